//! # Repostore Client
//!
//! Reconstructs the repository capability surface over the HTTP API:
//! reference-resolving operations intercept redirects and reverse-parse the
//! `Location` header through the shared router; data-returning operations
//! decode JSON.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use repostore_core::router::{parse_commit_url, Router};
use repostore_core::{
    BlameOptions, Branch, CloneSpec, Commit, CommitId, CommitsOptions, Committer, Diff,
    DiffOptions, Error, ErrorKind, FileWithRange, GetFileOptions, Hunk, RepoId, Result, Tag,
    TreeEntry, TOTAL_COMMITS_HEADER,
};
use reqwest::{redirect, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// How many manual redirect hops a data-returning request will follow.
const MAX_REDIRECTS: usize = 4;

struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    router: Router,
}

/// A client for one repostore server.
///
/// Cheap to clone; repositories hold a clone of the client, which shares the
/// underlying connection pool.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

/// Repository info returned by the existence probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoInfo {
    /// VCS type tag implementing the repository on the server.
    pub implementation_type: String,
}

impl Client {
    /// Creates a client for a server base URL such as
    /// `http://localhost:9090`.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::invalid_argument(format!("invalid base URL: {e}")))?;
        let prefix = base_url.path().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .user_agent(concat!("repostore-client/", env!("CARGO_PKG_VERSION")))
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                router: Router::new(prefix),
            }),
        })
    }

    /// Returns the repository object for an identifier.
    pub fn repository(&self, repo_id: RepoId) -> RemoteRepository {
        RemoteRepository {
            client: self.clone(),
            repo_id,
        }
    }

    fn url_for(&self, path: &str) -> Result<Url> {
        // The router's prefix already carries the base path, so the path is
        // set whole rather than joined (which would double the prefix).
        let mut url = self.inner.base_url.clone();
        url.set_path(path);
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request
            .send()
            .await
            .map_err(|e| Error::transport(format!("request failed: {e}")))
    }

    /// GET and decode JSON, following commit-URL redirects manually so
    /// short-id requests land on the canonical resource.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: String,
        query: Option<&impl Serialize>,
    ) -> Result<T> {
        let mut path = path;
        for _ in 0..MAX_REDIRECTS {
            let mut request = self.inner.http.get(self.url_for(&path)?);
            if let Some(query) = query {
                request = request.query(query);
            }
            let response = self.send(request).await?;
            if response.status().is_redirection() {
                path = location_path(&response)?;
                continue;
            }
            let response = check_status(response).await?;
            return response
                .json()
                .await
                .map_err(|e| Error::internal(format!("undecodable response: {e}")));
        }
        Err(Error::internal("too many redirects"))
    }

    /// GET without following redirects; returns the commit id carried in
    /// the `Location` header.
    async fn resolve(&self, path: String) -> Result<CommitId> {
        let request = self.inner.http.get(self.url_for(&path)?);
        let response = self.send(request).await?;
        if !response.status().is_redirection() {
            let response = check_status(response).await?;
            return Err(Error::internal(format!(
                "expected a redirect, got {}",
                response.status()
            )));
        }
        let location = location_path(&response)?;
        parse_commit_url(&location)
            .map(|(_, commit)| commit)
            .ok_or_else(|| {
                Error::internal(format!(
                    "failed to determine commit id from redirect {location:?}"
                ))
            })
    }
}

fn location_path(response: &reqwest::Response) -> Result<String> {
    let raw = response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::internal("redirect without a Location header"))?;
    // Location may be an absolute URL or a bare path.
    match Url::parse(raw) {
        Ok(url) => Ok(url.path().to_string()),
        Err(_) => Ok(raw.to_string()),
    }
}

fn kind_for_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::BAD_REQUEST => ErrorKind::InvalidArgument,
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::UNAUTHORIZED => ErrorKind::AuthRequired,
        StatusCode::FORBIDDEN => ErrorKind::Forbidden,
        StatusCode::NOT_IMPLEMENTED => ErrorKind::NotImplemented,
        _ => ErrorKind::Internal,
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "Message")]
    message: String,
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let kind = kind_for_status(status);
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.message,
        Err(_) => format!("server returned {status}"),
    };
    Err(Error::new(kind, message))
}

/// A repository reconstructed over the HTTP API.
pub struct RemoteRepository {
    client: Client,
    repo_id: RepoId,
}

impl RemoteRepository {
    fn router(&self) -> &Router {
        &self.client.inner.router
    }

    /// The identifier this repository was opened under.
    pub fn repo_id(&self) -> &RepoId {
        &self.repo_id
    }

    /// Probes existence and returns the implementing VCS type.
    pub async fn info(&self) -> Result<RepoInfo> {
        self.client
            .get_json(self.router().url_to_repo(&self.repo_id), None::<&()>)
            .await
    }

    /// Instructs the server to clone the repository, or to fetch everything
    /// from its remote when it already exists. Blocks until the server
    /// finishes; 200 and 201 are both success.
    pub async fn clone_or_update(&self, spec: &CloneSpec) -> Result<()> {
        let url = self
            .client
            .url_for(&self.router().url_to_repo(&self.repo_id))?;
        let request = self.client.inner.http.post(url).json(spec);
        let response = self.client.send(request).await?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(()),
            _ => {
                check_status(response).await?;
                Ok(())
            }
        }
    }

    /// Resolves a branch name to a commit id.
    pub async fn resolve_branch(&self, name: &str) -> Result<CommitId> {
        self.client
            .resolve(self.router().url_to_branch(&self.repo_id, name))
            .await
    }

    /// Resolves a tag name to a commit id.
    pub async fn resolve_tag(&self, tag: &str) -> Result<CommitId> {
        self.client
            .resolve(self.router().url_to_tag(&self.repo_id, tag))
            .await
    }

    /// Resolves an arbitrary revision spec to a commit id.
    pub async fn resolve_revision(&self, spec: &str) -> Result<CommitId> {
        self.client
            .resolve(self.router().url_to_revision(&self.repo_id, spec))
            .await
    }

    /// Fetches a commit by id, following the canonicalizing redirect for
    /// abbreviated ids.
    pub async fn get_commit(&self, id: &CommitId) -> Result<Commit> {
        self.client
            .get_json(self.router().url_to_commit(&self.repo_id, id), None::<&()>)
            .await
    }

    /// Lists commits from a head; returns the page and the total reachable
    /// count from `X-Total-Commits`.
    pub async fn commits(&self, opt: &CommitsOptions) -> Result<(Vec<Commit>, u64)> {
        let url = self
            .client
            .url_for(&self.router().url_to_commits(&self.repo_id))?;
        let request = self.client.inner.http.get(url).query(opt);
        let response = self.client.send(request).await?;
        let response = check_status(response).await?;
        let total = response
            .headers()
            .get(TOTAL_COMMITS_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| Error::internal("missing or unparseable X-Total-Commits header"))?;
        let commits = response
            .json()
            .await
            .map_err(|e| Error::internal(format!("undecodable commits: {e}")))?;
        Ok((commits, total))
    }

    /// Full commit log ending at the given commit.
    pub async fn commit_log(&self, to: &CommitId) -> Result<Vec<Commit>> {
        self.client
            .get_json(
                self.router().url_to_commit_log(&self.repo_id, to),
                None::<&()>,
            )
            .await
    }

    /// All branches.
    pub async fn branches(&self) -> Result<Vec<Branch>> {
        self.client
            .get_json(self.router().url_to_branches(&self.repo_id), None::<&()>)
            .await
    }

    /// All tags.
    pub async fn tags(&self) -> Result<Vec<Tag>> {
        self.client
            .get_json(self.router().url_to_tags(&self.repo_id), None::<&()>)
            .await
    }

    /// Committers with commit counts.
    pub async fn committers(&self) -> Result<Vec<Committer>> {
        self.client
            .get_json(self.router().url_to_committers(&self.repo_id), None::<&()>)
            .await
    }

    /// Fetches a tree entry at a commit. Directories carry immediate
    /// children, the full subtree with `full_tree`.
    pub async fn tree_entry(
        &self,
        commit: &CommitId,
        path: &str,
        full_tree: bool,
    ) -> Result<TreeEntry> {
        let opt = GetFileOptions {
            full_tree,
            ..Default::default()
        };
        self.client
            .get_json(
                self.router().url_to_tree_entry(&self.repo_id, commit, path),
                Some(&opt),
            )
            .await
    }

    /// Fetches a ranged read of a file, contents trimmed to the normalized
    /// range.
    pub async fn file_with_range(
        &self,
        commit: &CommitId,
        path: &str,
        opt: &GetFileOptions,
    ) -> Result<FileWithRange> {
        self.client
            .get_json(
                self.router().url_to_tree_entry(&self.repo_id, commit, path),
                Some(opt),
            )
            .await
    }

    /// Blames a file.
    pub async fn blame_file(&self, path: &str, opt: &BlameOptions) -> Result<Vec<Hunk>> {
        self.client
            .get_json(self.router().url_to_blame(&self.repo_id, path), Some(opt))
            .await
    }

    /// Diffs two commits.
    pub async fn diff(&self, base: &CommitId, head: &CommitId, opt: &DiffOptions) -> Result<Diff> {
        self.client
            .get_json(
                self.router().url_to_diff(&self.repo_id, base, head),
                Some(opt),
            )
            .await
    }

    /// Diffs a commit against a commit of another repository.
    pub async fn cross_repo_diff(
        &self,
        base: &CommitId,
        head_repo: &RepoId,
        head: &CommitId,
        opt: &DiffOptions,
    ) -> Result<Diff> {
        self.client
            .get_json(
                self.router()
                    .url_to_cross_repo_diff(&self.repo_id, base, head_repo, head),
                Some(opt),
            )
            .await
    }

    /// Merge base of two commits, extracted from the redirect target.
    pub async fn merge_base(&self, a: &CommitId, b: &CommitId) -> Result<CommitId> {
        self.client
            .resolve(self.router().url_to_merge_base(&self.repo_id, a, b))
            .await
    }

    /// Merge base across repositories.
    pub async fn cross_repo_merge_base(
        &self,
        a: &CommitId,
        head_repo: &RepoId,
        b: &CommitId,
    ) -> Result<CommitId> {
        self.client
            .resolve(
                self.router()
                    .url_to_cross_repo_merge_base(&self.repo_id, a, head_repo, b),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_urls_under_base_path() {
        let client = Client::new("http://localhost:9090/api/").unwrap();
        let repo = client.repository(RepoId::parse("a.b/c").unwrap());
        let path = repo.router().url_to_repo(repo.repo_id());
        assert_eq!(path, "/api/a.b/c");
        let url = client.url_for(&path).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9090/api/a.b/c");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(Client::new("not a url").is_err());
    }

    #[test]
    fn statuses_map_to_error_kinds() {
        assert_eq!(
            kind_for_status(StatusCode::NOT_FOUND),
            ErrorKind::NotFound
        );
        assert_eq!(
            kind_for_status(StatusCode::NOT_IMPLEMENTED),
            ErrorKind::NotImplemented
        );
        assert_eq!(
            kind_for_status(StatusCode::INTERNAL_SERVER_ERROR),
            ErrorKind::Internal
        );
    }
}
