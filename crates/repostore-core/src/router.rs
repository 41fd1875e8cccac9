//! Bidirectional mapping between URL paths and repository operations.
//!
//! Operation route segments begin with `.` to disambiguate them from
//! repository-identifier path segments: `/{repoID}/.commits/{commitID}`,
//! `/{repoID}/.branches/{name}`, and so on. The same table is used by the
//! server to dispatch requests and by the client to construct URLs and to
//! reverse-parse redirect targets.

use crate::{CommitId, Error, RepoId, Result};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters percent-encoded inside a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// An operation extracted from a URL path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `GET /`: service banner.
    Root,
    /// `GET /{repoID}` (info) and `POST /{repoID}` (clone or update).
    Repo {
        /// Repository the request addresses.
        repo_id: RepoId,
    },
    /// `GET /{repoID}/.branches`: list branches.
    Branches {
        /// Repository the request addresses.
        repo_id: RepoId,
    },
    /// `GET /{repoID}/.branches/{name}`: resolve a branch to a commit.
    Branch {
        /// Repository the request addresses.
        repo_id: RepoId,
        /// Branch name (may contain `/`).
        name: String,
    },
    /// `GET /{repoID}/.tags`: list tags.
    Tags {
        /// Repository the request addresses.
        repo_id: RepoId,
    },
    /// `GET /{repoID}/.tags/{tag}`: resolve a tag to a commit.
    Tag {
        /// Repository the request addresses.
        repo_id: RepoId,
        /// Tag name (may contain `/`).
        tag: String,
    },
    /// `GET /{repoID}/.revs/{spec}`: resolve an arbitrary revision spec.
    Revision {
        /// Repository the request addresses.
        repo_id: RepoId,
        /// Revision spec.
        spec: String,
    },
    /// `GET /{repoID}/.commits`: list commits from a head.
    Commits {
        /// Repository the request addresses.
        repo_id: RepoId,
    },
    /// `GET /{repoID}/.commits/{id}`: fetch a single commit.
    Commit {
        /// Repository the request addresses.
        repo_id: RepoId,
        /// Possibly abbreviated commit id.
        commit_id: CommitId,
    },
    /// `GET /{repoID}/.commits/{id}/log`: commit log ending at `{id}`.
    CommitLog {
        /// Repository the request addresses.
        repo_id: RepoId,
        /// Possibly abbreviated commit id.
        commit_id: CommitId,
    },
    /// `GET /{repoID}/.commits/{id}/tree/{path}`: tree entry at a commit.
    TreeEntry {
        /// Repository the request addresses.
        repo_id: RepoId,
        /// Possibly abbreviated commit id.
        commit_id: CommitId,
        /// Path within the tree; `.` is the root.
        path: String,
    },
    /// `GET /{repoID}/.blame/{path}`: blame a file.
    Blame {
        /// Repository the request addresses.
        repo_id: RepoId,
        /// File path within the tree.
        path: String,
    },
    /// `GET /{repoID}/.diff/{base}..{head}`: diff two commits.
    Diff {
        /// Repository the request addresses.
        repo_id: RepoId,
        /// Base commit id.
        base: CommitId,
        /// Head commit id.
        head: CommitId,
    },
    /// `GET /{repoID}/.cross-repo-diff/{base}..{headRepoID}:{head}`.
    CrossRepoDiff {
        /// Base repository.
        repo_id: RepoId,
        /// Base commit id.
        base: CommitId,
        /// Head repository.
        head_repo_id: RepoId,
        /// Head commit id.
        head: CommitId,
    },
    /// `GET /{repoID}/.merge-base/{a}/{b}`: merge base of two commits.
    MergeBase {
        /// Repository the request addresses.
        repo_id: RepoId,
        /// First commit id.
        a: CommitId,
        /// Second commit id.
        b: CommitId,
    },
    /// `GET /{repoID}/.cross-repo-merge-base/{a}..{headRepoID}:{b}`.
    CrossRepoMergeBase {
        /// Repository of the first commit.
        repo_id: RepoId,
        /// First commit id.
        a: CommitId,
        /// Repository of the second commit.
        head_repo_id: RepoId,
        /// Second commit id.
        b: CommitId,
    },
    /// `GET /{repoID}/.committers`: committer list.
    Committers {
        /// Repository the request addresses.
        repo_id: RepoId,
    },
    /// `GET /{repoID}/.git/info/refs`: smart-transport ref advertisement.
    GitInfoRefs {
        /// Repository the request addresses.
        repo_id: RepoId,
    },
    /// `POST /{repoID}/.git/git-upload-pack`: smart-transport fetch.
    GitUploadPack {
        /// Repository the request addresses.
        repo_id: RepoId,
    },
    /// `POST /{repoID}/.git/git-receive-pack`: smart-transport push.
    GitReceivePack {
        /// Repository the request addresses.
        repo_id: RepoId,
    },
}

impl Route {
    /// Whether this route belongs to the git smart transport, which is only
    /// matched for clients whose User-Agent begins with `git/`.
    pub fn is_git_transport(&self) -> bool {
        matches!(
            self,
            Route::GitInfoRefs { .. } | Route::GitUploadPack { .. } | Route::GitReceivePack { .. }
        )
    }
}

fn decode_segment(seg: &str) -> Result<String> {
    percent_decode_str(seg)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| Error::invalid_argument(format!("malformed percent-encoding in {seg:?}")))
}

fn encode_segment(seg: &str) -> String {
    utf8_percent_encode(seg, SEGMENT).to_string()
}

/// Matches a URL path against the route table.
///
/// Returns `NotFound` for paths that fit no route and `InvalidArgument` for
/// paths that name a route but carry malformed identifiers.
pub fn match_path(path: &str) -> Result<Route> {
    let path = path.strip_prefix('/').unwrap_or(path);
    if path.is_empty() {
        return Ok(Route::Root);
    }
    let path = path.strip_suffix('/').unwrap_or(path);

    let raw: Vec<&str> = path.split('/').collect();
    let op_index = raw.iter().position(|seg| seg.starts_with('.'));

    let repo_segments = &raw[..op_index.unwrap_or(raw.len())];
    let mut decoded = Vec::with_capacity(repo_segments.len());
    for seg in repo_segments {
        decoded.push(decode_segment(seg)?);
    }
    let repo_id = RepoId::parse(decoded.join("/"))?;

    let Some(op_index) = op_index else {
        return Ok(Route::Repo { repo_id });
    };
    let op = raw[op_index];
    let rest = &raw[op_index + 1..];

    let join_rest = |rest: &[&str]| -> Result<String> {
        let mut parts = Vec::with_capacity(rest.len());
        for seg in rest {
            parts.push(decode_segment(seg)?);
        }
        Ok(parts.join("/"))
    };

    match (op, rest) {
        (".branches", []) => Ok(Route::Branches { repo_id }),
        (".branches", rest) => Ok(Route::Branch {
            repo_id,
            name: join_rest(rest)?,
        }),
        (".tags", []) => Ok(Route::Tags { repo_id }),
        (".tags", rest) => Ok(Route::Tag {
            repo_id,
            tag: join_rest(rest)?,
        }),
        (".revs", rest) if !rest.is_empty() => Ok(Route::Revision {
            repo_id,
            spec: join_rest(rest)?,
        }),
        (".commits", []) => Ok(Route::Commits { repo_id }),
        (".commits", [id]) => Ok(Route::Commit {
            repo_id,
            commit_id: CommitId::parse(decode_segment(id)?)?,
        }),
        (".commits", [id, "log"]) => Ok(Route::CommitLog {
            repo_id,
            commit_id: CommitId::parse(decode_segment(id)?)?,
        }),
        (".commits", [id, "tree", tree_path @ ..]) => {
            let path = join_rest(tree_path)?;
            Ok(Route::TreeEntry {
                repo_id,
                commit_id: CommitId::parse(decode_segment(id)?)?,
                path: if path.is_empty() { ".".to_string() } else { path },
            })
        }
        (".blame", rest) if !rest.is_empty() => Ok(Route::Blame {
            repo_id,
            path: join_rest(rest)?,
        }),
        (".diff", [pair]) => {
            let pair = decode_segment(pair)?;
            let (base, head) = pair
                .split_once("..")
                .ok_or_else(|| Error::invalid_argument("diff spec must be {base}..{head}"))?;
            Ok(Route::Diff {
                repo_id,
                base: CommitId::parse(base)?,
                head: CommitId::parse(head)?,
            })
        }
        (".cross-repo-diff", rest) if !rest.is_empty() => {
            let spec = join_rest(rest)?;
            let (base, head_part) = spec.split_once("..").ok_or_else(|| {
                Error::invalid_argument("cross-repo diff spec must be {base}..{headRepoID}:{head}")
            })?;
            let (head_repo, head) = head_part.rsplit_once(':').ok_or_else(|| {
                Error::invalid_argument("cross-repo diff spec must be {base}..{headRepoID}:{head}")
            })?;
            Ok(Route::CrossRepoDiff {
                repo_id,
                base: CommitId::parse(base)?,
                head_repo_id: RepoId::parse(head_repo)?,
                head: CommitId::parse(head)?,
            })
        }
        (".merge-base", [a, b]) => Ok(Route::MergeBase {
            repo_id,
            a: CommitId::parse(decode_segment(a)?)?,
            b: CommitId::parse(decode_segment(b)?)?,
        }),
        (".cross-repo-merge-base", rest) if !rest.is_empty() => {
            let spec = join_rest(rest)?;
            let (a, b_part) = spec.split_once("..").ok_or_else(|| {
                Error::invalid_argument(
                    "cross-repo merge-base spec must be {a}..{headRepoID}:{b}",
                )
            })?;
            let (head_repo, b) = b_part.rsplit_once(':').ok_or_else(|| {
                Error::invalid_argument(
                    "cross-repo merge-base spec must be {a}..{headRepoID}:{b}",
                )
            })?;
            Ok(Route::CrossRepoMergeBase {
                repo_id,
                a: CommitId::parse(a)?,
                head_repo_id: RepoId::parse(head_repo)?,
                b: CommitId::parse(b)?,
            })
        }
        (".committers", []) => Ok(Route::Committers { repo_id }),
        (".git", ["info", "refs"]) => Ok(Route::GitInfoRefs { repo_id }),
        (".git", ["git-upload-pack"]) => Ok(Route::GitUploadPack { repo_id }),
        (".git", ["git-receive-pack"]) => Ok(Route::GitReceivePack { repo_id }),
        _ => Err(Error::not_found(format!("no route matches path {path:?}"))),
    }
}

/// Extracts the resolved commit id from a redirect target, if the target is
/// a commit URL. This is the reverse-parse entry the client uses on
/// `Location` headers.
pub fn parse_commit_url(path: &str) -> Option<(RepoId, CommitId)> {
    match match_path(path) {
        Ok(Route::Commit { repo_id, commit_id }) => Some((repo_id, commit_id)),
        _ => None,
    }
}

/// Constructs URL paths for every operation, under a fixed prefix.
#[derive(Debug, Clone)]
pub struct Router {
    prefix: String,
}

impl Default for Router {
    fn default() -> Self {
        Self::new("")
    }
}

impl Router {
    /// Creates a router whose generated paths are rooted at `prefix`
    /// (without a trailing slash; the empty string roots at `/`).
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        while prefix.ends_with('/') {
            prefix.pop();
        }
        Self { prefix }
    }

    fn repo_path(&self, repo_id: &RepoId) -> String {
        let encoded: Vec<String> = repo_id.segments().map(encode_segment).collect();
        format!("{}/{}", self.prefix, encoded.join("/"))
    }

    /// `/{repoID}`
    pub fn url_to_repo(&self, repo_id: &RepoId) -> String {
        self.repo_path(repo_id)
    }

    /// `/{repoID}/.branches`
    pub fn url_to_branches(&self, repo_id: &RepoId) -> String {
        format!("{}/.branches", self.repo_path(repo_id))
    }

    /// `/{repoID}/.branches/{name}`
    pub fn url_to_branch(&self, repo_id: &RepoId, name: &str) -> String {
        format!("{}/.branches/{}", self.repo_path(repo_id), encode_segment(name))
    }

    /// `/{repoID}/.tags`
    pub fn url_to_tags(&self, repo_id: &RepoId) -> String {
        format!("{}/.tags", self.repo_path(repo_id))
    }

    /// `/{repoID}/.tags/{tag}`
    pub fn url_to_tag(&self, repo_id: &RepoId, tag: &str) -> String {
        format!("{}/.tags/{}", self.repo_path(repo_id), encode_segment(tag))
    }

    /// `/{repoID}/.revs/{spec}`
    pub fn url_to_revision(&self, repo_id: &RepoId, spec: &str) -> String {
        format!("{}/.revs/{}", self.repo_path(repo_id), encode_segment(spec))
    }

    /// `/{repoID}/.commits`
    pub fn url_to_commits(&self, repo_id: &RepoId) -> String {
        format!("{}/.commits", self.repo_path(repo_id))
    }

    /// `/{repoID}/.commits/{id}`
    pub fn url_to_commit(&self, repo_id: &RepoId, commit_id: &CommitId) -> String {
        format!("{}/.commits/{}", self.repo_path(repo_id), commit_id)
    }

    /// `/{repoID}/.commits/{id}/log`
    pub fn url_to_commit_log(&self, repo_id: &RepoId, commit_id: &CommitId) -> String {
        format!("{}/.commits/{}/log", self.repo_path(repo_id), commit_id)
    }

    /// `/{repoID}/.commits/{id}/tree/{path}`
    pub fn url_to_tree_entry(
        &self,
        repo_id: &RepoId,
        commit_id: &CommitId,
        path: &str,
    ) -> String {
        let base = format!("{}/.commits/{}/tree", self.repo_path(repo_id), commit_id);
        if path.is_empty() || path == "." {
            return base;
        }
        let encoded: Vec<String> = path.split('/').map(encode_segment).collect();
        format!("{base}/{}", encoded.join("/"))
    }

    /// `/{repoID}/.blame/{path}`
    pub fn url_to_blame(&self, repo_id: &RepoId, path: &str) -> String {
        let encoded: Vec<String> = path.split('/').map(encode_segment).collect();
        format!("{}/.blame/{}", self.repo_path(repo_id), encoded.join("/"))
    }

    /// `/{repoID}/.diff/{base}..{head}`
    pub fn url_to_diff(&self, repo_id: &RepoId, base: &CommitId, head: &CommitId) -> String {
        format!("{}/.diff/{base}..{head}", self.repo_path(repo_id))
    }

    /// `/{repoID}/.cross-repo-diff/{base}..{headRepoID}:{head}`
    pub fn url_to_cross_repo_diff(
        &self,
        repo_id: &RepoId,
        base: &CommitId,
        head_repo_id: &RepoId,
        head: &CommitId,
    ) -> String {
        format!(
            "{}/.cross-repo-diff/{base}..{}:{head}",
            self.repo_path(repo_id),
            head_repo_id
        )
    }

    /// `/{repoID}/.merge-base/{a}/{b}`
    pub fn url_to_merge_base(&self, repo_id: &RepoId, a: &CommitId, b: &CommitId) -> String {
        format!("{}/.merge-base/{a}/{b}", self.repo_path(repo_id))
    }

    /// `/{repoID}/.cross-repo-merge-base/{a}..{headRepoID}:{b}`
    pub fn url_to_cross_repo_merge_base(
        &self,
        repo_id: &RepoId,
        a: &CommitId,
        head_repo_id: &RepoId,
        b: &CommitId,
    ) -> String {
        format!(
            "{}/.cross-repo-merge-base/{a}..{}:{b}",
            self.repo_path(repo_id),
            head_repo_id
        )
    }

    /// `/{repoID}/.committers`
    pub fn url_to_committers(&self, repo_id: &RepoId) -> String {
        format!("{}/.committers", self.repo_path(repo_id))
    }

    /// `/{repoID}/.git/info/refs`
    pub fn url_to_git_info_refs(&self, repo_id: &RepoId) -> String {
        format!("{}/.git/info/refs", self.repo_path(repo_id))
    }

    /// `/{repoID}/.git/git-upload-pack`
    pub fn url_to_git_upload_pack(&self, repo_id: &RepoId) -> String {
        format!("{}/.git/git-upload-pack", self.repo_path(repo_id))
    }

    /// `/{repoID}/.git/git-receive-pack`
    pub fn url_to_git_receive_pack(&self, repo_id: &RepoId) -> String {
        format!("{}/.git/git-receive-pack", self.repo_path(repo_id))
    }
}
