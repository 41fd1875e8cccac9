//! HTTP-level tests of the dispatcher, driven through the router with a
//! scripted in-memory driver (and the real git driver for the smart
//! transport advertisement).

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use repostore_core::{
    Branch, CloneSpec, Commit, CommitId, CommitsOptions, Error, ErrorKind, RemoteOpts, RepoId,
    Result, Signature, Tag, TreeEntry, TreeEntryType, VcsType,
};
use repostore_server::{AppState, ServerConfig};
use repostore_vcs::{Driver, DriverRegistry, RepoManager, Repository};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const CANONICAL: &str = "0123456789abcdef0123456789abcdef01234567";
const OTHER: &str = "89abcdef0123456789abcdef0123456789abcdef";

fn canned_commit() -> Commit {
    Commit {
        id: CommitId::parse(CANONICAL).unwrap(),
        author: Signature {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            date: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        },
        committer: None,
        message: "initial import".to_string(),
        parents: vec![],
    }
}

#[derive(Debug)]
struct FakeDriver {
    clone_delay: Duration,
}

struct FakeRepository {
    dir: PathBuf,
}

#[async_trait]
impl Driver for FakeDriver {
    fn vcs_type(&self) -> VcsType {
        VcsType::parse("fake").unwrap()
    }

    fn detect(&self, dir: &Path) -> bool {
        dir.join("FAKE_REPO").is_file()
    }

    async fn open_mirror(&self, dir: &Path) -> Result<Arc<dyn Repository>> {
        if !self.detect(dir) {
            return Err(Error::new(ErrorKind::Corrupt, "not a fake repository"));
        }
        Ok(Arc::new(FakeRepository {
            dir: dir.to_path_buf(),
        }))
    }

    async fn clone_mirror(&self, clone_url: &str, dir: &Path, _opt: &RemoteOpts) -> Result<()> {
        tokio::time::sleep(self.clone_delay).await;
        std::fs::write(dir.join("FAKE_REPO"), clone_url)?;
        Ok(())
    }
}

#[async_trait]
impl Repository for FakeRepository {
    fn vcs_type(&self) -> VcsType {
        VcsType::parse("fake").unwrap()
    }

    fn dir(&self) -> &Path {
        &self.dir
    }

    async fn resolve_branch(&self, name: &str) -> Result<CommitId> {
        match name {
            "main" => Ok(CommitId::parse(CANONICAL).unwrap()),
            _ => Err(Error::not_found(format!("no branch {name:?}"))),
        }
    }

    async fn resolve_revision(&self, spec: &str) -> Result<CommitId> {
        if CANONICAL.starts_with(spec) {
            Ok(CommitId::parse(CANONICAL).unwrap())
        } else {
            Err(Error::not_found(format!("no revision {spec:?}")))
        }
    }

    async fn get_commit(&self, id: &CommitId) -> Result<Commit> {
        if CANONICAL.starts_with(id.as_str()) {
            Ok(canned_commit())
        } else {
            Err(Error::not_found(format!("commit {id} not found")))
        }
    }

    async fn commits(&self, opt: &CommitsOptions) -> Result<(Vec<Commit>, u64)> {
        if !CANONICAL.starts_with(&opt.head) {
            return Err(Error::not_found(format!("commit {} not found", opt.head)));
        }
        Ok((vec![canned_commit()], 17))
    }

    async fn branches(&self) -> Result<Vec<Branch>> {
        Ok(vec![Branch {
            name: "main".to_string(),
            head: CommitId::parse(CANONICAL).unwrap(),
        }])
    }

    async fn tags(&self) -> Result<Vec<Tag>> {
        Ok(vec![])
    }

    async fn tree_entry(
        &self,
        _commit: &CommitId,
        path: &str,
        recursive: bool,
    ) -> Result<TreeEntry> {
        let mod_time = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let readme = TreeEntry {
            name: "README.md".to_string(),
            entry_type: TreeEntryType::File,
            size: 12,
            mod_time,
            contents: Some(b"hello\nworld\n".to_vec()),
            entries: None,
        };
        let lib = TreeEntry {
            name: "lib.rs".to_string(),
            entry_type: TreeEntryType::File,
            size: 0,
            mod_time,
            contents: Some(Vec::new()),
            entries: None,
        };
        match path {
            "." => {
                let src = TreeEntry {
                    name: "src".to_string(),
                    entry_type: TreeEntryType::Dir,
                    size: 0,
                    mod_time,
                    contents: None,
                    entries: recursive.then(|| vec![{
                        let mut lib = lib.clone();
                        lib.contents = None;
                        lib
                    }]),
                };
                let mut entries = vec![readme, src];
                entries
                    .iter_mut()
                    .for_each(|e| {
                        if e.entry_type == TreeEntryType::File {
                            e.contents = None;
                        }
                    });
                TreeEntry::sort_entries(&mut entries);
                Ok(TreeEntry {
                    name: ".".to_string(),
                    entry_type: TreeEntryType::Dir,
                    size: 0,
                    mod_time,
                    contents: None,
                    entries: Some(entries),
                })
            }
            "README.md" => Ok(readme),
            "src/lib.rs" => Ok(lib),
            _ => Err(Error::not_found(format!("path {path:?} not found"))),
        }
    }

    async fn merge_base(&self, _a: &CommitId, _b: &CommitId) -> Result<CommitId> {
        Ok(CommitId::parse(CANONICAL).unwrap())
    }

    async fn update_everything(&self, _opt: &RemoteOpts) -> Result<()> {
        Ok(())
    }
}

struct TestServer {
    _storage: tempfile::TempDir,
    app: axum::Router,
    state: AppState,
}

fn test_server_with(config: ServerConfig, clone_delay: Duration) -> TestServer {
    let storage = tempfile::TempDir::new().unwrap();
    let mut registry = DriverRegistry::new();
    registry.register(Arc::new(FakeDriver { clone_delay }));
    let manager = Arc::new(RepoManager::new(storage.path(), Arc::new(registry)));
    let state = AppState::new(manager, config);
    let app = repostore_server::create_router(state.clone());
    TestServer {
        _storage: storage,
        app,
        state,
    }
}

fn test_server() -> TestServer {
    test_server_with(ServerConfig::default(), Duration::ZERO)
}

fn repo_id() -> RepoId {
    RepoId::parse("example.com/a/b").unwrap()
}

fn clone_spec() -> CloneSpec {
    CloneSpec {
        vcs_type: VcsType::parse("fake").unwrap(),
        clone_url: "https://example.com/a/b".to_string(),
        remote_opts: RemoteOpts::default(),
    }
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(path)
        .body(Body::empty())
        .unwrap()
}

fn post_clone(path: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&clone_spec()).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn seed_repo(server: &TestServer) {
    let response = server
        .app
        .clone()
        .oneshot(post_clone("/example.com/a/b"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn root_banner_and_date_header() {
    let server = test_server();
    let response = server.app.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let date = response.headers().get(header::DATE).unwrap();
    assert!(date.to_str().unwrap().ends_with("GMT"));
    let body = body_json(response).await;
    assert_eq!(body["name"], "repostore");
}

#[tokio::test]
async fn missing_repo_is_404() {
    let server = test_server();
    let response = server
        .app
        .clone()
        .oneshot(get("/example.com/a/b"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache, max-age=0"
    );
}

#[tokio::test]
async fn clone_then_info_then_update() {
    let server = test_server();
    seed_repo(&server).await;

    let response = server
        .app
        .clone()
        .oneshot(get("/example.com/a/b"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["implementation_type"], "fake");

    // Re-posting an existing repository updates it.
    let response = server
        .app
        .clone()
        .oneshot(post_clone("/example.com/a/b"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn clone_without_spec_is_invalid() {
    let server = test_server();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/example.com/a/b")
        .body(Body::empty())
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn clone_race_yields_one_created_and_one_ok() {
    let server = test_server_with(ServerConfig::default(), Duration::from_millis(50));

    let app1 = server.app.clone();
    let app2 = server.app.clone();
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { app1.oneshot(post_clone("/example.com/a/b")).await.unwrap() }),
        tokio::spawn(async move { app2.oneshot(post_clone("/example.com/a/b")).await.unwrap() }),
    );
    let mut statuses = vec![r1.unwrap().status(), r2.unwrap().status()];
    statuses.sort();
    assert!(
        statuses == [StatusCode::OK, StatusCode::CREATED]
            || statuses == [StatusCode::CREATED, StatusCode::CREATED],
        "unexpected statuses {statuses:?}"
    );

    // Exactly one clone directory and no temp siblings remain.
    let dir = server.state.manager.repo_dir(&repo_id()).unwrap();
    assert!(dir.join("FAKE_REPO").is_file());
    let leftovers: Vec<_> = std::fs::read_dir(dir.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("_tmp_"))
        .collect();
    assert!(leftovers.is_empty(), "leftover temp dirs: {leftovers:?}");
}

#[tokio::test]
async fn short_commit_id_redirects_to_canonical() {
    let server = test_server();
    seed_repo(&server).await;

    let response = server
        .app
        .clone()
        .oneshot(get("/example.com/a/b/.commits/0123"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        &format!("/example.com/a/b/.commits/{CANONICAL}")
    );
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "max-age=0, private, must-revalidate"
    );

    // The Location parses back to the canonical commit id.
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    let (_, commit) = repostore_core::router::parse_commit_url(location).unwrap();
    assert_eq!(commit.as_str(), CANONICAL);
}

#[tokio::test]
async fn canonical_commit_is_long_cached() {
    let server = test_server();
    seed_repo(&server).await;

    let response = server
        .app
        .clone()
        .oneshot(get(&format!("/example.com/a/b/.commits/{CANONICAL}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "max-age=31536000, public"
    );
    let body = body_json(response).await;
    assert_eq!(body["id"], CANONICAL);
    assert_eq!(body["author"]["name"], "Alice");
}

#[tokio::test]
async fn malformed_commit_id_is_400() {
    let server = test_server();
    seed_repo(&server).await;

    for path in [
        "/example.com/a/b/.commits/NOTHEX",
        "/example.com/a/b/.commits/ABCD",
    ] {
        let response = server.app.clone().oneshot(get(path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{path}");
    }
}

#[tokio::test]
async fn commits_list_carries_total_header() {
    let server = test_server();
    seed_repo(&server).await;

    let response = server
        .app
        .clone()
        .oneshot(get(&format!(
            "/example.com/a/b/.commits?head={CANONICAL}&n=10"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("X-Total-Commits").unwrap(), "17");
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "max-age=31536000, public"
    );

    // A short head is servable but only short-cached.
    let response = server
        .app
        .clone()
        .oneshot(get("/example.com/a/b/.commits?head=0123"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "max-age=0, private, must-revalidate"
    );
}

#[tokio::test]
async fn branch_resolution_redirects_short_cache() {
    let server = test_server();
    seed_repo(&server).await;

    let response = server
        .app
        .clone()
        .oneshot(get("/example.com/a/b/.branches/main"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    let (_, commit) = repostore_core::router::parse_commit_url(location).unwrap();
    assert_eq!(commit.as_str(), CANONICAL);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "max-age=0, private, must-revalidate"
    );
}

#[tokio::test]
async fn branches_list_is_served() {
    let server = test_server();
    seed_repo(&server).await;

    let response = server
        .app
        .clone()
        .oneshot(get("/example.com/a/b/.branches"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body[0]["name"], "main");
}

#[tokio::test]
async fn merge_base_of_canonical_ids_is_permanent_redirect() {
    let server = test_server();
    seed_repo(&server).await;

    let response = server
        .app
        .clone()
        .oneshot(get(&format!(
            "/example.com/a/b/.merge-base/{CANONICAL}/{OTHER}"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "max-age=31536000, public"
    );

    let response = server
        .app
        .clone()
        .oneshot(get("/example.com/a/b/.merge-base/0123/89ab"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "max-age=0, private, must-revalidate"
    );
}

#[tokio::test]
async fn tree_file_with_range_is_trimmed_and_wrapped() {
    let server = test_server();
    seed_repo(&server).await;

    let response = server
        .app
        .clone()
        .oneshot(get(&format!(
            "/example.com/a/b/.commits/{CANONICAL}/tree/README.md?start_byte=0&end_byte=5&full_lines=true"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    // "hello\n" base64-encoded, expanded to the full first line.
    assert_eq!(body["contents"], "aGVsbG8K");
    assert_eq!(body["start_byte"], 0);
    assert_eq!(body["end_byte"], 6);
    assert_eq!(body["start_line"], 1);
    assert_eq!(body["end_line"], 1);
}

#[tokio::test]
async fn tree_bad_range_reports_totals() {
    let config = ServerConfig {
        debug: true,
        ..ServerConfig::default()
    };
    let server = test_server_with(config, Duration::ZERO);
    seed_repo(&server).await;

    let response = server
        .app
        .clone()
        .oneshot(get(&format!(
            "/example.com/a/b/.commits/{CANONICAL}/tree/README.md?end_byte=99"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["Message"], "end byte 99 out of bounds (12 bytes total)");
}

#[tokio::test]
async fn tree_directory_lists_children() {
    let server = test_server();
    seed_repo(&server).await;

    let response = server
        .app
        .clone()
        .oneshot(get(&format!("/example.com/a/b/.commits/{CANONICAL}/tree")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["type"], "dir");
    // Directories sort before files.
    assert_eq!(body["entries"][0]["name"], "src");
    assert_eq!(body["entries"][1]["name"], "README.md");
}

#[tokio::test]
async fn absent_capability_is_501_no_cache() {
    let server = test_server();
    seed_repo(&server).await;

    let response = server
        .app
        .clone()
        .oneshot(get(&format!(
            "/example.com/a/b/.diff/{CANONICAL}..{OTHER}"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache, max-age=0"
    );
}

#[tokio::test]
async fn error_bodies_only_in_debug_mode() {
    let server = test_server();
    let response = server
        .app
        .clone()
        .oneshot(get("/example.com/a/b"))
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.is_empty());

    let debug_server = test_server_with(
        ServerConfig {
            debug: true,
            ..ServerConfig::default()
        },
        Duration::ZERO,
    );
    let response = debug_server
        .app
        .clone()
        .oneshot(get("/example.com/a/b"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert!(body["Message"].as_str().unwrap().contains("no repository"));
}

#[tokio::test]
async fn git_transport_requires_git_user_agent() {
    let server = test_server();
    seed_repo(&server).await;

    let response = server
        .app
        .clone()
        .oneshot(get(
            "/example.com/a/b/.git/info/refs?service=git-upload-pack",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn git_info_refs_advertises_service() {
    // Real git driver against a real bare repository.
    let storage = tempfile::TempDir::new().unwrap();
    let repo_dir = storage.path().join("a.b/c");
    std::fs::create_dir_all(&repo_dir).unwrap();
    let status = std::process::Command::new("git")
        .args(["init", "--bare", "--quiet"])
        .arg(&repo_dir)
        .status()
        .expect("git binary available");
    assert!(status.success());

    let registry = Arc::new(DriverRegistry::with_defaults());
    let manager = Arc::new(RepoManager::new(storage.path(), registry));
    let state = AppState::new(manager, ServerConfig::default());
    let app = repostore_server::create_router(state);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/a.b/c/.git/info/refs?service=git-upload-pack")
        .header(header::USER_AGENT, "git/2.40.0")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/x-git-upload-pack-advertisement"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.starts_with(b"001e# service=git-upload-pack\n0000"));
}

#[tokio::test]
async fn basic_auth_guards_every_route() {
    let config = ServerConfig {
        basic_auth: Some("user:secret".to_string()),
        ..ServerConfig::default()
    };
    let server = test_server_with(config, Duration::ZERO);

    let response = server.app.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::WWW_AUTHENTICATE).is_some());

    let request = Request::builder()
        .method(Method::GET)
        .uri("/")
        .header(header::AUTHORIZATION, "Basic dXNlcjpzZWNyZXQ=")
        .body(Body::empty())
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn healthz_and_metrics_respond() {
    let server = test_server();
    let response = server.app.clone().oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = server.app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(String::from_utf8_lossy(&bytes).contains("repostore_requests"));
}
