//! Client/server round trip over a live listener with a scripted driver.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use repostore_client::Client;
use repostore_core::{
    Branch, CloneSpec, Commit, CommitId, CommitsOptions, Error, ErrorKind, RemoteOpts, RepoId,
    Result, Signature, VcsType,
};
use repostore_server::{AppState, ServerConfig};
use repostore_vcs::{Driver, DriverRegistry, RepoManager, Repository};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CANONICAL: &str = "0123456789abcdef0123456789abcdef01234567";

#[derive(Debug)]
struct ScriptedDriver;

struct ScriptedRepository {
    dir: PathBuf,
}

#[async_trait]
impl Driver for ScriptedDriver {
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
        Ok(Arc::new(ScriptedRepository {
            dir: dir.to_path_buf(),
        }))
    }

    async fn clone_mirror(&self, clone_url: &str, dir: &Path, _opt: &RemoteOpts) -> Result<()> {
        std::fs::write(dir.join("FAKE_REPO"), clone_url)?;
        Ok(())
    }
}

#[async_trait]
impl Repository for ScriptedRepository {
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

    async fn get_commit(&self, id: &CommitId) -> Result<Commit> {
        if !CANONICAL.starts_with(id.as_str()) {
            return Err(Error::not_found(format!("commit {id} not found")));
        }
        Ok(Commit {
            id: CommitId::parse(CANONICAL).unwrap(),
            author: Signature {
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                date: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            },
            committer: None,
            message: "initial import".to_string(),
            parents: vec![],
        })
    }

    async fn commits(&self, opt: &CommitsOptions) -> Result<(Vec<Commit>, u64)> {
        let head = CommitId::parse(&opt.head)?;
        Ok((vec![self.get_commit(&head).await?], 42))
    }

    async fn branches(&self) -> Result<Vec<Branch>> {
        Ok(vec![Branch {
            name: "main".to_string(),
            head: CommitId::parse(CANONICAL).unwrap(),
        }])
    }

    async fn merge_base(&self, _a: &CommitId, _b: &CommitId) -> Result<CommitId> {
        Ok(CommitId::parse(CANONICAL).unwrap())
    }

    async fn update_everything(&self, _opt: &RemoteOpts) -> Result<()> {
        Ok(())
    }
}

async fn start_server() -> (tempfile::TempDir, String) {
    let storage = tempfile::TempDir::new().unwrap();
    let mut registry = DriverRegistry::new();
    registry.register(Arc::new(ScriptedDriver));
    let manager = Arc::new(RepoManager::new(storage.path(), Arc::new(registry)));
    let state = AppState::new(manager, ServerConfig::default());
    let app = repostore_server::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (storage, format!("http://{addr}"))
}

fn spec() -> CloneSpec {
    CloneSpec {
        vcs_type: VcsType::parse("fake").unwrap(),
        clone_url: "https://example.com/a/b".to_string(),
        remote_opts: RemoteOpts::default(),
    }
}

#[tokio::test]
async fn full_capability_round_trip() {
    let (_storage, base_url) = start_server().await;
    let client = Client::new(&base_url).unwrap();
    let repo = client.repository(RepoId::parse("example.com/a/b").unwrap());

    // Absent repository probes as not-found.
    let err = repo.info().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // Clone, then probe again; a second clone-or-update is an update.
    repo.clone_or_update(&spec()).await.unwrap();
    assert_eq!(repo.info().await.unwrap().implementation_type, "fake");
    repo.clone_or_update(&spec()).await.unwrap();

    // Reference resolution rides the redirect.
    let head = repo.resolve_branch("main").await.unwrap();
    assert_eq!(head.as_str(), CANONICAL);
    assert!(repo.resolve_branch("gone").await.is_err());

    // An abbreviated commit id follows the canonicalizing redirect.
    let commit = repo
        .get_commit(&CommitId::parse("0123").unwrap())
        .await
        .unwrap();
    assert_eq!(commit.id.as_str(), CANONICAL);
    assert_eq!(commit.author.name, "Alice");

    // Commit list with the total from X-Total-Commits.
    let (commits, total) = repo
        .commits(&CommitsOptions {
            head: CANONICAL.to_string(),
            n: 5,
            skip: 0,
        })
        .await
        .unwrap();
    assert_eq!(commits.len(), 1);
    assert_eq!(total, 42);

    // Branch listing decodes as JSON.
    let branches = repo.branches().await.unwrap();
    assert_eq!(branches[0].name, "main");

    // Merge base comes back through the Location header.
    let a = CommitId::parse(CANONICAL).unwrap();
    let b = CommitId::parse("89abcdef0123456789abcdef0123456789abcdef").unwrap();
    let mb = repo.merge_base(&a, &b).await.unwrap();
    assert_eq!(mb.as_str(), CANONICAL);

    // A capability the driver lacks surfaces as NotImplemented.
    let err = repo.tags().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotImplemented);
}
