//! The repository manager: atomic clone, open, update, and per-repository
//! serialization.

use crate::{DriverRegistry, Repository};
use parking_lot::Mutex;
use repostore_core::{storage_path, CloneSpec, Error, ErrorKind, RemoteOpts, RepoId, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// An opened repository with its identity and on-disk location.
///
/// The handle owns its driver repository; dropping it releases the open.
pub struct RepoHandle {
    /// Identifier the repository was opened under.
    pub repo_id: RepoId,
    /// On-disk clone directory.
    pub dir: PathBuf,
    /// Driver repository satisfying some subset of capabilities.
    pub repo: Arc<dyn Repository>,
}

impl std::fmt::Debug for RepoHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoHandle")
            .field("repo_id", &self.repo_id)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

/// Locates, atomically clones, opens, and updates on-disk mirror clones
/// keyed by repository identifier.
pub struct RepoManager {
    storage_dir: PathBuf,
    registry: Arc<DriverRegistry>,
    // Per-repo clone locks, lazily allocated and never removed; the map
    // itself is guarded by a short critical section.
    clone_locks: Mutex<HashMap<RepoId, Arc<tokio::sync::Mutex<()>>>>,
}

impl RepoManager {
    /// Creates a manager storing clones under `storage_dir`.
    pub fn new(storage_dir: impl Into<PathBuf>, registry: Arc<DriverRegistry>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            registry,
            clone_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The storage root.
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// The driver registry.
    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// On-disk directory for a repository id.
    pub fn repo_dir(&self, repo_id: &RepoId) -> Result<PathBuf> {
        storage_path(&self.storage_dir, repo_id)
    }

    fn clone_lock(&self, repo_id: &RepoId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.clone_locks.lock();
        locks
            .entry(repo_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn open_dir(&self, dir: &Path) -> Result<Arc<dyn Repository>> {
        let meta = match tokio::fs::metadata(dir).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found(format!(
                    "no repository at {}",
                    dir.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        if !meta.is_dir() {
            return Err(Error::new(
                ErrorKind::Corrupt,
                format!("clone path {} is not a directory", dir.display()),
            ));
        }
        self.registry.open_detected(dir).await
    }

    /// Opens a repository, or fails with `NotFound` when it has not been
    /// cloned yet.
    pub async fn open(&self, repo_id: &RepoId) -> Result<RepoHandle> {
        let dir = self.repo_dir(repo_id)?;
        let repo = self.open_dir(&dir).await?;
        Ok(RepoHandle {
            repo_id: repo_id.clone(),
            dir,
            repo,
        })
    }

    /// Clones the repository if no clone exists yet, otherwise opens it.
    ///
    /// Returns the handle and whether this call performed the clone. The
    /// clone is atomic: the driver clones into a temporary sibling
    /// directory which is renamed into place as the single commit point,
    /// and is removed on every exit path. Concurrent clones of the same
    /// repository are serialized; exactly one invokes the driver.
    pub async fn clone(&self, repo_id: &RepoId, spec: &CloneSpec) -> Result<(RepoHandle, bool)> {
        let dir = self.repo_dir(repo_id)?;

        // Fast path: an existing repository is never re-cloned, and needs
        // no lock to observe.
        match self.open(repo_id).await {
            Ok(handle) => return Ok((handle, false)),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let lock = self.clone_lock(repo_id);
        let _guard = lock.lock().await;

        // Re-check under the lock so a raced clone is opened, not redone.
        match self.open(repo_id).await {
            Ok(handle) => return Ok((handle, false)),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let driver = self.registry.get(&spec.vcs_type)?;

        let start = Instant::now();
        tracing::info!(
            repo_id = %repo_id,
            vcs = %spec.vcs_type,
            clone_url = %spec.clone_url,
            "cloning repository"
        );

        let parent = dir
            .parent()
            .ok_or_else(|| Error::internal("clone directory has no parent"))?;
        create_dir_all_restricted(parent)?;

        let base = dir
            .file_name()
            .ok_or_else(|| Error::internal("clone directory has no basename"))?
            .to_string_lossy()
            .into_owned();
        let tmp = tempfile::Builder::new()
            .prefix(&format!("_tmp_{base}-"))
            .tempdir_in(parent)
            .map_err(|e| Error::internal(format!("failed to create temp clone dir: {e}")))?;

        driver
            .clone_mirror(&spec.clone_url, tmp.path(), &spec.remote_opts)
            .await?;

        // The rename is the single commit point; until it succeeds the
        // destination does not exist, and the TempDir guard removes the
        // partial clone on failure.
        std::fs::rename(tmp.path(), &dir).map_err(|e| {
            Error::internal(format!(
                "failed to move clone into place at {}: {e}",
                dir.display()
            ))
        })?;
        let _ = tmp.keep();

        tracing::info!(
            repo_id = %repo_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "finished cloning repository"
        );

        let repo = self.open_dir(&dir).await?;
        Ok((
            RepoHandle {
                repo_id: repo_id.clone(),
                dir,
                repo,
            },
            true,
        ))
    }

    /// Opens the repository and fetches everything from its remote.
    pub async fn update(&self, repo_id: &RepoId, opt: &RemoteOpts) -> Result<()> {
        let handle = self.open(repo_id).await?;
        handle.repo.update_everything(opt).await
    }
}

#[cfg(unix)]
fn create_dir_all_restricted(dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(Into::into)
}

#[cfg(not(unix))]
fn create_dir_all_restricted(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(Into::into)
}
