//! Mercurial driver backed by the `hg` command-line tool.
//!
//! Deliberately thin: clone, pull, and revision resolution. Everything else
//! is left to the not-implemented defaults, exercising the
//! optional-capability contract end to end.

use crate::{Driver, Repository};
use async_trait::async_trait;
use repostore_core::{CommitId, Error, ErrorKind, RemoteOpts, Result, VcsType};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

/// Driver for Mercurial repositories.
#[derive(Debug)]
pub struct HgDriver;

impl HgDriver {
    /// Creates the driver.
    pub fn new() -> Self {
        Self
    }
}

impl Default for HgDriver {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_hg(dir: Option<&Path>, args: &[&str]) -> Result<String> {
    let mut cmd = Command::new("hg");
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    let output = cmd
        .args(args)
        .env("HGPLAIN", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::transport(format!("failed to spawn hg: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let kind = if stderr.contains("unknown revision") || stderr.contains("not found") {
            ErrorKind::NotFound
        } else if stderr.contains("authorization") || stderr.contains("authentication") {
            ErrorKind::AuthRequired
        } else {
            ErrorKind::Transport
        };
        return Err(Error::new(kind, stderr));
    }
    String::from_utf8(output.stdout)
        .map_err(|_| Error::internal("hg produced non-UTF-8 output where text was expected"))
}

#[async_trait]
impl Driver for HgDriver {
    fn vcs_type(&self) -> VcsType {
        VcsType::parse("hg").expect("static tag")
    }

    fn detect(&self, dir: &Path) -> bool {
        dir.join(".hg").is_dir()
    }

    async fn open_mirror(&self, dir: &Path) -> Result<Arc<dyn Repository>> {
        if !dir.exists() {
            return Err(Error::not_found(format!(
                "no repository at {}",
                dir.display()
            )));
        }
        if !self.detect(dir) {
            return Err(Error::new(
                ErrorKind::Corrupt,
                format!("{} is not an hg repository", dir.display()),
            ));
        }
        Ok(Arc::new(HgRepository {
            dir: dir.to_path_buf(),
        }))
    }

    async fn clone_mirror(&self, clone_url: &str, dir: &Path, _opt: &RemoteOpts) -> Result<()> {
        let dir_str = dir.to_string_lossy();
        run_hg(None, &["clone", "--noupdate", clone_url, &dir_str]).await?;
        Ok(())
    }
}

/// An opened Mercurial repository.
pub struct HgRepository {
    dir: PathBuf,
}

#[async_trait]
impl Repository for HgRepository {
    fn vcs_type(&self) -> VcsType {
        VcsType::parse("hg").expect("static tag")
    }

    fn dir(&self) -> &Path {
        &self.dir
    }

    async fn resolve_revision(&self, spec: &str) -> Result<CommitId> {
        let out = run_hg(
            Some(&self.dir),
            &["log", "-r", spec, "--template", "{node}"],
        )
        .await?;
        CommitId::parse(out.trim())
    }

    async fn resolve_branch(&self, name: &str) -> Result<CommitId> {
        self.resolve_revision(name).await
    }

    async fn resolve_tag(&self, name: &str) -> Result<CommitId> {
        self.resolve_revision(name).await
    }

    async fn update_everything(&self, _opt: &RemoteOpts) -> Result<()> {
        run_hg(Some(&self.dir), &["pull"]).await?;
        Ok(())
    }
}
