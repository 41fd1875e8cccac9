//! Registry resolving VCS-type tags to drivers.

use crate::{git::GitDriver, hg::HgDriver, Driver};
use repostore_core::{Error, ErrorKind, Result, VcsType};
use std::path::Path;
use std::sync::Arc;

/// Maps VCS-type tags to registered drivers and probes on-disk layouts.
#[derive(Clone)]
pub struct DriverRegistry {
    drivers: Vec<Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            drivers: Vec::new(),
        }
    }

    /// A registry with the built-in `git` and `hg` drivers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GitDriver::new()));
        registry.register(Arc::new(HgDriver::new()));
        registry
    }

    /// Registers a driver. A driver registered later for the same type
    /// shadows an earlier one.
    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        self.drivers.insert(0, driver);
    }

    /// Resolves a VCS-type tag to its driver.
    pub fn get(&self, vcs_type: &VcsType) -> Result<Arc<dyn Driver>> {
        self.drivers
            .iter()
            .find(|d| d.vcs_type() == *vcs_type)
            .cloned()
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidArgument,
                    format!("no driver registered for VCS type {vcs_type:?}"),
                )
            })
    }

    /// Probes the type of an on-disk repository directory.
    pub fn detect(&self, dir: &Path) -> Option<VcsType> {
        self.drivers
            .iter()
            .find(|d| d.detect(dir))
            .map(|d| d.vcs_type())
    }

    /// Opens a repository directory with the driver its layout matches.
    pub async fn open_detected(&self, dir: &Path) -> Result<Arc<dyn crate::Repository>> {
        let Some(vcs_type) = self.detect(dir) else {
            return Err(Error::new(
                ErrorKind::Corrupt,
                format!("directory {} is not a recognized repository", dir.display()),
            ));
        };
        self.get(&vcs_type)?.open_mirror(dir).await
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
