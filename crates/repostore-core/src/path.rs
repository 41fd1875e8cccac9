//! On-disk path encoding for repository identifiers.

use crate::{Error, RepoId, Result};
use std::path::{Component, Path, PathBuf};

/// Normalizes a repository identifier into a clean relative path.
///
/// Redundant `.` components are removed and `..` components are resolved
/// lexically. The result is rejected if it is absolute or escapes upward,
/// so joining it onto a storage root can never leave the root.
pub fn encode_repository_path(repo_id: &RepoId) -> Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in Path::new(repo_id.as_str()).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !clean.pop() {
                    return Err(Error::invalid_argument(format!(
                        "repository id {repo_id:?} escapes the storage root"
                    )));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::invalid_argument(format!(
                    "repository id {repo_id:?} is an absolute path"
                )));
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(Error::invalid_argument(format!(
            "repository id {repo_id:?} resolves to an empty path"
        )));
    }
    Ok(clean)
}

/// Computes the on-disk directory for a repository under `root`.
///
/// The result is always contained within `root`; identifiers that would
/// escape it yield an invalid-argument error.
pub fn storage_path(root: &Path, repo_id: &RepoId) -> Result<PathBuf> {
    let encoded = encode_repository_path(repo_id)?;
    let full = root.join(&encoded);
    debug_assert!(full.starts_with(root));
    Ok(full)
}
