//! The driver and repository capability traits.

use async_trait::async_trait;
use repostore_core::{
    BlameOptions, Branch, Commit, CommitId, CommitsOptions, Committer, Diff, DiffOptions, Error,
    Hunk, RemoteOpts, Result, Tag, TreeEntry, VcsType,
};
use std::path::Path;
use std::sync::Arc;

/// An opened on-disk repository exposing an optional set of capabilities.
///
/// Every capability method has a default body returning a not-implemented
/// error tagged with the capability name; a driver overrides the ones it
/// supports. The HTTP layer maps absent capabilities to `501`.
#[async_trait]
pub trait Repository: Send + Sync {
    /// The VCS type of this repository.
    fn vcs_type(&self) -> VcsType;

    /// The on-disk directory of the clone.
    fn dir(&self) -> &Path;

    /// Resolves a branch name to a canonical commit id.
    async fn resolve_branch(&self, _name: &str) -> Result<CommitId> {
        Err(Error::not_implemented("ResolveBranch"))
    }

    /// Resolves a tag name to a canonical commit id.
    async fn resolve_tag(&self, _name: &str) -> Result<CommitId> {
        Err(Error::not_implemented("ResolveTag"))
    }

    /// Resolves an arbitrary revision spec to a canonical commit id.
    async fn resolve_revision(&self, _spec: &str) -> Result<CommitId> {
        Err(Error::not_implemented("ResolveRevision"))
    }

    /// Fetches a single commit by (possibly abbreviated) id.
    async fn get_commit(&self, _id: &CommitId) -> Result<Commit> {
        Err(Error::not_implemented("GetCommit"))
    }

    /// Lists commits reachable from a head, returning the page and the
    /// total count of reachable commits.
    async fn commits(&self, _opt: &CommitsOptions) -> Result<(Vec<Commit>, u64)> {
        Err(Error::not_implemented("Commits"))
    }

    /// Full commit log ending at the given commit.
    async fn commit_log(&self, _to: &CommitId) -> Result<Vec<Commit>> {
        Err(Error::not_implemented("CommitLog"))
    }

    /// Committers with their commit counts, most prolific first.
    async fn committers(&self) -> Result<Vec<Committer>> {
        Err(Error::not_implemented("Committers"))
    }

    /// All branches.
    async fn branches(&self) -> Result<Vec<Branch>> {
        Err(Error::not_implemented("Branches"))
    }

    /// All tags.
    async fn tags(&self) -> Result<Vec<Tag>> {
        Err(Error::not_implemented("Tags"))
    }

    /// Stats the tree entry at `path` as of `commit`. Directories carry
    /// their immediate children; with `recursive` the whole subtree is
    /// materialized depth-first. Regular files carry their raw contents.
    async fn tree_entry(
        &self,
        _commit: &CommitId,
        _path: &str,
        _recursive: bool,
    ) -> Result<TreeEntry> {
        Err(Error::not_implemented("FileSystem"))
    }

    /// Blames a file, attributing line runs to commits.
    async fn blame_file(&self, _path: &str, _opt: &BlameOptions) -> Result<Vec<Hunk>> {
        Err(Error::not_implemented("BlameFile"))
    }

    /// Diffs two commits of this repository.
    async fn diff(&self, _base: &CommitId, _head: &CommitId, _opt: &DiffOptions) -> Result<Diff> {
        Err(Error::not_implemented("Diff"))
    }

    /// Diffs a commit of this repository against a commit of another.
    async fn cross_repo_diff(
        &self,
        _base: &CommitId,
        _head_repo: Arc<dyn Repository>,
        _head: &CommitId,
        _opt: &DiffOptions,
    ) -> Result<Diff> {
        Err(Error::not_implemented("CrossRepoDiff"))
    }

    /// Merge base of two commits.
    async fn merge_base(&self, _a: &CommitId, _b: &CommitId) -> Result<CommitId> {
        Err(Error::not_implemented("MergeBase"))
    }

    /// Merge base of a commit of this repository and one of another.
    async fn cross_repo_merge_base(
        &self,
        _a: &CommitId,
        _head_repo: Arc<dyn Repository>,
        _b: &CommitId,
    ) -> Result<CommitId> {
        Err(Error::not_implemented("CrossRepoMergeBase"))
    }

    /// Fetches everything from the remote this mirror was cloned from.
    async fn update_everything(&self, _opt: &RemoteOpts) -> Result<()> {
        Err(Error::not_implemented("UpdateEverything"))
    }
}

/// A VCS driver: opens and clones mirror repositories of one type.
#[async_trait]
pub trait Driver: Send + Sync + std::fmt::Debug {
    /// The VCS type this driver handles.
    fn vcs_type(&self) -> VcsType;

    /// Probes whether `dir` holds a repository of this driver's type.
    fn detect(&self, dir: &Path) -> bool;

    /// Opens an existing mirror clone at `dir`.
    async fn open_mirror(&self, dir: &Path) -> Result<Arc<dyn Repository>>;

    /// Clones `clone_url` as a mirror into `dir` (which exists and is
    /// empty). The caller owns `dir` and removes it if this fails.
    async fn clone_mirror(&self, clone_url: &str, dir: &Path, opt: &RemoteOpts) -> Result<()>;
}
