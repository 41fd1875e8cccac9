//! Operation handlers, one per route.

mod blame;
mod commits;
mod diff;
mod merge;
mod refs;
mod repo;
mod tree;

pub use blame::blame_file;
pub use commits::{commit_log, get_commit, list_commits};
pub use diff::{cross_repo_diff, diff};
pub use merge::{cross_repo_merge_base, merge_base};
pub use refs::{resolve_branch, resolve_revision, resolve_tag};
pub use repo::{committers, list_branches, list_tags, repo_create_or_update, repo_info, root};
pub use tree::tree_entry;
