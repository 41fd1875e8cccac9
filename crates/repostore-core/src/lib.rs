//! # Repostore Core
//!
//! Shared data model for the repostore repository-store service: repository
//! and commit identifiers, on-disk path encoding, file range computation,
//! the value types exchanged over the HTTP API, and the bidirectional URL
//! router used by both the server and the client.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod id;
mod path;
mod range;
pub mod router;
mod types;

pub use error::{classify_auth_error, Error, ErrorKind, Result};
pub use id::{CommitId, RepoId, VcsType};
pub use path::{encode_repository_path, storage_path};
pub use range::{compute_file_range, FileRange, GetFileOptions};
pub use types::{
    BlameOptions, Branch, CloneSpec, Commit, CommitsOptions, Committer, Diff, DiffOptions,
    FileWithRange, Hunk, RemoteOpts, Signature, Tag, TreeEntry, TreeEntryType,
};

/// Header carrying the total number of commits on the commits-list response.
pub const TOTAL_COMMITS_HEADER: &str = "X-Total-Commits";
