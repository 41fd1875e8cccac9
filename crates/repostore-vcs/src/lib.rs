//! # Repostore VCS
//!
//! The repository capability surface, the VCS driver registry, concrete
//! `git` and `hg` drivers backed by their command-line tools, and the
//! concurrency-safe repository manager that atomically clones, opens, and
//! updates on-disk mirror clones.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod git;
pub mod hg;
mod manager;
mod registry;
mod traits;

pub use manager::{RepoHandle, RepoManager};
pub use registry::DriverRegistry;
pub use traits::{Driver, Repository};
