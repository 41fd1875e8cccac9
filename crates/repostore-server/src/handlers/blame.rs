//! The blame endpoint.

use crate::cache::{for_canonicality, set_cache_control};
use crate::dispatch::{json_response, parse_query, AppState};
use axum::http::request::Parts;
use axum::response::Response;
use repostore_core::{BlameOptions, CommitId, RepoId, Result};

/// `GET /{repoID}/.blame/{path}`
///
/// The response is long-cached only when the newest-commit bound is a
/// canonical commit id.
pub async fn blame_file(
    state: &AppState,
    repo_id: &RepoId,
    path: &str,
    parts: &Parts,
) -> Result<Response> {
    let opt: BlameOptions = parse_query(parts)?;

    // Validate the bound up front so a malformed id is a 400, not a driver
    // error, and remember its canonicality for the cache directive.
    let newest_canonical = match opt.newest_commit.as_deref() {
        Some(id) => Some(CommitId::parse(id)?.is_canonical()),
        None => None,
    };

    let handle = state.manager.open(repo_id).await?;
    let hunks = handle.repo.blame_file(path, &opt).await?;

    let mut response = json_response(&hunks)?;
    if let Some(canonical) = newest_canonical {
        set_cache_control(&mut response, for_canonicality(canonical));
    }
    Ok(response)
}
