//! Diff endpoints, same-repository and cross-repository.

use crate::cache::{for_canonicality, set_cache_control};
use crate::dispatch::{json_response, parse_query, AppState};
use axum::http::request::Parts;
use axum::response::Response;
use repostore_core::{CommitId, DiffOptions, RepoId, Result};

/// `GET /{repoID}/.diff/{base}..{head}`
pub async fn diff(
    state: &AppState,
    repo_id: &RepoId,
    base: &CommitId,
    head: &CommitId,
    parts: &Parts,
) -> Result<Response> {
    let opt: DiffOptions = parse_query(parts)?;
    let handle = state.manager.open(repo_id).await?;
    let diff = handle.repo.diff(base, head, &opt).await?;

    let mut response = json_response(&diff)?;
    set_cache_control(
        &mut response,
        for_canonicality(base.is_canonical() && head.is_canonical()),
    );
    Ok(response)
}

/// `GET /{repoID}/.cross-repo-diff/{base}..{headRepoID}:{head}`
///
/// Opens both repositories; the base repository's driver performs the diff
/// against the head repository's handle.
pub async fn cross_repo_diff(
    state: &AppState,
    repo_id: &RepoId,
    base: &CommitId,
    head_repo_id: &RepoId,
    head: &CommitId,
    parts: &Parts,
) -> Result<Response> {
    let opt: DiffOptions = parse_query(parts)?;
    let base_handle = state.manager.open(repo_id).await?;
    let head_handle = state.manager.open(head_repo_id).await?;
    let diff = base_handle
        .repo
        .cross_repo_diff(base, head_handle.repo.clone(), head, &opt)
        .await?;

    let mut response = json_response(&diff)?;
    set_cache_control(
        &mut response,
        for_canonicality(base.is_canonical() && head.is_canonical()),
    );
    Ok(response)
}
