//! Merge-base endpoints, same-repository and cross-repository.
//!
//! The merge base rides in a redirect to its canonical commit URL: a
//! permanent redirect when both inputs are canonical (the answer can never
//! change), a temporary one otherwise.

use crate::cache::for_canonicality;
use crate::dispatch::{redirect, AppState};
use axum::http::StatusCode;
use axum::response::Response;
use repostore_core::{CommitId, RepoId, Result};

fn merge_base_redirect(
    state: &AppState,
    repo_id: &RepoId,
    merge_base: &CommitId,
    both_canonical: bool,
) -> Result<Response> {
    let status = if both_canonical {
        StatusCode::MOVED_PERMANENTLY
    } else {
        StatusCode::FOUND
    };
    redirect(
        status,
        state.urls.url_to_commit(repo_id, merge_base),
        for_canonicality(both_canonical),
    )
}

/// `GET /{repoID}/.merge-base/{a}/{b}`
pub async fn merge_base(
    state: &AppState,
    repo_id: &RepoId,
    a: &CommitId,
    b: &CommitId,
) -> Result<Response> {
    let handle = state.manager.open(repo_id).await?;
    let mb = handle.repo.merge_base(a, b).await?;
    merge_base_redirect(state, repo_id, &mb, a.is_canonical() && b.is_canonical())
}

/// `GET /{repoID}/.cross-repo-merge-base/{a}..{headRepoID}:{b}`
pub async fn cross_repo_merge_base(
    state: &AppState,
    repo_id: &RepoId,
    a: &CommitId,
    head_repo_id: &RepoId,
    b: &CommitId,
) -> Result<Response> {
    let base_handle = state.manager.open(repo_id).await?;
    let head_handle = state.manager.open(head_repo_id).await?;
    let mb = base_handle
        .repo
        .cross_repo_merge_base(a, head_handle.repo.clone(), b)
        .await?;
    merge_base_redirect(state, repo_id, &mb, a.is_canonical() && b.is_canonical())
}
