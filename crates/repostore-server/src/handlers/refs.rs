//! Reference resolution: branch, tag, and revision-spec lookups redirect to
//! the canonical commit URL so the resolved id rides in `Location`.

use crate::cache::SHORT_CACHE;
use crate::dispatch::{redirect, AppState};
use axum::http::StatusCode;
use axum::response::Response;
use repostore_core::{CommitId, RepoId, Result};

fn commit_redirect(state: &AppState, repo_id: &RepoId, commit: &CommitId) -> Result<Response> {
    redirect(
        StatusCode::FOUND,
        state.urls.url_to_commit(repo_id, commit),
        SHORT_CACHE,
    )
}

/// `GET /{repoID}/.branches/{name}`
pub async fn resolve_branch(state: &AppState, repo_id: &RepoId, name: &str) -> Result<Response> {
    let handle = state.manager.open(repo_id).await?;
    let commit = handle.repo.resolve_branch(name).await?;
    commit_redirect(state, repo_id, &commit)
}

/// `GET /{repoID}/.tags/{tag}`
pub async fn resolve_tag(state: &AppState, repo_id: &RepoId, tag: &str) -> Result<Response> {
    let handle = state.manager.open(repo_id).await?;
    let commit = handle.repo.resolve_tag(tag).await?;
    commit_redirect(state, repo_id, &commit)
}

/// `GET /{repoID}/.revs/{spec}`
pub async fn resolve_revision(state: &AppState, repo_id: &RepoId, spec: &str) -> Result<Response> {
    let handle = state.manager.open(repo_id).await?;
    let commit = handle.repo.resolve_revision(spec).await?;
    commit_redirect(state, repo_id, &commit)
}
