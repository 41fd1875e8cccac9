//! Commit handlers: single commit, commit list, and commit log.

use crate::cache::{for_canonicality, set_cache_control, SHORT_CACHE};
use crate::dispatch::{json_response, parse_query, redirect, AppState};
use axum::http::request::Parts;
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use repostore_core::{CommitId, CommitsOptions, Error, RepoId, Result, TOTAL_COMMITS_HEADER};

/// `GET /{repoID}/.commits/{id}`
///
/// A non-canonical id that resolves to a commit redirects to the canonical
/// URL with short-cache; the canonical URL itself is long-cached.
pub async fn get_commit(state: &AppState, repo_id: &RepoId, commit_id: &CommitId) -> Result<Response> {
    let handle = state.manager.open(repo_id).await?;
    let commit = handle.repo.get_commit(commit_id).await?;

    if commit.id != *commit_id {
        return redirect(
            StatusCode::FOUND,
            state.urls.url_to_commit(repo_id, &commit.id),
            SHORT_CACHE,
        );
    }

    let mut response = json_response(&commit)?;
    set_cache_control(&mut response, for_canonicality(commit_id.is_canonical()));
    Ok(response)
}

/// `GET /{repoID}/.commits?head={id}&n={n}&skip={skip}`
///
/// Returns the page as JSON and the total reachable count in
/// `X-Total-Commits`.
pub async fn list_commits(state: &AppState, repo_id: &RepoId, parts: &Parts) -> Result<Response> {
    let opt: CommitsOptions = parse_query(parts)?;
    if opt.head.is_empty() {
        return Err(Error::invalid_argument("head commit id is required"));
    }
    let head = CommitId::parse(&opt.head)?;

    let handle = state.manager.open(repo_id).await?;
    let (commits, total) = handle.repo.commits(&opt).await?;

    let mut response = json_response(&commits)?;
    response.headers_mut().insert(
        TOTAL_COMMITS_HEADER,
        HeaderValue::from_str(&total.to_string())
            .map_err(|_| Error::internal("unrepresentable commit total"))?,
    );
    set_cache_control(&mut response, for_canonicality(head.is_canonical()));
    Ok(response)
}

/// `GET /{repoID}/.commits/{id}/log`
pub async fn commit_log(state: &AppState, repo_id: &RepoId, commit_id: &CommitId) -> Result<Response> {
    let handle = state.manager.open(repo_id).await?;
    let commits = handle.repo.commit_log(commit_id).await?;
    let mut response = json_response(&commits)?;
    set_cache_control(&mut response, for_canonicality(commit_id.is_canonical()));
    Ok(response)
}
