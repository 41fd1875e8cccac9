//! Repository-level handlers: service banner, repository info, clone or
//! update, and the branch/tag/committer listings.

use crate::cache::{set_cache_control, SHORT_CACHE};
use crate::dispatch::{json_response, AppState};
use axum::body::Body;
use axum::http::StatusCode;
use axum::response::Response;
use repostore_core::{classify_auth_error, CloneSpec, Error, ErrorKind, RepoId, Result};
use repostore_vcs::RepoManager;
use serde::Serialize;

/// Service banner at `/`.
pub fn root() -> Result<Response> {
    json_response(&serde_json::json!({
        "name": "repostore",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Serialize)]
struct RepoInfo {
    implementation_type: String,
}

/// `GET /{repoID}`: whether the repository exists, and what implements it.
pub async fn repo_info(state: &AppState, repo_id: &RepoId) -> Result<Response> {
    let handle = state.manager.open(repo_id).await?;
    json_response(&RepoInfo {
        implementation_type: handle.repo.vcs_type().to_string(),
    })
}

/// `POST /{repoID}`: clone the repository if absent (201), otherwise fetch
/// everything from its remote (200).
pub async fn repo_create_or_update(
    state: &AppState,
    repo_id: &RepoId,
    body: Body,
) -> Result<Response> {
    let body = axum::body::to_bytes(body, 1 << 20)
        .await
        .map_err(|e| Error::invalid_argument(format!("unreadable request body: {e}")))?;
    let spec: Option<CloneSpec> = if body.is_empty() {
        None
    } else {
        Some(
            serde_json::from_slice(&body)
                .map_err(|e| Error::invalid_argument(format!("invalid clone spec: {e}")))?,
        )
    };

    match state.manager.open(repo_id).await {
        Ok(handle) => {
            let opts = spec.map(|s| s.remote_opts).unwrap_or_default();
            handle
                .repo
                .update_everything(&opts)
                .await
                .map_err(remap_remote_error)?;
            Ok(Response::new(Body::empty()))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let spec = spec.ok_or_else(|| {
                Error::invalid_argument("a clone spec is required to clone a new repository")
            })?;
            let (_handle, cloned) = RepoManager::clone(&state.manager, repo_id, &spec)
                .await
                .map_err(remap_remote_error)?;
            let mut response = Response::new(Body::empty());
            if cloned {
                state.metrics.clones.inc();
                *response.status_mut() = StatusCode::CREATED;
            }
            Ok(response)
        }
        Err(e) => Err(e),
    }
}

/// Re-classifies driver errors whose messages match the known credential
/// failure strings, so foreign drivers map to 401/403 like the built-ins.
fn remap_remote_error(err: Error) -> Error {
    match classify_auth_error(&err.to_string()) {
        Some(kind) => Error::new(kind, err.to_string()),
        None => err,
    }
}

/// `GET /{repoID}/.branches`: all branches.
pub async fn list_branches(state: &AppState, repo_id: &RepoId) -> Result<Response> {
    let handle = state.manager.open(repo_id).await?;
    let branches = handle.repo.branches().await?;
    json_response(&branches)
}

/// `GET /{repoID}/.tags`: all tags.
pub async fn list_tags(state: &AppState, repo_id: &RepoId) -> Result<Response> {
    let handle = state.manager.open(repo_id).await?;
    let tags = handle.repo.tags().await?;
    json_response(&tags)
}

/// `GET /{repoID}/.committers`: committers with commit counts.
pub async fn committers(state: &AppState, repo_id: &RepoId) -> Result<Response> {
    let handle = state.manager.open(repo_id).await?;
    let committers = handle.repo.committers().await?;
    let mut response = json_response(&committers)?;
    set_cache_control(&mut response, SHORT_CACHE);
    Ok(response)
}
