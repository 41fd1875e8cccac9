//! Request dispatch: one fallback handler matches every operation URL
//! against the route table and invokes the handler for it.
//!
//! Repository identifiers span a variable number of path segments, so the
//! operation table cannot be expressed as static axum route patterns; the
//! shared router does the matching and axum serves everything through a
//! single fallback.

use crate::config::ServerConfig;
use crate::error::error_response;
use crate::handlers;
use crate::metrics::Metrics;
use crate::middleware::{require_basic_auth, set_date_header};
use crate::transport;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::{middleware, Json, Router as AxumRouter};
use repostore_core::router::{match_path, Route, Router as UrlRouter};
use repostore_core::{Error, Result};
use repostore_vcs::RepoManager;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state, passed explicitly to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Repository manager over the storage directory.
    pub manager: Arc<RepoManager>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Request metrics.
    pub metrics: Arc<Metrics>,
    /// URL constructor for redirects.
    pub urls: Arc<UrlRouter>,
}

impl AppState {
    /// Creates the state for a manager and config.
    pub fn new(manager: Arc<RepoManager>, config: ServerConfig) -> Self {
        Self {
            manager,
            config: Arc::new(config),
            metrics: Arc::new(Metrics::new()),
            urls: Arc::new(UrlRouter::default()),
        }
    }
}

/// Builds the axum application.
pub fn create_router(state: AppState) -> AxumRouter {
    let basic_auth = state.config.basic_auth.clone();
    let mut app = AxumRouter::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(serve_metrics))
        .fallback(dispatch)
        .with_state(state);
    if let Some(credential) = basic_auth {
        app = app.layer(middleware::from_fn_with_state(
            credential,
            require_basic_auth,
        ));
    }
    app.layer(middleware::from_fn(set_date_header))
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn serve_metrics(State(state): State<AppState>) -> Response {
    let mut response = Response::new(Body::from(state.metrics.render()));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/openmetrics-text; version=1.0.0; charset=utf-8"),
    );
    response
}

async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    state.metrics.requests.inc();
    let response = route_request(&state, request).await.unwrap_or_else(|err| {
        state.metrics.response_errors.inc();
        tracing::debug!(error = %err, "request failed");
        error_response(&err, state.config.debug)
    });
    state.metrics.responses.inc();
    response
}

async fn route_request(state: &AppState, request: Request) -> Result<Response> {
    let (parts, body) = request.into_parts();
    let route = match_path(parts.uri.path())?;

    // The git smart transport only exists for git clients; for anyone else
    // these paths are not routes at all.
    if route.is_git_transport() && !is_git_user_agent(&parts) {
        return Err(Error::not_found("no such route"));
    }

    match route {
        Route::Root => {
            require_method(&parts, &Method::GET)?;
            handlers::root()
        }
        Route::Repo { repo_id } => {
            if parts.method == Method::POST {
                handlers::repo_create_or_update(state, &repo_id, body).await
            } else if parts.method == Method::GET || parts.method == Method::HEAD {
                handlers::repo_info(state, &repo_id).await
            } else {
                Ok(method_not_allowed())
            }
        }
        Route::Branches { repo_id } => {
            require_method(&parts, &Method::GET)?;
            handlers::list_branches(state, &repo_id).await
        }
        Route::Branch { repo_id, name } => {
            require_method(&parts, &Method::GET)?;
            handlers::resolve_branch(state, &repo_id, &name).await
        }
        Route::Tags { repo_id } => {
            require_method(&parts, &Method::GET)?;
            handlers::list_tags(state, &repo_id).await
        }
        Route::Tag { repo_id, tag } => {
            require_method(&parts, &Method::GET)?;
            handlers::resolve_tag(state, &repo_id, &tag).await
        }
        Route::Revision { repo_id, spec } => {
            require_method(&parts, &Method::GET)?;
            handlers::resolve_revision(state, &repo_id, &spec).await
        }
        Route::Commits { repo_id } => {
            require_method(&parts, &Method::GET)?;
            handlers::list_commits(state, &repo_id, &parts).await
        }
        Route::Commit { repo_id, commit_id } => {
            require_method(&parts, &Method::GET)?;
            handlers::get_commit(state, &repo_id, &commit_id).await
        }
        Route::CommitLog { repo_id, commit_id } => {
            require_method(&parts, &Method::GET)?;
            handlers::commit_log(state, &repo_id, &commit_id).await
        }
        Route::TreeEntry {
            repo_id,
            commit_id,
            path,
        } => {
            require_method(&parts, &Method::GET)?;
            handlers::tree_entry(state, &repo_id, &commit_id, &path, &parts).await
        }
        Route::Blame { repo_id, path } => {
            require_method(&parts, &Method::GET)?;
            handlers::blame_file(state, &repo_id, &path, &parts).await
        }
        Route::Diff {
            repo_id,
            base,
            head,
        } => {
            require_method(&parts, &Method::GET)?;
            handlers::diff(state, &repo_id, &base, &head, &parts).await
        }
        Route::CrossRepoDiff {
            repo_id,
            base,
            head_repo_id,
            head,
        } => {
            require_method(&parts, &Method::GET)?;
            handlers::cross_repo_diff(state, &repo_id, &base, &head_repo_id, &head, &parts).await
        }
        Route::MergeBase { repo_id, a, b } => {
            require_method(&parts, &Method::GET)?;
            handlers::merge_base(state, &repo_id, &a, &b).await
        }
        Route::CrossRepoMergeBase {
            repo_id,
            a,
            head_repo_id,
            b,
        } => {
            require_method(&parts, &Method::GET)?;
            handlers::cross_repo_merge_base(state, &repo_id, &a, &head_repo_id, &b).await
        }
        Route::Committers { repo_id } => {
            require_method(&parts, &Method::GET)?;
            handlers::committers(state, &repo_id).await
        }
        Route::GitInfoRefs { repo_id } => {
            require_method(&parts, &Method::GET)?;
            transport::info_refs(state, &repo_id, &parts).await
        }
        Route::GitUploadPack { repo_id } => {
            require_method(&parts, &Method::POST)?;
            transport::service_pack(state, &repo_id, "upload-pack", &parts, body).await
        }
        Route::GitReceivePack { repo_id } => {
            require_method(&parts, &Method::POST)?;
            transport::service_pack(state, &repo_id, "receive-pack", &parts, body).await
        }
    }
}

fn is_git_user_agent(parts: &Parts) -> bool {
    parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|ua| ua.to_ascii_lowercase().starts_with("git/"))
        .unwrap_or(false)
}

fn require_method(parts: &Parts, method: &Method) -> Result<()> {
    if parts.method == *method || (*method == Method::GET && parts.method == Method::HEAD) {
        Ok(())
    } else {
        Err(Error::not_found(format!(
            "method {} not allowed for this route",
            parts.method
        )))
    }
}

fn method_not_allowed() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
    response
}

/// Serializes a value as the JSON body of a 200 response.
pub(crate) fn json_response<T: Serialize>(value: &T) -> Result<Response> {
    let body = serde_json::to_vec(value)?;
    let mut response = Response::new(Body::from(body));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    Ok(response)
}

/// A redirect with an explicit status and cache directive.
pub(crate) fn redirect(
    status: StatusCode,
    location: String,
    cache_directive: &'static str,
) -> Result<Response> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    let location = HeaderValue::from_str(&location)
        .map_err(|_| Error::internal("redirect target is not a valid header value"))?;
    response.headers_mut().insert(header::LOCATION, location);
    crate::cache::set_cache_control(&mut response, cache_directive);
    Ok(response)
}

/// Deserializes the query string into an options struct.
pub(crate) fn parse_query<T: DeserializeOwned>(parts: &Parts) -> Result<T> {
    axum::extract::Query::<T>::try_from_uri(&parts.uri)
        .map(|q| q.0)
        .map_err(|e| Error::invalid_argument(format!("invalid query string: {e}")))
}
