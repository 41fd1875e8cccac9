//! Response and request middleware: RFC-1123 `Date` header and optional
//! HTTP basic auth.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Adds an RFC-1123 `Date` header to every response.
pub async fn set_date_header(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let now = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
    if let Ok(value) = HeaderValue::from_str(&now.to_string()) {
        response.headers_mut().insert(header::DATE, value);
    }
    response
}

/// Rejects requests that do not carry the configured basic-auth credential.
pub async fn require_basic_auth(
    State(expected): State<String>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|v| BASE64.decode(v).ok())
        .map(|decoded| decoded == expected.as_bytes())
        .unwrap_or(false);

    if !authorized {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::UNAUTHORIZED;
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"repostore\""),
        );
        return response;
    }
    next.run(request).await
}
