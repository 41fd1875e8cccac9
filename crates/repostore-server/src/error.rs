//! HTTP error rendering.

use crate::cache::{set_cache_control, NO_CACHE};
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use repostore_core::{Error, ErrorKind};
use serde::Serialize;

/// HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AuthRequired | ErrorKind::AuthUnsupported => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        ErrorKind::Transport | ErrorKind::Corrupt | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    #[serde(rename = "Message")]
    message: String,
}

/// Renders an error as an HTTP response. The message body is only written
/// when debug mode is on; production servers return the bare status.
pub fn error_response(err: &Error, debug: bool) -> Response {
    let status = status_for(err.kind());
    let mut response = if debug {
        let body = serde_json::to_vec(&ErrorBody {
            message: err.to_string(),
        })
        .unwrap_or_default();
        let mut response = Response::new(Body::from(body));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        response
    } else {
        Response::new(Body::empty())
    };
    *response.status_mut() = status;
    set_cache_control(&mut response, NO_CACHE);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(
            status_for(ErrorKind::InvalidArgument),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::AuthRequired), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(ErrorKind::AuthUnsupported),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_for(ErrorKind::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(ErrorKind::NotImplemented),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            status_for(ErrorKind::Transport),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn debug_mode_writes_message_body() {
        let err = Error::not_found("repository does not exist");
        let response = error_response(&err, true);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-cache, max-age=0"
        );
    }

    #[test]
    fn production_mode_has_empty_body() {
        let err = Error::internal("secret detail");
        let response = error_response(&err, false);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }
}
