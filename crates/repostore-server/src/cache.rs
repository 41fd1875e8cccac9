//! Cache-control directives tied to commit-id canonicality.

use axum::http::{header, HeaderValue};
use axum::response::Response;

/// One year, public: the canonical commit-id URL is the only cacheable form
/// of a commit-bound resource.
pub const LONG_CACHE: &str = "max-age=31536000, public";

/// Immediate revalidation for responses bound to a non-canonical commit id.
pub const SHORT_CACHE: &str = "max-age=0, private, must-revalidate";

/// Errors and not-implemented responses are never cached.
pub const NO_CACHE: &str = "no-cache, max-age=0";

/// Sets the cache-control header on a response.
pub fn set_cache_control(response: &mut Response, directive: &'static str) {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(directive));
}

/// Picks the directive for a resource bound to a commit id of the given
/// canonicality.
pub fn for_canonicality(canonical: bool) -> &'static str {
    if canonical {
        LONG_CACHE
    } else {
        SHORT_CACHE
    }
}
