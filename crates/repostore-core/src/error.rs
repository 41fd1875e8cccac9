//! Error model shared across the workspace.

use thiserror::Error;

/// Classification of an error, mapped to an HTTP status by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input: bad commit id, bad repository id, bad range.
    InvalidArgument,
    /// Repository or tree path does not exist.
    NotFound,
    /// A repository directory exists but is not usable.
    Corrupt,
    /// The remote requires credentials that were not supplied.
    AuthRequired,
    /// The supplied credentials are of a kind the remote cannot use.
    AuthUnsupported,
    /// SSH authentication was rejected.
    Forbidden,
    /// The driver does not implement the requested capability.
    NotImplemented,
    /// Clone or update I/O failure against the remote.
    Transport,
    /// Anything unclassified.
    Internal,
}

/// An error with a classification [`ErrorKind`] and a human-readable message.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

/// A specialized Result for repostore operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates an error with an explicit kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// An invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// A not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// A not-implemented error naming the missing capability.
    pub fn not_implemented(capability: &str) -> Self {
        Self::new(
            ErrorKind::NotImplemented,
            format!("capability {capability} not supported by this repository"),
        )
    }

    /// A transport error from a clone or update.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    /// An internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::Forbidden,
            _ => ErrorKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::Internal, err.to_string())
    }
}

/// Classifies a driver error message into an auth-related kind, if it matches
/// one of the known credential failure strings emitted by SSH-capable
/// transports. Returns `None` when the message is not auth-related.
pub fn classify_auth_error(message: &str) -> Option<ErrorKind> {
    if message.contains("authentication required but no callback set") {
        return Some(ErrorKind::AuthRequired);
    }
    if message.contains("callback returned unsupported credentials type") {
        return Some(ErrorKind::AuthUnsupported);
    }
    if message.contains("Failed to authenticate SSH session") {
        return Some(ErrorKind::Forbidden);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_not_found_maps_to_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn auth_classifier_matches_known_strings() {
        assert_eq!(
            classify_auth_error("authentication required but no callback set"),
            Some(ErrorKind::AuthRequired)
        );
        assert_eq!(
            classify_auth_error("callback returned unsupported credentials type"),
            Some(ErrorKind::AuthUnsupported)
        );
        assert_eq!(
            classify_auth_error("Failed to authenticate SSH session: Waiting for USERAUTH response"),
            Some(ErrorKind::Forbidden)
        );
        assert_eq!(classify_auth_error("connection refused"), None);
    }
}
