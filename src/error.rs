//! Error types for the laptop catalog.

use tonic::Status;

/// Main error type for the library.
///
/// Every variant maps onto the gRPC status code of the same name, so handlers
/// can return it with `?` and the caller receives a structured status.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed identifier, filter or upload message.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A resource with the same identifier is already stored.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The referenced resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing, malformed or expired credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The caller is authenticated but its role may not invoke the method.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The caller gave up on the call.
    #[error("canceled: {0}")]
    Canceled(String),

    /// The call ran past its deadline.
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Unexpected failure, e.g. a signing or storage write failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidArgument(msg) => Status::invalid_argument(msg),
            Error::AlreadyExists(msg) => Status::already_exists(msg),
            Error::NotFound(msg) => Status::not_found(msg),
            Error::Unauthenticated(msg) => Status::unauthenticated(msg),
            Error::PermissionDenied(msg) => Status::permission_denied(msg),
            Error::Canceled(msg) => Status::cancelled(msg),
            Error::DeadlineExceeded(msg) => Status::deadline_exceeded(msg),
            Error::Internal(msg) => Status::internal(msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

/// Result alias using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
