//! Error types and their client-facing classification
//!
//! Handlers return [`Error`]; converting it into a response produces an
//! [`ErrorReport`](crate::handlers::error::ErrorReport) that the Error
//! Normalizer middleware renders for the current environment and path.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use thiserror::Error;

use crate::handlers::error::ErrorReport;
use crate::store::{StoreError, StoreErrorKind};

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

pub const TOO_MANY_REQUESTS: &str = "Too many requests, please try again in an hour!";

/// Service error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JWT error: {0}")]
    Jwt(Box<jsonwebtoken::errors::Error>),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// A deliberately raised error whose message is safe to show clients
    #[error("{message}")]
    Operational { status: StatusCode, message: String },

    #[error("External service error: {0}")]
    External(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl Error {
    pub fn operational(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Operational {
            status,
            message: message.into(),
        }
    }

    /// Map the error onto a status, a client message and an error code
    pub fn classify(&self) -> Classification {
        match self {
            Error::Store(e) => match &e.kind {
                StoreErrorKind::InvalidId { path, value } => Classification::operational(
                    StatusCode::BAD_REQUEST,
                    "INVALID_ID",
                    format!("Invalid {path}: {value}"),
                ),
                StoreErrorKind::DuplicateKey { value, .. } => Classification::operational(
                    StatusCode::BAD_REQUEST,
                    "DUPLICATE_KEY",
                    format!("Duplicate field value: {value}, Please use another value!"),
                ),
                StoreErrorKind::Validation(_) => Classification::operational(
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_FAILED",
                    format!("Invalid input data: {}", e.field_messages().join(". ")),
                ),
                StoreErrorKind::Unavailable(_) => Classification::unknown("STORE_UNAVAILABLE"),
            },

            Error::Jwt(e) => match e.kind() {
                JwtErrorKind::ExpiredSignature => Classification::operational(
                    StatusCode::UNAUTHORIZED,
                    "TOKEN_EXPIRED",
                    "Token Expired. Please login again",
                ),
                _ => Classification::operational(
                    StatusCode::UNAUTHORIZED,
                    "INVALID_TOKEN",
                    "Invalid Token. Please login again",
                ),
            },

            Error::Unauthorized(msg) => {
                Classification::operational(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
            }
            Error::Forbidden(msg) => {
                Classification::operational(StatusCode::FORBIDDEN, "FORBIDDEN", msg)
            }
            Error::NotFound(msg) => {
                Classification::operational(StatusCode::NOT_FOUND, "NOT_FOUND", msg)
            }
            Error::BadRequest(msg) => {
                Classification::operational(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            Error::RateLimitExceeded => Classification::operational(
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMIT_EXCEEDED",
                TOO_MANY_REQUESTS,
            ),
            Error::Operational { status, message } => {
                Classification::operational(*status, "OPERATIONAL", message)
            }

            Error::Config(_) | Error::InvalidConfig(_) => Classification::unknown("CONFIG_ERROR"),
            Error::Io(_) => Classification::unknown("IO_ERROR"),
            Error::Template(_) => Classification::unknown("TEMPLATE_ERROR"),
            Error::External(_) => Classification::unknown("EXTERNAL_SERVICE_ERROR"),
            Error::Internal(_) => Classification::unknown("INTERNAL_ERROR"),
        }
    }
}

/// Outcome of classifying an [`Error`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: StatusCode,
    pub code: &'static str,
    /// Client-safe message; generic for unknown errors
    pub message: String,
    /// Whether the message may be shown to clients in production
    pub operational: bool,
}

impl Classification {
    pub const GENERIC_MESSAGE: &'static str = "Something went wrong!";

    fn operational(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            operational: true,
        }
    }

    fn unknown(code: &'static str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code,
            message: Self::GENERIC_MESSAGE.to_string(),
            operational: false,
        }
    }

    /// `"fail"` for client errors, `"error"` otherwise
    pub fn status_label(&self) -> &'static str {
        if self.status.is_client_error() {
            "fail"
        } else {
            "error"
        }
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Error::Jwt(Box::new(err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::External(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        ErrorReport::new(&self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FieldError, StoreOperation};

    #[test]
    fn test_store_errors_become_operational() {
        let cast = Error::from(StoreError::invalid_id(StoreOperation::FindById, "id", "xyz"));
        let c = cast.classify();
        assert_eq!(c.status, StatusCode::BAD_REQUEST);
        assert_eq!(c.message, "Invalid id: xyz");
        assert!(c.operational);

        let dup = Error::from(StoreError::duplicate_key(StoreOperation::Insert, "name", "Sea"));
        assert_eq!(
            dup.classify().message,
            "Duplicate field value: Sea, Please use another value!"
        );

        let invalid = Error::from(StoreError::validation(
            StoreOperation::Insert,
            vec![
                FieldError::new("name", "A tour must have a name"),
                FieldError::new("price", "A tour must have a price"),
            ],
        ));
        let c = invalid.classify();
        assert_eq!(c.status_label(), "fail");
        assert_eq!(
            c.message,
            "Invalid input data: A tour must have a name. A tour must have a price"
        );
    }

    #[test]
    fn test_unknown_errors_are_masked() {
        let c = Error::Internal("connection pool poisoned".into()).classify();
        assert_eq!(c.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(c.message, Classification::GENERIC_MESSAGE);
        assert!(!c.operational);
        assert_eq!(c.status_label(), "error");
    }

    #[test]
    fn test_jwt_errors() {
        let expired = Error::from(jsonwebtoken::errors::Error::from(
            JwtErrorKind::ExpiredSignature,
        ));
        assert_eq!(expired.classify().message, "Token Expired. Please login again");

        let invalid = Error::from(jsonwebtoken::errors::Error::from(
            JwtErrorKind::InvalidSignature,
        ));
        let c = invalid.classify();
        assert_eq!(c.status, StatusCode::UNAUTHORIZED);
        assert_eq!(c.message, "Invalid Token. Please login again");
    }

    #[test]
    fn test_operational_keeps_status_and_message() {
        let err = Error::operational(StatusCode::INTERNAL_SERVER_ERROR, "Email failed");
        let c = err.classify();
        assert!(c.operational);
        assert_eq!(c.status_label(), "error");
        assert_eq!(c.message, "Email failed");
    }
}
