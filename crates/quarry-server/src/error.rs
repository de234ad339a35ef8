use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use quarry_remote::RemoteError;
use quarry_types::ErrorClass;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("store error: {0}")]
    Store(#[from] RemoteError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidKey(_) => StatusCode::BAD_REQUEST,
            Self::Store(RemoteError::Rejected { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Store(RemoteError::InvalidPrefix(_)) => StatusCode::BAD_REQUEST,
            Self::Store(_) | Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Map into the user-facing error taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Unauthorized | Self::InvalidKey(_) | Self::Config(_) => ErrorClass::Argument,
            Self::Store(e) => e.class(),
            Self::Io(_) => ErrorClass::Io,
            Self::Internal(_) => ErrorClass::Other,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(ServerError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ServerError::InvalidKey("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        let rejected = ServerError::Store(RemoteError::Rejected {
            backend: "m".into(),
            reason: "mismatch".into(),
        });
        assert_eq!(rejected.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        let io = ServerError::Store(RemoteError::Io {
            path: "/x".into(),
            source: std::io::Error::other("disk"),
        });
        assert_eq!(io.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn into_response_carries_status() {
        let response = ServerError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
