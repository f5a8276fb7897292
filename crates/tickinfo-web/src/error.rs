use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tickinfo_core::{Ticker, ValidationError};

/// Request failures mapped to JSON error bodies.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown entity kind '{0}'")]
    UnknownKind(String),

    #[error(transparent)]
    InvalidRequest(#[from] ValidationError),

    #[error("no data found for {0}")]
    NotFound(Ticker),
}

impl ApiError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownKind(_) => "unknown_kind",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
        }
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::UnknownKind(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

/// Failures of the server binary itself.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

impl ServerError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Bind { .. } => 2,
            Self::Serve(_) => 10,
        }
    }
}
