use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sync cycle error: {0}")]
    Cycle(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Request-level rejections raised by the proxy routes before (or instead of)
/// returning an upstream body.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Invalid API route")]
    InvalidRoute,

    #[error("Invalid API version")]
    InvalidVersion,

    #[error("Missing upstream path")]
    MissingPath,

    #[error("Missing image url")]
    MissingImageUrl,

    #[error("Invalid image url")]
    InvalidImageUrl,

    #[error("Unsupported protocol")]
    UnsupportedProtocol,

    #[error("Host not allowed")]
    HostNotAllowed,

    #[error("Unsupported content type")]
    UnsupportedContentType,

    #[error("Invalid or missing league id")]
    InvalidLeague,

    #[error("Upstream unreachable: {0}")]
    Network(String),

    #[error("{0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::InvalidRoute
            | ProxyError::InvalidVersion
            | ProxyError::MissingPath
            | ProxyError::MissingImageUrl
            | ProxyError::InvalidImageUrl
            | ProxyError::UnsupportedProtocol
            | ProxyError::InvalidLeague => StatusCode::BAD_REQUEST,
            ProxyError::HostNotAllowed => StatusCode::FORBIDDEN,
            ProxyError::UnsupportedContentType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ProxyError::Network(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        ProxyError::Network(e.to_string())
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        match self {
            // Plain-text bodies for the two rejections clients match on verbatim.
            ProxyError::MethodNotAllowed | ProxyError::UnsupportedContentType => {
                (status, self.to_string()).into_response()
            }
            _ => (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response(),
        }
    }
}
