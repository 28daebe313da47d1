use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid API base url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status. `message` holds the server's `error` field
    /// when the body carried one.
    #[error("{}", .message.as_deref().unwrap_or("request failed"))]
    Status { status: u16, message: Option<String> },
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Http(err) => err.status().map(|status| status.as_u16()),
            ApiError::InvalidUrl { .. } => None,
        }
    }

    /// Message reported by the backend, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}
