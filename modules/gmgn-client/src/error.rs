use thiserror::Error;

pub type Result<T> = std::result::Result<T, GmgnError>;

#[derive(Debug, Error)]
pub enum GmgnError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Client setup error: {0}")]
    Setup(String),
}

impl GmgnError {
    /// HTTP status for API errors; `None` for transport and parse failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            GmgnError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GmgnError {
    fn from(err: reqwest::Error) -> Self {
        GmgnError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for GmgnError {
    fn from(err: serde_json::Error) -> Self {
        GmgnError::Parse(err.to_string())
    }
}
