use thiserror::Error;

pub type Result<T> = std::result::Result<T, TorError>;

#[derive(Debug, Error)]
pub enum TorError {
    #[error("Could not reach control port {addr}: {message}")]
    Connect { addr: String, message: String },

    #[error("Control port rejected command (status {code}): {message}")]
    Reply { code: u16, message: String },

    #[error("Malformed control reply: {0}")]
    Protocol(String),

    #[error("Control connection closed before reply")]
    Closed,

    #[error("Timed out talking to control port")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TorError {
    fn from(err: std::io::Error) -> Self {
        TorError::Io(err.to_string())
    }
}
