use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Token record must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}
