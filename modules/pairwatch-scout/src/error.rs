use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}
