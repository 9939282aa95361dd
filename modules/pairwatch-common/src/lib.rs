pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::Config;
pub use error::{ConfigError, RecordError};
pub use types::*;
