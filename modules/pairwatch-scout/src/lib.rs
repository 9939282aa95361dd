pub mod error;
pub mod extract;
pub mod filter;
pub mod pipeline;
pub mod retry;
pub mod seen_set;
pub mod stats;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod transform;
pub mod updates;

pub use error::TransformError;
pub use filter::TokenFilter;
pub use pipeline::{Pipeline, PipelineSettings, PipelineState};
pub use retry::RetryPolicy;
pub use stats::{CycleStats, UpdateStats};
