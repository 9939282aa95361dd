pub mod error;
pub mod sql;
mod store;

pub use error::{Result, StoreError};
pub use sql::TableColumn;
pub use store::{TokenStore, LIVE_PAGE_SIZE};
