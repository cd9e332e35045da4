//! Utility modules.

pub mod file;
pub mod retry;

pub use file::collect_files;
pub use retry::{RetryConfig, RetryResult, Retryable, with_retry};
