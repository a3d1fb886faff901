//! Utilities shared by the database connectors and their callers

pub mod retry;

pub use retry::{RetryConfig, backoff_delay, retry, retry_with_backoff};
