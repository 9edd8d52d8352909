//! Error types for pool operations
//!
//! Missing accounts and empty pools are routine on the request path and are
//! reported through `Option`/`bool` returns. Only setup can fail.

/// Errors from pool setup.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid pool configuration: {0}")]
    Config(#[from] common::Error),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
