//! Error types for ChronoSync core types

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Range bounds out of order
    #[error("invalid missing range: low {low} > high {high}")]
    InvalidRange { low: u64, high: u64 },
}
