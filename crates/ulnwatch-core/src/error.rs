//! Error types for ulnwatch-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Address cannot be normalized to 20 bytes
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Value cannot be normalized to 32 bytes
    #[error("invalid bytes32 value: {0}")]
    InvalidBytes32(String),

    /// Composite identifier does not round-trip
    #[error("malformed identifier: {0}")]
    MalformedId(String),
}
