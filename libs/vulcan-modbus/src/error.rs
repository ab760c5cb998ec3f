//! Link and codec error types

use errors::VulcanError;
use thiserror::Error;

/// Register word(s) that cannot be turned into a physical value
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("expected {expected} register(s), got {actual}")]
    WordCount { expected: usize, actual: usize },

    #[error("non-finite float decoded from words [0x{low:04X}, 0x{high:04X}]")]
    NonFinite { low: u16, high: u16 },

    #[error("value {value} out of range for {format}")]
    OutOfRange { value: f64, format: &'static str },
}

/// Transport or connection failure
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link not connected")]
    NotConnected,

    #[error("connect to {addr} timed out after {timeout_ms} ms")]
    Timeout { addr: String, timeout_ms: u64 },

    #[error("invalid controller address: {0}")]
    Address(String),

    #[error("transport: {0}")]
    Transport(#[from] std::io::Error),
}

impl From<CodecError> for VulcanError {
    fn from(err: CodecError) -> Self {
        VulcanError::Decode(err.to_string())
    }
}

impl From<LinkError> for VulcanError {
    fn from(err: LinkError) -> Self {
        VulcanError::Link(err.to_string())
    }
}
