//! Error types for the Tether protocol

use thiserror::Error;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol error types
#[derive(Error, Debug)]
pub enum Error {
    /// A frame could not be serialized
    #[error("encode error: {0}")]
    Encode(String),

    /// A frame could not be parsed
    #[error("decode error: {0}")]
    Decode(String),

    /// A payload exceeds the frame size limit
    #[error("frame too large: {0} bytes (max {1})")]
    FrameTooLarge(usize, usize),
}
