//! Gateway error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Failures crossing the platform-client boundary. These never escape the
/// gateway as panics; action operations normalize them into outcome values.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("login rejected: {0}")]
    LoginRejected(String),

    #[error("connection is not ready")]
    NotReady,

    #[error("unknown guild: {0}")]
    UnknownGuild(String),

    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("unknown message: {0}")]
    UnknownMessage(String),

    #[error("operation timed out")]
    Timeout,

    #[error("platform error: {0}")]
    Platform(String),
}
