//! Client error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("not connected")]
    NotConnected,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("request timed out")]
    Timeout,

    #[error("broker replied with the wrong frame: {0}")]
    UnexpectedReply(String),

    #[error("credentials rejected: {0}")]
    CredentialsRejected(String),

    #[error("transport error: {0}")]
    Transport(#[from] tether_transport::IpcError),

    #[error("protocol error: {0}")]
    Protocol(#[from] tether_core::Error),
}
