//! Transport error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IpcError>;

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("bind failed: {0}")]
    BindFailed(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("not connected")]
    NotConnected,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
