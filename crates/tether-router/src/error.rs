//! Router error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("transport error: {0}")]
    Transport(#[from] tether_transport::IpcError),

    #[error("protocol error: {0}")]
    Protocol(#[from] tether_core::Error),

    #[error("configuration error: {0}")]
    Config(String),
}
