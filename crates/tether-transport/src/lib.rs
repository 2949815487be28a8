//! Tether Transport Layer
//!
//! Duplex line-channel transports for the broker socket:
//! - Unix domain socket (primary, the "named channel")
//!
//! The traits are channel-agnostic: anything that can carry one UTF-8 line
//! per frame in both directions can back the broker.

pub mod error;
pub mod traits;
pub mod uds;

pub use error::{IpcError, Result};
pub use traits::{IpcEvent, IpcReceiver, IpcSender, IpcServer};
pub use uds::{UnixSocketConnector, UnixSocketReceiver, UnixSocketSender, UnixSocketServer};
