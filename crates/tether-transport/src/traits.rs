//! Transport trait definitions

use async_trait::async_trait;

use crate::error::Result;

/// Events that can occur on one side of a duplex channel
#[derive(Debug, Clone)]
pub enum IpcEvent {
    /// One complete frame (a line, newline stripped)
    Frame(String),
    /// The peer went away (clean close or error)
    Disconnected { reason: Option<String> },
    /// Error that did not close the channel
    Error(String),
}

/// Trait for sending frames to one peer
#[async_trait]
pub trait IpcSender: Send + Sync {
    /// Queue one frame for delivery
    async fn send(&self, frame: String) -> Result<()>;

    /// Check if the peer is still connected
    fn is_connected(&self) -> bool;

    /// Close this side of the channel
    async fn close(&self) -> Result<()>;
}

/// Trait for receiving frames from one peer
#[async_trait]
pub trait IpcReceiver: Send {
    /// Receive the next event; `None` once the channel is drained
    async fn recv(&mut self) -> Option<IpcEvent>;
}

/// Trait for the broker-side listener
#[async_trait]
pub trait IpcServer: Send {
    type Sender: IpcSender;
    type Receiver: IpcReceiver;

    /// Accept the next inbound connection. The returned string is an opaque
    /// peer label used only for logging; the reply address proper is the
    /// sender handle.
    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, String)>;

    /// Stop listening and release the underlying endpoint
    async fn close(&self) -> Result<()>;
}
