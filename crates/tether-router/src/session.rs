//! Node session management
//!
//! One session per connected node process. The session is the reply
//! address: requests are answered on it and subscribed events delivered
//! through it, and its disconnect sweeps away every subscriber it
//! registered.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tether_core::{codec, Message};
use tether_transport::IpcSender;
use uuid::Uuid;

use crate::error::Result;

/// Session identifier
pub type SessionId = String;

/// A connected node process
pub struct Session {
    /// Unique session id, assigned at accept time
    pub id: SessionId,
    /// Transport peer label, for logging only
    pub peer: String,
    /// Reply channel for this session
    sender: Arc<dyn IpcSender>,
    /// Session creation time
    pub created_at: Instant,
    /// Last activity time
    last_activity: RwLock<Instant>,
}

impl Session {
    pub fn new(sender: Arc<dyn IpcSender>, peer: String) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4().to_string(),
            peer,
            sender,
            created_at: now,
            last_activity: RwLock::new(now),
        }
    }

    /// Encode and send one frame to this session
    pub async fn send_frame(&self, message: &Message) -> Result<()> {
        let line = codec::encode(message)?;
        self.sender.send(line).await?;
        *self.last_activity.write() = Instant::now();
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.sender.is_connected()
    }

    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn idle_duration(&self) -> std::time::Duration {
        self.last_activity.read().elapsed()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}
