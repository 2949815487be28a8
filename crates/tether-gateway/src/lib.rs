//! Tether Gateway
//!
//! The platform-facing half of the broker: one persistent [`Connection`]
//! per credential identity, created and deduplicated by the
//! [`ConnectionRegistry`], all talking to the chat platform through the
//! [`ChatClient`] black-box trait.
//!
//! This crate provides:
//! - The platform client seam ([`ChatClient`], [`ChatClientFactory`],
//!   [`ClientEvent`])
//! - Connection state machine and actions ([`Connection`])
//! - Identity-keyed connection registry ([`ConnectionRegistry`])
//! - Outbound message preparation ([`message`])
//! - A fully scripted in-memory driver for tests and local development
//!   ([`loopback`])

pub mod client;
pub mod connection;
pub mod error;
pub mod loopback;
pub mod message;
pub mod registry;

pub use client::{ChatClient, ChatClientFactory, ClientEvent, EVERYONE_ROLE_NAME};
pub use connection::{ConnState, Connection, GatewayEvent};
pub use error::{GatewayError, Result};
pub use message::{prepare, PreparedAttachment, PreparedEmbed, PreparedMessage};
pub use registry::{ConnectReport, ConnectionRegistry};
