//! Tether Core
//!
//! Protocol types and wire codec for the Tether broker.
//!
//! This crate provides:
//! - The request/reply/event vocabulary ([`Message`])
//! - Credential identity derivation ([`CredentialIdentity`])
//! - Trigger filter parameters ([`TriggerFilter`])
//! - Outbound message and action specs ([`MessageSpec`], [`ActionSpec`])
//! - Newline-delimited JSON encoding ([`codec`])

pub mod codec;
pub mod error;
pub mod identity;
pub mod types;

pub use codec::{decode, encode};
pub use error::{Error, Result};
pub use identity::CredentialIdentity;
pub use types::*;

/// Protocol version, echoed nowhere yet but bumped on breaking wire changes.
pub const PROTOCOL_VERSION: u8 = 1;

/// Default broker socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/tether-broker.sock";

/// Ceiling for simple request/response round trips (§ list/send ops).
pub const REQUEST_TIMEOUT_MS: u64 = 15_000;

/// Ceiling for a login attempt to settle to Ready or Error.
pub const LOGIN_TIMEOUT_MS: u64 = 30_000;

/// How long a second `connect` waits for an in-flight login to settle.
pub const LOGIN_SETTLE_MS: u64 = 2_000;

/// Default confirmation-prompt timeout when the caller supplies none.
pub const CONFIRM_TIMEOUT_MS: u64 = 60_000;
