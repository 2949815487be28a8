//! Tether Client
//!
//! Node-side library for talking to the broker: connect to the socket,
//! issue requests with bounded waits, register triggers and receive their
//! event streams.

pub mod client;
pub mod error;

pub use client::{BrokerClient, EventStream};
pub use error::{ClientError, Result};
