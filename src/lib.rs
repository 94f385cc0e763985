//! # chanrelay
//!
//! `chanrelay` is an in-memory, channel-scoped WebSocket broadcast relay.
//! Clients connect to `/ws/{channel}`; every frame a client sends is
//! delivered, unmodified, to every client currently connected to the same
//! channel (the sender included).
//!
//! ## Core Modules
//!
//! - `relay`: channel registry, subscriber handles and the broadcaster.
//! - `transport`: WebSocket accept loop, handshake routing and the per-connection supervisor.
//! - `auth`: bearer-token gate used when the relay requires authentication.
//! - `config`: loading and merging server configuration.
//! - `utils`: error types and logging setup.

pub mod auth;
pub mod config;
pub mod relay;
pub mod transport;
pub mod utils;
