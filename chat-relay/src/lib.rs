//! Line-oriented multi-client chat relay.
//!
//! Clients connect over TCP, pick a unique nickname and every line they send
//! is broadcast to all connected clients and appended to a history file that
//! new clients may replay. Each module focuses on one responsibility:
//!
//! - [`registry`] keeps the set of claimed nicknames unique.
//! - [`history`] is the append-only message log (file or in-memory).
//! - [`broadcast`] fans messages out to every active session and logs them.
//! - [`session`] is the per-client state machine, independent of TCP.
//! - [`state`] bundles the registry and broadcaster shared by sessions.
//! - [`server`] accepts connections, spawns sessions and coordinates shutdown.
//! - [`protocol`] parses client lines and renders every relay line.
//! - [`cli`], [`config`] and [`client`] back the `chat-relay` binary.
//!
//! Unit tests drive sessions over in-memory pipes; integration tests under
//! `tests/` talk to a real listener.

pub mod broadcast;
pub mod cli;
pub mod client;
pub mod config;
pub mod history;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod state;
