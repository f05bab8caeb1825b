//! vigil — multi-chain EVM balance and transaction observer.
//!
//! The core is the watcher: a polling scheduler with a pluggable data
//! source, an RPC endpoint health model with failover and cooldown, a
//! thread-safe snapshot store, and an event bus fanning typed updates out
//! to the terminal UI and the WebSocket API.

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod selftest;
pub mod server;
pub mod watcher;
