//! Server side of the terminal bridge.
//!
//! An axum router exposes a WebSocket endpoint that bridges each connection
//! to its own PTY-backed shell, plus a REST fallback that validates and
//! simulates commands without one. PTYs are spawned lazily, output streams
//! back as binary frames, and a heartbeat sweep terminates silent peers.

pub mod error;
pub mod exec;
pub mod server;
pub mod state;
pub mod terminal;
pub mod ws;

pub use {
    error::{Error, Result},
    server::{build_app, start_gateway},
    state::{AppState, GatewayState, SessionRegistry},
};
