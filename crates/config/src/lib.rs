//! Environment-driven configuration for the codequest terminal bridge.
//!
//! All settings come from environment variables with serde defaults as the
//! fallback, so a bare `codequest` invocation works out of the box:
//!
//! - `CODEQUEST_TERMINAL_HOST` — gateway listen address
//! - `CODEQUEST_TERMINAL_PORT` — gateway listen port
//! - `CODEQUEST_SHELL` — shell executable override for PTY sessions
//! - `CODEQUEST_TERMINAL_WS_URL` — client-facing WebSocket URL override

pub mod schema;
pub mod ws_url;

pub use {
    schema::{CodequestConfig, GatewayConfig, HeartbeatConfig, TerminalClientConfig},
    ws_url::resolve_ws_url,
};
