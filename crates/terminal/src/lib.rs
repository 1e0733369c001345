//! Client side of the terminal bridge.
//!
//! One [`TerminalConnection`] is shared by every terminal view in the
//! process: it owns the WebSocket, reconnects with exponential backoff, and
//! fans messages out to subscribers. A [`TerminalAdapter`] binds a display
//! [`Surface`] to that connection, routing keystrokes to the live PTY when
//! connected and to the local [`DemoShell`] when not, so the user always has
//! a working (if simulated) terminal.

pub mod adapter;
pub mod connection;
pub mod demo;
pub mod error;
pub mod line;
pub mod surface;

pub use {
    adapter::{CommandEvent, CommandHook, TerminalAdapter},
    connection::{ConnectionStatus, Payload, Subscription, TerminalConnection},
    demo::DemoShell,
    error::{Error, Result},
    line::LineBuffer,
    surface::Surface,
};
