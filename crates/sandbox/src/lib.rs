//! Command safety policy for the learning environment.
//!
//! A closed allow-list of shell commands with per-command constraints, plus a
//! list of categorically blocked patterns (privilege escalation, destructive
//! deletes, network tools, ...). The validator is a pure function: it never
//! panics and has no side effects, so it is safe to call speculatively for
//! client-side pre-screening before a round trip.

pub mod simulate;
pub mod validator;
pub mod whitelist;

pub use {
    simulate::simulate,
    validator::{Verdict, available_commands, validate, validate_script},
    whitelist::{ALLOWED_COMMANDS, CommandConfig, SANDBOX_HOME, WORKSPACE_ROOT},
};
