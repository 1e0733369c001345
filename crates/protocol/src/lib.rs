//! Terminal bridge WebSocket protocol definitions.
//!
//! Client → server traffic is JSON control frames. Server → client traffic is
//! raw binary frames for PTY output (the hot path carries no JSON overhead)
//! plus JSON control frames for session lifecycle events.
//!
//! Any frame that fails to parse, or carries an unknown `type` tag, is logged
//! and dropped at the deserialization boundary — it never propagates deeper.

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

/// Endpoint path the gateway serves terminal WebSocket upgrades on.
pub const TERMINAL_WS_PATH: &str = "/api/terminal";

/// Upper bound on a single inbound control frame.
pub const MAX_CONTROL_FRAME_BYTES: usize = 16_384; // 16 KB

/// Default PTY dimensions used until the client reports its viewport.
pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;

/// `TERM` exported to the shell spawned in the PTY.
pub const TERM_VALUE: &str = "xterm-256color";

// ── Client → server ──────────────────────────────────────────────────────────

/// Control frames sent by the terminal client.
///
/// `Resize` dimensions are carried as `i64` and validated with
/// [`ClientMessage::valid_resize`] so that zero or negative values are
/// ignored rather than rejected at the serde layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Trigger a lazy PTY spawn without sending input.
    Init,
    /// Keepalive probe; the peer echoes the timestamp back in a `pong`.
    Ping { time: u64 },
    /// Keepalive acknowledgement; no reply.
    Pong { time: u64 },
    /// Raw bytes for the PTY stdin. Spawns the PTY first if needed.
    Input { data: String },
    /// Resize the PTY viewport.
    Resize { cols: i64, rows: i64 },
    /// Convenience: write `command + "\n"` to the PTY stdin.
    Command { command: String },
}

impl ClientMessage {
    /// Whether this message requires a running shell (and therefore triggers
    /// a lazy spawn when none exists).
    pub fn requires_pty(&self) -> bool {
        matches!(
            self,
            Self::Init | Self::Input { .. } | Self::Resize { .. } | Self::Command { .. }
        )
    }

    /// Validate resize dimensions: positive and within `u16` range.
    pub fn valid_resize(cols: i64, rows: i64) -> Option<(u16, u16)> {
        let cols = u16::try_from(cols).ok().filter(|c| *c > 0)?;
        let rows = u16::try_from(rows).ok().filter(|r| *r > 0)?;
        Some((cols, rows))
    }
}

// ── Server → client ──────────────────────────────────────────────────────────

/// JSON control frames sent by the gateway. PTY output travels separately as
/// raw binary frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// PTY spawned successfully.
    Connected {
        #[serde(rename = "terminalId")]
        terminal_id: String,
    },
    /// The PTY process ended. The socket stays open; the client decides
    /// whether to keep it and respawn on next input.
    Exit {
        #[serde(rename = "exitCode")]
        exit_code: Option<u32>,
        signal: Option<String>,
    },
    /// Spawn or fatal per-session failure; the socket will be closed.
    Error { message: String },
    /// Server-side keepalive probe.
    Ping { time: u64 },
    /// Reply to a client `ping`, echoing its timestamp.
    Pong { time: u64 },
}

/// Milliseconds since the Unix epoch, the timestamp unit of the wire protocol.
pub fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_lowercase_type_tags() {
        let json = serde_json::to_string(&ClientMessage::Init).unwrap();
        assert_eq!(json, r#"{"type":"init"}"#);

        let json = serde_json::to_string(&ClientMessage::Input {
            data: "ls\r".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"input","data":"ls\r"}"#);
    }

    #[test]
    fn resize_parses_from_wire_form() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"resize","cols":100,"rows":40}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Resize {
                cols: 100,
                rows: 40
            }
        );
        assert!(msg.requires_pty());
    }

    #[test]
    fn unknown_type_tag_is_a_parse_error() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"format_disk"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>("not json").is_err());
    }

    #[test]
    fn resize_validation_rejects_non_positive_dimensions() {
        assert_eq!(ClientMessage::valid_resize(0, 24), None);
        assert_eq!(ClientMessage::valid_resize(80, -5), None);
        assert_eq!(ClientMessage::valid_resize(80, 0), None);
        assert_eq!(ClientMessage::valid_resize(i64::MAX, 24), None);
        assert_eq!(ClientMessage::valid_resize(100, 40), Some((100, 40)));
    }

    #[test]
    fn server_exit_uses_camel_case_fields() {
        let json = serde_json::to_string(&ServerMessage::Exit {
            exit_code: Some(0),
            signal: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"exit","exitCode":0,"signal":null}"#);

        let json = serde_json::to_string(&ServerMessage::Connected {
            terminal_id: "t1".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"connected","terminalId":"t1"}"#);
    }

    #[test]
    fn ping_pong_round_trip() {
        let ping = ClientMessage::Ping { time: 123 };
        let json = serde_json::to_string(&ping).unwrap();
        assert_eq!(serde_json::from_str::<ClientMessage>(&json).unwrap(), ping);
        assert!(!ClientMessage::Pong { time: 123 }.requires_pty());
    }
}
