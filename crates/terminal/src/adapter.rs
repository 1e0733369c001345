//! Binds a display [`Surface`] to the shared connection.
//!
//! The adapter is the single place that decides where a keystroke goes: to
//! the live PTY when the socket is up, to the local [`DemoShell`] otherwise.
//! It also mirrors live-mode keystrokes into a line buffer so executed
//! commands can be reported to the gamification hook without parsing PTY
//! echo output.

use std::sync::Arc;

use codequest_protocol::ServerMessage;

use crate::{
    connection::{ConnectionStatus, Payload, TerminalConnection},
    demo::DemoShell,
    line::LineBuffer,
    surface::Surface,
};

/// An executed command, as observed at the input boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvent {
    /// The command word itself.
    pub command: String,
    /// Non-flag arguments.
    pub args: Vec<String>,
    /// Arguments starting with `-`.
    pub flags: Vec<String>,
}

impl CommandEvent {
    pub fn from_line(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default().to_string();
        let (flags, args) = parts
            .map(str::to_string)
            .partition(|part| part.starts_with('-'));
        Self {
            command,
            args,
            flags,
        }
    }
}

/// Observer invoked for every command the user executes, in either mode.
pub type CommandHook = Arc<dyn Fn(CommandEvent) + Send + Sync>;

/// Routes terminal I/O between a surface, the live socket, and the demo
/// shell.
pub struct TerminalAdapter {
    connection: TerminalConnection,
    demo: DemoShell,
    /// Mirror of what the user typed since the last Enter, live mode only.
    mirror: LineBuffer,
    /// Trailing bytes of a UTF-8 sequence split across binary frames.
    pending: Vec<u8>,
    hook: Option<CommandHook>,
}

impl TerminalAdapter {
    pub fn new(connection: TerminalConnection) -> Self {
        Self {
            connection,
            demo: DemoShell::new(),
            mirror: LineBuffer::new(),
            pending: Vec::new(),
            hook: None,
        }
    }

    /// Attach a command observer. It fires for demo commands too.
    pub fn with_hook(connection: TerminalConnection, hook: CommandHook) -> Self {
        Self {
            connection,
            demo: DemoShell::with_hook(Arc::clone(&hook)),
            mirror: LineBuffer::new(),
            pending: Vec::new(),
            hook: Some(hook),
        }
    }

    pub fn connection(&self) -> &TerminalConnection {
        &self.connection
    }

    fn live(&self) -> bool {
        self.connection.status() == ConnectionStatus::Connected
    }

    /// Show the demo prompt. Call when a view mounts without a connection.
    pub fn start_demo(&mut self, surface: &mut dyn Surface) {
        self.demo.prompt(surface);
    }

    /// One raw input chunk from the user.
    pub fn handle_input(&mut self, surface: &mut dyn Surface, data: &str) {
        if !self.live() {
            self.demo.handle_input(surface, data);
            return;
        }

        self.mirror_input(data);
        if self.connection.send_input(data).is_err() {
            // The socket died between the status check and the send; fall
            // back so the keystroke is not swallowed.
            self.demo.handle_input(surface, data);
        }
    }

    /// Track live-mode keystrokes for command reporting. The mirror is a
    /// best-effort reconstruction; anything it cannot follow (history
    /// recall, cursor movement) resets it.
    fn mirror_input(&mut self, data: &str) {
        match data {
            "\r" => {
                if let Some(line) = self.mirror.take()
                    && let Some(hook) = &self.hook
                {
                    hook(CommandEvent::from_line(&line));
                }
            },
            "\x7f" => {
                self.mirror.backspace();
            },
            "\x03" | "\x1b[A" | "\x1b[B" => self.mirror.clear(),
            _ => {
                if data.chars().all(|c| c >= ' ') {
                    self.mirror.push(data);
                }
            },
        }
    }

    /// One frame from the gateway.
    pub fn handle_payload(&mut self, surface: &mut dyn Surface, payload: &Payload) {
        match payload {
            Payload::Binary(data) => {
                self.write_binary(surface, data);
            },
            Payload::Text(text) => match serde_json::from_str::<ServerMessage>(text) {
                Ok(ServerMessage::Connected { terminal_id }) => {
                    tracing::debug!(terminal_id = %terminal_id, "terminal: session ready");
                },
                Ok(ServerMessage::Exit { exit_code, .. }) => {
                    let code = exit_code.unwrap_or_default();
                    surface.write(&format!(
                        "\r\n\x1b[1;31mSession ended (exit code {code}).\x1b[0m\r\n"
                    ));
                },
                Ok(ServerMessage::Error { message }) => {
                    surface.write(&format!("\r\n\x1b[1;31m{message}\x1b[0m\r\n"));
                },
                Ok(_) => {},
                Err(_) => {
                    tracing::debug!(frame = %text, "terminal: unrecognized control frame");
                },
            },
        }
    }

    /// Write PTY output, holding back a trailing UTF-8 sequence that is
    /// still missing continuation bytes so a multi-byte character split
    /// across frames is not rendered as U+FFFD.
    fn write_binary(&mut self, surface: &mut dyn Surface, data: &[u8]) {
        self.pending.extend_from_slice(data);
        let keep = incomplete_utf8_tail(&self.pending);
        let ready = self.pending.len() - keep;
        if ready > 0 {
            let text = String::from_utf8_lossy(&self.pending[..ready]).into_owned();
            surface.write(&text);
            self.pending.drain(..ready);
        }
    }

    /// Propagate a viewport resize. Dropped when not connected; the demo
    /// shell has no grid to resize.
    pub fn handle_resize(&self, cols: u16, rows: u16) {
        if self.live() {
            let _ = self.connection.send_resize(cols, rows);
        }
    }
}

/// Length of an incomplete multi-byte UTF-8 sequence at the end of `data`,
/// or 0 when the buffer ends on a character boundary (or with bytes no
/// amount of waiting will repair).
fn incomplete_utf8_tail(data: &[u8]) -> usize {
    let len = data.len();
    for back in 1..=len.min(3) {
        let byte = data[len - back];
        if byte & 0xC0 != 0x80 {
            // Lead byte of the final character: how long should it be?
            let needed = match byte {
                b if b & 0x80 == 0x00 => 1,
                b if b & 0xE0 == 0xC0 => 2,
                b if b & 0xF0 == 0xE0 => 3,
                b if b & 0xF8 == 0xF0 => 4,
                _ => return 0, // stray continuation run, nothing to wait for
            };
            return if needed > back { back } else { 0 };
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        out: String,
    }

    impl Surface for Recorder {
        fn write(&mut self, data: &str) {
            self.out.push_str(data);
        }

        fn clear(&mut self) {
            self.out.clear();
        }
    }

    #[test]
    fn command_event_splits_flags_from_args() {
        let event = CommandEvent::from_line("ls -la /home/learner --color");
        assert_eq!(event.command, "ls");
        assert_eq!(event.args, vec!["/home/learner"]);
        assert_eq!(event.flags, vec!["-la", "--color"]);
    }

    #[test]
    fn command_event_tolerates_empty_lines() {
        let event = CommandEvent::from_line("");
        assert_eq!(event.command, "");
        assert!(event.args.is_empty());
        assert!(event.flags.is_empty());
    }

    #[tokio::test]
    async fn disconnected_input_goes_to_the_demo_shell() {
        let conn = TerminalConnection::new(
            "ws://localhost:1",
            codequest_config::TerminalClientConfig::default(),
        );
        let mut adapter = TerminalAdapter::new(conn);
        let mut surface = Recorder::default();

        for ch in "pwd".chars() {
            adapter.handle_input(&mut surface, &ch.to_string());
        }
        adapter.handle_input(&mut surface, "\r");
        assert!(surface.out.contains("/home/lara"));
    }

    #[test]
    fn exit_frames_render_a_red_banner() {
        let conn = TerminalConnection::new(
            "ws://localhost:1",
            codequest_config::TerminalClientConfig::default(),
        );
        let mut adapter = TerminalAdapter::new(conn);
        let mut surface = Recorder::default();

        adapter.handle_payload(
            &mut surface,
            &Payload::Text(r#"{"type":"exit","exitCode":1,"signal":null}"#.into()),
        );
        assert!(surface.out.contains("Session ended (exit code 1)"));
        assert!(surface.out.contains("\x1b[1;31m"));
    }

    #[test]
    fn binary_frames_are_written_raw() {
        let conn = TerminalConnection::new(
            "ws://localhost:1",
            codequest_config::TerminalClientConfig::default(),
        );
        let mut adapter = TerminalAdapter::new(conn);
        let mut surface = Recorder::default();

        adapter.handle_payload(&mut surface, &Payload::Binary(b"\x1b[32mok\x1b[0m".to_vec()));
        assert_eq!(surface.out, "\x1b[32mok\x1b[0m");
    }

    #[test]
    fn multibyte_output_split_across_frames_renders_intact() {
        let conn = TerminalConnection::new(
            "ws://localhost:1",
            codequest_config::TerminalClientConfig::default(),
        );
        let mut adapter = TerminalAdapter::new(conn);
        let mut surface = Recorder::default();

        // "héllo" with the é (0xC3 0xA9) cut between two frames.
        adapter.handle_payload(&mut surface, &Payload::Binary(vec![b'h', 0xC3]));
        adapter.handle_payload(
            &mut surface,
            &Payload::Binary(vec![0xA9, b'l', b'l', b'o']),
        );
        assert_eq!(surface.out, "héllo");
        assert!(!surface.out.contains('\u{FFFD}'));
    }

    #[test]
    fn genuinely_invalid_bytes_still_render_as_replacement() {
        let conn = TerminalConnection::new(
            "ws://localhost:1",
            codequest_config::TerminalClientConfig::default(),
        );
        let mut adapter = TerminalAdapter::new(conn);
        let mut surface = Recorder::default();

        // A lone continuation byte mid-stream cannot be completed later.
        adapter.handle_payload(&mut surface, &Payload::Binary(vec![b'a', 0xA9, b'b']));
        assert_eq!(surface.out, "a\u{FFFD}b");
    }

    #[test]
    fn error_frames_surface_the_message() {
        let conn = TerminalConnection::new(
            "ws://localhost:1",
            codequest_config::TerminalClientConfig::default(),
        );
        let mut adapter = TerminalAdapter::new(conn);
        let mut surface = Recorder::default();

        adapter.handle_payload(
            &mut surface,
            &Payload::Text(r#"{"type":"error","message":"command not allowed: rm"}"#.into()),
        );
        assert!(surface.out.contains("command not allowed: rm"));
    }
}
