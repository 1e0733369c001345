//! Local demo-mode shell.
//!
//! A tiny line editor plus a fixed command table that simulates a shell when
//! no live connection exists. No process is spawned and outputs are canned;
//! the point is graceful degradation, not shell fidelity.

use time::{OffsetDateTime, format_description::well_known::Rfc2822};

use crate::{
    adapter::{CommandEvent, CommandHook},
    line::LineBuffer,
    surface::Surface,
};

/// Bound on retained history entries; the oldest entry is evicted at capacity.
const HISTORY_CAP: usize = 100;

const PROMPT: &str =
    "\x1b[1;32mlara\x1b[0m@\x1b[1;34mraspberrypi\x1b[0m:\x1b[1;36m~\x1b[0m$ ";

/// Demo-mode command interpreter with line editing and history.
#[derive(Default)]
pub struct DemoShell {
    line: LineBuffer,
    history: Vec<String>,
    /// History cursor; `None` means no selection (editing a fresh line).
    cursor: Option<usize>,
    hook: Option<CommandHook>,
}

impl DemoShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an observer notified of every executed command (XP and
    /// achievement instrumentation).
    pub fn with_hook(hook: CommandHook) -> Self {
        Self {
            hook: Some(hook),
            ..Self::default()
        }
    }

    /// Emit the shell prompt.
    pub fn prompt(&self, surface: &mut dyn Surface) {
        surface.write(PROMPT);
    }

    /// Feed one raw input chunk (a keystroke or paste) through the line
    /// editor.
    pub fn handle_input(&mut self, surface: &mut dyn Surface, data: &str) {
        match data {
            "\r" => {
                surface.write("\r\n");
                if let Some(command) = self.line.take() {
                    self.push_history(command.clone());
                    self.cursor = None;
                    self.execute(surface, &command);
                } else {
                    self.line.clear();
                    self.prompt(surface);
                }
            },
            // Backspace: erase one display cell.
            "\x7f" => {
                if self.line.backspace() {
                    surface.write("\x08 \x08");
                }
            },
            // Up arrow: recall older history.
            "\x1b[A" => {
                if self.history.is_empty() {
                    return;
                }
                let idx = match self.cursor {
                    None => self.history.len() - 1,
                    Some(i) => i.saturating_sub(1),
                };
                self.cursor = Some(idx);
                let entry = self.history[idx].clone();
                self.replace_line(surface, &entry);
            },
            // Down arrow: recall newer history, or clear past the end.
            "\x1b[B" => {
                let Some(current) = self.cursor else {
                    return;
                };
                let idx = current + 1;
                if idx >= self.history.len() {
                    self.cursor = None;
                    self.replace_line(surface, "");
                } else {
                    self.cursor = Some(idx);
                    let entry = self.history[idx].clone();
                    self.replace_line(surface, &entry);
                }
            },
            // Ctrl-C: abandon the line.
            "\x03" => {
                surface.writeln("^C");
                self.line.clear();
                self.prompt(surface);
            },
            // Ctrl-L: wipe the display.
            "\x0c" => {
                surface.clear();
                self.prompt(surface);
            },
            _ => {
                if data.chars().all(|c| c >= ' ') || data == "\t" {
                    self.line.push(data);
                    surface.write(data);
                }
            },
        }
    }

    /// Replace the displayed line with `next`, erasing exactly as many cells
    /// as the *current* buffer occupies.
    fn replace_line(&mut self, surface: &mut dyn Surface, next: &str) {
        let erase = self.line.len();
        let mut redraw = String::with_capacity(erase * 3 + next.len());
        for _ in 0..erase {
            redraw.push('\x08');
        }
        for _ in 0..erase {
            redraw.push(' ');
        }
        for _ in 0..erase {
            redraw.push('\x08');
        }
        redraw.push_str(next);
        surface.write(&redraw);
        self.line.replace(next);
    }

    fn push_history(&mut self, command: String) {
        if self.history.len() == HISTORY_CAP {
            self.history.remove(0);
        }
        self.history.push(command);
    }

    fn execute(&mut self, surface: &mut dyn Surface, command: &str) {
        let mut parts = command.split_whitespace();
        let cmd = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        if let Some(hook) = &self.hook {
            hook(CommandEvent::from_line(command));
        }

        match cmd {
            "help" => {
                surface.writeln("\x1b[1;36mDemo Mode Commands:\x1b[0m");
                surface.writeln(
                    "  \x1b[1;32mls\x1b[0m, \x1b[1;32mpwd\x1b[0m, \x1b[1;32mcat\x1b[0m, \
                     \x1b[1;32mecho\x1b[0m, \x1b[1;32mwhoami\x1b[0m, \x1b[1;32mdate\x1b[0m, \
                     \x1b[1;32mclear\x1b[0m",
                );
            },
            "whoami" => surface.writeln("lara"),
            "pwd" => surface.writeln("/home/lara"),
            "date" => {
                let now = OffsetDateTime::now_utc()
                    .format(&Rfc2822)
                    .unwrap_or_else(|_| "unknown".into());
                surface.writeln(&now);
            },
            "echo" => surface.writeln(&args.join(" ")),
            "clear" => surface.clear(),
            "ls" => surface.writeln(
                "\x1b[1;34mDocuments\x1b[0m  \x1b[1;34mDownloads\x1b[0m  welcome.txt",
            ),
            "cat" => match args.first() {
                Some(&"welcome.txt") => surface.writeln("Welcome to CodeQuest!"),
                Some(name) => surface.writeln(&format!("cat: {name}: No such file")),
                None => surface.writeln("cat: (missing): No such file"),
            },
            _ => surface.writeln(&format!("\x1b[1;33m{cmd}: not available in demo\x1b[0m")),
        }

        self.prompt(surface);
    }
}
