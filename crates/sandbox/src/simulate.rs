//! Canned command simulation for the REST fallback path.
//!
//! Where a full interactive shell is unnecessary, the gateway pre-screens a
//! single command with the validator and answers from this table instead of
//! touching a PTY. Outputs mirror the demo-mode terminal.

use time::{OffsetDateTime, format_description::well_known::Rfc2822};

const HELP_TEXT: &str = "Available Commands:
  ls       - List files and directories
  cd       - Change directory
  pwd      - Print working directory
  cat      - Display file contents
  echo     - Display text
  whoami   - Print username
  date     - Display date and time
  clear    - Clear terminal
  help     - Show this help

Tip: Use the up/down arrows to navigate command history!";

/// Produce the canned output for an already-validated command line.
pub fn simulate(command_line: &str) -> String {
    let mut parts = command_line.trim().split_whitespace();
    let command = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    match command {
        "help" => HELP_TEXT.to_string(),
        "whoami" => "lara".to_string(),
        "pwd" => "/home/lara".to_string(),
        "date" => OffsetDateTime::now_utc()
            .format(&Rfc2822)
            .unwrap_or_else(|_| "unknown".to_string()),
        "echo" => args.join(" "),
        "ls" => "Documents  Downloads  workspace  welcome.txt".to_string(),
        "cat" => match args.first() {
            Some(&"welcome.txt") => "Welcome to CodeQuest Academy!\n\
                 Start your learning journey by exploring the lessons."
                .to_string(),
            Some(name) => format!("cat: {name}: No such file or directory"),
            None => "cat: (missing file): No such file or directory".to_string(),
        },
        _ => format!("{command}: command simulation not implemented"),
    }
}
