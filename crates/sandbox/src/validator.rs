//! Command line validation against the whitelist and blocked patterns.

use serde::Serialize;

use crate::whitelist::{ALLOWED_COMMANDS, BLOCKED_PATTERNS, matches_blocked_pattern};

/// Structured validation verdict. Every branch of [`validate`] returns one of
/// these; the function never panics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Verdict {
    pub allowed: bool,
    pub reason: Option<String>,
    pub warning: Option<String>,
    pub sanitized_command: Option<String>,
}

impl Verdict {
    fn allow() -> Self {
        Self {
            allowed: true,
            ..Self::default()
        }
    }

    fn allow_sanitized(line: &str) -> Self {
        Self {
            sanitized_command: Some(line.to_string()),
            ..Self::allow()
        }
    }

    fn allow_with_warning(line: &str, warning: impl Into<String>) -> Self {
        Self {
            warning: Some(warning.into()),
            ..Self::allow_sanitized(line)
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Split a command line into `(command, args)`, honoring single and double
/// quotes. A simple state-machine scanner: toggle "in quote" on the matching
/// quote char, split on spaces outside quotes.
fn parse_command_line(line: &str) -> (String, Vec<String>) {
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in line.chars() {
        match quote {
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            Some(q) if ch == q => quote = None,
            None if ch == ' ' => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            },
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }

    let mut iter = parts.into_iter();
    let command = iter.next().unwrap_or_default();
    (command, iter.collect())
}

/// Whether `path` stays inside the restriction root. Relative paths are
/// allowed; only absolute paths outside the root are rejected.
fn is_path_allowed(path: &str, restriction: &str) -> bool {
    let normalized = normalize_slashes(path);
    normalized.starts_with(&normalize_slashes(restriction))
        || normalized.starts_with("./")
        || normalized.starts_with("../")
        || !normalized.starts_with('/')
}

fn normalize_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for ch in path.chars() {
        if ch == '/' {
            if !prev_slash {
                out.push(ch);
            }
            prev_slash = true;
        } else {
            out.push(ch);
            prev_slash = false;
        }
    }
    out
}

/// First blocked flag found among `args` (exact or prefix match).
fn blocked_flag<'a>(args: &[String], blocked: &'a [String]) -> Option<&'a str> {
    for arg in args {
        for flag in blocked {
            if arg == flag || arg.starts_with(flag.as_str()) {
                return Some(flag);
            }
        }
    }
    None
}

/// Validate a command line.
///
/// Precedence: empty input is a no-op, then the categorical block rules run
/// against the raw line, then the whitelist lookup and its per-command
/// constraints. Pipe/redirect on commands not flagged for them produce a
/// non-fatal warning.
pub fn validate(command_line: &str) -> Verdict {
    let full_line = command_line.trim();
    let (command, args) = parse_command_line(full_line);

    // Empty command is allowed (just pressing enter).
    if command.is_empty() {
        return Verdict::allow();
    }

    if matches_blocked_pattern(full_line) {
        return Verdict::deny("This command pattern is not allowed for safety reasons.");
    }

    let Some(config) = ALLOWED_COMMANDS.get(command.as_str()) else {
        // Direct script/path invocation gets a more helpful message.
        if command.contains('/') || command.starts_with("./") {
            return Verdict::deny(
                "Running scripts directly is not allowed. \
                 Use 'bash scriptname.sh' or 'python3 script.py' instead.",
            );
        }
        return Verdict::deny(format!(
            "Command '{command}' is not available in this learning environment. \
             Try 'help' to see available commands."
        ));
    };

    if let Some(max_args) = config.max_args
        && args.len() > max_args
    {
        return Verdict::deny(format!(
            "Too many arguments for '{command}'. Maximum allowed: {max_args}"
        ));
    }

    if let Some(flag) = blocked_flag(&args, &config.blocked_flags) {
        return Verdict::deny(format!(
            "The flag '{flag}' is not allowed with '{command}' for safety reasons."
        ));
    }

    if let Some(ref restriction) = config.path_restriction {
        for arg in &args {
            if arg.starts_with('-') {
                continue;
            }
            // Only arguments that look like paths are checked.
            if (arg.contains('/') || arg == "..") && !is_path_allowed(arg, restriction) {
                return Verdict::deny(format!(
                    "Access to paths outside your workspace is restricted. \
                     Stay within {restriction}"
                ));
            }
        }
    }

    if full_line.contains('|') && !config.allow_pipe {
        return Verdict::allow_with_warning(
            full_line,
            "Piping output may be limited for this command.",
        );
    }

    if (full_line.contains('>') || full_line.contains('<')) && !config.allow_redirect {
        return Verdict::allow_with_warning(
            full_line,
            "Redirection may be limited for this command.",
        );
    }

    Verdict::allow_sanitized(full_line)
}

/// Validate a whole script body: the categorical block rules plus a few
/// script-specific patterns (fork bombs, trivially infinite loops).
pub fn validate_script(script: &str) -> Verdict {
    if BLOCKED_PATTERNS.iter().any(|p| p.is_match(script)) {
        return Verdict::deny("This script contains commands that are not allowed for safety.");
    }

    const SCRIPT_PATTERNS: &[&str] = &[
        r"while\s+true\s*;\s*do.*done",
        r"fork\s*\(\)",
        r":\s*\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;",
    ];
    for pattern in SCRIPT_PATTERNS {
        if let Ok(re) = regex::Regex::new(pattern)
            && re.is_match(script)
        {
            return Verdict::deny("This script contains potentially dangerous patterns.");
        }
    }

    Verdict::allow()
}

/// Friendly `(command, description)` listing, sorted by command name.
pub fn available_commands() -> Vec<(String, String)> {
    let mut list: Vec<(String, String)> = ALLOWED_COMMANDS
        .iter()
        .map(|(name, config)| ((*name).to_string(), config.description.clone()))
        .collect();
    list.sort();
    list
}
