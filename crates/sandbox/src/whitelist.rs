//! Command whitelist for safe execution in the learning environment.

use std::{collections::HashMap, sync::LazyLock};

use {regex::Regex, serde::Serialize};

/// Home directory of the learner account inside the sandbox.
pub const SANDBOX_HOME: &str = "/home/learner";

/// The only subtree where write operations are permitted.
pub const WORKSPACE_ROOT: &str = "/home/learner/workspace";

/// Per-command constraints. Immutable after load; consumed read-only by the
/// validator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommandConfig {
    /// Argument count ceiling. `None` means unbounded.
    pub max_args: Option<usize>,
    /// Flags denied for this command (exact or prefix match).
    pub blocked_flags: Vec<String>,
    /// Root that every path-like argument must resolve under.
    pub path_restriction: Option<String>,
    /// Piping output is expected to work for this command.
    pub allow_pipe: bool,
    /// Redirection is expected to work for this command.
    pub allow_redirect: bool,
    pub description: String,
}

fn cmd(max_args: usize, description: &str) -> CommandConfig {
    CommandConfig {
        max_args: Some(max_args),
        description: description.into(),
        ..CommandConfig::default()
    }
}

fn restricted(max_args: usize, root: &str, description: &str) -> CommandConfig {
    CommandConfig {
        path_restriction: Some(root.into()),
        ..cmd(max_args, description)
    }
}

fn pipeable(mut config: CommandConfig) -> CommandConfig {
    config.allow_pipe = true;
    config
}

/// Commands allowed in the sandbox environment. Absence from this table means
/// denial: it is a closed allow-list, not a deny-list.
pub static ALLOWED_COMMANDS: LazyLock<HashMap<&'static str, CommandConfig>> = LazyLock::new(|| {
    let mut t = HashMap::new();

    // Navigation & directory
    t.insert("ls", pipeable(cmd(10, "List directory contents")));
    t.insert("cd", restricted(1, SANDBOX_HOME, "Change directory"));
    t.insert("pwd", cmd(0, "Print working directory"));
    t.insert("tree", restricted(3, SANDBOX_HOME, "Display directory tree"));

    // File reading
    t.insert(
        "cat",
        pipeable(restricted(
            5,
            SANDBOX_HOME,
            "Concatenate and display files",
        )),
    );
    t.insert(
        "head",
        pipeable(restricted(5, SANDBOX_HOME, "Display first lines of file")),
    );
    t.insert(
        "tail",
        pipeable(restricted(5, SANDBOX_HOME, "Display last lines of file")),
    );
    t.insert("less", restricted(1, SANDBOX_HOME, "View file with pagination"));
    t.insert("more", restricted(1, SANDBOX_HOME, "View file with pagination"));

    // File operations (restricted to the workspace)
    t.insert("touch", restricted(3, WORKSPACE_ROOT, "Create empty file"));
    t.insert("mkdir", restricted(2, WORKSPACE_ROOT, "Create directory"));
    t.insert("rmdir", restricted(1, WORKSPACE_ROOT, "Remove empty directory"));
    t.insert(
        "cp",
        CommandConfig {
            blocked_flags: vec!["-r".into(), "-R".into(), "--recursive".into()],
            ..restricted(3, WORKSPACE_ROOT, "Copy files")
        },
    );
    t.insert("mv", restricted(3, WORKSPACE_ROOT, "Move/rename files"));
    t.insert(
        "rm",
        CommandConfig {
            blocked_flags: vec![
                "-rf".into(),
                "-fr".into(),
                "-r".into(),
                "-R".into(),
                "--recursive".into(),
                "-f".into(),
                "--force".into(),
            ],
            ..restricted(2, WORKSPACE_ROOT, "Remove files (carefully!)")
        },
    );

    // Text processing
    t.insert(
        "echo",
        CommandConfig {
            allow_redirect: true,
            ..cmd(20, "Display text")
        },
    );
    t.insert(
        "grep",
        pipeable(restricted(5, SANDBOX_HOME, "Search for patterns")),
    );
    t.insert("sort", pipeable(restricted(5, SANDBOX_HOME, "Sort lines")));
    t.insert(
        "wc",
        pipeable(restricted(5, SANDBOX_HOME, "Word, line, character count")),
    );
    t.insert(
        "cut",
        pipeable(restricted(5, SANDBOX_HOME, "Remove sections from lines")),
    );
    t.insert(
        "uniq",
        pipeable(restricted(3, SANDBOX_HOME, "Report or omit repeated lines")),
    );
    t.insert("tr", pipeable(cmd(4, "Translate characters")));

    // File info
    t.insert("file", restricted(3, SANDBOX_HOME, "Determine file type"));
    t.insert("stat", restricted(2, SANDBOX_HOME, "Display file status"));

    // System info (read-only)
    t.insert("whoami", cmd(0, "Print username"));
    t.insert("date", cmd(3, "Display date and time"));
    t.insert("cal", cmd(3, "Display calendar"));
    t.insert("uptime", cmd(0, "System uptime"));
    t.insert("df", cmd(2, "Disk space usage"));
    t.insert("free", cmd(2, "Memory usage"));
    t.insert("uname", cmd(2, "System information"));
    t.insert("hostname", cmd(0, "Display hostname"));
    t.insert("id", cmd(0, "Print user identity"));
    t.insert("env", cmd(0, "Display environment"));

    // Python
    t.insert("python3", restricted(3, WORKSPACE_ROOT, "Run Python 3"));
    t.insert("python", restricted(3, WORKSPACE_ROOT, "Run Python"));

    // Help
    t.insert("man", cmd(1, "Manual pages"));
    t.insert("help", cmd(1, "Display help"));
    t.insert("type", cmd(1, "Display command type"));
    t.insert("which", cmd(1, "Locate command"));

    // Shell built-ins for scripting
    t.insert("export", cmd(3, "Set environment variable"));
    t.insert("read", cmd(3, "Read input"));
    t.insert("test", cmd(5, "Evaluate expression"));
    t.insert("[", cmd(6, "Test expression"));
    t.insert("true", cmd(0, "Return true"));
    t.insert("false", cmd(0, "Return false"));
    t.insert("exit", cmd(1, "Exit shell"));

    // Text editors (safe ones)
    t.insert("nano", restricted(1, WORKSPACE_ROOT, "Simple text editor"));

    // Basic utilities
    t.insert("clear", cmd(0, "Clear terminal"));
    t.insert("history", cmd(1, "Command history"));
    t.insert("alias", cmd(2, "Create command alias"));

    // Fun commands for engagement
    t.insert("cowsay", cmd(5, "Speaking cow"));
    t.insert("figlet", cmd(5, "ASCII art text"));
    t.insert("sl", cmd(0, "Steam locomotive"));
    t.insert("fortune", cmd(0, "Random fortune"));

    t
});

/// Patterns that are always blocked regardless of the base command. Checked
/// against the raw, untokenized line before the whitelist lookup, so a
/// blocked pattern cannot be smuggled in via an allowed command.
pub static BLOCKED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)rm\s+(-[a-zA-Z]*[rf][a-zA-Z]*\s+|--recursive|--force)", // rm -rf variants
        r"sudo",                                                      // no sudo
        r"su\s+",                                                     // no su
        r"chmod\s+[0-7]*7",                                           // no world-writable
        r"\|\s*(bash|sh|zsh)",                                        // no piping to shell
        r"curl|wget|nc|netcat|ncat",                                  // no network tools
        r"eval\s",                                                    // no eval
        r"exec\s",                                                    // no exec
        r"`[^`]*`",                                                   // backtick substitution
        r"\$\([^)]*\)",                                               // $() substitution
        r">\s*/dev/",                                                 // writing to devices
        r"mkfs",                                                      // no filesystem creation
        r"dd\s",                                                      // no dd
        r"reboot|shutdown|poweroff|halt",                             // no system control
        r"kill\s+-9",                                                 // no force kill
        r"pkill|killall",                                             // no process killing
        r"crontab",                                                   // no cron manipulation
        r"systemctl|service",                                         // no service control
        r"iptables|firewall",                                         // no firewall changes
        r"useradd|userdel|usermod",                                   // no user management
        r"passwd",                                                    // no password changes
        r"chown",                                                     // no ownership changes
        r"mount|umount",                                              // no mount operations
        r"fdisk|parted",                                              // no disk partitioning
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Captures the target of an output redirect to an absolute path.
static REDIRECT_TARGET: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r">\s*(/\S*)").ok());

/// Captures the argument of `source`/`.` sourcing.
static SOURCE_TARGET: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(?:source|\.)\s+(\S+)").ok());

/// Test the raw line against every categorical block rule.
///
/// Beyond the plain regexes, two rules need a capture-then-check because
/// they depend on where a path points: redirects to absolute paths outside
/// the workspace, and sourcing files outside the sandbox home.
pub fn matches_blocked_pattern(line: &str) -> bool {
    if BLOCKED_PATTERNS.iter().any(|p| p.is_match(line)) {
        return true;
    }

    if let Some(re) = REDIRECT_TARGET.as_ref()
        && let Some(caps) = re.captures(line)
        && let Some(target) = caps.get(1)
        && !target.as_str().starts_with(WORKSPACE_ROOT)
    {
        return true;
    }

    if let Some(re) = SOURCE_TARGET.as_ref()
        && let Some(caps) = re.captures(line)
        && let Some(target) = caps.get(1)
        && !target.as_str().starts_with(SANDBOX_HOME)
    {
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist_contains_core_commands() {
        for name in ["ls", "cd", "pwd", "cat", "echo", "rm", "help"] {
            assert!(ALLOWED_COMMANDS.contains_key(name), "missing {name}");
        }
        assert!(!ALLOWED_COMMANDS.contains_key("bash"));
        assert!(!ALLOWED_COMMANDS.contains_key("ssh"));
    }

    #[test]
    fn recursive_delete_is_blocked() {
        assert!(matches_blocked_pattern("rm -rf /home/learner/workspace"));
        assert!(matches_blocked_pattern("rm -r docs"));
        assert!(matches_blocked_pattern("rm --force notes.txt"));
        assert!(!matches_blocked_pattern("rm notes.txt"));
    }

    #[test]
    fn privilege_escalation_is_blocked() {
        assert!(matches_blocked_pattern("sudo apt install cowsay"));
        assert!(matches_blocked_pattern("ls; sudo reboot"));
        assert!(matches_blocked_pattern("echo hi && sudo id"));
    }

    #[test]
    fn command_substitution_is_blocked() {
        assert!(matches_blocked_pattern("echo `id`"));
        assert!(matches_blocked_pattern("echo $(id)"));
    }

    #[test]
    fn redirects_outside_workspace_are_blocked() {
        assert!(matches_blocked_pattern("echo pwned > /etc/passwd"));
        assert!(matches_blocked_pattern("echo x > /dev/sda"));
        assert!(!matches_blocked_pattern(
            "echo hi > /home/learner/workspace/out.txt"
        ));
    }

    #[test]
    fn sourcing_outside_home_is_blocked() {
        assert!(matches_blocked_pattern("source /etc/profile"));
        assert!(matches_blocked_pattern(". /etc/profile"));
        assert!(!matches_blocked_pattern("source /home/learner/setup.sh"));
    }
}
