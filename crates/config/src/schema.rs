//! Config schema types (gateway listener, PTY shell, client connection).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodequestConfig {
    pub gateway: GatewayConfig,
    pub client: TerminalClientConfig,
    pub heartbeat: HeartbeatConfig,
}

impl CodequestConfig {
    /// Build the config from environment variables, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            gateway: GatewayConfig::from_env(),
            client: TerminalClientConfig::from_env(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

/// Terminal gateway listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
    /// Shell executable spawned inside PTY sessions. `None` means use
    /// `$SHELL`, falling back to `/bin/sh`.
    pub shell: Option<String>,
    /// Initial PTY columns.
    pub cols: u16,
    /// Initial PTY rows.
    pub rows: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 4000,
            shell: None,
            cols: 80,
            rows: 24,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind: non_empty_env("CODEQUEST_TERMINAL_HOST").unwrap_or(defaults.bind),
            port: non_empty_env("CODEQUEST_TERMINAL_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            shell: non_empty_env("CODEQUEST_SHELL"),
            cols: defaults.cols,
            rows: defaults.rows,
        }
    }

    /// Shell executable to spawn, resolving the override chain.
    pub fn shell_program(&self) -> String {
        self.shell
            .clone()
            .or_else(|| non_empty_env("SHELL"))
            .unwrap_or_else(|| "/bin/sh".into())
    }
}

/// Client-side terminal connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalClientConfig {
    /// Raw WebSocket URL override. May be a bare host, a scheme-qualified
    /// URL, or a full URL with path — see [`crate::resolve_ws_url`].
    pub ws_url: Option<String>,
    /// Host used when no override is configured.
    pub default_host: String,
    /// Interval between client keepalive pings.
    #[serde(with = "duration_ms")]
    pub keepalive_interval: Duration,
    /// Bound on a single connection attempt before the socket is treated
    /// as stale.
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
}

impl Default for TerminalClientConfig {
    fn default() -> Self {
        Self {
            ws_url: None,
            default_host: "localhost:4000".into(),
            keepalive_interval: Duration::from_secs(25),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl TerminalClientConfig {
    pub fn from_env() -> Self {
        Self {
            ws_url: non_empty_env("CODEQUEST_TERMINAL_WS_URL"),
            ..Self::default()
        }
    }
}

/// Server-side peer liveness configuration. A peer silent for more than
/// `grace()` is forcibly terminated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    #[serde(with = "duration_ms")]
    pub interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

impl HeartbeatConfig {
    /// Two missed intervals mean a dead peer.
    pub fn grace(&self) -> Duration {
        self.interval * 2
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
