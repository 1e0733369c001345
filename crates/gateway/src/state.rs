//! Shared gateway state and the live session registry.

use std::sync::Arc;

use {codequest_config::CodequestConfig, dashmap::DashMap, tokio::sync::mpsc, tracing::info};

/// One live WebSocket connection. `terminal_id` is set once a PTY has been
/// spawned for it.
struct SessionEntry {
    terminal_id: Option<String>,
    shutdown: mpsc::UnboundedSender<()>,
}

/// Registry of live connections, keyed by connection id. Used for shutdown
/// fan-out and introspection.
#[derive(Default)]
pub struct SessionRegistry {
    inner: DashMap<String, SessionEntry>,
}

impl SessionRegistry {
    /// Track a new connection. The returned receiver fires when the gateway
    /// wants the connection to terminate.
    pub fn register(&self, conn_id: &str) -> mpsc::UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.insert(
            conn_id.to_string(),
            SessionEntry {
                terminal_id: None,
                shutdown: tx,
            },
        );
        rx
    }

    /// Record the PTY spawned for a connection.
    pub fn set_terminal(&self, conn_id: &str, terminal_id: &str) {
        if let Some(mut entry) = self.inner.get_mut(conn_id) {
            entry.terminal_id = Some(terminal_id.to_string());
        }
    }

    /// Clear the PTY association after the shell exits.
    pub fn clear_terminal(&self, conn_id: &str) {
        if let Some(mut entry) = self.inner.get_mut(conn_id) {
            entry.terminal_id = None;
        }
    }

    pub fn remove(&self, conn_id: &str) {
        self.inner.remove(conn_id);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Number of connections that currently hold a PTY.
    pub fn active_terminals(&self) -> usize {
        self.inner
            .iter()
            .filter(|entry| entry.terminal_id.is_some())
            .count()
    }

    /// Ask every live connection to terminate. Each handler kills its own
    /// PTY on the way out.
    pub fn shutdown_all(&self) {
        let count = self.inner.len();
        if count > 0 {
            info!(sessions = count, "gateway: terminating live sessions");
        }
        for entry in self.inner.iter() {
            let _ = entry.shutdown.send(());
        }
    }
}

pub struct GatewayState {
    pub config: CodequestConfig,
    pub sessions: SessionRegistry,
}

impl GatewayState {
    pub fn new(config: CodequestConfig) -> Self {
        Self {
            config,
            sessions: SessionRegistry::default(),
        }
    }
}

/// Cloneable handle threaded through axum.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
}

impl AppState {
    pub fn new(config: CodequestConfig) -> Self {
        Self {
            gateway: Arc::new(GatewayState::new(config)),
        }
    }
}
