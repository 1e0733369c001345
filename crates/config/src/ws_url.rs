//! Resolution of the client-facing terminal WebSocket URL.
//!
//! The override accepts three forms:
//!
//! - bare host (`terminal.example.com:4000`)
//! - scheme-qualified URL without a path (`https://terminal.example.com`)
//! - full URL with a path (`wss://example.com/custom/ws`)
//!
//! The default endpoint path is appended only when the supplied value has no
//! path component. `http`/`https` schemes are rewritten to `ws`/`wss`.

use tracing::debug;

/// Path the gateway serves the terminal WebSocket on.
pub const DEFAULT_WS_PATH: &str = "/api/terminal";

/// Resolve the terminal WebSocket URL from an optional override.
///
/// `secure` selects `wss` over `ws` for forms that carry no scheme of their
/// own. With no override, the result is `{scheme}://{default_host}/api/terminal`.
pub fn resolve_ws_url(configured: Option<&str>, default_host: &str, secure: bool) -> String {
    let scheme = if secure { "wss" } else { "ws" };

    let Some(configured) = configured.map(str::trim).filter(|v| !v.is_empty()) else {
        return format!("{scheme}://{default_host}{DEFAULT_WS_PATH}");
    };

    // Rewrite HTTP schemes to their WebSocket equivalents.
    let url = if let Some(rest) = configured.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = configured.strip_prefix("https://") {
        format!("wss://{rest}")
    } else {
        configured.to_string()
    };

    if let Some(rest) = url
        .strip_prefix("ws://")
        .or_else(|| url.strip_prefix("wss://"))
    {
        // Scheme-qualified: append the default path only when the authority
        // is bare.
        let has_path = rest.contains('/');
        let resolved = if has_path {
            url
        } else {
            format!("{url}{DEFAULT_WS_PATH}")
        };
        debug!(url = %resolved, "resolved scheme-qualified terminal ws url");
        return resolved;
    }

    // Bare host form, optionally with a leading `//` or its own path.
    let without_slashes = url.trim_start_matches('/');
    let has_path = without_slashes.contains('/');
    let resolved = if has_path {
        format!("{scheme}://{without_slashes}")
    } else {
        format!("{scheme}://{without_slashes}{DEFAULT_WS_PATH}")
    };
    debug!(url = %resolved, "resolved bare-host terminal ws url");
    resolved
}
