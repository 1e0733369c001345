use {
    axum::{
        Router,
        extract::{
            State, WebSocketUpgrade,
            ws::rejection::WebSocketUpgradeRejection,
        },
        response::{IntoResponse, Json},
        routing::get,
    },
    tower_http::cors::{Any, CorsLayer},
    tracing::info,
};

use crate::{
    error::{Context, Result},
    exec::api_terminal_exec_handler,
    state::AppState,
    ws::handle_connection,
};

// ── Router construction ──────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route(
            codequest_protocol::TERMINAL_WS_PATH,
            get(terminal_handler).post(api_terminal_exec_handler),
        )
        .layer(cors)
        .with_state(state)
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Start the gateway HTTP + WebSocket server. Runs until the listener fails
/// or the task is aborted.
pub async fn start_gateway(state: AppState) -> Result<()> {
    let bind = format!(
        "{}:{}",
        state.gateway.config.gateway.bind, state.gateway.config.gateway.port
    );
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(addr = %bind, "gateway: listening");
    axum::serve(listener, build_app(state)).await?;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "ok": true,
        "sessions": state.gateway.sessions.len(),
        "terminals": state.gateway.sessions.active_terminals(),
    }))
}

/// `GET /api/terminal` serves both the WebSocket upgrade and, for plain HTTP
/// requests, a readiness probe.
async fn terminal_handler(
    ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match ws {
        Ok(upgrade) => upgrade
            .on_upgrade(move |socket| handle_connection(socket, state))
            .into_response(),
        Err(_) => Json(serde_json::json!({
            "ok": true,
            "endpoint": codequest_protocol::TERMINAL_WS_PATH,
            "protocol": "websocket",
        }))
        .into_response(),
    }
}
