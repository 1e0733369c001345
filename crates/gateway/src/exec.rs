//! REST fallback for environments that cannot hold a WebSocket open.
//!
//! Commands are validated against the same sandbox policy as the live
//! stream, then answered from the canned simulator instead of a PTY.

use {
    axum::{
        http::StatusCode,
        response::{IntoResponse, Json},
    },
    codequest_sandbox::{simulate, validate},
    serde::Deserialize,
    tracing::debug,
};

#[derive(Debug, Deserialize)]
pub struct ExecRequest {
    pub command: String,
}

pub async fn api_terminal_exec_handler(Json(body): Json<ExecRequest>) -> impl IntoResponse {
    let verdict = validate(&body.command);
    if !verdict.allowed {
        let reason = verdict
            .reason
            .unwrap_or_else(|| "command not allowed".into());
        debug!(command = %body.command, reason = %reason, "exec: denied");
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": reason })),
        )
            .into_response();
    }

    let line = verdict.sanitized_command.unwrap_or(body.command);
    let mut response = serde_json::json!({ "output": simulate(&line) });
    if let Some(warning) = verdict.warning
        && let Some(map) = response.as_object_mut()
    {
        map.insert("warning".into(), serde_json::Value::String(warning));
    }
    Json(response).into_response()
}
