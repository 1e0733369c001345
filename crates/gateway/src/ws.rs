//! Per-connection WebSocket handler.
//!
//! Each connection walks a small state machine: open with no PTY, PTY
//! running, PTY exited (socket stays open, a later shell-requiring message
//! respawns), socket closed (PTY killed unconditionally). The heartbeat
//! sweep terminates peers that stay silent for two intervals.

use std::time::Instant;

use {
    axum::extract::ws::{Message, Utf8Bytes, WebSocket},
    codequest_protocol::{ClientMessage, MAX_CONTROL_FRAME_BYTES, ServerMessage, epoch_millis},
    futures::{SinkExt, StreamExt, stream::SplitSink},
    tracing::{debug, info, warn},
};

use crate::{
    state::AppState,
    terminal::{OutputEvent, PtyRuntime, spawn_runtime},
};

async fn send_control(sink: &mut SplitSink<WebSocket, Message>, message: &ServerMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(json) => sink
            .send(Message::Text(Utf8Bytes::from(json)))
            .await
            .is_ok(),
        Err(err) => {
            warn!(error = %err, "ws: failed to serialize control frame");
            false
        },
    }
}

/// Spawn a PTY for this connection and announce it. Returns `None` when the
/// spawn fails, after notifying the client; the caller closes the socket.
async fn bring_up_pty(
    sink: &mut SplitSink<WebSocket, Message>,
    state: &AppState,
    conn_id: &str,
) -> Option<(PtyRuntime, String)> {
    let config = &state.gateway.config.gateway;
    match spawn_runtime(config, config.cols, config.rows) {
        Ok(runtime) => {
            let terminal_id = uuid::Uuid::new_v4().to_string();
            state.gateway.sessions.set_terminal(conn_id, &terminal_id);
            info!(conn_id = %conn_id, terminal_id = %terminal_id, "ws: PTY spawned");
            send_control(
                sink,
                &ServerMessage::Connected {
                    terminal_id: terminal_id.clone(),
                },
            )
            .await;
            Some((runtime, terminal_id))
        },
        Err(err) => {
            warn!(conn_id = %conn_id, error = %err, "ws: PTY spawn failed");
            let _ = send_control(sink, &ServerMessage::Error { message: err }).await;
            None
        },
    }
}

pub async fn handle_connection(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "ws: new terminal connection");

    let mut shutdown_rx = state.gateway.sessions.register(&conn_id);
    let (mut sink, mut reader) = socket.split();

    let mut runtime: Option<PtyRuntime> = None;
    let mut last_seen = Instant::now();

    let heartbeat = &state.gateway.config.heartbeat;
    let grace = heartbeat.grace();
    let mut sweep = tokio::time::interval(heartbeat.interval);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    sweep.tick().await; // the first tick fires immediately

    loop {
        tokio::select! {
            event = async {
                match runtime.as_mut() {
                    Some(rt) => rt.output_rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                match event {
                    Some(OutputEvent::Output(data)) => {
                        if sink.send(Message::Binary(data.into())).await.is_err() {
                            break;
                        }
                    },
                    Some(OutputEvent::Error(err)) => {
                        if !send_control(&mut sink, &ServerMessage::Error { message: err }).await {
                            break;
                        }
                    },
                    Some(OutputEvent::Closed) | None => {
                        let exit_code = runtime.as_mut().and_then(PtyRuntime::exit_code);
                        info!(conn_id = %conn_id, exit_code, "ws: shell exited");
                        runtime = None;
                        state.gateway.sessions.clear_terminal(&conn_id);
                        // Socket stays open; the next shell-requiring
                        // message respawns the PTY.
                        if !send_control(
                            &mut sink,
                            &ServerMessage::Exit { exit_code, signal: None },
                        )
                        .await
                        {
                            break;
                        }
                    },
                }
            },
            maybe_msg = reader.next() => {
                let Some(Ok(msg)) = maybe_msg else {
                    break;
                };
                last_seen = Instant::now();

                let text = match msg {
                    Message::Text(text) => text,
                    Message::Ping(_) | Message::Pong(_) => continue, // axum answers pings itself
                    Message::Close(_) => break,
                    Message::Binary(_) => {
                        debug!(conn_id = %conn_id, "ws: unexpected binary frame dropped");
                        continue;
                    },
                };

                if text.len() > MAX_CONTROL_FRAME_BYTES {
                    warn!(conn_id = %conn_id, bytes = text.len(), "ws: oversized control frame dropped");
                    continue;
                }

                let parsed = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        warn!(conn_id = %conn_id, error = %err, "ws: malformed control frame dropped");
                        continue;
                    },
                };

                if parsed.requires_pty() && runtime.is_none() {
                    match bring_up_pty(&mut sink, &state, &conn_id).await {
                        Some((rt, _terminal_id)) => runtime = Some(rt),
                        None => break,
                    }
                }

                match parsed {
                    ClientMessage::Init => {},
                    ClientMessage::Ping { time } => {
                        if !send_control(&mut sink, &ServerMessage::Pong { time }).await {
                            break;
                        }
                    },
                    ClientMessage::Pong { .. } => {},
                    ClientMessage::Input { data } => {
                        if data.is_empty() {
                            continue;
                        }
                        if let Some(rt) = runtime.as_mut()
                            && let Err(err) = rt.write_input(&data)
                        {
                            if !send_control(&mut sink, &ServerMessage::Error { message: err }).await {
                                break;
                            }
                        }
                    },
                    ClientMessage::Resize { cols, rows } => {
                        match ClientMessage::valid_resize(cols, rows) {
                            Some((cols, rows)) => {
                                if let Some(rt) = runtime.as_ref()
                                    && let Err(err) = rt.resize(cols, rows)
                                {
                                    if !send_control(&mut sink, &ServerMessage::Error { message: err }).await {
                                        break;
                                    }
                                }
                            },
                            None => {
                                debug!(conn_id = %conn_id, cols, rows, "ws: invalid resize ignored");
                            },
                        }
                    },
                    ClientMessage::Command { command } => {
                        // Convenience form of `input`: the line goes to the
                        // shell as typed. Policy screening lives on the REST
                        // path, not here.
                        if let Some(rt) = runtime.as_mut()
                            && let Err(err) = rt.write_input(&format!("{command}\n"))
                        {
                            if !send_control(&mut sink, &ServerMessage::Error { message: err }).await {
                                break;
                            }
                        }
                    },
                }
            },
            _ = sweep.tick() => {
                if last_seen.elapsed() > grace {
                    info!(conn_id = %conn_id, "ws: peer silent past grace, terminating");
                    break;
                }
                if !send_control(&mut sink, &ServerMessage::Ping { time: epoch_millis() }).await {
                    break;
                }
            },
            _ = shutdown_rx.recv() => {
                info!(conn_id = %conn_id, "ws: shutdown requested");
                break;
            },
        }
    }

    // Socket gone (or shutting down): the PTY dies with it.
    if let Some(mut rt) = runtime.take() {
        rt.kill();
    }
    state.gateway.sessions.remove(&conn_id);
    info!(conn_id = %conn_id, "ws: terminal connection closed");
}
