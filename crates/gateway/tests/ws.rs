#![allow(clippy::unwrap_used, clippy::expect_used)]
//! WebSocket integration tests against a real listener.

use std::{net::SocketAddr, time::Duration};

use {
    codequest_config::{CodequestConfig, GatewayConfig, HeartbeatConfig},
    codequest_gateway::{AppState, build_app},
    futures::{SinkExt, StreamExt},
    serde_json::Value,
    tokio_tungstenite::{
        MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
    },
};

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

fn test_config() -> CodequestConfig {
    CodequestConfig {
        gateway: GatewayConfig {
            shell: Some("/bin/sh".into()),
            ..GatewayConfig::default()
        },
        ..CodequestConfig::default()
    }
}

async fn spawn_gateway(config: CodequestConfig) -> (SocketAddr, AppState) {
    let state = AppState::new(config);
    let app = build_app(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{addr}/api/terminal"))
        .await
        .unwrap();
    ws
}

/// Read text frames until one parses as JSON with the given `type` tag.
/// Binary frames (PTY output) are skipped.
async fn next_control(ws: &mut WsClient, expected: &str) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(msg) = ws.next().await {
            if let Ok(Message::Text(text)) = msg
                && let Ok(value) = serde_json::from_str::<Value>(&text)
                && value["type"] == expected
            {
                return value;
            }
        }
        panic!("socket closed while waiting for {expected:?} frame");
    })
    .await;
    frame.unwrap_or_else(|_| panic!("timed out waiting for {expected:?} frame"))
}

async fn send_json(ws: &mut WsClient, json: &str) {
    ws.send(Message::Text(json.into())).await.unwrap();
}

#[tokio::test]
async fn pty_spawn_is_lazy() {
    let (addr, state) = spawn_gateway(test_config()).await;
    let mut ws = connect(addr).await;

    // Merely opening the socket must not allocate a shell.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(state.gateway.sessions.len(), 1);
    assert_eq!(state.gateway.sessions.active_terminals(), 0);

    // The first shell-requiring message triggers the spawn.
    send_json(&mut ws, r#"{"type":"init"}"#).await;
    let connected = next_control(&mut ws, "connected").await;
    assert!(connected["terminalId"].is_string());
    assert_eq!(state.gateway.sessions.active_terminals(), 1);
}

#[tokio::test]
async fn liveness_ping_does_not_spawn() {
    let (addr, state) = spawn_gateway(test_config()).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, r#"{"type":"ping","time":7}"#).await;
    let pong = next_control(&mut ws, "pong").await;
    assert_eq!(pong["time"], 7);
    assert_eq!(state.gateway.sessions.active_terminals(), 0);
}

#[tokio::test]
async fn resize_is_applied_and_invalid_sizes_are_ignored() {
    let (addr, _state) = spawn_gateway(test_config()).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, r#"{"type":"init"}"#).await;
    next_control(&mut ws, "connected").await;

    // Invalid dimensions must be dropped without killing the session.
    send_json(&mut ws, r#"{"type":"resize","cols":0,"rows":24}"#).await;
    send_json(&mut ws, r#"{"type":"resize","cols":80,"rows":-1}"#).await;
    send_json(&mut ws, r#"{"type":"resize","cols":100,"rows":40}"#).await;
    send_json(&mut ws, r#"{"type":"input","data":"stty size\r"}"#).await;

    let observed = tokio::time::timeout(Duration::from_secs(10), async {
        let mut collected = Vec::new();
        while let Some(msg) = ws.next().await {
            if let Ok(Message::Binary(data)) = msg {
                collected.extend_from_slice(&data);
                if String::from_utf8_lossy(&collected).contains("40 100") {
                    return;
                }
            }
        }
        panic!("socket closed before stty output arrived");
    })
    .await;
    assert!(observed.is_ok(), "PTY never reported the resized viewport");
}

#[tokio::test]
async fn silent_peer_is_evicted_after_grace() {
    let mut config = test_config();
    config.heartbeat = HeartbeatConfig {
        interval: Duration::from_millis(150),
    };
    let (addr, _state) = spawn_gateway(config).await;
    let mut ws = connect(addr).await;

    // Never answer the server's pings; the sweep must close the socket
    // after two silent intervals.
    let closed = tokio::time::timeout(Duration::from_secs(3), async {
        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => return,
                _ => {},
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "silent peer was never evicted");
}

#[tokio::test]
async fn responsive_peer_survives_the_sweep() {
    let mut config = test_config();
    config.heartbeat = HeartbeatConfig {
        interval: Duration::from_millis(150),
    };
    let (addr, state) = spawn_gateway(config).await;
    let mut ws = connect(addr).await;

    // Answer every server ping for six intervals.
    let deadline = tokio::time::Instant::now() + Duration::from_millis(900);
    while tokio::time::Instant::now() < deadline {
        let msg = tokio::time::timeout_at(deadline, ws.next()).await;
        let Ok(Some(Ok(Message::Text(text)))) = msg else {
            continue;
        };
        if let Ok(value) = serde_json::from_str::<Value>(&text)
            && value["type"] == "ping"
        {
            let time = value["time"].as_u64().unwrap_or_default();
            send_json(&mut ws, &format!(r#"{{"type":"pong","time":{time}}}"#)).await;
        }
    }

    assert_eq!(state.gateway.sessions.len(), 1, "live peer was evicted");
}

#[tokio::test]
async fn command_frames_reach_the_shell_unscreened() {
    let (addr, _state) = spawn_gateway(test_config()).await;
    let mut ws = connect(addr).await;

    // `command` is a convenience wrapper around stdin; the gateway writes
    // the line through without consulting the whitelist (that screening
    // belongs to the REST path).
    send_json(&mut ws, r#"{"type":"command","command":"echo cmd-check-77"}"#).await;
    next_control(&mut ws, "connected").await;

    let echoed = tokio::time::timeout(Duration::from_secs(10), async {
        let mut collected = Vec::new();
        while let Some(msg) = ws.next().await {
            if let Ok(Message::Binary(data)) = msg {
                collected.extend_from_slice(&data);
                if String::from_utf8_lossy(&collected).contains("cmd-check-77") {
                    return;
                }
            }
        }
        panic!("socket closed before the command output arrived");
    })
    .await;
    assert!(echoed.is_ok(), "command line never reached the shell");
}

#[tokio::test]
async fn malformed_frames_are_dropped_not_fatal() {
    let (addr, _state) = spawn_gateway(test_config()).await;
    let mut ws = connect(addr).await;

    ws.send(Message::Text("not json at all".into())).await.unwrap();
    send_json(&mut ws, r#"{"type":"self_destruct"}"#).await;

    // The connection is still alive and serving.
    send_json(&mut ws, r#"{"type":"ping","time":1}"#).await;
    let pong = next_control(&mut ws, "pong").await;
    assert_eq!(pong["time"], 1);
}

#[tokio::test]
async fn shell_exit_leaves_the_socket_open_and_respawns() {
    let (addr, state) = spawn_gateway(test_config()).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, r#"{"type":"init"}"#).await;
    let first = next_control(&mut ws, "connected").await;

    send_json(&mut ws, r#"{"type":"input","data":"exit\r"}"#).await;
    next_control(&mut ws, "exit").await;
    assert_eq!(state.gateway.sessions.active_terminals(), 0);

    // Socket is still usable; the next input brings up a fresh shell.
    send_json(&mut ws, r#"{"type":"input","data":"ls\r"}"#).await;
    let second = next_control(&mut ws, "connected").await;
    assert_ne!(first["terminalId"], second["terminalId"]);
    assert_eq!(state.gateway.sessions.active_terminals(), 1);
}

#[tokio::test]
async fn socket_close_kills_the_pty() {
    let (addr, state) = spawn_gateway(test_config()).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, r#"{"type":"init"}"#).await;
    next_control(&mut ws, "connected").await;
    assert_eq!(state.gateway.sessions.len(), 1);

    ws.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(state.gateway.sessions.len(), 0);
}
