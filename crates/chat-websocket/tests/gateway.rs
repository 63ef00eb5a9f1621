//! End-to-end runs against a local gateway that behaves like the production
//! one: token in the query string, close code 1008 for a bad token, and
//! chat lines echoed back with a server timestamp.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use chat_core::{ChatEvent, ConnectionState, EventStream, RetryPolicy, WireEnvelope};
use chat_websocket::{RuntimeConfig, spawn_runtime};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::{net::TcpListener, task::JoinHandle, time::timeout};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{ErrorResponse, Request, Response},
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use url::Url;

const SECRET: &str = "s3cret-token";
const TIMESTAMP: &str = "2024-05-01T10:15:00Z";
const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Gateway {
    accepted: AtomicUsize,
    restart_first: bool,
    queries: Mutex<Vec<String>>,
}

async fn start_gateway(restart_first: bool) -> (Url, Arc<Gateway>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let gateway = Arc::new(Gateway {
        restart_first,
        ..Default::default()
    });

    let state = gateway.clone();
    let task = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let state = state.clone();
            tokio::spawn(async move {
                let _ = handle_client(stream, state).await;
            });
        }
    });

    let url = Url::parse(&format!("ws://{addr}/ws")).expect("gateway url");
    (url, gateway, task)
}

async fn handle_client(
    stream: tokio::net::TcpStream,
    gateway: Arc<Gateway>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let mut query = None;
    let mut ws = accept_hdr_async(
        stream,
        |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            query = req.uri().query().map(str::to_owned);
            Ok(resp)
        },
    )
    .await?;

    let query = query.unwrap_or_default();
    gateway
        .queries
        .lock()
        .expect("queries lock")
        .push(query.clone());
    let token = url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned());

    if token.as_deref() != Some(SECRET) {
        ws.close(Some(CloseFrame {
            code: CloseCode::Policy,
            reason: "Unauthorized".into(),
        }))
        .await?;
        while let Some(Ok(_)) = ws.next().await {}
        return Ok(());
    }

    let accepted = gateway.accepted.fetch_add(1, Ordering::SeqCst);
    if gateway.restart_first && accepted == 0 {
        ws.close(Some(CloseFrame {
            code: CloseCode::Error,
            reason: "restarting".into(),
        }))
        .await?;
        while let Some(Ok(_)) = ws.next().await {}
        return Ok(());
    }

    while let Some(message) = ws.next().await {
        match message? {
            Message::Text(text) => {
                let data: Value = match serde_json::from_str(text.as_str()) {
                    Ok(data) => data,
                    Err(_) => continue,
                };
                if data["type"] == "message" {
                    let reply = json!({
                        "type": "message",
                        "username": data["username"],
                        "text": data["text"],
                        "timestamp": TIMESTAMP,
                    });
                    ws.send(Message::Text(reply.to_string().into())).await?;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

fn config(endpoint: Url) -> RuntimeConfig {
    RuntimeConfig {
        retry: RetryPolicy::new(20, 100, 3),
        ..RuntimeConfig::new(endpoint)
    }
}

async fn next_event(events: &mut EventStream) -> ChatEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("event timeout")
        .expect("event receive")
}

async fn wait_for_state(events: &mut EventStream, expected: ConnectionState) {
    loop {
        if let ChatEvent::StatusChanged { state, .. } = next_event(events).await
            && state == expected
        {
            return;
        }
    }
}

#[tokio::test]
async fn chats_through_a_live_gateway() {
    let (endpoint, gateway, server) = start_gateway(false).await;
    let (handle, runtime) = spawn_runtime(config(endpoint));
    let mut events = handle.subscribe();

    handle.connect("alice", SECRET).await.expect("enqueue connect");
    wait_for_state(&mut events, ConnectionState::Connected).await;
    assert_eq!(
        gateway.queries.lock().expect("queries lock").as_slice(),
        &[format!("token={SECRET}")]
    );

    handle.send_message("hello <world>").await.expect("enqueue send");
    assert_eq!(
        next_event(&mut events).await,
        ChatEvent::Incoming(WireEnvelope::Chat {
            username: "alice".into(),
            text: "hello <world>".into(),
            timestamp: Some(json!(TIMESTAMP)),
        })
    );

    handle.shutdown().await.expect("enqueue shutdown");
    timeout(WAIT, runtime)
        .await
        .expect("runtime stops")
        .expect("runtime task");
    server.abort();
}

#[tokio::test]
async fn invalid_token_is_rejected_with_policy_close() {
    let (endpoint, gateway, server) = start_gateway(false).await;
    let (handle, _runtime) = spawn_runtime(config(endpoint));
    let mut events = handle.subscribe();

    handle
        .connect("mallory", "wrong-token")
        .await
        .expect("enqueue connect");
    wait_for_state(&mut events, ConnectionState::Failed).await;
    match next_event(&mut events).await {
        ChatEvent::Error {
            code,
            message,
            terminal,
        } => {
            assert_eq!(code, "auth_rejected");
            assert_eq!(message, "authentication failed: invalid token");
            assert!(terminal);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(gateway.queries.lock().expect("queries lock").len(), 1);
    server.abort();
}

#[tokio::test]
async fn reconnects_after_server_restart() {
    let (endpoint, gateway, server) = start_gateway(true).await;
    let (handle, _runtime) = spawn_runtime(config(endpoint));
    let mut events = handle.subscribe();

    handle.connect("alice", SECRET).await.expect("enqueue connect");
    wait_for_state(&mut events, ConnectionState::Connected).await;
    wait_for_state(&mut events, ConnectionState::ReconnectWaiting).await;
    wait_for_state(&mut events, ConnectionState::Connected).await;

    assert_eq!(gateway.accepted.load(Ordering::SeqCst), 2);
    server.abort();
}

#[tokio::test]
async fn gives_up_when_gateway_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let endpoint = Url::parse(&format!("ws://{addr}/ws")).expect("url");
    let (handle, _runtime) = spawn_runtime(config(endpoint));
    let mut events = handle.subscribe();

    handle.connect("alice", SECRET).await.expect("enqueue connect");
    wait_for_state(&mut events, ConnectionState::Failed).await;
    match next_event(&mut events).await {
        ChatEvent::Error { code, terminal, .. } => {
            assert_eq!(code, "retries_exhausted");
            assert!(terminal);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
