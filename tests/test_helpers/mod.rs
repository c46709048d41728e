//! Test Helpers Module for JSON-RPC channels integration tests
//!
//! Starts servers on ephemeral loopback ports and provides a small
//! WebSocket client that speaks JSON frames.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use turul_channels_json_rpc::prelude::*;
use turul_channels_server::{JsonRpcServer, JsonRpcServerBuilder, RunningServer};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

#[derive(Debug, thiserror::Error)]
#[error("boom")]
pub struct Boom;

#[derive(Debug, Deserialize)]
struct RoomParams {
    room: String,
}

async fn join(args: CallArgs) -> HandlerResult {
    let RoomParams { room } = args.bind()?;
    let context = args.require_context()?;
    context.join_group(&room).await?;
    Ok(json!({"room": room, "connection_id": context.connection_id()}))
}

async fn leave(args: CallArgs) -> HandlerResult {
    let RoomParams { room } = args.bind()?;
    args.require_context()?.leave_group(&room).await?;
    Ok(json!({"room": room}))
}

async fn whoami(args: CallArgs) -> HandlerResult {
    let context = args.require_context()?;
    Ok(json!({
        "connection_id": context.connection_id(),
        "transport": context.transport().as_str(),
    }))
}

async fn slow(args: CallArgs) -> HandlerResult {
    let (delay_ms, label): (u64, String) = args.bind()?;
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    Ok(json!(label))
}

async fn remember(args: CallArgs) -> HandlerResult {
    let (key, value): (String, Value) = args.bind()?;
    let previous = args.require_context()?.session().insert(key, value);
    Ok(previous.unwrap_or(Value::Null))
}

/// Builder with the methods every integration test relies on. The returned
/// counter is bumped by the `count` notification.
pub fn test_builder() -> (JsonRpcServerBuilder, Arc<AtomicUsize>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let hits = Arc::clone(&counter);

    let builder = JsonRpcServer::builder()
        .websocket_address(loopback())
        .http_address(loopback())
        .call(MethodEntry::new(
            "ping",
            sync_handler(|args: CallArgs| {
                args.expect_no_params()?;
                Ok(json!("pong"))
            }),
        ))
        .call(MethodEntry::new(
            "echo",
            sync_handler(|args: CallArgs| Ok(args.params().to_value())),
        ))
        .call(MethodEntry::new("slow", handler_fn(slow)))
        .call(MethodEntry::new(
            "fail",
            sync_handler(|_args: CallArgs| Err(Boom.into())),
        ))
        .call(MethodEntry::new(
            "quota",
            sync_handler(|_args: CallArgs| {
                Err(ApplicationError::new(-32010)
                    .with_message("quota exceeded")
                    .with_data(json!({"limit": 10}))
                    .into())
            }),
        ))
        .call(MethodEntry::new("whoami", handler_fn(whoami)).with_context())
        .call(MethodEntry::new("remember", handler_fn(remember)).with_context())
        .call(MethodEntry::new("join", handler_fn(join)).http(false).with_context())
        .call(MethodEntry::new("leave", handler_fn(leave)).http(false).with_context())
        .call(MethodEntry::new(
            "ws_only",
            sync_handler(|_args: CallArgs| Ok(json!("ws"))),
        )
        .http(false))
        .call(MethodEntry::new(
            "http_only",
            sync_handler(|_args: CallArgs| Ok(json!("http"))),
        )
        .websocket(false))
        .notification(MethodEntry::new(
            "count",
            sync_handler(move |_args: CallArgs| {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            }),
        ))
        .notification(MethodEntry::new(
            "explode",
            sync_handler(|_args: CallArgs| Err(Boom.into())),
        ));

    (builder, counter)
}

pub async fn start(builder: JsonRpcServerBuilder) -> (JsonRpcServer, RunningServer) {
    let server = builder.build().expect("valid server config");
    let running = server.start().await.expect("server starts");
    (server, running)
}

pub fn http_url(running: &RunningServer) -> String {
    format!("http://{}/", running.http_addr().expect("HTTP enabled"))
}

/// JSON-over-WebSocket test client
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn connect(running: &RunningServer) -> Self {
        let addr = running.websocket_addr().expect("WebSocket enabled");
        let (stream, _response) = connect_async(format!("ws://{}", addr))
            .await
            .expect("WebSocket handshake");
        Self { stream }
    }

    pub async fn send_text(&mut self, text: &str) {
        self.stream
            .send(Message::text(text.to_string()))
            .await
            .expect("send text frame");
    }

    pub async fn send_binary(&mut self, bytes: Vec<u8>) {
        self.stream
            .send(Message::binary(bytes))
            .await
            .expect("send binary frame");
    }

    pub async fn send_json(&mut self, value: Value) {
        self.send_text(&value.to_string()).await;
    }

    /// Next text frame, as raw text. `None` when nothing arrives in time.
    pub async fn recv_text_within(&mut self, wait: Duration) -> Option<String> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let next = tokio::time::timeout_at(deadline, self.stream.next()).await.ok()??;
            // a reset after the close handshake counts as closed
            match next.ok()? {
                Message::Text(text) => return Some(text.as_str().to_owned()),
                Message::Close(_) => return None,
                _ => continue,
            }
        }
    }

    pub async fn recv_text(&mut self) -> String {
        self.recv_text_within(RECV_TIMEOUT)
            .await
            .expect("frame before timeout")
    }

    pub async fn recv_json(&mut self) -> Value {
        serde_json::from_str(&self.recv_text().await).expect("JSON frame")
    }

    pub async fn recv_json_within(&mut self, wait: Duration) -> Option<Value> {
        self.recv_text_within(wait)
            .await
            .map(|text| serde_json::from_str(&text).expect("JSON frame"))
    }

    /// Send a call and wait for the next frame.
    pub async fn call(&mut self, id: i64, method: &str, params: Value) -> Value {
        self.send_json(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await;
        self.recv_json().await
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
