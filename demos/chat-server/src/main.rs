//! # Chat Server
//!
//! Rooms over WebSocket, with the read-only methods also reachable through
//! the HTTP bridge. Every connection joins the `lobby` group and receives a
//! periodic `server.tick` notification.
//!
//! ## Usage
//! ```bash
//! cargo run --package chat-server -- --ws-port 8000 --http-port 8001
//! ```
//!
//! ```bash
//! curl -X POST http://127.0.0.1:8001/ \
//!   -d '{"jsonrpc":"2.0","id":1,"method":"ping","params":[]}'
//! ```
//!
//! Over WebSocket:
//! ```text
//! > {"jsonrpc":"2.0","id":1,"method":"chat.join","params":{"room":"room1"}}
//! > {"jsonrpc":"2.0","id":2,"method":"chat.send","params":{"room":"room1","text":"hi"}}
//! < {"jsonrpc":"2.0","method":"chat.message","params":{"room":"room1","from":"anonymous","text":"hi"}}
//! ```

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turul_channels_json_rpc::FrameCodec;
use turul_channels_json_rpc::prelude::*;
use turul_channels_server::JsonRpcServer;

const LOBBY: &str = "lobby";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind both listeners to
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// WebSocket port
    #[arg(long, default_value = "8000")]
    ws_port: u16,

    /// HTTP port
    #[arg(long, default_value = "8001")]
    http_port: u16,

    /// Answer WebSocket messages strictly in arrival order
    #[arg(long, default_value = "false")]
    ordered: bool,

    /// Seconds between lobby ticks, 0 disables them
    #[arg(long, default_value = "30")]
    tick_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct RoomParams {
    room: String,
}

#[derive(Debug, Deserialize)]
struct SendParams {
    room: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct NickParams {
    name: String,
}

fn nickname(context: &ConnectionContext) -> String {
    context
        .session()
        .get("nickname")
        .and_then(|value| value.as_str().map(str::to_owned))
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Notifier on the connection's channel layer, encoding with the server's codec.
fn notifier_for(context: &ConnectionContext, codec: &FrameCodec) -> Result<Notifier, HandlerError> {
    let layer = context
        .channel_layer()
        .cloned()
        .ok_or_else(|| HandlerError::msg("connection cannot receive notifications"))?;
    Ok(Notifier::with_codec(layer, codec.clone()))
}

async fn join(args: CallArgs) -> HandlerResult {
    let RoomParams { room } = args.bind()?;
    let context = args.require_context()?;
    context.join_group(&room).await?;
    info!(room, connection_id = context.connection_id(), "joined room");
    Ok(json!({"room": room, "connection_id": context.connection_id()}))
}

async fn leave(args: CallArgs) -> HandlerResult {
    let RoomParams { room } = args.bind()?;
    args.require_context()?.leave_group(&room).await?;
    Ok(json!({"room": room}))
}

async fn send(args: CallArgs, codec: FrameCodec) -> HandlerResult {
    let SendParams { room, text } = args.bind()?;
    if text.trim().is_empty() {
        return Err(ApplicationError::new(-32001)
            .with_message("empty message")
            .with_data(json!({"room": room}))
            .into());
    }

    let context = args.require_context()?;
    let delivered = notifier_for(context, &codec)?
        .notify_group(
            &room,
            "chat.message",
            json!({"room": room, "from": nickname(context), "text": text}),
        )
        .await?;
    Ok(json!({"delivered": delivered}))
}

async fn nick(args: CallArgs) -> HandlerResult {
    let NickParams { name } = args.bind()?;
    let previous = args
        .require_context()?
        .session()
        .insert("nickname", Value::String(name.clone()));
    Ok(json!({"name": name, "previous": previous}))
}

async fn typing(args: CallArgs, codec: FrameCodec) -> HandlerResult {
    let RoomParams { room } = args.bind()?;
    let context = args.require_context()?;
    notifier_for(context, &codec)?
        .notify_group(&room, "chat.typing", json!({"room": room, "from": nickname(context)}))
        .await?;
    Ok(Value::Null)
}

fn server(args: &Args, codec: FrameCodec) -> turul_channels_server::Result<JsonRpcServer> {
    let send_codec = codec.clone();
    let typing_codec = codec.clone();

    JsonRpcServer::builder()
        .codec(codec)
        .websocket_address(SocketAddr::new(args.host, args.ws_port))
        .http_address(SocketAddr::new(args.host, args.http_port))
        .ordered_dispatch(args.ordered)
        .connection_group(LOBBY)
        .call(MethodEntry::new(
            "ping",
            sync_handler(|args: CallArgs| {
                args.expect_no_params()?;
                Ok(json!("pong"))
            }),
        ))
        .call(MethodEntry::new(
            "time.now",
            sync_handler(|_args: CallArgs| Ok(json!(chrono::Utc::now().to_rfc3339()))),
        ))
        .call(MethodEntry::new("chat.join", handler_fn(join)).http(false).with_context())
        .call(MethodEntry::new("chat.leave", handler_fn(leave)).http(false).with_context())
        .call(
            MethodEntry::new(
                "chat.send",
                handler_fn(move |args| send(args, send_codec.clone())),
            )
            .http(false)
            .with_context(),
        )
        .call(MethodEntry::new("chat.nick", handler_fn(nick)).http(false).with_context())
        .notification(
            MethodEntry::new(
                "chat.typing",
                handler_fn(move |args| typing(args, typing_codec.clone())),
            )
            .http(false)
            .with_context(),
        )
        .build()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let running = server(&args, FrameCodec::new())?.start().await?;
    info!(
        websocket = ?running.websocket_addr(),
        http = ?running.http_addr(),
        "chat server ready"
    );

    if args.tick_seconds > 0 {
        let notifier = running.notifier().clone();
        let period = Duration::from_secs(args.tick_seconds);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let now = chrono::Utc::now().to_rfc3339();
                if let Err(err) = notifier.notify_group(LOBBY, "server.tick", json!({"time": now})).await {
                    warn!("Failed to send tick: {}", err);
                }
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    running.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use turul_channels_json_rpc::CodecError;
    use turul_channels_server::InMemoryChannelLayer;

    #[tokio::test]
    async fn test_pushed_frames_use_the_server_codec() {
        let codec = FrameCodec::with_encoder(|value: Value| -> Result<Value, CodecError> {
            match value {
                Value::Object(mut map) => {
                    map.insert("encoded".to_string(), json!(true));
                    Ok(Value::Object(map))
                }
                other => Ok(other),
            }
        });

        let layer = Arc::new(InMemoryChannelLayer::new());
        let mut outbox = layer.register("c1").await;
        let shared: Arc<dyn ChannelLayer> = layer.clone();
        let context = ConnectionContext::new(Transport::WebSocket)
            .with_connection_id("c1")
            .with_channel_layer(shared);
        context.join_group("room1").await.unwrap();

        let params = RequestParams::from_value(json!({"room": "room1", "text": "hi"})).unwrap();
        let result = send(CallArgs::new(params, Some(context)), codec).await.unwrap();
        assert_eq!(result, json!({"delivered": 1}));

        let frame: Value = serde_json::from_str(&outbox.recv().await.unwrap()).unwrap();
        assert_eq!(frame["method"], json!("chat.message"));
        assert_eq!(frame["params"]["text"], json!("hi"));
        assert_eq!(frame["params"]["encoded"], json!(true));
    }

    #[tokio::test]
    async fn test_empty_message_is_declared_error() {
        let params = RequestParams::from_value(json!({"room": "room1", "text": "  "})).unwrap();
        let err = send(CallArgs::new(params, None), FrameCodec::new()).await.unwrap_err();
        assert_eq!(err.to_error_object().code, -32001);
    }
}
