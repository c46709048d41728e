//! JSON-RPC over a real WebSocket connection

mod test_helpers;

use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;
use test_helpers::{WsClient, start, test_builder};

#[tokio::test]
async fn test_ping_pong() {
    let (builder, _) = test_builder();
    let (_server, running) = start(builder).await;
    let mut client = WsClient::connect(&running).await;

    client
        .send_text(r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":[]}"#)
        .await;
    assert_eq!(client.recv_text().await, r#"{"jsonrpc":"2.0","id":1,"result":"pong"}"#);

    client.close().await;
    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_params_and_ids_round_trip() {
    let (builder, _) = test_builder();
    let (_server, running) = start(builder).await;
    let mut client = WsClient::connect(&running).await;

    let positional = client.call(2, "echo", json!([1, "two", {"three": 3}])).await;
    assert_eq!(positional, json!({"jsonrpc": "2.0", "id": 2, "result": [1, "two", {"three": 3}]}));

    client
        .send_json(json!({"jsonrpc": "2.0", "id": "abc", "method": "echo", "params": {"k": "v"}}))
        .await;
    assert_eq!(
        client.recv_json().await,
        json!({"jsonrpc": "2.0", "id": "abc", "result": {"k": "v"}})
    );

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_protocol_errors() {
    let (builder, _) = test_builder();
    let (_server, running) = start(builder).await;
    let mut client = WsClient::connect(&running).await;

    client.send_text("sqwdw").await;
    assert_eq!(
        client.recv_text().await,
        r#"{"jsonrpc":"2.0","error":{"code":-32700,"message":"Parse Error"}}"#
    );

    client.send_text(r#"{"value": "my_value"}"#).await;
    assert_eq!(client.recv_json().await["error"]["code"], json!(-32600));

    client
        .send_text(r#"[{"jsonrpc":"2.0","id":1,"method":"ping","params":[]}]"#)
        .await;
    assert_eq!(client.recv_json().await["error"]["code"], json!(-32600));

    client
        .send_text(r#"{"jsonrpc":"2.0","id":4,"method":"ping","params":"nope"}"#)
        .await;
    let frame = client.recv_json().await;
    assert_eq!(frame["error"]["code"], json!(-32602));
    assert_eq!(frame["id"], json!(4));

    client.send_binary(vec![0x01, 0x02]).await;
    assert_eq!(client.recv_json().await["error"]["code"], json!(-32600));

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_method_not_found_cases() {
    let (builder, _) = test_builder();
    let (_server, running) = start(builder).await;
    let mut client = WsClient::connect(&running).await;

    for (id, method) in [(1, "missing"), (2, "_private"), (3, "http_only"), (4, "PING")] {
        let frame = client.call(id, method, json!([])).await;
        assert_eq!(
            frame,
            json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "Method Not Found"}}),
            "method {}",
            method
        );
    }

    assert_eq!(client.call(5, "ws_only", json!([])).await["result"], json!("ws"));

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_handler_errors_become_error_frames() {
    let (builder, _) = test_builder();
    let (_server, running) = start(builder).await;
    let mut client = WsClient::connect(&running).await;

    assert_eq!(
        client.call(1, "fail", json!([])).await,
        json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "boom", "data": ["boom"]}})
    );
    assert_eq!(
        client.call(2, "quota", json!({})).await,
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": -32010, "message": "quota exceeded", "data": {"limit": 10}}
        })
    );

    // the connection survives handler failures
    assert_eq!(client.call(3, "ping", json!([])).await["result"], json!("pong"));

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_notifications_get_no_reply() {
    let (builder, counter) = test_builder();
    let (_server, running) = start(builder).await;
    let mut client = WsClient::connect(&running).await;

    client
        .send_text(r#"{"jsonrpc":"2.0","method":"count","params":[]}"#)
        .await;
    client
        .send_text(r#"{"jsonrpc":"2.0","method":"explode","params":{}}"#)
        .await;
    client
        .send_text(r#"{"jsonrpc":"2.0","method":"unregistered","params":{}}"#)
        .await;
    assert!(client.recv_text_within(Duration::from_millis(300)).await.is_none());

    // an id-less message without params is answered like a call
    client.send_text(r#"{"jsonrpc":"2.0","method":"ping"}"#).await;
    assert_eq!(
        client.recv_json().await,
        json!({"jsonrpc": "2.0", "id": null, "result": "pong"})
    );
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_context_and_session_per_connection() {
    let (builder, _) = test_builder();
    let (_server, running) = start(builder).await;
    let mut first = WsClient::connect(&running).await;
    let mut second = WsClient::connect(&running).await;

    let me = first.call(1, "whoami", json!([])).await;
    let other = second.call(1, "whoami", json!([])).await;
    assert_eq!(me["result"]["transport"], json!("websocket"));
    assert_ne!(me["result"]["connection_id"], other["result"]["connection_id"]);

    assert_eq!(first.call(2, "remember", json!(["nick", "ada"])).await["result"], json!(null));
    assert_eq!(first.call(3, "remember", json!(["nick", "bob"])).await["result"], json!("ada"));
    assert_eq!(second.call(2, "remember", json!(["nick", "eve"])).await["result"], json!(null));

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_dispatch_can_reorder_responses() {
    let (builder, _) = test_builder();
    let (_server, running) = start(builder).await;
    let mut client = WsClient::connect(&running).await;

    client
        .send_json(json!({"jsonrpc": "2.0", "id": 1, "method": "slow", "params": [500, "slow"]}))
        .await;
    client
        .send_json(json!({"jsonrpc": "2.0", "id": 2, "method": "slow", "params": [0, "fast"]}))
        .await;

    assert_eq!(client.recv_json().await["id"], json!(2));
    assert_eq!(client.recv_json().await["id"], json!(1));

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_ordered_dispatch_keeps_request_order() {
    let (builder, _) = test_builder();
    let (_server, running) = start(builder.ordered_dispatch(true)).await;
    let mut client = WsClient::connect(&running).await;

    client
        .send_json(json!({"jsonrpc": "2.0", "id": 1, "method": "slow", "params": [300, "slow"]}))
        .await;
    client
        .send_json(json!({"jsonrpc": "2.0", "id": 2, "method": "slow", "params": [0, "fast"]}))
        .await;

    assert_eq!(client.recv_json().await["result"], json!("slow"));
    assert_eq!(client.recv_json().await["result"], json!("fast"));

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_connections() {
    let (builder, _) = test_builder();
    let (server, running) = start(builder).await;
    let mut client = WsClient::connect(&running).await;
    assert_eq!(client.call(1, "ping", json!([])).await["result"], json!("pong"));

    running.shutdown().await.unwrap();
    assert!(client.recv_text_within(Duration::from_secs(2)).await.is_none());

    // connection bookkeeping is released
    for _ in 0..50 {
        if server.channel_layer().connection_count().await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("connection was not unregistered after shutdown");
}
