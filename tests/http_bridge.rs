//! JSON-RPC over the HTTP POST bridge

mod test_helpers;

use std::sync::atomic::Ordering;

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use test_helpers::{http_url, start, test_builder};

async fn post(client: &Client, url: &str, body: &str) -> (StatusCode, Option<String>, String) {
    let response = client
        .post(url)
        .header("Content-Type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .map(|value| value.to_str().unwrap().to_string());
    (status, content_type, response.text().await.unwrap())
}

#[tokio::test]
async fn test_call_over_http() {
    let (builder, _) = test_builder();
    let (_server, running) = start(builder).await;
    let client = Client::new();
    let url = http_url(&running);

    let (status, content_type, body) = post(
        &client,
        &url,
        r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":[]}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json-rpc"));
    assert_eq!(body, r#"{"jsonrpc":"2.0","id":1,"result":"pong"}"#);

    let (status, _, body) = post(
        &client,
        &url,
        r#"{"jsonrpc":"2.0","id":2,"method":"whoami","params":{}}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let frame: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(frame["result"]["transport"], json!("http"));

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_status_codes() {
    let (builder, _) = test_builder();
    let (_server, running) = start(builder).await;
    let client = Client::new();
    let url = http_url(&running);

    let cases = [
        ("sqwdw", StatusCode::INTERNAL_SERVER_ERROR, -32700),
        (r#"{"value": "my_value"}"#, StatusCode::BAD_REQUEST, -32600),
        (r#"["value", "my_value"]"#, StatusCode::BAD_REQUEST, -32600),
        (r#"{"jsonrpc":"2.0","id":1,"method":"missing","params":[]}"#, StatusCode::NOT_FOUND, -32601),
        (r#"{"jsonrpc":"2.0","id":1,"method":"ws_only","params":[]}"#, StatusCode::NOT_FOUND, -32601),
        (r#"{"jsonrpc":"2.0","id":1,"method":"join","params":{"room":"r"}}"#, StatusCode::NOT_FOUND, -32601),
        (r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":5}"#, StatusCode::INTERNAL_SERVER_ERROR, -32602),
        (r#"{"jsonrpc":"2.0","id":1,"method":"fail","params":[]}"#, StatusCode::INTERNAL_SERVER_ERROR, -32000),
        (r#"{"jsonrpc":"2.0","id":1,"method":"quota","params":[]}"#, StatusCode::INTERNAL_SERVER_ERROR, -32010),
    ];

    for (payload, expected_status, expected_code) in cases {
        let (status, content_type, body) = post(&client, &url, payload).await;
        assert_eq!(status, expected_status, "payload {}", payload);
        assert_eq!(content_type.as_deref(), Some("application/json-rpc"));
        let frame: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(frame["error"]["code"], json!(expected_code), "payload {}", payload);
    }

    let (status, _, body) = post(
        &client,
        &url,
        r#"{"jsonrpc":"2.0","id":1,"method":"http_only","params":[]}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""result":"http""#));

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_notification_returns_no_content() {
    let (builder, counter) = test_builder();
    let (_server, running) = start(builder).await;
    let client = Client::new();
    let url = http_url(&running);

    for payload in [
        r#"{"jsonrpc":"2.0","method":"count","params":[]}"#,
        r#"{"jsonrpc":"2.0","method":"explode","params":[]}"#,
        r#"{"jsonrpc":"2.0","method":"unregistered","params":{}}"#,
    ] {
        let (status, _, body) = post(&client, &url, payload).await;
        assert_eq!(status, StatusCode::NO_CONTENT, "payload {}", payload);
        assert!(body.is_empty());
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_non_post_requests_are_invalid() {
    let (builder, _) = test_builder();
    let (_server, running) = start(builder).await;
    let client = Client::new();
    let url = http_url(&running);

    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.text().await.unwrap(),
        r#"{"jsonrpc":"2.0","error":{"code":-32600,"message":"Invalid Request"}}"#
    );

    let (status, _, _) = post(&client, &url, "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("{}other", url))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_body_limit() {
    let (builder, _) = test_builder();
    let (_server, running) = start(builder.max_body_size(128)).await;
    let client = Client::new();
    let url = http_url(&running);

    let payload = json!({"jsonrpc": "2.0", "id": 1, "method": "echo", "params": ["x".repeat(512)]});
    let (status, _, _) = post(&client, &url, &payload.to_string()).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    running.shutdown().await.unwrap();
}
