//! HTTP POST bridge.
//!
//! Each request carries exactly one JSON-RPC message in its body. The HTTP
//! status follows the error code of the response frame; notifications are
//! answered with `204 No Content`.

use std::convert::Infallible;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use turul_channels_json_rpc::{ConnectionContext, Transport};

use crate::server::TransportState;

/// Content type of every JSON-RPC response body
pub const JSON_RPC_CONTENT_TYPE: &str = "application/json-rpc";

/// How long shutdown waits for open HTTP connections
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Accept HTTP connections until shutdown is signalled, then let open
/// connections finish their in-flight request.
pub(crate) async fn serve(listener: TcpListener, state: TransportState, mut shutdown: watch::Receiver<bool>) {
    let graceful = GracefulShutdown::new();
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("HTTP listener shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    debug!("New HTTP connection from {}", peer_addr);
                    let state = state.clone();
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req| {
                        let state = state.clone();
                        async move { handle_request(req, &state).await }
                    });
                    let connection = graceful.watch(http1::Builder::new().serve_connection(io, service));

                    tokio::spawn(async move {
                        if let Err(err) = connection.await {
                            let err_str = err.to_string();
                            if err_str.contains("connection closed before message completed") {
                                debug!("Client disconnected (normal): {}", err);
                            } else {
                                error!("Error serving connection: {}", err);
                            }
                        }
                    });
                }
                Err(err) => error!("Failed to accept HTTP connection: {}", err),
            },
        }
    }

    tokio::select! {
        _ = graceful.shutdown() => debug!("All HTTP connections closed"),
        _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
            warn!("Timed out waiting for HTTP connections to close");
        }
    }
}

/// Answer one HTTP request.
pub(crate) async fn handle_request<B>(
    req: Request<B>,
    state: &TransportState,
) -> std::result::Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("Handling {} {}", method, path);

    if path != state.config.http_path {
        return Ok(plain_response(StatusCode::NOT_FOUND, "Not Found"));
    }

    let payload = if method == Method::POST {
        match read_body(req, state.config.max_body_size).await {
            BodyOutcome::Text(text) => Some(text),
            BodyOutcome::Unreadable => None,
            BodyOutcome::TooLarge => {
                return Ok(plain_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"));
            }
        }
    } else {
        // only POST carries a message, everything else is empty input
        None
    };

    let context = ConnectionContext::new(Transport::Http);
    let Some(frame) = state
        .dispatcher
        .handle_message(Transport::Http, payload.as_deref(), &context)
        .await
    else {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::NO_CONTENT;
        return Ok(response);
    };

    let status = StatusCode::from_u16(frame.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match state.dispatcher.codec().encode_response(frame) {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_RPC_CONTENT_TYPE));
            Ok(response)
        }
        Err(err) => {
            error!("Failed to encode response frame: {}", err);
            Ok(plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"))
        }
    }
}

enum BodyOutcome {
    Text(String),
    Unreadable,
    TooLarge,
}

async fn read_body<B>(req: Request<B>, max_body_size: usize) -> BodyOutcome
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared.is_some_and(|len| len > max_body_size) {
        warn!("Request body too large: {:?} bytes", declared);
        return BodyOutcome::TooLarge;
    }

    let body_bytes = match Limited::new(req.into_body(), max_body_size).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            warn!("Request body exceeds {} bytes", max_body_size);
            return BodyOutcome::TooLarge;
        }
        Err(err) => {
            debug!("Failed to read request body: {}", err);
            return BodyOutcome::Unreadable;
        }
    };

    match String::from_utf8(body_bytes.to_vec()) {
        Ok(text) => BodyOutcome::Text(text),
        Err(err) => {
            debug!("Request body is not UTF-8: {}", err);
            BodyOutcome::Unreadable
        }
    }
}

fn plain_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}
