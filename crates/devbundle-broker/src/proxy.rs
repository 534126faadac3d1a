//! HTTP and WebSocket forwarding to the worker.

use crate::error::BrokerError;
use axum::body::Body;
use axum::extract::ws::{CloseFrame as ClientCloseFrame, Message as ClientMessage, WebSocket};
use axum::http::{header, HeaderMap, HeaderName, Method, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WorkerCloseFrame;
use tokio_tungstenite::tungstenite::Message as WorkerMessage;
use tracing::{debug, warn};

/// Headers that describe one connection and must not be forwarded.
const HOP_BY_HOP: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// A request captured by the front server.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Path plus query string, as received.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Build the client used for forwarding.
pub fn client() -> Result<reqwest::Client, BrokerError> {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| BrokerError::Proxy(e.to_string()))
}

/// Forward `request` to the worker on `port`.
///
/// Any failure answers 404: the worker is assumed to be briefly unavailable.
pub async fn forward(client: &reqwest::Client, port: u16, request: ProxyRequest) -> Response {
    let path = request.path_and_query.clone();
    match try_forward(client, port, request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(%path, "{e}");
            not_found()
        }
    }
}

async fn try_forward(
    client: &reqwest::Client,
    port: u16,
    request: ProxyRequest,
) -> Result<Response, BrokerError> {
    let url = format!("http://127.0.0.1:{port}{}", request.path_and_query);
    let mut headers = request.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);

    let upstream = client
        .request(request.method, &url)
        .headers(headers)
        .body(request.body)
        .send()
        .await
        .map_err(|e| BrokerError::Proxy(e.to_string()))?;

    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);
    let body = upstream
        .bytes()
        .await
        .map_err(|e| BrokerError::Proxy(e.to_string()))?;
    debug!(%url, %status, len = body.len(), "proxied");

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

pub(crate) fn not_found() -> Response {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Body::from("Not Found"))
        .unwrap()
}

/// Relay frames between a browser socket and the worker's socket at the
/// same path until either side closes.
pub async fn relay_websocket(socket: WebSocket, port: u16, path_and_query: String) {
    let url = format!("ws://127.0.0.1:{port}{path_and_query}");
    let upstream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!(%url, "websocket connect to worker failed: {e}");
            let _ = socket.close().await;
            return;
        }
    };
    debug!(%url, "websocket relay open");

    let (mut worker_tx, mut worker_rx) = upstream.split();
    let (mut client_tx, mut client_rx) = socket.split();

    let to_worker = async {
        while let Some(Ok(msg)) = client_rx.next().await {
            let Some(msg) = to_worker_message(msg) else {
                continue;
            };
            if worker_tx.send(msg).await.is_err() {
                break;
            }
        }
        let _ = worker_tx.close().await;
    };

    let to_client = async {
        while let Some(Ok(msg)) = worker_rx.next().await {
            let Some(msg) = to_client_message(msg) else {
                continue;
            };
            if client_tx.send(msg).await.is_err() {
                break;
            }
        }
        let _ = client_tx.close().await;
    };

    tokio::select! {
        () = to_worker => {}
        () = to_client => {}
    }
    debug!(%url, "websocket relay closed");
}

// Pings and pongs are answered by each side's own socket.
fn to_worker_message(msg: ClientMessage) -> Option<WorkerMessage> {
    match msg {
        ClientMessage::Text(text) => Some(WorkerMessage::Text(text)),
        ClientMessage::Binary(data) => Some(WorkerMessage::Binary(data)),
        ClientMessage::Close(frame) => Some(WorkerMessage::Close(frame.map(|f| WorkerCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason,
        }))),
        ClientMessage::Ping(_) | ClientMessage::Pong(_) => None,
    }
}

fn to_client_message(msg: WorkerMessage) -> Option<ClientMessage> {
    match msg {
        WorkerMessage::Text(text) => Some(ClientMessage::Text(text)),
        WorkerMessage::Binary(data) => Some(ClientMessage::Binary(data)),
        WorkerMessage::Close(frame) => Some(ClientMessage::Close(frame.map(|f| ClientCloseFrame {
            code: f.code.into(),
            reason: f.reason,
        }))),
        WorkerMessage::Ping(_) | WorkerMessage::Pong(_) | WorkerMessage::Frame(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, "keep-alive".parse().unwrap());
        headers.insert("keep-alive", "timeout=5".parse().unwrap());
        headers.insert(header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        headers.insert(header::CONTENT_TYPE, "text/css".parse().unwrap());
        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[header::CONTENT_TYPE], "text/css");
    }

    #[test]
    fn test_message_conversion() {
        assert!(matches!(
            to_worker_message(ClientMessage::Text("hi".to_string())),
            Some(WorkerMessage::Text(ref t)) if t == "hi"
        ));
        assert!(to_worker_message(ClientMessage::Ping(vec![1])).is_none());

        let close = to_client_message(WorkerMessage::Close(Some(WorkerCloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        })));
        let Some(ClientMessage::Close(Some(frame))) = close else {
            panic!("expected close frame");
        };
        assert_eq!(frame.code, 1000);
        assert_eq!(frame.reason, "bye");
    }

    #[tokio::test]
    async fn test_forward_to_closed_port_is_404() {
        let port = std::net::TcpListener::bind(("127.0.0.1", 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client = client().unwrap();
        let response = forward(
            &client,
            port,
            ProxyRequest {
                method: Method::GET,
                path_and_query: "/index.js".to_string(),
                headers: HeaderMap::new(),
                body: Bytes::new(),
            },
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
