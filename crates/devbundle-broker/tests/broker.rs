//! End-to-end broker tests against a throwaway in-process worker.

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use devbundle_broker::{BrokerOptions, BrokerServer, WorkerHandle, WorkerSpawner};
use devbundle_core::{EntryFiles, EntryTargets};
use futures::{SinkExt, StreamExt};
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Entries the fake worker was last "spawned" with, plus a spawn counter.
#[derive(Default)]
struct WorkerLog {
    entries: Mutex<Vec<String>>,
    spawns: Mutex<usize>,
}

struct FakeSpawner {
    log: Arc<WorkerLog>,
}

struct FakeHandle;

impl WorkerHandle for FakeHandle {
    fn id(&self) -> Option<u32> {
        None
    }

    fn is_alive(&mut self) -> bool {
        true
    }

    fn kill(&mut self) {}
}

impl WorkerSpawner for FakeSpawner {
    fn spawn(&self, entries: &[String], _port: u16, _cwd: &Path) -> io::Result<Box<dyn WorkerHandle>> {
        *self.log.entries.lock().unwrap() = entries.to_vec();
        *self.log.spawns.lock().unwrap() += 1;
        Ok(Box::new(FakeHandle))
    }
}

async fn serve_script(State(log): State<Arc<WorkerLog>>) -> Response {
    let entries = log.entries.lock().unwrap().join(",");
    ([("x-entries", entries)], "console.log('bundle');").into_response()
}

async fn echo(RawQuery(query): RawQuery, body: Bytes) -> Response {
    let mut out = query.unwrap_or_default().into_bytes();
    out.push(b'|');
    out.extend_from_slice(&body);
    out.into_response()
}

async fn echo_ws(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(|mut socket| async move {
        while let Some(Ok(msg)) = socket.recv().await {
            if let Message::Text(text) = msg {
                if socket.send(Message::Text(format!("echo:{text}"))).await.is_err() {
                    break;
                }
            }
        }
    })
}

/// Start the fake worker and return its port.
async fn start_worker(log: Arc<WorkerLog>) -> u16 {
    let app = Router::new()
        .route("/index.js", get(serve_script))
        .route("/admin.js", get(serve_script))
        .route("/echo", post(echo))
        .route("/teapot", get(|| async { StatusCode::IM_A_TEAPOT }))
        .route("/main.1a2b.hot-update.json", get(|| async { "{}" }))
        .route("/ws", get(echo_ws))
        .with_state(log);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

async fn start_broker() -> (BrokerServer, Arc<WorkerLog>) {
    let log = Arc::new(WorkerLog::default());
    let worker_port = start_worker(log.clone()).await;
    let options = BrokerOptions {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        worker_port,
        prewarm: Vec::new(),
        entries: EntryTargets::new()
            .with("index.js", EntryFiles::new(["index.js"], ["styles"]))
            .with("admin.js", EntryFiles::new(["admin.js"], ["src/admin.scss"])),
        source_prefix: "src/".to_string(),
        cwd: PathBuf::from("."),
        spawner: Arc::new(FakeSpawner { log: log.clone() }),
        startup_grace: Duration::ZERO,
        ready_timeout: Duration::from_secs(2),
        fallback_wait: Duration::from_millis(200),
        probe_interval: Duration::from_millis(10),
    };
    (BrokerServer::create(options).await.unwrap(), log)
}

#[tokio::test]
async fn proxies_script_after_starting_its_entry() {
    let (mut server, log) = start_broker().await;
    let base = format!("http://{}", server.local_addr());
    let client = reqwest::Client::new();

    let response = client.get(format!("{base}/index.js?v=2")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-entries"], "index.js");
    assert_eq!(response.text().await.unwrap(), "console.log('bundle');");

    // A second entry restarts the worker with both entries.
    let response = client.get(format!("{base}/admin.js")).send().await.unwrap();
    assert_eq!(response.headers()["x-entries"], "admin.js,index.js");
    assert_eq!(*log.spawns.lock().unwrap(), 2);

    // Already tracked: no restart.
    client.get(format!("{base}/index.js")).send().await.unwrap();
    assert_eq!(*log.spawns.lock().unwrap(), 2);

    server.reset().await;
    assert!(server.service().broker().tracked().await.is_empty());
}

#[tokio::test]
async fn forwards_unclaimed_and_hot_update_requests() {
    let (mut server, log) = start_broker().await;
    let base = format!("http://{}", server.local_addr());
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/echo?a=1"))
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "a=1|payload");

    let response = client.get(format!("{base}/teapot")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);

    let response = client
        .get(format!("{base}/main.1a2b.hot-update.json"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "{}");

    // None of these belong to an entry, so no worker was started.
    assert_eq!(*log.spawns.lock().unwrap(), 0);
    server.reset().await;
}

#[tokio::test]
async fn relays_websocket_frames() {
    let (mut server, _log) = start_broker().await;
    let url = format!("ws://{}/ws", server.local_addr());

    let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    socket.send(WsMessage::Text("hello".to_string())).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(reply, WsMessage::Text("echo:hello".to_string()));

    socket.close(None).await.unwrap();
    server.reset().await;
}
