//! Front server: classifies each request, starts the right worker and proxies.

use crate::error::BrokerError;
use crate::probe::wait_for_port;
use crate::proxy::{self, ProxyRequest};
use crate::state::Broker;
use crate::worker::{CommandSpawner, WorkerSpawner};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use axum::Router;
use bytes::Bytes;
use devbundle_core::{BuildConfig, EntryTargets};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Substring that marks incremental hot-update fragments.
const HOT_UPDATE_MARKER: &str = ".hot-update.";

/// Broker construction parameters.
#[derive(Clone)]
pub struct BrokerOptions {
    pub host: IpAddr,
    /// Listening port. `0` picks a free one.
    pub port: u16,
    pub worker_port: u16,
    /// Entry ids started before the first request.
    pub prewarm: Vec<String>,
    pub entries: EntryTargets,
    pub source_prefix: String,
    pub cwd: PathBuf,
    pub spawner: Arc<dyn WorkerSpawner>,
    /// Delay between spawning a worker and the first readiness probe.
    pub startup_grace: Duration,
    pub ready_timeout: Duration,
    /// How long an unclassified request waits for any worker.
    pub fallback_wait: Duration,
    pub probe_interval: Duration,
}

impl std::fmt::Debug for BrokerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("worker_port", &self.worker_port)
            .field("prewarm", &self.prewarm)
            .field("entries", &self.entries)
            .field("cwd", &self.cwd)
            .field("spawner", &"<dyn WorkerSpawner>")
            .finish_non_exhaustive()
    }
}

impl BrokerOptions {
    /// Options from a loaded config, spawning the configured worker command.
    #[must_use]
    pub fn from_config(config: &BuildConfig, cwd: impl Into<PathBuf>) -> Self {
        let worker = &config.worker;
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: config.broker.port,
            worker_port: worker.port,
            prewarm: config.broker.prewarm.clone(),
            entries: config.entries.clone(),
            source_prefix: config.styles.source_prefix.clone(),
            cwd: cwd.into(),
            spawner: Arc::new(CommandSpawner::new(&worker.command, worker.args.clone())),
            startup_grace: Duration::from_millis(worker.startup_grace_ms),
            ready_timeout: Duration::from_millis(worker.ready_timeout_ms),
            fallback_wait: Duration::from_millis(worker.fallback_wait_ms),
            probe_interval: Duration::from_millis(worker.probe_interval_ms),
        }
    }
}

/// Request handling shared by every connection.
pub struct BrokerService {
    broker: Broker,
    entries: EntryTargets,
    source_prefix: String,
    startup_grace: Duration,
    ready_timeout: Duration,
    fallback_wait: Duration,
    probe_interval: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for BrokerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerService")
            .field("broker", &self.broker)
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl BrokerService {
    pub fn new(options: &BrokerOptions) -> Result<Self, BrokerError> {
        Ok(Self {
            broker: Broker::new(options.spawner.clone(), options.cwd.clone(), options.worker_port),
            entries: options.entries.clone(),
            source_prefix: options.source_prefix.clone(),
            startup_grace: options.startup_grace,
            ready_timeout: options.ready_timeout,
            fallback_wait: options.fallback_wait,
            probe_interval: options.probe_interval,
            client: proxy::client()?,
        })
    }

    #[must_use]
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Entry target owning `asset_path`, if any.
    #[must_use]
    pub fn resolve_entry_for(&self, asset_path: &str) -> Option<&str> {
        self.entries.resolve_entry_for(asset_path, &self.source_prefix)
    }

    /// Get a worker ready to answer a request for `path`.
    ///
    /// Hot-update fragments skip this entirely. Paths no entry claims wait a
    /// short while for whatever worker is running and are proxied regardless.
    pub async fn prepare(&self, path: &str) -> Result<(), BrokerError> {
        if is_hot_update(path) {
            return Ok(());
        }

        let port = self.broker.worker_port();
        let Some(entry) = self.resolve_entry_for(path) else {
            debug!(path, "no entry claims request, proxying to current worker");
            if let Err(e) = wait_for_port(port, self.fallback_wait, self.probe_interval).await {
                debug!(path, "{e}");
            }
            return Ok(());
        };

        debug!(path, entry, "resolved entry");
        if self.broker.ensure_worker(&[entry]).await? {
            tokio::time::sleep(self.startup_grace).await;
        }
        wait_for_port(port, self.ready_timeout, self.probe_interval).await
    }

    /// Classify, prepare and proxy one HTTP request.
    pub async fn handle_request(&self, request: ProxyRequest) -> Response {
        let path = request
            .path_and_query
            .split('?')
            .next()
            .unwrap_or_default()
            .to_string();
        if let Err(e) = self.prepare(&path).await {
            error!(%path, "{e}");
            return proxy::not_found();
        }
        proxy::forward(&self.client, self.broker.worker_port(), request).await
    }

    /// Start every entry in `ids` before any request arrives.
    pub async fn prewarm(&self, ids: &[String]) -> Result<(), BrokerError> {
        if ids.is_empty() {
            return Ok(());
        }
        let targets = self.entries.select(ids)?;
        let ids: Vec<&str> = targets.ids().collect();
        info!(entries = %ids.join(","), "prewarming worker");
        self.broker.ensure_worker(ids.as_slice()).await?;
        Ok(())
    }
}

/// Whether `path` names an incremental hot-update fragment.
#[must_use]
pub fn is_hot_update(path: &str) -> bool {
    path.contains(HOT_UPDATE_MARKER)
}

async fn handle(
    State(service): State<Arc<BrokerService>>,
    ws: Option<WebSocketUpgrade>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path_and_query = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), ToString::to_string);

    if let Some(ws) = ws {
        let port = service.broker.worker_port();
        if let Err(e) = wait_for_port(port, service.fallback_wait, service.probe_interval).await {
            warn!(path = %path_and_query, "{e}");
            return proxy::not_found();
        }
        return ws.on_upgrade(move |socket| proxy::relay_websocket(socket, port, path_and_query));
    }

    service
        .handle_request(ProxyRequest {
            method,
            path_and_query,
            headers,
            body,
        })
        .await
}

/// Router with a single catch-all handler; every path is an asset.
pub fn router(service: Arc<BrokerService>) -> Router {
    Router::new().fallback(handle).with_state(service)
}

/// A running broker.
#[derive(Debug)]
pub struct BrokerServer {
    service: Arc<BrokerService>,
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl BrokerServer {
    /// Start a broker: pre-warm the configured entries, bind and serve in
    /// the background.
    pub async fn create(options: BrokerOptions) -> Result<Self, BrokerError> {
        let service = Arc::new(BrokerService::new(&options)?);
        service.broker.reset().await;
        service.prewarm(&options.prewarm).await?;

        let addr = SocketAddr::new(options.host, options.port);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| BrokerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| BrokerError::Bind { addr, source })?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(service.clone());
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(%local_addr, worker_port = options.worker_port, "broker listening");
        Ok(Self {
            service,
            local_addr,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn service(&self) -> &Arc<BrokerService> {
        &self.service
    }

    /// Close the listener, forget tracked entries and kill the worker.
    pub async fn reset(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("broker server error: {e}"),
                Err(e) => warn!("broker server task failed: {e}"),
            }
        }
        self.service.broker.reset().await;
        debug!("broker reset");
    }

    /// Serve until the listener stops or the process receives Ctrl+C.
    pub async fn run_until_ctrl_c(mut self) -> Result<(), BrokerError> {
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };
        let finished = tokio::select! {
            res = &mut task => Some(res),
            _ = tokio::signal::ctrl_c() => None,
        };

        let Some(res) = finished else {
            info!("shutting down");
            self.task = Some(task);
            self.reset().await;
            return Ok(());
        };
        self.service.broker.reset().await;
        match res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BrokerError::Serve(e.to_string())),
            Err(e) => Err(BrokerError::Serve(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::RecordingSpawner;
    use devbundle_core::EntryFiles;

    fn options(spawner: Arc<RecordingSpawner>) -> BrokerOptions {
        let worker_port = std::net::TcpListener::bind(("127.0.0.1", 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        BrokerOptions {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            worker_port,
            prewarm: Vec::new(),
            entries: EntryTargets::new()
                .with("index.js", EntryFiles::new(["index.js"], ["styles"]))
                .with("admin.js", EntryFiles::new(["admin.js"], ["src/admin.scss"])),
            source_prefix: "src/".to_string(),
            cwd: PathBuf::from("."),
            spawner,
            startup_grace: Duration::ZERO,
            ready_timeout: Duration::from_millis(50),
            fallback_wait: Duration::from_millis(20),
            probe_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_hot_update_detection() {
        assert!(is_hot_update("/main.8f2a.hot-update.json"));
        assert!(is_hot_update("/index.js.abc.hot-update.js"));
        assert!(!is_hot_update("/index.js"));
    }

    #[tokio::test]
    async fn test_prepare_starts_owning_entry() {
        let spawner = Arc::new(RecordingSpawner::default());
        let service = BrokerService::new(&options(spawner.clone())).unwrap();

        // No worker is listening, so the probe times out after the spawn.
        let err = service.prepare("/styles.rtl.css").await.unwrap_err();
        assert!(matches!(err, BrokerError::NotReady { .. }));
        assert_eq!(service.broker().tracked().await, vec!["index.js"]);
        assert_eq!(spawner.events(), vec!["spawn 1 [index.js]"]);
    }

    #[tokio::test]
    async fn test_prepare_skips_hot_updates_and_unclaimed_paths() {
        let spawner = Arc::new(RecordingSpawner::default());
        let service = BrokerService::new(&options(spawner.clone())).unwrap();

        service.prepare("/main.1.hot-update.json").await.unwrap();
        service.prepare("/chunk-77.js").await.unwrap();
        assert!(spawner.events().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_worker_yields_404() {
        let spawner = Arc::new(RecordingSpawner::default());
        let service = BrokerService::new(&options(spawner)).unwrap();
        let response = service
            .handle_request(ProxyRequest {
                method: Method::GET,
                path_and_query: "/index.js?v=1".to_string(),
                headers: HeaderMap::new(),
                body: Bytes::new(),
            })
            .await;
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_prewarms_and_reset_clears() {
        let spawner = Arc::new(RecordingSpawner::default());
        let mut opts = options(spawner.clone());
        opts.prewarm = vec!["admin.js".to_string()];

        let mut server = BrokerServer::create(opts).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.service().broker().tracked().await, vec!["admin.js"]);

        server.reset().await;
        assert!(server.service().broker().tracked().await.is_empty());
        assert_eq!(spawner.events(), vec!["spawn 1 [admin.js]", "kill 1"]);
        assert!(tokio::net::TcpStream::connect(server.local_addr()).await.is_err());
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_prewarm_entry() {
        let spawner = Arc::new(RecordingSpawner::default());
        let mut opts = options(spawner);
        opts.prewarm = vec!["nope.js".to_string()];
        let err = BrokerServer::create(opts).await.unwrap_err();
        assert!(matches!(
            err,
            BrokerError::Core(devbundle_core::Error::UnknownEntry { .. })
        ));
    }
}
