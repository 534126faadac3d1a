//! `devbundle dev` command implementation.
//!
//! Runs the on-demand broker in front of the bundler's dev server. The
//! bundler is not started until the first request for one of its entries.

use devbundle_broker::{BrokerOptions, BrokerServer};
use devbundle_core::BuildConfig;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use tracing::info;

/// Dev server action.
#[derive(Debug, Clone)]
pub struct DevAction {
    pub cwd: PathBuf,
    /// Broker port override.
    pub port: Option<u16>,
    /// Worker port override.
    pub worker_port: Option<u16>,
    /// Entries to start immediately, in addition to the configured ones.
    pub prewarm: Vec<String>,
}

/// Run the broker until Ctrl+C.
pub fn run(config: BuildConfig, action: DevAction) -> Result<()> {
    let mut config = config;
    if let Some(port) = action.port {
        config = config.with_broker_port(port);
    }
    if let Some(port) = action.worker_port {
        config = config.with_worker_port(port);
    }
    if config.entries.is_empty() {
        return Err(miette::miette!(
            help = "add an `entries` map to devbundle.json",
            "No entry targets configured"
        ));
    }

    let mut options = BrokerOptions::from_config(&config, action.cwd);
    for id in action.prewarm {
        if !options.prewarm.contains(&id) {
            options.prewarm.push(id);
        }
    }

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    runtime.block_on(async move {
        let server = BrokerServer::create(options).await.into_diagnostic()?;
        info!(
            entries = config.entries.len(),
            worker = %config.worker.command,
            "dev broker ready"
        );
        println!();
        println!("  Dev server running at http://{}", server.local_addr());
        println!("  Bundler starts on first request (worker port {})", config.worker.port);
        println!();
        println!("  Press Ctrl+C to stop");
        println!();
        server.run_until_ctrl_c().await.into_diagnostic()
    })
}
