#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::doc_markdown)]

//! On-demand dev server broker.
//!
//! The broker listens where the browser expects the bundler's dev server.
//! Each request is mapped to the entry target that owns it; the first request
//! for an entry restarts the single bundler worker with that entry added, and
//! the request is proxied once the worker's port accepts connections.
//!
//! ```text
//! GET /admin.js
//!   → resolve entry (admin.js)
//!   → ensure worker serves {index.js, admin.js} (kill + respawn if not)
//!   → wait for worker port
//!   → proxy (HTTP via reqwest, WebSocket via tokio-tungstenite)
//! ```

pub mod error;
pub mod probe;
pub mod proxy;
pub mod server;
pub mod state;
pub mod worker;

pub use error::BrokerError;
pub use server::{is_hot_update, router, BrokerOptions, BrokerServer, BrokerService};
pub use state::Broker;
pub use worker::{CommandSpawner, WorkerHandle, WorkerSpawner, WORKER_PORT_ENV_VAR};
