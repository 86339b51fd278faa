//! ==============================================================================
//! main.rs - telemetry relay entry point
//! ==============================================================================
//!
//! purpose:
//!     sensor nodes push readings over http, the relay persists them and fans
//!     them out to every open dashboard, and operator commands are queued for
//!     the device to pick up on its next poll.
//!
//! responsibilities:
//!     - load configuration (relay.toml, .env, environment)
//!     - initialize logging
//!     - open the sqlite store and ensure the schema
//!     - build the relay (live state + action log + queue + broadcast)
//!     - serve the api, the dashboard page and the websocket channel
//!
//! relationships:
//!     - uses: config.rs (settings), store.rs (persistence)
//!     - uses: relay.rs (shared state owner), server.rs (routes), ws.rs
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────────┐
//!     │                      relay (this binary)                     │
//!     │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐  │
//!     │  │ POST /ingest │   │ POST /control│   │ GET /ws sessions │  │
//!     │  └──────┬───────┘   └──────┬───────┘   └────────┬─────────┘  │
//!     │         └──────────────────┼────────────────────┘            │
//!     │                      ┌─────┴─────┐                           │
//!     │                      │   relay   │ <- relay.rs               │
//!     │                      └─────┬─────┘                           │
//!     │     (Clone-able handle to live state, log, queue and hub)    │
//!     └────────────────────────────┼─────────────────────────────────┘
//!                                  │ sqlx
//!                          ┌───────┴───────┐
//!                          │ sqlite store  │
//!                          └───────────────┘
//!
//! ==============================================================================

mod broadcast;
mod config;
mod domain;
mod error;
mod queue;
mod relay;
mod server;
mod state;
mod store;
mod ws;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  Telemetry Relay");
    println!("  ingest -> live state -> dashboards, commands -> device");
    println!("===========================================================");

    // step 1: load configuration
    let config = config::RelayConfig::from_env()?;
    config.print_summary();

    // step 2: logging
    init_tracing(&config.logging.level);
    if config.uses_default_secret() {
        tracing::warn!("SESSION_SECRET not set - using the development default");
    }

    // step 3: open the store
    let store = store::Store::connect(&config.database.url)
        .await
        .context("store initialization failed")?;
    tracing::info!(url = %config.database.url, "store ready");

    // step 4: shared relay state
    let relay = relay::Relay::new(store, config.broadcast.capacity);

    // step 5: serve until ctrl-c
    println!("[STARTUP] ✓ Dashboard live at http://{}", config.bind_addr());
    println!("────────────────────────────────────────────────────────────");
    server::run_server(relay, &config.bind_addr()).await
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{},hyper=warn,sqlx=warn", level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
