//! vinoteca-sessiond - session consistency daemon for the Vinoteca client

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vinoteca_session::{
    config::Args,
    monitor::SessionMonitor,
    remote::{RestSessionSource, RestSourceConfig},
    store::{FileStore, TokenStorage},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("vinoteca_session={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  Vinoteca Session Daemon");
    info!(
        "  v{} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_SHORT"),
        env!("BUILD_TIMESTAMP")
    );
    info!("======================================");
    info!("Backend: {}", args.backend_url);
    info!("Profile table: {}", args.profile_table);
    info!("Session store: {}", args.session_store_path.display());
    info!("Monitor interval: {:?}", args.monitor_interval());
    info!("Session TTL: {} days", args.session_ttl_days);
    info!(
        "Mode: {}",
        if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" }
    );
    info!("======================================");

    // Open the local session store
    let store = match FileStore::open(&args.session_store_path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open session store: {}", e.message());
            std::process::exit(1);
        }
    };
    let storage = Arc::new(TokenStorage::with_ttl(store, args.session_ttl()).await);
    info!(
        "Session store ready (logged in: {})",
        storage.is_logged_in()
    );

    // Wire the backend session-state source and start the monitor
    let mut source_config = RestSourceConfig::new(&args.backend_url, args.api_key());
    source_config.table = args.profile_table.clone();
    source_config.request_timeout = args.request_timeout();
    let source = match RestSessionSource::new(source_config) {
        Ok(source) => Arc::new(source),
        Err(e) => {
            error!("Failed to build backend client: {}", e.message());
            std::process::exit(1);
        }
    };

    let monitor = Arc::new(SessionMonitor::with_interval(
        Arc::clone(&storage),
        source,
        args.monitor_interval(),
    ));
    monitor.start_monitoring().await;

    // Run until invalidation or shutdown signal
    let mut invalidated = monitor.invalidation_changes();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        changed = invalidated.changed() => {
            match changed {
                Ok(()) if *invalidated.borrow() => {
                    warn!("Session was invalidated by the backend");
                }
                _ => {}
            }
        }
    }

    monitor.stop_monitoring().await;
    info!("Goodbye");
    Ok(())
}
