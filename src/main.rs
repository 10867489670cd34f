// marketcache - read-through SWR cache with request coalescing and popularity-driven prewarming
// Author: kelexine (https://github.com/kelexine)

use anyhow::Result;
use clap::Parser;
use marketcache::cache::CacheService;
use marketcache::catalog::{CatalogService, MarketplaceClient};
use marketcache::cli::Args;
use marketcache::config::AppConfig;
use marketcache::prewarm::PrewarmScheduler;
use marketcache::server::create_router;
use marketcache::utils::logging;
use std::net::SocketAddr;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Phase 1: Load configuration, flags win over file and environment
    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    // Phase 2: Initialize logging
    logging::init(&config.logging)?;
    info!("Starting marketcache v{}", env!("CARGO_PKG_VERSION"));

    // Phase 3: Connect the cache store (falls back to no-cache mode)
    let cache = CacheService::connect(&config).await;

    // Phase 4: Build the catalog that owns the producers
    let client = MarketplaceClient::new(&config.upstream)?;
    let catalog = CatalogService::new(cache.clone(), client, &config.upstream, &config.prewarm);

    // Phase 5: Start prewarming
    let scheduler = if config.prewarm.enabled {
        let scheduler = PrewarmScheduler::new(cache.clone(), config.prewarm.clone())
            .with_warmers(catalog.warmers());
        Some(scheduler.start())
    } else {
        info!("[PREWARM] scheduler disabled");
        None
    };

    // Phase 6: Build and start HTTP server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = create_router(config, cache, catalog)?;

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Phase 7: Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = scheduler {
        handle.stop().await;
    }

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
