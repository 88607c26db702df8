// Copyright (c) 2026 Shardtrade Contributors. MIT License.
// See LICENSE for details.

//! # Shardtrade Node
//!
//! Entry point for the `shardtrade-node` binary. Parses CLI arguments,
//! initializes logging and metrics, connects to the shared store, and runs
//! the trade dispatcher, the expiry sweeper and the HTTP API until a
//! shutdown signal arrives.

mod api;
mod cli;
mod logging;
mod metrics;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;

use shardtrade_protocol::{
    ExpirySweeper, MemoryInventory, MemoryTransport, NodeDispatcher, PlayerDirectory,
    RedisTransport, TradeCommands, TradeConfig, TradeCoordinator, Transport,
};

use cli::{Commands, ShardtradeNodeCli};
use metrics::{MetricsState, NodeMetrics};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ShardtradeNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(args.log_format).context("failed to install log subscriber")?;

    tracing::info!(
        node_id = %args.node_id,
        http_port = args.http_port,
        metrics_port = args.metrics_port,
        memory = args.memory,
        "starting shardtrade-node"
    );

    // --- Shared store ---
    let transport: Arc<dyn Transport> = if args.memory {
        tracing::warn!("using in-process store, trades with other nodes are unavailable");
        Arc::new(MemoryTransport::new())
    } else {
        let redis = RedisTransport::connect(&args.redis_url)
            .with_context(|| format!("invalid redis url {}", args.redis_url))?;
        redis
            .ping()
            .await
            .with_context(|| format!("redis at {} is unreachable", args.redis_url))?;
        Arc::new(redis)
    };

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Trade coordination ---
    let config = TradeConfig {
        trade_timeout: Duration::from_secs(args.trade_timeout_secs),
        sweep_interval: Duration::from_millis(args.sweep_interval_ms),
        ..TradeConfig::default()
    };
    let inventory = Arc::new(MemoryInventory::new());
    let coordinator = Arc::new(TradeCoordinator::new(
        args.node_id.clone(),
        Arc::clone(&transport),
        inventory.clone(),
        node_metrics.clone(),
        config,
    ));

    let dispatcher = NodeDispatcher::start(Arc::clone(&coordinator))
        .await
        .context("failed to subscribe to node channels")?;
    let sweeper = ExpirySweeper::start(Arc::clone(&coordinator));

    // --- API server ---
    let directory = PlayerDirectory::new(Arc::clone(&transport));
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        commands: TradeCommands::new(Arc::clone(&coordinator), directory.clone()),
        inventory,
        directory,
    };
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.http_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(MetricsState {
            metrics: Arc::clone(&node_metrics),
            registry: Arc::clone(coordinator.registry()),
        });
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, stopping trade tasks");
        }
    }

    sweeper.stop().await;
    dispatcher.shutdown().await;
    tracing::info!(
        abandoned = coordinator.registry().len(),
        "shardtrade-node stopped"
    );
    Ok(())
}

fn print_version() {
    println!("shardtrade-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc           {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed the corresponding branch never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
