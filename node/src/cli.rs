//! # CLI Interface
//!
//! Command-line arguments for `shardtrade-node`, declared with `clap`
//! derive. Every `run` flag can also come from a `SHARDTRADE_*` variable.

use clap::{Parser, Subcommand};

use crate::logging::LogFormat;

/// Shardtrade game-server node.
///
/// Hosts players, answers trade requests from other nodes, and exposes the
/// trade commands plus Prometheus metrics over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "shardtrade-node",
    about = "Shardtrade game-server node",
    version,
    propagate_version = true
)]
pub struct ShardtradeNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Cluster-unique name of this node. Other nodes address it by this id.
    #[arg(long, env = "SHARDTRADE_NODE_ID")]
    pub node_id: String,

    /// Redis server shared by every node of the cluster.
    #[arg(long, env = "SHARDTRADE_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Run against an in-process store instead of Redis. Only useful for a
    /// single-node setup.
    #[arg(long, env = "SHARDTRADE_MEMORY", default_value_t = false)]
    pub memory: bool,

    /// Port for the trade command API.
    #[arg(long, env = "SHARDTRADE_HTTP_PORT", default_value_t = 8080)]
    pub http_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "SHARDTRADE_METRICS_PORT", default_value_t = 9100)]
    pub metrics_port: u16,

    /// Log output format.
    #[arg(long, env = "SHARDTRADE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Lifetime of a pending trade, in seconds.
    #[arg(
        long,
        env = "SHARDTRADE_TRADE_TIMEOUT_SECS",
        default_value_t = 120,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub trade_timeout_secs: u64,

    /// Interval between expiry sweeps, in milliseconds. Must be positive.
    #[arg(
        long,
        env = "SHARDTRADE_SWEEP_INTERVAL_MS",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub sweep_interval_ms: u64,
}
