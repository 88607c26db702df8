//! # Prometheus Metrics
//!
//! Trade counters for the node, scraped at `/metrics` on the metrics port.
//! Everything lives in a dedicated [`prometheus::Registry`] prefixed with
//! `shardtrade`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

use shardtrade_protocol::{TradeEvent, TradeListener, TradeRegistry};

#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Offers that reached a target on this node.
    pub trades_requested_total: IntCounter,
    /// Per-participant completions recorded on this node.
    pub trades_completed_total: IntCounter,
    pub trades_denied_total: IntCounter,
    pub trades_expired_total: IntCounter,
    pub trades_failed_total: IntCounter,
    /// Trades this node currently tracks, refreshed on every scrape.
    pub pending_trades: IntGauge,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("shardtrade".into()), None)?;

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let c = IntCounter::new(name, help)?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let trades_requested_total =
            counter("trades_requested_total", "Trade offers delivered to a target on this node")?;
        let trades_completed_total = counter(
            "trades_completed_total",
            "Participants whose asset changed hands on this node",
        )?;
        let trades_denied_total = counter("trades_denied_total", "Trades refused by the target")?;
        let trades_expired_total =
            counter("trades_expired_total", "Trades that timed out without a decision")?;
        let trades_failed_total =
            counter("trades_failed_total", "Trades aborted by a transport or store failure")?;

        let pending_trades =
            IntGauge::new("pending_trades", "Trades currently tracked by this node")?;
        registry.register(Box::new(pending_trades.clone()))?;

        Ok(Self {
            registry,
            trades_requested_total,
            trades_completed_total,
            trades_denied_total,
            trades_expired_total,
            trades_failed_total,
            pending_trades,
        })
    }

    /// Encodes all registered metrics into the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl TradeListener for NodeMetrics {
    fn on_event(&self, event: &TradeEvent) {
        match event {
            TradeEvent::Requested { .. } => self.trades_requested_total.inc(),
            TradeEvent::Completed { .. } => self.trades_completed_total.inc(),
            TradeEvent::Denied { .. } => self.trades_denied_total.inc(),
            TradeEvent::Expired { .. } => self.trades_expired_total.inc(),
            TradeEvent::Failed { .. } => self.trades_failed_total.inc(),
        }
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// State of the metrics router.
#[derive(Clone)]
pub struct MetricsState {
    pub metrics: SharedMetrics,
    pub registry: Arc<TradeRegistry>,
}

/// Renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    state
        .metrics
        .pending_trades
        .set(i64::try_from(state.registry.len()).unwrap_or(i64::MAX));

    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardtrade_protocol::TradeId;

    #[test]
    fn events_bump_their_counter() {
        let metrics = NodeMetrics::new().unwrap();
        let trade_id = TradeId::from("t1");
        metrics.on_event(&TradeEvent::Completed {
            trade_id: trade_id.clone(),
            player_id: "alice".into(),
        });
        metrics.on_event(&TradeEvent::Completed {
            trade_id: trade_id.clone(),
            player_id: "bob".into(),
        });
        metrics.on_event(&TradeEvent::Expired {
            trade_id,
            requester_id: "alice".into(),
        });

        assert_eq!(metrics.trades_completed_total.get(), 2);
        assert_eq!(metrics.trades_expired_total.get(), 1);
        assert_eq!(metrics.trades_denied_total.get(), 0);
    }

    #[test]
    fn encode_uses_namespace() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.trades_denied_total.inc();
        let text = metrics.encode().unwrap();
        assert!(text.contains("shardtrade_trades_denied_total 1"));
        assert!(text.contains("shardtrade_pending_trades 0"));
    }
}
