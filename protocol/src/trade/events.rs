//! Trade outcome notifications.
//!
//! The coordinator reports every trade it opens or closes to a
//! [`TradeListener`] supplied by the host (chat messages, metrics, audit).
//! Each event also goes out as a one-line notice on the events channel.

use parking_lot::Mutex;
use serde::Serialize;

use super::types::TradeId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TradeEvent {
    /// A trade offer reached the target's node.
    Requested {
        trade_id: TradeId,
        requester_id: String,
        target_id: String,
    },
    /// Emitted once per participant whose asset changed hands on this node.
    Completed { trade_id: TradeId, player_id: String },
    Denied {
        trade_id: TradeId,
        requester_id: String,
        target_id: String,
    },
    Failed { trade_id: TradeId, reason: String },
    Expired {
        trade_id: TradeId,
        requester_id: String,
    },
}

impl TradeEvent {
    pub fn trade_id(&self) -> &TradeId {
        match self {
            TradeEvent::Requested { trade_id, .. }
            | TradeEvent::Completed { trade_id, .. }
            | TradeEvent::Denied { trade_id, .. }
            | TradeEvent::Failed { trade_id, .. }
            | TradeEvent::Expired { trade_id, .. } => trade_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TradeEvent::Requested { .. } => "trade_requested",
            TradeEvent::Completed { .. } => "trade_completed",
            TradeEvent::Denied { .. } => "trade_denied",
            TradeEvent::Failed { .. } => "trade_failed",
            TradeEvent::Expired { .. } => "trade_expired",
        }
    }

    /// `<name>|<tradeId>`, published on the events channel.
    pub fn notice(&self) -> String {
        format!("{}|{}", self.name(), self.trade_id())
    }
}

/// Receives trade events on the node that produced them.
///
/// Called inline by the coordinator, so implementations must not block.
pub trait TradeListener: Send + Sync {
    fn on_event(&self, event: &TradeEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl TradeListener for NoopListener {
    fn on_event(&self, _event: &TradeEvent) {}
}

/// Keeps every event in order of arrival.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<TradeEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TradeEvent> {
        self.events.lock().clone()
    }

    /// Names of the recorded events, oldest first.
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(TradeEvent::name).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl TradeListener for RecordingListener {
    fn on_event(&self, event: &TradeEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_names_event_and_trade() {
        let event = TradeEvent::Completed {
            trade_id: TradeId::from("t1"),
            player_id: "p1".into(),
        };
        assert_eq!(event.notice(), "trade_completed|t1");
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = TradeEvent::Expired {
            trade_id: TradeId::from("t1"),
            requester_id: "p1".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "expired");
        assert_eq!(json["trade_id"], "t1");
    }

    #[test]
    fn recording_listener_keeps_order() {
        let listener = RecordingListener::new();
        listener.on_event(&TradeEvent::Failed {
            trade_id: TradeId::from("t1"),
            reason: "peer timeout".into(),
        });
        listener.on_event(&TradeEvent::Expired {
            trade_id: TradeId::from("t2"),
            requester_id: "p1".into(),
        });
        assert_eq!(listener.names(), vec!["trade_failed", "trade_expired"]);
        listener.clear();
        assert!(listener.events().is_empty());
    }
}
