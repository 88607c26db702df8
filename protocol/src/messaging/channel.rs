//! Correlated request/reply over the pub/sub transport.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::envelope::{
    decode_reply, encode_reply, Correlation, Envelope, EnvelopeError, MessageKind, Reply,
};
use crate::config::{reply_channel, requests_channel, BROADCAST_CHANNEL, EVENTS_CHANNEL};
use crate::transport::{Transport, TransportError};

#[derive(Debug, Error)]
pub enum ChannelError {
    /// No matching reply arrived within the bound.
    #[error("no reply from node {node} within {timeout_ms}ms")]
    Timeout { node: String, timeout_ms: u64 },

    /// The reply subscription ended before a reply arrived.
    #[error("reply channel closed")]
    Closed,

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// This node's endpoint on the shared transport.
#[derive(Clone)]
pub struct NodeChannel {
    node_id: String,
    transport: Arc<dyn Transport>,
}

impl NodeChannel {
    pub fn new(node_id: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            node_id: node_id.into(),
            transport,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Sends a request to `target_node` and waits up to `timeout` for the
    /// reply carrying the same correlation id.
    ///
    /// Each call listens on its own reply channel, subscribed before the
    /// request is published. The subscription is dropped on every exit, so
    /// a reply arriving after the timeout goes nowhere.
    pub async fn send_and_wait(
        &self,
        target_node: &str,
        kind: MessageKind,
        fields: Vec<String>,
        timeout: Duration,
    ) -> Result<Reply, ChannelError> {
        let correlation_id = Uuid::new_v4().to_string();
        let reply_to = reply_channel(&self.node_id, &correlation_id);
        let request = Envelope::new(kind, fields)
            .with_correlation(correlation_id.as_str(), reply_to.as_str())
            .encode()?;

        let mut replies = self.transport.subscribe(&reply_to).await?;
        let receivers = self
            .transport
            .publish(&requests_channel(target_node), &request)
            .await?;
        debug!(
            kind = %kind,
            target = target_node,
            correlation = %correlation_id,
            receivers,
            "request sent"
        );

        let wait = async {
            while let Some(raw) = replies.recv().await {
                match decode_reply(&raw) {
                    Ok((id, reply)) if id == correlation_id => return Ok(reply),
                    Ok((id, _)) => {
                        warn!(expected = %correlation_id, got = id, "skipping mismatched reply");
                    }
                    Err(e) => warn!(error = %e, "skipping malformed reply"),
                }
            }
            Err(ChannelError::Closed)
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout {
                node: target_node.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Answers a correlated request.
    pub async fn reply(&self, correlation: &Correlation, reply: &Reply) -> Result<(), ChannelError> {
        let receivers = self
            .transport
            .publish(&correlation.reply_to, &encode_reply(&correlation.id, reply))
            .await?;
        if receivers == 0 {
            // The requester already gave up waiting.
            trace!(correlation = %correlation.id, "reply had no listener");
        }
        Ok(())
    }

    /// Publishes `payload` to every node on the broadcast channel.
    pub async fn broadcast(&self, payload: &str) -> Result<(), ChannelError> {
        self.transport.publish(BROADCAST_CHANNEL, payload).await?;
        Ok(())
    }

    /// Publishes `payload` on the events channel. No one has to listen.
    pub async fn fire_and_forget(&self, payload: &str) -> Result<(), ChannelError> {
        self.transport.publish(EVENTS_CHANNEL, payload).await?;
        Ok(())
    }
}

impl std::fmt::Debug for NodeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeChannel")
            .field("node_id", &self.node_id)
            .finish()
    }
}
