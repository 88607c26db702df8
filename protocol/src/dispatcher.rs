//! # Node Dispatcher
//!
//! The single inbound loop of a node. It holds one subscription to the
//! node's request channel and one to the broadcast channel for the life of
//! the node, decodes each request, and runs the coordinator handler on its
//! own task so a slow exchange never stalls delivery of the next request.
//!
//! ## Shutdown
//!
//! [`DispatcherHandle::shutdown`] stops the loop, drops both subscriptions
//! and then waits for handlers already in flight. Requests published after
//! that point are lost, and their senders see a timeout.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::{requests_channel, BROADCAST_CHANNEL};
use crate::messaging::envelope::parse_cleanup;
use crate::messaging::{Envelope, Reply};
use crate::trade::{ErrorKind, TradeCoordinator};
use crate::transport::{Subscription, TransportError};

/// Cleanup notices may only name keys under this prefix.
const CLEANUP_KEY_PREFIX: &str = "trade";

pub struct NodeDispatcher;

impl NodeDispatcher {
    /// Subscribes to the node's channels and spawns the dispatch loop.
    ///
    /// Both subscriptions are active when this returns, so a request
    /// published afterwards is guaranteed to be seen.
    pub async fn start(coordinator: Arc<TradeCoordinator>) -> Result<DispatcherHandle, TransportError> {
        let transport = Arc::clone(coordinator.transport());
        let requests = transport
            .subscribe(&requests_channel(coordinator.node_id()))
            .await?;
        let broadcasts = transport.subscribe(BROADCAST_CHANNEL).await?;

        let (shutdown, rx) = watch::channel(false);
        info!(node = coordinator.node_id(), "dispatcher starting");
        let task = tokio::spawn(Self::run(coordinator, requests, broadcasts, rx));
        Ok(DispatcherHandle { shutdown, task })
    }

    async fn run(
        coordinator: Arc<TradeCoordinator>,
        mut requests: Subscription,
        mut broadcasts: Subscription,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut handlers = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!(node = coordinator.node_id(), "dispatcher received shutdown signal");
                    break;
                }
                message = requests.recv() => match message {
                    Some(raw) => Self::dispatch(&coordinator, &mut handlers, &raw),
                    None => {
                        warn!(node = coordinator.node_id(), "request subscription closed");
                        break;
                    }
                },
                message = broadcasts.recv() => match message {
                    Some(raw) => Self::on_broadcast(&coordinator, &mut handlers, &raw),
                    None => {
                        warn!(node = coordinator.node_id(), "broadcast subscription closed");
                        break;
                    }
                },
                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    log_join(joined);
                }
            }
        }

        drop(requests);
        drop(broadcasts);
        if !handlers.is_empty() {
            debug!(in_flight = handlers.len(), "draining request handlers");
        }
        while let Some(joined) = handlers.join_next().await {
            log_join(joined);
        }
        info!(node = coordinator.node_id(), "dispatcher stopped");
    }

    fn dispatch(coordinator: &Arc<TradeCoordinator>, handlers: &mut JoinSet<()>, raw: &str) {
        let envelope = match Envelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping undecodable request");
                return;
            }
        };
        debug!(kind = %envelope.kind, "request received");

        let coordinator = Arc::clone(coordinator);
        handlers.spawn(async move {
            let reply = match coordinator.handle(&envelope).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(kind = %envelope.kind, error = %e, "request handler failed");
                    match e.kind() {
                        ErrorKind::Rejected | ErrorKind::Conflict => Reply::Rejected,
                        ErrorKind::Timeout | ErrorKind::Failure => Reply::Failed,
                    }
                }
            };
            if let Some(correlation) = &envelope.correlation {
                if let Err(e) = coordinator.channel().reply(correlation, &reply).await {
                    warn!(correlation = %correlation.id, error = %e, "reply not published");
                }
            }
        });
    }

    fn on_broadcast(coordinator: &TradeCoordinator, handlers: &mut JoinSet<()>, raw: &str) {
        let Some(key) = parse_cleanup(raw) else {
            debug!("ignoring broadcast");
            return;
        };
        if !key.starts_with(CLEANUP_KEY_PREFIX) {
            warn!(key, "refusing cleanup of foreign key");
            return;
        }

        let transport = Arc::clone(coordinator.transport());
        let key = key.to_string();
        handlers.spawn(async move {
            match transport.delete(&key).await {
                Ok(removed) => debug!(key = %key, removed, "cleanup notice handled"),
                Err(e) => warn!(key = %key, error = %e, "cleanup failed, key will expire"),
            }
        });
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!(error = %e, "request handler panicked");
        }
    }
}

/// Controls a running dispatcher.
pub struct DispatcherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Stops the loop and waits for in-flight handlers.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "dispatcher task ended abnormally");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
