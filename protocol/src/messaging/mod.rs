//! # Inter-node Messaging
//!
//! Nodes talk to each other in two ways:
//!
//! - **Correlated request/reply.** [`NodeChannel::send_and_wait`] publishes
//!   an [`Envelope`] on the target's request channel and waits, bounded by a
//!   timeout, for the reply carrying the same correlation id on a private
//!   reply channel.
//! - **Fire-and-forget.** Broadcast cleanup notices and event notices.
//!   Nobody acknowledges them and losing one is harmless.

pub mod channel;
pub mod envelope;

pub use channel::{ChannelError, NodeChannel};
pub use envelope::{Correlation, Envelope, EnvelopeError, MessageKind, Reply};
