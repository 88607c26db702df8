//! # Trade Coordination
//!
//! Everything that decides a trade's fate.
//!
//! ```text
//! types.rs       : TradeId, TradeState machine, TradeRequest record
//! lock.rs        : Store-backed asset locks with TTL
//! registry.rs    : Per-node trade map + outbound markers (CAS transitions)
//! coordinator.rs : Request / accept / deny / expire + inbound handlers
//! sweep.rs       : Periodic expiry task
//! events.rs      : Outcome notifications to the host
//! error.rs       : TradeError and its broad ErrorKind
//! ```

pub mod coordinator;
pub mod error;
pub mod events;
pub mod lock;
pub mod registry;
pub mod sweep;
pub mod types;

pub use coordinator::TradeCoordinator;
pub use error::{ErrorKind, TradeError};
pub use events::{NoopListener, RecordingListener, TradeEvent, TradeListener};
pub use lock::{AssetLockKey, LockManager};
pub use registry::{RegistryError, TradeRegistry};
pub use sweep::{ExpirySweeper, SweeperHandle};
pub use types::{TradeId, TradeRequest, TradeState};
