//! Role-agnostic core of the driveway lighting mesh.
//!
//! The core is a step function: the application samples its monotonic clock,
//! pushes raw radio callbacks into the shared queues, and drives one loop
//! iteration at a time. `Stack::poll` runs admission, reliable delivery and
//! routing; `Router::tick` runs adapter housekeeping; `Heartbeat::tick`
//! handles liveness and time sync. Nothing in here blocks, allocates or
//! panics on protocol data.
//!
//! Ownership follows the component boundaries: [`peers::PeerDb`] is the only
//! writer to persisted peer state and the radio peer list, [`stack::Stack`]
//! owns the await/ack rings and per-MAC sequence windows, adapters own their
//! role state, and the [`router::Router`] holds non-owning adapter
//! references.

#![cfg_attr(not(test), no_std)]

pub mod adapters;
pub mod config;
pub mod heartbeat;
pub mod peers;
pub mod queue;
pub mod router;
pub mod stack;

pub use config::StackCfg;
pub use heartbeat::Heartbeat;
pub use peers::{AddOutcome, Peer, PeerDb, PeerDbError};
pub use queue::{AckEvent, RxItem, RxQueue, TxDone, TxDoneQueue};
pub use router::{RouteResult, Router};
pub use stack::{RxObserver, Stack};
