//! # Replay Engine Core
//!
//! The stateful heart of the sensor replay service. Everything that owns or
//! mutates shared state lives here; the surrounding crates only reach it
//! through the types re-exported below.
//!
//! ## Core Components:
//!
//! - **`store`**: the in-memory record store. It is loaded once at startup
//!   from a `RecordSource` and treated as immutable afterwards; readers share
//!   cheap `Arc` snapshots instead of holding locks across their work.
//!
//! - **`replay`**: the cyclic cursor over the store plus the scheduler task
//!   that advances it on a fixed cadence and hands each new position to the
//!   broadcast hub.
//!
//! - **`hub`**: the broadcast fan-out. It keeps the subscriber registry,
//!   seeds every new subscriber with the current position, and prunes
//!   channels whose receiving half has gone away.

/// In-memory record store with single-shot load and shared snapshots.
pub mod store;
/// Cyclic replay cursor and the timer task driving it.
pub mod replay;
/// Subscriber registry and frame fan-out.
pub mod hub;

// --- Public API Re-exports ---
// Make the primary structs from the core modules directly accessible.
pub use hub::{BroadcastHub, Subscription};
pub use replay::{CursorPosition, ReplayCursor, ReplayScheduler};
pub use store::{NoDataError, RecordStore};
