//! Shared engine for the sensor replay service: record model, CSV ingestion,
//! the in-memory store, the replay/broadcast core, and the statistics engine.

#![forbid(unsafe_code)]

// Declare the modules to re-export
pub mod core;
pub mod ingest;
pub mod model;
pub mod stats;

// Re-export the primary types so callers can write `lib_common::RecordStore`
// without walking the module tree.
pub use crate::core::hub::{BroadcastHub, Subscription};
pub use crate::core::replay::{CursorPosition, ReplayCursor, ReplayScheduler};
pub use crate::core::store::{NoDataError, RecordStore};
pub use crate::ingest::{CsvFileSource, IngestError, RecordSource};
pub use crate::model::{FrameKind, LiveReading, SensorRecord, StreamFrame};
pub use crate::stats::StatsSnapshot;
