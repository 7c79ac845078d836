//! The in-memory record store: one ordered, immutable-after-load batch of
//! sensor observations that every other component reads.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;

use crate::ingest::{normalize_row, IngestError, RecordSource};
use crate::model::SensorRecord;

/// Returned by every read path invoked while the store has nothing to serve.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("No data available")]
pub struct NoDataError;

/// Ordered sequence of normalized records plus a load-completion flag.
///
/// The batch is published as a whole: `load` builds the complete vector
/// first and swaps it in under the write lock, so concurrent readers see
/// either the previous batch or the new one, never a partial sequence.
pub struct RecordStore {
    records: RwLock<Arc<Vec<SensorRecord>>>,
    loaded: AtomicBool,
    next_id: AtomicU64,
    load_guard: Mutex<()>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Arc::new(Vec::new())),
            loaded: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            load_guard: Mutex::new(()),
        }
    }

    /// Replaces the whole batch with the source contents.
    ///
    /// Prior contents are cleared first; a failing source therefore leaves
    /// an empty, unloaded store. Malformed rows are dropped here and only
    /// show up as a smaller final count. Returns the number of records kept.
    pub fn load(&self, source: &dyn RecordSource) -> Result<usize, IngestError> {
        // One load at a time; reloads serialize behind this guard.
        let _guard = self.load_guard.lock().expect("record store load lock poisoned");

        self.loaded.store(false, Ordering::SeqCst);
        *self.records.write().expect("record store lock poisoned") = Arc::new(Vec::new());

        let rows = source.fetch_rows()?;
        let total = rows.len();

        let mut records = Vec::with_capacity(total);
        for row in &rows {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if let Some(record) = normalize_row(row, id) {
                records.push(record);
            }
        }

        let kept = records.len();
        if kept < total {
            log::warn!(
                "Dropped {} malformed row(s) out of {} from {}",
                total - kept,
                total,
                source.description()
            );
        }

        *self.records.write().expect("record store lock poisoned") = Arc::new(records);
        self.loaded.store(true, Ordering::SeqCst);
        log::info!("Loaded {} record(s) from {}", kept, source.description());
        Ok(kept)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Cheap read-only view of the current batch, possibly empty. Components
    /// that handle the empty case themselves use this.
    pub fn snapshot(&self) -> Arc<Vec<SensorRecord>> {
        Arc::clone(&self.records.read().expect("record store lock poisoned"))
    }

    /// The full batch, or [`NoDataError`] when there is nothing to serve.
    pub fn all(&self) -> Result<Arc<Vec<SensorRecord>>, NoDataError> {
        let records = self.snapshot();
        if records.is_empty() {
            return Err(NoDataError);
        }
        Ok(records)
    }

    /// The last `limit` records in stored order.
    pub fn recent(&self, limit: usize) -> Result<Vec<SensorRecord>, NoDataError> {
        let records = self.all()?;
        let start = records.len().saturating_sub(limit);
        Ok(records[start..].to_vec())
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}
