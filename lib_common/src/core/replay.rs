//! Cyclic replay over the record store: a single cursor advanced one record
//! per tick by a repeating scheduler.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::core::hub::BroadcastHub;
use crate::core::store::{NoDataError, RecordStore};
use crate::model::{LiveReading, SensorRecord, StreamFrame};

/// One consistent view of the cursor: the record together with the index it
/// was read at and the store size at that moment. Taken under a single lock
/// acquisition so callers can never pair an index with the wrong total.
#[derive(Debug, Clone)]
pub struct CursorPosition {
    pub record: SensorRecord,
    pub index: usize,
    pub total: usize,
}

impl CursorPosition {
    pub fn reading(&self) -> LiveReading {
        LiveReading::new(&self.record, self.index, self.total)
    }
}

/// The single index marking the "current" record during replay.
///
/// Advancing wraps at the end of the batch, so the cursor cycles through the
/// dataset forever. All operations are no-ops or [`NoDataError`] against an
/// empty store.
pub struct ReplayCursor {
    store: Arc<RecordStore>,
    index: Mutex<usize>,
}

impl ReplayCursor {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self {
            store,
            index: Mutex::new(0),
        }
    }

    /// The record at the current index, without advancing.
    pub fn current(&self) -> Result<CursorPosition, NoDataError> {
        let index = self.index.lock().expect("replay cursor lock poisoned");
        let records = self.store.snapshot();
        if records.is_empty() {
            return Err(NoDataError);
        }
        // A reload may have shrunk the batch since the last advance.
        let at = *index % records.len();
        Ok(CursorPosition {
            record: records[at].clone(),
            index: at,
            total: records.len(),
        })
    }

    /// Moves the cursor forward exactly one position, wrapping at the end,
    /// and returns the newly current record.
    pub fn advance(&self) -> Result<CursorPosition, NoDataError> {
        let mut index = self.index.lock().expect("replay cursor lock poisoned");
        let records = self.store.snapshot();
        if records.is_empty() {
            return Err(NoDataError);
        }
        *index = (*index + 1) % records.len();
        Ok(CursorPosition {
            record: records[*index].clone(),
            index: *index,
            total: records.len(),
        })
    }

    pub fn index(&self) -> usize {
        *self.index.lock().expect("replay cursor lock poisoned")
    }
}

/// Repeating timer that drives the replay: each tick advances the cursor by
/// one and fans the new position out through the hub.
///
/// `run` consumes the scheduler, so a process gets exactly one driving task;
/// tests call [`tick`](Self::tick) directly instead of waiting on the clock.
pub struct ReplayScheduler {
    cursor: Arc<ReplayCursor>,
    hub: Arc<BroadcastHub>,
    period: Duration,
}

impl ReplayScheduler {
    pub fn new(cursor: Arc<ReplayCursor>, hub: Arc<BroadcastHub>, period: Duration) -> Self {
        Self { cursor, hub, period }
    }

    /// One replay step: advance and broadcast. Skips silently when the store
    /// has nothing to replay.
    pub fn tick(&self) {
        match self.cursor.advance() {
            Ok(position) => {
                self.hub.broadcast(StreamFrame::update(position.reading()));
            }
            Err(NoDataError) => {}
        }
    }

    /// Drives [`tick`](Self::tick) on the configured cadence until the
    /// shutdown signal arrives. The first tick fires one full period after
    /// start, not immediately.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!(
            "Replay scheduler started ({} ms cadence)",
            self.period.as_millis()
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    log::info!("Replay scheduler received shutdown signal.");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{IngestError, RawRow, RecordSource};

    struct StaticSource(usize);

    impl RecordSource for StaticSource {
        fn description(&self) -> String {
            "static test source".to_string()
        }

        fn fetch_rows(&self) -> Result<Vec<RawRow>, IngestError> {
            Ok((0..self.0)
                .map(|i| {
                    let mut row = RawRow::new();
                    row.insert("temperature".to_string(), format!("{}.0", 20 + i));
                    row.insert("humidity".to_string(), "40.0".to_string());
                    row
                })
                .collect())
        }
    }

    fn loaded_store(n: usize) -> Arc<RecordStore> {
        let store = Arc::new(RecordStore::new());
        store.load(&StaticSource(n)).unwrap();
        store
    }

    #[test]
    fn cursor_starts_at_the_first_record() {
        let cursor = ReplayCursor::new(loaded_store(3));
        let position = cursor.current().unwrap();
        assert_eq!(position.index, 0);
        assert_eq!(position.total, 3);
        assert_eq!(position.record.temperature, 20.0);
    }

    #[test]
    fn advance_wraps_and_returns_to_the_start() {
        let cursor = ReplayCursor::new(loaded_store(4));

        for step in 1..=3 {
            assert_eq!(cursor.advance().unwrap().index, step);
        }
        // Fourth advance wraps to index 0.
        let wrapped = cursor.advance().unwrap();
        assert_eq!(wrapped.index, 0);
        assert_eq!(wrapped.record.temperature, 20.0);
    }

    #[test]
    fn k_advances_land_on_index_k_mod_size() {
        let cursor = ReplayCursor::new(loaded_store(5));
        for _ in 0..13 {
            cursor.advance().unwrap();
        }
        assert_eq!(cursor.index(), 13 % 5);
    }

    #[test]
    fn full_cycle_restores_the_original_record() {
        let cursor = ReplayCursor::new(loaded_store(5));
        let before = cursor.current().unwrap();
        for _ in 0..5 {
            cursor.advance().unwrap();
        }
        let after = cursor.current().unwrap();
        assert_eq!(before.index, after.index);
        assert_eq!(before.record.id, after.record.id);
    }

    #[test]
    fn empty_store_reads_are_no_data() {
        let cursor = ReplayCursor::new(Arc::new(RecordStore::new()));
        assert_eq!(cursor.current().unwrap_err(), NoDataError);
        assert_eq!(cursor.advance().unwrap_err(), NoDataError);
    }

    #[test]
    fn cursor_position_survives_a_shrinking_reload() {
        let store = loaded_store(5);
        let cursor = ReplayCursor::new(store.clone());
        for _ in 0..4 {
            cursor.advance().unwrap();
        }

        store.load(&StaticSource(2)).unwrap();
        // Stored index 4 clamps into the new, smaller batch.
        let position = cursor.current().unwrap();
        assert!(position.index < 2);
        assert_eq!(position.total, 2);
    }

    #[tokio::test]
    async fn tick_on_an_empty_store_is_silent() {
        let store = Arc::new(RecordStore::new());
        let cursor = Arc::new(ReplayCursor::new(store));
        let hub = Arc::new(BroadcastHub::new(cursor.clone()));
        let scheduler = ReplayScheduler::new(cursor.clone(), hub.clone(), Duration::from_millis(10));

        let mut subscription = hub.subscribe();
        scheduler.tick();

        assert!(subscription.try_recv().is_none());
        assert_eq!(cursor.index(), 0);
    }

    #[tokio::test]
    async fn ticks_broadcast_cycling_updates() {
        let cursor = Arc::new(ReplayCursor::new(loaded_store(3)));
        let hub = Arc::new(BroadcastHub::new(cursor.clone()));
        let scheduler = ReplayScheduler::new(cursor.clone(), hub.clone(), Duration::from_millis(10));

        let mut subscription = hub.subscribe();
        // Drop the initial snapshot; the ticks are what this test is about.
        let initial = subscription.recv().await.unwrap();
        assert_eq!(initial.data.current_index, 0);

        for expected in [1, 2, 0, 1] {
            scheduler.tick();
            let frame = subscription.recv().await.unwrap();
            assert_eq!(frame.data.current_index, expected);
            assert_eq!(frame.data.total_records, 3);
        }
    }
}
