use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Current UTC time as an ISO-8601 string, the format every wire timestamp
/// in this crate uses.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One normalized sensor observation. Built once by the ingestion layer and
/// immutable afterwards; a reload replaces the whole batch, never a single
/// record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorRecord {
    /// Unique across the process lifetime, never reused.
    pub id: u64,
    /// Source-provided timestamp, or the capture time if the source had none.
    pub timestamp: String,
    pub temperature: f64,
    pub humidity: f64,
    pub battery_voltage: f64,
    /// Integer-valued in practice; anything above zero counts as active.
    pub motion: f64,
}

impl SensorRecord {
    pub fn motion_active(&self) -> bool {
        self.motion > 0.0
    }
}

/// Payload pushed to live subscribers and served by the current-data route:
/// the sensor fields plus a fresh delivery timestamp and the replay position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveReading {
    pub id: u64,
    pub timestamp: String,
    pub temperature: f64,
    pub humidity: f64,
    pub battery_voltage: f64,
    pub motion: f64,
    pub current_index: usize,
    pub total_records: usize,
}

impl LiveReading {
    pub fn new(record: &SensorRecord, index: usize, total: usize) -> Self {
        Self {
            id: record.id,
            timestamp: now_iso(),
            temperature: record.temperature,
            humidity: record.humidity,
            battery_voltage: record.battery_voltage,
            motion: record.motion,
            current_index: index,
            total_records: total,
        }
    }
}

/// The two envelope kinds a subscriber can receive. `InitialData` goes to a
/// newly joined subscriber exactly once; `RealtimeUpdate` goes to everyone
/// on every replay tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    InitialData,
    RealtimeUpdate,
}

/// The tagged envelope pushed through the broadcast hub.
#[derive(Debug, Clone, Serialize)]
pub struct StreamFrame {
    pub r#type: FrameKind,
    pub data: LiveReading,
}

impl StreamFrame {
    pub fn initial(data: LiveReading) -> Self {
        Self {
            r#type: FrameKind::InitialData,
            data,
        }
    }

    pub fn update(data: LiveReading) -> Self {
        Self {
            r#type: FrameKind::RealtimeUpdate,
            data,
        }
    }
}
