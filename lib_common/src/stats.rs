//! Aggregate and cross-series metrics over the full record set.
//!
//! Everything here is pure and synchronous. Nothing is cached: every call
//! recomputes from the slice it is given, so the numbers always describe the
//! store contents at request time.

use serde::Serialize;

use crate::model::SensorRecord;

/// Min/max/mean/population standard deviation of one numeric series.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

/// Battery voltage gets a signed trend (last minus first) instead of a
/// standard deviation.
#[derive(Debug, Clone, Serialize)]
pub struct BatterySummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub trend: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MotionSummary {
    pub total_detections: usize,
    /// Percentage of records with active motion, formatted to one decimal
    /// place ("30.0" for 3 of 10).
    pub detection_rate: String,
    /// Longest run of consecutive records with active motion.
    pub longest_activation: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrelationSummary {
    pub temperature_humidity: f64,
    pub temperature_battery: f64,
}

/// Snapshot of every metric the statistics endpoint reports.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_records: usize,
    pub temperature: SeriesSummary,
    pub humidity: SeriesSummary,
    pub battery: BatterySummary,
    pub motion: MotionSummary,
    pub correlations: CorrelationSummary,
}

/// Computes the full snapshot, or `None` when there are no records.
pub fn compute(records: &[SensorRecord]) -> Option<StatsSnapshot> {
    if records.is_empty() {
        return None;
    }

    let temperatures: Vec<f64> = records.iter().map(|r| r.temperature).collect();
    let humidities: Vec<f64> = records.iter().map(|r| r.humidity).collect();
    let batteries: Vec<f64> = records.iter().map(|r| r.battery_voltage).collect();

    let battery = {
        let summary = series_summary(&batteries);
        BatterySummary {
            min: summary.min,
            max: summary.max,
            mean: summary.mean,
            trend: batteries[batteries.len() - 1] - batteries[0],
        }
    };

    Some(StatsSnapshot {
        total_records: records.len(),
        temperature: series_summary(&temperatures),
        humidity: series_summary(&humidities),
        battery,
        motion: motion_summary(records),
        correlations: CorrelationSummary {
            temperature_humidity: correlation(&temperatures, &humidities),
            temperature_battery: correlation(&temperatures, &batteries),
        },
    })
}

/// Caller guarantees `values` is non-empty. Standard deviation is the
/// population form (divide by `n`), centered on the mean of this same pass.
fn series_summary(values: &[f64]) -> SeriesSummary {
    let n = values.len() as f64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for &value in values {
        min = min.min(value);
        max = max.max(value);
        sum += value;
    }
    let mean = sum / n;

    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;

    SeriesSummary {
        min,
        max,
        mean,
        std_dev: variance.sqrt(),
    }
}

fn motion_summary(records: &[SensorRecord]) -> MotionSummary {
    let total_detections = records.iter().filter(|r| r.motion_active()).count();
    let rate = total_detections as f64 / records.len() as f64 * 100.0;

    let mut longest_activation = 0usize;
    let mut run = 0usize;
    for record in records {
        if record.motion_active() {
            run += 1;
            longest_activation = longest_activation.max(run);
        } else {
            run = 0;
        }
    }

    MotionSummary {
        total_detections,
        detection_rate: format!("{:.1}", rate),
        longest_activation,
    }
}

/// Pearson correlation coefficient for two equal-length series, rounded to
/// three decimal places. Returns `0.0` whenever the denominator is zero
/// (either series has no variance), including the case where floating-point
/// cancellation drives the radicand negative.
fn correlation(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let sum_x: f64 = x.iter().sum();
    let sum_y: f64 = y.iter().sum();
    let sum_xy: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();
    let sum_x2: f64 = x.iter().map(|v| v * v).sum();
    let sum_y2: f64 = y.iter().map(|v| v * v).sum();

    let numerator = n * sum_xy - sum_x * sum_y;
    let denominator = ((n * sum_x2 - sum_x * sum_x) * (n * sum_y2 - sum_y * sum_y)).sqrt();
    if denominator == 0.0 || denominator.is_nan() {
        return 0.0;
    }

    round3(numerator / denominator)
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
