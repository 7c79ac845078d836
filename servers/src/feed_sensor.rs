//! Generates a CSV batch of synthetic sensor readings for the replay server.
//!
//! The output mimics what the field devices publish: a slightly noisy
//! temperature around room level, humidity in the 40-50% band, a battery
//! that drains a little with every reading, and a sparse motion column that
//! arrives in short bursts.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Parser;
use env_logger::Env;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(about = "Sensor CSV batch generator", version)]
struct FeedArgs {
    #[clap(long, default_value = "data/sensor_data.csv", help = "Where to write the CSV batch.")]
    output: PathBuf,

    #[clap(long, default_value_t = 48, help = "Number of rows to generate.")]
    count: usize,

    #[clap(long, default_value_t = 2, help = "Seconds between consecutive timestamps.")]
    interval_secs: i64,

    #[clap(long, help = "Seed for reproducible batches.")]
    seed: Option<u64>,

    #[clap(long, default_value = "esp32-room1", help = "Device id stamped on every row.")]
    device_id: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = FeedArgs::parse();

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let csv = render_batch(&args, Utc::now(), &mut rng);

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&args.output, csv)?;

    log::info!("Wrote {} rows to {}", args.count, args.output.display());
    Ok(())
}

fn render_batch(args: &FeedArgs, start: DateTime<Utc>, rng: &mut StdRng) -> String {
    let mut out =
        String::from("device_id,seq,timestamp,temperature,humidity,battery_voltage,motion\n");

    let mut battery = 4.2_f64;
    let mut active = false;

    for i in 0..args.count {
        let timestamp = (start + chrono::Duration::seconds(args.interval_secs * i as i64))
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        let temperature = 20.0 + rng.random::<f64>() * 5.0;
        let humidity = 40.0 + rng.random::<f64>() * 10.0;
        // Motion bursts: short runs of activity, mostly idle otherwise.
        active = if active {
            rng.random_bool(0.55)
        } else {
            rng.random_bool(0.15)
        };

        out.push_str(&format!(
            "{},{},{},{:.2},{:.2},{:.3},{}\n",
            args.device_id,
            i + 1,
            timestamp,
            temperature,
            humidity,
            battery,
            u8::from(active)
        ));

        battery = (battery - (0.002 + rng.random::<f64>() * 0.002)).max(3.0);
    }

    out
}
