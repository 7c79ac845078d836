//! # Realtime Stream Live Test
//!
//! Connects to a running sensor replay server and verifies the event stream
//! protocol end to end: exactly one initial_data frame, then realtime_update
//! frames advancing the replay index one step per tick.

use anyhow::{anyhow, Result};
use clap::Parser;
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Parser, Debug)]
#[clap(about = "Live probe for the sensor replay server's event stream", version)]
struct ProbeArgs {
    #[clap(long, default_value = "http://localhost:3000", help = "Base URL of the running server.")]
    base_url: String,

    #[clap(long, default_value_t = 3, help = "Number of realtime updates to wait for.")]
    updates: usize,
}

/// Executes the live stream probe.
///
/// // Statement: Exits non-zero as soon as the server breaks the protocol.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = ProbeArgs::parse();

    println!("[*] Checking {}/api/all-data ...", args.base_url);
    let all: Value = reqwest::get(format!("{}/api/all-data", args.base_url))
        .await?
        .json()
        .await?;
    let total = all.as_array().map(|records| records.len() as u64).unwrap_or(0);
    println!("[INFO] Server holds {} records", total);

    if total == 0 {
        // // Statement: An empty store streams nothing; probing it would only time out.
        eprintln!("[ERROR] Server reports no data; load a CSV batch before probing the stream.");
        std::process::exit(1);
    }

    println!("[*] Checking {}/api/statistics ...", args.base_url);
    let statistics: Value = reqwest::get(format!("{}/api/statistics", args.base_url))
        .await?
        .json()
        .await?;
    println!("{}", serde_json::to_string_pretty(&statistics)?);

    println!("[*] Opening {}/api/realtime-stream ...", args.base_url);
    let mut response = reqwest::get(format!("{}/api/realtime-stream", args.base_url)).await?;
    let mut buffer = String::new();

    let first = next_event(&mut response, &mut buffer).await?;
    if first["type"] != "initial_data" {
        eprintln!("\n[ERROR] Expected an initial_data frame first, got:");
        eprintln!(">>> {}", first);
        std::process::exit(1);
    }
    let mut last_index = first["data"]["current_index"]
        .as_u64()
        .ok_or_else(|| anyhow!("initial frame is missing current_index"))?;
    println!("[INFO] initial_data at index {} of {}", last_index, total);

    for n in 1..=args.updates {
        let frame = next_event(&mut response, &mut buffer).await?;
        let index = frame["data"]["current_index"]
            .as_u64()
            .ok_or_else(|| anyhow!("update frame is missing current_index"))?;

        // // Statement: Every update must advance the cycle by exactly one.
        let expected = (last_index + 1) % total;
        if frame["type"] != "realtime_update" || index != expected {
            eprintln!("\n[ERROR] Protocol violation on update {}:", n);
            eprintln!(">>> expected realtime_update at index {}, got: {}", expected, frame);
            std::process::exit(1);
        }
        println!("[INFO] realtime_update {}/{}: index {}", n, args.updates, index);
        last_index = index;
    }

    println!("[*] Posting a control acknowledgment request ...");
    let client = reqwest::Client::new();
    let ack: Value = client
        .post(format!("{}/api/realtime-control", args.base_url))
        .json(&serde_json::json!({"action": "probe", "speed": 2000}))
        .send()
        .await?
        .json()
        .await?;
    println!("[INFO] Control response: {}", ack);

    println!("\n[SUCCESS] Stream protocol verified ({} updates observed).", args.updates);
    Ok(())
}

/// Buffers the chunked response body until one full `data: ...` event is
/// available, then returns its JSON payload.
async fn next_event(response: &mut reqwest::Response, buffer: &mut String) -> Result<Value> {
    let event = timeout(Duration::from_secs(30), async {
        loop {
            if let Some(end) = buffer.find("\n\n") {
                let event: String = buffer.drain(..end + 2).collect();
                return Ok::<String, anyhow::Error>(event);
            }
            match response.chunk().await? {
                Some(chunk) => buffer.push_str(std::str::from_utf8(&chunk)?),
                None => return Err(anyhow!("stream closed by the server")),
            }
        }
    })
    .await
    .map_err(|_| anyhow!("timed out waiting for a stream event"))??;

    let payload: String = event
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .collect();
    Ok(serde_json::from_str(&payload)?)
}
