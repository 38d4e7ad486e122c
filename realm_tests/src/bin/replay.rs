//! Batch replay tool.
//!
//! Feeds a capture of inbound batches through a session controller with no
//! network involved and prints what happened: records applied, entities
//! created/removed, culls, input messages the cadence would have sent and the
//! peak usage of every render pool.
//!
//! Usage:
//!   cargo run -p realm_tests --bin replay -- <capture.jsonl | -> [--config client.json] [--json]

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use anyhow::Context;
use realm_shared::config::ClientConfig;
use realm_tests::replay::replay;

struct Args {
    capture: String,
    config: Option<PathBuf>,
    json: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut capture = None;
    let mut config = None;
    let mut json = false;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                config = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--json" => {
                json = true;
                i += 1;
            }
            other => {
                capture = Some(other.to_string());
                i += 1;
            }
        }
    }
    Ok(Args {
        capture: capture.context("usage: replay <capture.jsonl | -> [--config file] [--json]")?,
        config,
        json,
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(io::stderr)
        .init();

    let args = parse_args()?;
    let cfg = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };

    let input: Box<dyn BufRead> = if args.capture == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(&args.capture).with_context(|| format!("open {}", args.capture))?;
        Box::new(BufReader::new(file))
    };

    let summary = replay(input, cfg)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let totals = &summary.records;
    println!("Batches:   {} ({} dropped)", summary.batches, summary.dropped_batches);
    println!(
        "Records:   {} ({} malformed, {} unrecognized)",
        totals.records, totals.malformed, totals.unrecognized
    );
    println!(
        "Entities:  {} created, {} updated, {} removed, {} skipped, {} culled",
        totals.created, totals.updated, totals.removed, totals.skipped, totals.culled
    );
    println!("Tracked:   {} players, {} enemies", summary.players, summary.enemies);
    println!("Inputs:    {}", summary.inputs_sent);
    println!("Events:    {}", summary.events);
    println!("Pools:");
    for p in &summary.pools {
        println!(
            "  {:<10} peak {:>5} / {:<5} in use {}",
            format!("{:?}", p.role),
            p.peak,
            p.capacity,
            p.in_use
        );
    }
    Ok(())
}
