//! Offline replay of captured inbound batches.
//!
//! Each non-empty line of a capture is `{"nowMs": <unix ms>, "batch": [...]}`.
//! Lines starting with `#` are comments.

use std::io::BufRead;

use anyhow::Context;
use realm_client::effects::Effects;
use realm_client::session::{BatchReport, SessionController};
use realm_shared::config::ClientConfig;
use realm_shared::net::Keys;
use realm_shared::pool::Role;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptureLine {
    now_ms: i64,
    batch: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct PoolUsage {
    pub role: Role,
    pub capacity: usize,
    pub peak: usize,
    pub in_use: usize,
}

/// What a capture did to a fresh session.
#[derive(Debug, Serialize)]
pub struct Summary {
    pub batches: usize,
    pub dropped_batches: usize,
    pub records: BatchReport,
    pub inputs_sent: usize,
    pub events: usize,
    pub players: usize,
    pub enemies: usize,
    pub pools: Vec<PoolUsage>,
}

/// Feeds every captured batch through a connected controller, ticking once
/// per line with the gap to the previous line as frame time. Pool usage is
/// read before the session is shut down.
pub fn replay(input: impl BufRead, cfg: ClientConfig) -> anyhow::Result<Summary> {
    let caps = cfg.pools;
    let mut session = SessionController::with_effects(
        cfg,
        Effects::with_seed(caps.vfx + caps.text + caps.flash, 0),
    );
    session.begin_connect()?;
    session.on_connected()?;

    let mut totals = BatchReport::default();
    let mut batches = 0;
    let mut dropped_batches = 0;
    let mut inputs_sent = 0;
    let mut events = 0;
    let mut last_now: Option<i64> = None;

    for (n, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("read line {}", n + 1))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry: CaptureLine =
            serde_json::from_str(line).with_context(|| format!("parse line {}", n + 1))?;
        let payload = serde_json::to_vec(&entry.batch)?;

        batches += 1;
        match session.on_payload(&payload, entry.now_ms) {
            Ok(report) => totals.merge(&report),
            Err(e) => {
                dropped_batches += 1;
                warn!(line = n + 1, error = %e, "Batch dropped");
            }
        }

        let dt = last_now.map_or(0.0, |t| (entry.now_ms - t).max(0) as f64);
        last_now = Some(entry.now_ms);
        inputs_sent += session.tick(entry.now_ms, dt, Keys::empty()).len();
        events += session.drain_events().len();
    }

    let pools = Role::ALL
        .iter()
        .map(|&role| PoolUsage {
            role,
            capacity: session.pool().capacity(role),
            peak: session.pool().peak(role),
            in_use: session.pool().in_use(role),
        })
        .collect();
    let summary = Summary {
        batches,
        dropped_batches,
        records: totals,
        inputs_sent,
        events,
        players: session.players().len(),
        enemies: session.enemies().len(),
        pools,
    };
    session.shutdown();
    Ok(summary)
}
