//! Configuration system.
//!
//! Loads client configuration from JSON strings/files. Every field has a
//! default so a partial file (or none at all) is valid.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::pool::Role;

/// Root client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address, e.g. `127.0.0.1:8080`.
    pub server_addr: String,
    /// Entities render at `now - interpolation_delay_ms`.
    pub interpolation_delay_ms: i64,
    /// Maximum samples kept per entity.
    pub position_buffer_len: usize,
    /// Pool-acquiring entity births allowed per inbound batch.
    pub admission_limit: usize,
    /// Outbound input cadence.
    pub input_step_ms: f64,
    /// Host frame rate used by the client binary.
    pub frame_hz: u32,
    pub pools: PoolCapacities,
    pub viewport: ViewportSize,
    /// Width and height of one zone in world pixels.
    pub zone_extent_px: f32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8080".to_string(),
            interpolation_delay_ms: 110,
            position_buffer_len: 10,
            admission_limit: 20,
            input_step_ms: 100.0,
            frame_hz: 60,
            pools: PoolCapacities::default(),
            viewport: ViewportSize::default(),
            zone_extent_px: 256.0 * 32.0,
        }
    }
}

impl ClientConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }
}

/// Fixed slot counts for each render pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolCapacities {
    pub body: usize,
    pub shadow: usize,
    pub status_bar: usize,
    pub flash: usize,
    pub vfx: usize,
    pub text: usize,
}

impl Default for PoolCapacities {
    fn default() -> Self {
        Self {
            body: 1000,
            shadow: 1000,
            status_bar: 1000,
            flash: 1000,
            vfx: 300,
            text: 500,
        }
    }
}

impl PoolCapacities {
    /// Same capacity for every role. Handy in tests.
    pub fn uniform(n: usize) -> Self {
        Self {
            body: n,
            shadow: n,
            status_bar: n,
            flash: n,
            vfx: n,
            text: n,
        }
    }

    pub fn for_role(&self, role: Role) -> usize {
        match role {
            Role::Body => self.body,
            Role::Shadow => self.shadow,
            Role::StatusBar => self.status_bar,
            Role::Flash => self.flash,
            Role::Vfx => self.vfx,
            Role::Text => self.text,
        }
    }
}

/// Visible area in world pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportSize {
    pub width: f32,
    pub height: f32,
}

impl Default for ViewportSize {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1200.0,
        }
    }
}
