//! Interpolation.
//!
//! The server sends position samples whenever it gets round to it. The
//! client renders every entity at `now - delay`, between the two samples that
//! bracket that instant. A fixed delay larger than the usual inter-update
//! jitter means a bracketing pair is normally available.
//!
//! When no pair brackets the target (updates stalled, or the buffer is all in
//! the future) the entity freezes at its newest sample. There is no velocity
//! extrapolation.

use std::collections::VecDeque;

use realm_shared::math::Vec2;

/// Reference render delay.
pub const DEFAULT_DELAY_MS: i64 = 110;

/// One reported position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub x: f32,
    pub y: f32,
    /// Server time, unix milliseconds.
    pub timestamp: i64,
}

impl PositionSample {
    pub fn new(x: f32, y: f32, timestamp: i64) -> Self {
        Self { x, y, timestamp }
    }

    pub fn pos(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Bounded, oldest-first sample history for one entity.
#[derive(Debug, Clone)]
pub struct PositionBuffer {
    samples: VecDeque<PositionSample>,
    max: usize,
}

impl PositionBuffer {
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            samples: VecDeque::with_capacity(max + 1),
            max,
        }
    }

    /// Appends a sample, evicting the oldest ones beyond capacity.
    pub fn push(&mut self, sample: PositionSample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.max {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&PositionSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionSample> {
        self.samples.iter()
    }

    /// Render position for `now_ms`; see [`interpolate`].
    pub fn sample_at(&self, now_ms: i64, delay_ms: i64) -> Option<Vec2> {
        interpolate(&self.samples, now_ms, delay_ms)
    }
}

/// Render position for `now_ms` from an oldest-first sample sequence.
///
/// - no samples: `None`
/// - one sample: that sample
/// - otherwise: lerp inside the first pair bracketing `now_ms - delay_ms`,
///   or the newest sample when nothing brackets it
pub fn interpolate(samples: &VecDeque<PositionSample>, now_ms: i64, delay_ms: i64) -> Option<Vec2> {
    let newest = samples.back()?;
    if samples.len() == 1 {
        return Some(newest.pos());
    }

    let target = now_ms - delay_ms;
    let bracket = samples
        .iter()
        .zip(samples.iter().skip(1))
        .find(|(older, newer)| older.timestamp <= target && target <= newer.timestamp);

    let Some((older, newer)) = bracket else {
        return Some(newest.pos());
    };

    let span = newer.timestamp - older.timestamp;
    let alpha = if span <= 0 {
        1.0
    } else {
        ((target - older.timestamp) as f64 / span as f64).clamp(0.0, 1.0)
    };
    Some(older.pos().lerp(newer.pos(), alpha as f32))
}
