//! Transient visuals.
//!
//! Short-lived effects driven by the frame clock: floating damage numbers,
//! hit-flash pulses, ability circles, telegraph warnings and level-up text.
//! Every effect animates a pooled handle. Effects that own their handle give
//! it back to the pool when they finish; a flash pulse only borrows the
//! entity's flash handle and leaves it at alpha 0.
//!
//! If the handle an effect animates has been released and reused meanwhile
//! (entity culled mid-pulse), the pool rejects the stale handle and the
//! effect is dropped.

use rand::{rngs::StdRng, Rng, SeedableRng};
use realm_shared::{
    math::Vec2,
    pool::{Handle, RenderPool, Role},
};
use tracing::debug;

pub const DAMAGE_TEXT_MS: i64 = 1000;
pub const DAMAGE_TEXT_RISE: f32 = 20.0;
pub const DAMAGE_TEXT_DRIFT: f32 = 16.0;
pub const FLASH_MS: i64 = 250;
pub const ABILITY_CIRCLE_MS: i64 = 250;
pub const TELEGRAPH_FADE_MS: i64 = 500;
pub const LEVEL_TEXT_MS: i64 = 3000;

const TELEGRAPH_COLOR: u32 = 0x7a09fa;
const TELEGRAPH_IMPACT_COLOR: u32 = 0xea323c;
const LEVEL_TEXT_COLOR: u32 = 0xffffff;

#[derive(Debug, Clone, Copy)]
enum Kind {
    DamageText { start: Vec2, drift: f32 },
    Flash,
    AbilityCircle,
    Telegraph { warn_ms: i64 },
    LevelText { start: Vec2 },
}

#[derive(Debug, Clone, Copy)]
struct Effect {
    handle: Handle,
    started_ms: i64,
    duration_ms: i64,
    kind: Kind,
}

impl Effect {
    /// Handle goes back to the pool when the effect ends.
    fn owns_handle(&self) -> bool {
        !matches!(self.kind, Kind::Flash)
    }
}

/// Active transient effects.
pub struct Effects {
    active: Vec<Effect>,
    rng: StdRng,
}

impl Effects {
    pub fn new(capacity: usize) -> Self {
        Self {
            active: Vec::with_capacity(capacity),
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic drift, for tests and replays.
    pub fn with_seed(capacity: usize, seed: u64) -> Self {
        Self {
            active: Vec::with_capacity(capacity),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Floating damage number rising from `at`. Returns `false` when the
    /// text pool is exhausted.
    pub fn damage_text(
        &mut self,
        pool: &mut RenderPool,
        at: Vec2,
        amount: i64,
        color: u32,
        now_ms: i64,
    ) -> bool {
        let Some(handle) = pool.acquire(Role::Text) else {
            debug!(amount, "No text slot for damage number");
            return false;
        };
        if let Some(v) = pool.get_mut(handle) {
            v.position = at;
            v.set_text(&amount.to_string());
            v.color = color;
            v.font_px = 24;
        }
        let drift = self.rng.gen_range(-1.0f32..=1.0) * DAMAGE_TEXT_DRIFT;
        self.push(handle, now_ms, DAMAGE_TEXT_MS, Kind::DamageText { start: at, drift });
        true
    }

    /// Alpha 0 → 1 → 0 pulse on an entity's flash overlay. Restarts a pulse
    /// already running on the same handle.
    pub fn flash(&mut self, pool: &mut RenderPool, handle: Handle, now_ms: i64) {
        if !pool.is_live(handle) {
            return;
        }
        self.active.retain(|e| e.handle != handle);
        self.push(handle, now_ms, FLASH_MS, Kind::Flash);
    }

    /// Ability impact circle fading from 0.5 to 0.2.
    pub fn ability_circle(
        &mut self,
        pool: &mut RenderPool,
        at: Vec2,
        radius: f32,
        color: u32,
        now_ms: i64,
    ) -> bool {
        let Some(handle) = pool.acquire(Role::Vfx) else {
            debug!("No vfx slot for ability circle");
            return false;
        };
        if let Some(v) = pool.get_mut(handle) {
            v.position = at;
            v.radius = radius;
            v.color = color;
            v.alpha = 0.5;
        }
        self.push(handle, now_ms, ABILITY_CIRCLE_MS, Kind::AbilityCircle);
        true
    }

    /// Area warning: fades in over `warn_ms`, then flips to the impact
    /// colour and fades out.
    pub fn telegraph(
        &mut self,
        pool: &mut RenderPool,
        at: Vec2,
        radius: f32,
        warn_ms: i64,
        now_ms: i64,
    ) -> bool {
        let Some(handle) = pool.acquire(Role::Vfx) else {
            debug!("No vfx slot for telegraph");
            return false;
        };
        if let Some(v) = pool.get_mut(handle) {
            v.position = at;
            v.radius = radius;
            v.color = TELEGRAPH_COLOR;
            v.alpha = 0.0;
            v.depth = 901;
        }
        let warn_ms = warn_ms.max(0);
        self.push(
            handle,
            now_ms,
            warn_ms + TELEGRAPH_FADE_MS,
            Kind::Telegraph { warn_ms },
        );
        true
    }

    /// "Level Up!" plus the attack bonus line, stacked above `at`.
    pub fn level_up_text(&mut self, pool: &mut RenderPool, at: Vec2, now_ms: i64) {
        let lines = [("Level Up!", 48, 0.0), ("ATK +10%", 24, 40.0)];
        for (text, font_px, dy) in lines {
            let Some(handle) = pool.acquire(Role::Text) else {
                debug!("No text slot for level up");
                return;
            };
            let start = at.offset(0.0, dy);
            if let Some(v) = pool.get_mut(handle) {
                v.position = start;
                v.set_text(text);
                v.color = LEVEL_TEXT_COLOR;
                v.font_px = font_px;
            }
            self.push(handle, now_ms, LEVEL_TEXT_MS, Kind::LevelText { start });
        }
    }

    fn push(&mut self, handle: Handle, now_ms: i64, duration_ms: i64, kind: Kind) {
        self.active.push(Effect {
            handle,
            started_ms: now_ms,
            duration_ms,
            kind,
        });
    }

    /// Steps every effect to `now_ms`, finishing the expired ones.
    pub fn advance(&mut self, now_ms: i64, pool: &mut RenderPool) {
        self.active.retain(|e| {
            let elapsed = (now_ms - e.started_ms).max(0);
            let done = elapsed >= e.duration_ms;
            let t = if e.duration_ms <= 0 {
                1.0
            } else {
                (elapsed as f32 / e.duration_ms as f32).min(1.0)
            };

            let Some(v) = pool.get_mut(e.handle) else {
                return false;
            };

            match e.kind {
                Kind::DamageText { start, drift } => {
                    v.position = Vec2::new(
                        start.x + drift * t,
                        start.y - DAMAGE_TEXT_RISE * ease_back_out(t),
                    );
                    v.alpha = 1.0 - ease_quint_in(t);
                }
                Kind::Flash => {
                    // Up for the first half, back down for the second.
                    let half = if t < 0.5 { t * 2.0 } else { (1.0 - t) * 2.0 };
                    v.alpha = if done { 0.0 } else { ease_quad_in_out(half) };
                }
                Kind::AbilityCircle => {
                    v.alpha = 0.5 - 0.3 * t;
                }
                Kind::Telegraph { warn_ms } => {
                    if elapsed < warn_ms {
                        v.alpha = 0.5 * (elapsed as f32 / warn_ms as f32);
                    } else {
                        let fade = ((elapsed - warn_ms) as f32 / TELEGRAPH_FADE_MS as f32).min(1.0);
                        v.color = TELEGRAPH_IMPACT_COLOR;
                        v.alpha = 0.5 * (1.0 - fade);
                    }
                }
                Kind::LevelText { start } => {
                    let k = ease_quad_in(t);
                    v.position = start.offset(0.0, -DAMAGE_TEXT_RISE * k);
                    v.alpha = 1.0 - k;
                }
            }

            if done && e.owns_handle() {
                pool.release(e.handle);
            }
            !done
        });
    }

    /// Drops every effect, returning owned handles to the pool.
    pub fn clear(&mut self, pool: &mut RenderPool) {
        for e in self.active.drain(..) {
            if e.owns_handle() {
                pool.release(e.handle);
            } else if let Some(v) = pool.get_mut(e.handle) {
                v.alpha = 0.0;
            }
        }
    }
}

fn ease_back_out(t: f32) -> f32 {
    const C1: f32 = 1.70158;
    const C3: f32 = C1 + 1.0;
    let u = t - 1.0;
    1.0 + C3 * u * u * u + C1 * u * u
}

fn ease_quint_in(t: f32) -> f32 {
    t * t * t * t * t
}

fn ease_quad_in(t: f32) -> f32 {
    t * t
}

fn ease_quad_in_out(t: f32) -> f32 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}
