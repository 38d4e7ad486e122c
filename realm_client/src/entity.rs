//! Entity tracking.
//!
//! One generic manager serves both players and enemies. The kinds differ only
//! in their update payload, their kind-specific stats and their [`KindStyle`]
//! (depths, frames, tint, offsets). Everything else, including admission,
//! pooled visuals, damage feedback and interpolation, is shared.
//!
//! Invariants kept by [`EntityManager`]:
//! - an entity holds either all four pooled visuals or none of them;
//! - an entity is created only while its zone is active and the per-batch
//!   admission budget is not spent;
//! - removal returns every held visual to the pool exactly once.

use std::collections::HashMap;
use std::fmt::Debug;

use realm_shared::{
    math::{Rect, Vec2},
    net::{EnemyUpdate, LevelUp, PlayerUpdate, ZoneId},
    pool::{Handle, RenderPool, Role},
};
use tracing::{debug, info, warn};

use crate::{
    effects::Effects,
    interp::{PositionBuffer, PositionSample, DEFAULT_DELAY_MS},
    zones::{ZoneActivityTracker, ZoneCull},
};

/// Full width of a status bar at max hp.
pub const STATUS_BAR_WIDTH: f32 = 32.0;
/// Default number of creations allowed per inbound batch.
pub const DEFAULT_ADMISSION_LIMIT: usize = 20;
/// Default position history per entity.
pub const DEFAULT_BUFFER_LEN: usize = 10;

/// Fields every tracked update carries.
pub trait TrackedUpdate {
    fn id(&self) -> &str;
    fn zone(&self) -> ZoneId;
    fn sample(&self) -> PositionSample;
    fn hp(&self) -> i64;
    fn max_hp(&self) -> i64;
    /// 1 faces left, 2 faces right; anything else keeps the current facing.
    fn direction(&self) -> Option<u8>;
}

impl TrackedUpdate for PlayerUpdate {
    fn id(&self) -> &str {
        &self.id
    }
    fn zone(&self) -> ZoneId {
        self.zone_id
    }
    fn sample(&self) -> PositionSample {
        PositionSample::new(self.x, self.y, self.timestamp)
    }
    fn hp(&self) -> i64 {
        self.hp
    }
    fn max_hp(&self) -> i64 {
        self.max_hp
    }
    fn direction(&self) -> Option<u8> {
        self.direction
    }
}

impl TrackedUpdate for EnemyUpdate {
    fn id(&self) -> &str {
        &self.id
    }
    fn zone(&self) -> ZoneId {
        self.zone_id
    }
    fn sample(&self) -> PositionSample {
        PositionSample::new(self.x, self.y, self.timestamp)
    }
    fn hp(&self) -> i64 {
        self.hp
    }
    fn max_hp(&self) -> i64 {
        self.max_hp
    }
    fn direction(&self) -> Option<u8> {
        self.direction
    }
}

/// Per-kind look of the pooled visuals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KindStyle {
    pub body_depth: i32,
    pub shadow_depth: i32,
    pub bar_depth: i32,
    pub flash_depth: i32,
    pub scale: f32,
    pub flash_tint: u32,
    /// Shadow y offset, as a fraction of the scaled body height.
    pub shadow_offset: f32,
    /// Status bar distance above the anchor, as a fraction of body height.
    pub bar_offset: f32,
    pub damage_color: u32,
    pub damage_offset: f32,
}

/// Static description of one entity kind.
pub trait EntityKind {
    type Update: TrackedUpdate;
    type Stats: Debug + Clone + PartialEq;

    const NAME: &'static str;
    const STYLE: KindStyle;

    fn stats(update: &Self::Update) -> Self::Stats;

    /// Atlas frame for the body and its flash overlay.
    fn body_frame(stats: &Self::Stats) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Player;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enemy;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerStats {
    pub ap: i64,
    pub max_ap: i64,
    pub game_xp: i64,
    pub game_level: u32,
    pub xp_on_current_level: i64,
    pub xp_total_for_next_level: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnemyStats {
    /// Enemy type, also the body frame name.
    pub kind: String,
}

impl EntityKind for Player {
    type Update = PlayerUpdate;
    type Stats = PlayerStats;

    const NAME: &'static str = "player";
    const STYLE: KindStyle = KindStyle {
        body_depth: 1000,
        shadow_depth: 999,
        bar_depth: 1001,
        flash_depth: 1002,
        scale: 1.0,
        flash_tint: 0xf5555d,
        shadow_offset: 0.0,
        bar_offset: 1.2,
        damage_color: 0xf5555d,
        damage_offset: -64.0,
    };

    fn stats(u: &PlayerUpdate) -> PlayerStats {
        PlayerStats {
            ap: u.ap,
            max_ap: u.max_ap,
            game_xp: u.game_xp,
            game_level: u.game_level,
            xp_on_current_level: u.game_xp_on_current_level,
            xp_total_for_next_level: u.game_xp_total_for_next_level,
        }
    }

    fn body_frame(_: &PlayerStats) -> String {
        "player.png".to_string()
    }
}

impl EntityKind for Enemy {
    type Update = EnemyUpdate;
    type Stats = EnemyStats;

    const NAME: &'static str = "enemy";
    const STYLE: KindStyle = KindStyle {
        body_depth: 500,
        shadow_depth: 499,
        bar_depth: 501,
        flash_depth: 502,
        scale: 1.0,
        flash_tint: 0xffffff,
        shadow_offset: 0.0,
        bar_offset: 1.2,
        damage_color: 0xffffff,
        damage_offset: -48.0,
    };

    fn stats(u: &EnemyUpdate) -> EnemyStats {
        EnemyStats { kind: u.kind.clone() }
    }

    fn body_frame(stats: &EnemyStats) -> String {
        if stats.kind.is_empty() {
            "easy.png".to_string()
        } else {
            format!("{}.png", stats.kind)
        }
    }
}

/// The four pooled visuals of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityVisuals {
    pub body: Handle,
    pub shadow: Handle,
    pub status_bar: Handle,
    pub flash: Handle,
}

impl EntityVisuals {
    /// All four or nothing: partial acquisitions are handed back.
    fn acquire(pool: &mut RenderPool) -> Option<Self> {
        let body = pool.acquire(Role::Body)?;
        let Some(shadow) = pool.acquire(Role::Shadow) else {
            pool.release(body);
            return None;
        };
        let Some(status_bar) = pool.acquire(Role::StatusBar) else {
            pool.release(body);
            pool.release(shadow);
            return None;
        };
        let Some(flash) = pool.acquire(Role::Flash) else {
            pool.release(body);
            pool.release(shadow);
            pool.release(status_bar);
            return None;
        };
        Some(Self {
            body,
            shadow,
            status_bar,
            flash,
        })
    }

    fn release(self, pool: &mut RenderPool) {
        for h in [self.body, self.shadow, self.status_bar, self.flash] {
            pool.release(h);
        }
    }

    fn dress(&self, pool: &mut RenderPool, style: &KindStyle, frame: &str) {
        if let Some(v) = pool.get_mut(self.body) {
            v.depth = style.body_depth;
            v.scale = style.scale;
            v.set_frame(frame);
        }
        if let Some(v) = pool.get_mut(self.shadow) {
            v.depth = style.shadow_depth;
            v.scale = style.scale;
        }
        if let Some(v) = pool.get_mut(self.status_bar) {
            v.depth = style.bar_depth;
        }
        if let Some(v) = pool.get_mut(self.flash) {
            v.depth = style.flash_depth;
            v.scale = style.scale;
            v.tint = Some(style.flash_tint);
            v.set_frame(frame);
        }
    }

    fn place(&self, pool: &mut RenderPool, style: &KindStyle, pos: Vec2) {
        let height = match pool.get_mut(self.body) {
            Some(v) => {
                v.position = pos;
                v.height * v.scale
            }
            None => 0.0,
        };
        if let Some(v) = pool.get_mut(self.flash) {
            v.position = pos;
        }
        if let Some(v) = pool.get_mut(self.shadow) {
            v.position = pos.offset(0.0, style.shadow_offset * height);
        }
        if let Some(v) = pool.get_mut(self.status_bar) {
            v.position = pos.offset(0.0, -style.bar_offset * height);
        }
    }

    fn show_hp(&self, pool: &mut RenderPool, hp: i64, max_hp: i64) {
        if let Some(v) = pool.get_mut(self.status_bar) {
            v.width = status_bar_width(hp, max_hp);
        }
    }

    fn face(&self, pool: &mut RenderPool, direction: Option<u8>) {
        let flip = match direction {
            Some(1) => true,
            Some(2) => false,
            _ => return,
        };
        for h in [self.body, self.flash] {
            if let Some(v) = pool.get_mut(h) {
                v.flip_x = flip;
            }
        }
    }
}

/// Bar width proportional to remaining hp, clamped to `[0, STATUS_BAR_WIDTH]`.
pub fn status_bar_width(hp: i64, max_hp: i64) -> f32 {
    if max_hp <= 0 {
        return 0.0;
    }
    let ratio = (hp as f64 / max_hp as f64).clamp(0.0, 1.0);
    STATUS_BAR_WIDTH * ratio as f32
}

/// Client-side record of one server entity.
#[derive(Debug, Clone)]
pub struct TrackedEntity<S> {
    id: String,
    zone_id: ZoneId,
    hp: i64,
    max_hp: i64,
    previous_hp: i64,
    direction: Option<u8>,
    stats: S,
    positions: PositionBuffer,
    visuals: Option<EntityVisuals>,
    render_pos: Option<Vec2>,
}

impl<S> TrackedEntity<S> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Zone at creation; later updates never move an entity between zones.
    pub fn zone_id(&self) -> ZoneId {
        self.zone_id
    }

    pub fn hp(&self) -> i64 {
        self.hp
    }

    pub fn max_hp(&self) -> i64 {
        self.max_hp
    }

    /// Hp seen on the previous update, for damage detection.
    pub fn previous_hp(&self) -> i64 {
        self.previous_hp
    }

    pub fn direction(&self) -> Option<u8> {
        self.direction
    }

    pub fn stats(&self) -> &S {
        &self.stats
    }

    pub fn positions(&self) -> &PositionBuffer {
        &self.positions
    }

    pub fn visuals(&self) -> Option<&EntityVisuals> {
        self.visuals.as_ref()
    }

    pub fn has_render_resources(&self) -> bool {
        self.visuals.is_some()
    }

    /// Where the body was last drawn.
    pub fn render_position(&self) -> Option<Vec2> {
        self.render_pos
    }

    /// Last render position, if it lies inside `viewport`.
    fn on_screen(&self, viewport: Rect) -> Option<Vec2> {
        self.render_pos.filter(|p| viewport.contains(*p))
    }
}

/// Everything an update needs besides the manager itself.
pub struct UpdateCtx<'a> {
    pub zones: &'a ZoneActivityTracker,
    pub pool: &'a mut RenderPool,
    pub effects: &'a mut Effects,
    /// Visible world rectangle.
    pub viewport: Rect,
    pub now_ms: i64,
}

/// What [`EntityManager::add_or_update`] did with an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Created { with_visuals: bool },
    Updated,
    Removed,
    Skipped(Skip),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// Unknown entity reported at zero hp.
    Dead,
    InactiveZone,
    AdmissionLimit,
}

/// Tracks every live entity of kind `K`.
pub struct EntityManager<K: EntityKind> {
    entities: HashMap<String, TrackedEntity<K::Stats>>,
    admitted: usize,
    admission_limit: usize,
    buffer_len: usize,
    delay_ms: i64,
    local_id: Option<String>,
    local_lost: bool,
}

pub type PlayerManager = EntityManager<Player>;
pub type EnemyManager = EntityManager<Enemy>;

impl<K: EntityKind> Default for EntityManager<K> {
    fn default() -> Self {
        Self::new(DEFAULT_ADMISSION_LIMIT, DEFAULT_BUFFER_LEN, DEFAULT_DELAY_MS)
    }
}

impl<K: EntityKind> EntityManager<K> {
    pub fn new(admission_limit: usize, buffer_len: usize, delay_ms: i64) -> Self {
        Self {
            entities: HashMap::new(),
            admitted: 0,
            admission_limit,
            buffer_len,
            delay_ms,
            local_id: None,
            local_lost: false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&TrackedEntity<K::Stats>> {
        self.entities.get(id)
    }

    /// Every tracked entity, in no particular order.
    pub fn get_all(&self) -> impl Iterator<Item = &TrackedEntity<K::Stats>> {
        self.entities.values()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Creations made since the last [`reset_admission`](Self::reset_admission).
    pub fn admitted(&self) -> usize {
        self.admitted
    }

    /// Called once per inbound batch.
    pub fn reset_admission(&mut self) {
        self.admitted = 0;
    }

    fn can_admit(&self) -> bool {
        self.admitted < self.admission_limit
    }

    /// Applies one authoritative update.
    pub fn add_or_update(&mut self, update: &K::Update, ctx: &mut UpdateCtx<'_>) -> Applied {
        let id = update.id();

        if update.hp() <= 0 {
            return if self.remove(id, ctx.pool) {
                Applied::Removed
            } else {
                Applied::Skipped(Skip::Dead)
            };
        }

        if let Some(entity) = self.entities.get_mut(id) {
            entity.positions.push(update.sample());
            entity.hp = update.hp();
            entity.max_hp = update.max_hp();
            if update.direction().is_some() {
                entity.direction = update.direction();
            }
            entity.stats = K::stats(update);

            if entity.visuals.is_none() && self.admitted < self.admission_limit {
                self.admitted += 1;
                entity.visuals = attach_visuals::<K>(ctx.pool, &entity.stats, entity.render_pos);
                if entity.visuals.is_some() {
                    debug!(kind = K::NAME, id, "Visuals attached on retry");
                }
            }

            let dealt = entity.previous_hp - entity.hp;
            if dealt > 0 {
                if let Some(at) = entity.on_screen(ctx.viewport) {
                    let style = K::STYLE;
                    ctx.effects.damage_text(
                        ctx.pool,
                        at.offset(0.0, style.damage_offset),
                        dealt,
                        style.damage_color,
                        ctx.now_ms,
                    );
                    // The number uses its own pool; only the pulse needs a body.
                    if let Some(v) = entity.visuals {
                        ctx.effects.flash(ctx.pool, v.flash, ctx.now_ms);
                    }
                }
            }
            entity.previous_hp = entity.hp;

            if let Some(v) = entity.visuals {
                v.show_hp(ctx.pool, entity.hp, entity.max_hp);
                v.face(ctx.pool, entity.direction);
            }
            return Applied::Updated;
        }

        if !ctx.zones.is_active(update.zone()) {
            return Applied::Skipped(Skip::InactiveZone);
        }
        if !self.can_admit() {
            debug!(kind = K::NAME, id, limit = self.admission_limit, "Admission budget spent");
            return Applied::Skipped(Skip::AdmissionLimit);
        }
        self.admitted += 1;

        let sample = update.sample();
        let stats = K::stats(update);
        let visuals = attach_visuals::<K>(ctx.pool, &stats, Some(sample.pos()));
        if let Some(v) = visuals {
            v.show_hp(ctx.pool, update.hp(), update.max_hp());
            v.face(ctx.pool, update.direction());
        } else {
            warn!(kind = K::NAME, id, "No render resources; tracking without visuals");
        }

        let mut positions = PositionBuffer::new(self.buffer_len);
        positions.push(sample);
        let with_visuals = visuals.is_some();
        self.entities.insert(
            id.to_string(),
            TrackedEntity {
                id: id.to_string(),
                zone_id: update.zone(),
                hp: update.hp(),
                max_hp: update.max_hp(),
                previous_hp: update.hp(),
                direction: update.direction(),
                stats,
                positions,
                visuals,
                render_pos: Some(sample.pos()),
            },
        );

        if self.local_id.as_deref() == Some(id) {
            info!(kind = K::NAME, id, zone = %update.zone(), "Local entity spawned");
        } else {
            debug!(kind = K::NAME, id, zone = %update.zone(), with_visuals, "Entity created");
        }
        Applied::Created { with_visuals }
    }

    /// Stops tracking `id` and returns its visuals to the pool. Returns
    /// `false` when `id` was not tracked.
    pub fn remove(&mut self, id: &str, pool: &mut RenderPool) -> bool {
        let Some(mut entity) = self.entities.remove(id) else {
            return false;
        };
        if let Some(v) = entity.visuals.take() {
            v.release(pool);
        }
        self.note_removed(id);
        debug!(kind = K::NAME, id, "Entity removed");
        true
    }

    fn note_removed(&mut self, id: &str) {
        if self.local_id.as_deref() == Some(id) {
            info!(kind = K::NAME, id, "Local entity removed");
            self.local_id = None;
            self.local_lost = true;
        }
    }

    /// Moves every entity to its interpolated position for `now_ms`.
    pub fn interpolate(&mut self, now_ms: i64, pool: &mut RenderPool) {
        let style = K::STYLE;
        for entity in self.entities.values_mut() {
            let Some(pos) = entity.positions.sample_at(now_ms, self.delay_ms) else {
                continue;
            };
            entity.render_pos = Some(pos);
            if let Some(v) = entity.visuals {
                v.place(pool, &style, pos);
            }
        }
    }

    /// Releases everything and forgets every entity.
    pub fn shutdown(&mut self, pool: &mut RenderPool) {
        for (_, mut entity) in self.entities.drain() {
            if let Some(v) = entity.visuals.take() {
                v.release(pool);
            }
        }
        self.admitted = 0;
        self.local_id = None;
        self.local_lost = false;
    }
}

impl EntityManager<Player> {
    /// Id of the player this client controls, once the server has said so.
    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    pub fn set_local_id(&mut self, id: impl Into<String>) {
        self.local_id = Some(id.into());
    }

    pub fn clear_local_id(&mut self) {
        self.local_id = None;
    }

    pub fn local(&self) -> Option<&TrackedEntity<PlayerStats>> {
        self.local_id().and_then(|id| self.get(id))
    }

    /// True once after the tracked local player was removed.
    pub fn take_local_lost(&mut self) -> bool {
        std::mem::take(&mut self.local_lost)
    }

    /// Camera target: the local player's rendered body.
    pub fn follow_target(&self) -> Option<Vec2> {
        self.local().and_then(TrackedEntity::render_position)
    }

    /// Writes new progression values onto the tracked local player and
    /// returns where it is drawn.
    pub fn apply_level_up(&mut self, level: &LevelUp) -> Option<Vec2> {
        let id = self.local_id.as_deref()?;
        let player = self.entities.get_mut(id)?;
        player.stats.game_level = level.new_level;
        player.stats.xp_on_current_level = level.game_xp_on_current_level;
        player.stats.xp_total_for_next_level = level.game_xp_total_for_next_level;
        player.render_pos
    }
}

impl<K: EntityKind> ZoneCull for EntityManager<K> {
    fn cull_zone(&mut self, zone: ZoneId, pool: &mut RenderPool) -> usize {
        let before = self.entities.len();
        let mut lost_local = false;
        let local = self.local_id.as_deref();
        self.entities.retain(|id, e| {
            if e.zone_id != zone {
                return true;
            }
            if let Some(v) = e.visuals.take() {
                v.release(pool);
            }
            lost_local |= local == Some(id.as_str());
            false
        });
        if lost_local {
            if let Some(id) = self.local_id.clone() {
                self.note_removed(&id);
            }
        }
        before - self.entities.len()
    }
}

fn attach_visuals<K: EntityKind>(
    pool: &mut RenderPool,
    stats: &K::Stats,
    at: Option<Vec2>,
) -> Option<EntityVisuals> {
    let v = EntityVisuals::acquire(pool)?;
    let style = K::STYLE;
    v.dress(pool, &style, &K::body_frame(stats));
    if let Some(at) = at {
        v.place(pool, &style, at);
    }
    Some(v)
}
