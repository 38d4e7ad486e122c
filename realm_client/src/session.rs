//! Session control.
//!
//! [`SessionController`] owns every piece of client-side world state for one
//! session: the render pools, zone tracking, both entity managers, transient
//! effects and the outbound input cadence. It never touches a socket. The
//! transport driver feeds it raw inbound payloads and connection edges, calls
//! [`SessionController::tick`] once per frame and sends whatever outbound
//! messages come back.
//!
//! Within a batch, records are applied in delivery order. The per-batch
//! admission budget of both managers is reset once after the batch.

use realm_shared::{
    config::ClientConfig,
    event::{EventQueue, PresentationEvent, SessionEndReason},
    math::{Rect, Vec2},
    net::{
        decode_batch, AbilityEffect, CharacterSelection, Keys, LevelUp, Outbound, ProtocolError,
        Record, TelegraphWarning, Welcome,
    },
    pool::RenderPool,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    effects::Effects,
    entity::{Applied, EnemyManager, PlayerManager, UpdateCtx},
    input::{build_input, InputCadence},
    zones::{ZoneActivityTracker, ZoneRegistry},
};

const PLAYER_ABILITY_RADIUS: f32 = 100.0;
const ENEMY_ABILITY_RADIUS: f32 = 70.0;
const PLAYER_ABILITY_COLOR: u32 = 0xffffff;
const ENEMY_ABILITY_COLOR: u32 = 0xff0000;
/// Level-up text sits this far above the local player.
const LEVEL_TEXT_RISE: f32 = 192.0;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot go from {from:?} to {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },
    #[error("session is {0:?}, not connected")]
    NotConnected(SessionState),
    #[error("spawn intent already sent this session")]
    AlreadySpawned,
    #[error("batch dropped: {0}")]
    Protocol(#[from] ProtocolError),
}

/// What one inbound batch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub records: usize,
    pub malformed: usize,
    pub unrecognized: usize,
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub skipped: usize,
    pub culled: usize,
}

impl BatchReport {
    fn count(&mut self, applied: Applied) {
        match applied {
            Applied::Created { .. } => self.created += 1,
            Applied::Updated => self.updated += 1,
            Applied::Removed => self.removed += 1,
            Applied::Skipped(_) => self.skipped += 1,
        }
    }

    /// Adds another report's counters to this one.
    pub fn merge(&mut self, other: &BatchReport) {
        self.records += other.records;
        self.malformed += other.malformed;
        self.unrecognized += other.unrecognized;
        self.created += other.created;
        self.updated += other.updated;
        self.removed += other.removed;
        self.skipped += other.skipped;
        self.culled += other.culled;
    }
}

/// Owned client state for one session.
pub struct SessionController {
    config: ClientConfig,
    state: SessionState,
    pool: RenderPool,
    zones: ZoneActivityTracker,
    registry: ZoneRegistry,
    players: PlayerManager,
    enemies: EnemyManager,
    effects: Effects,
    cadence: InputCadence,
    events: EventQueue,
    viewport: Rect,
    viewport_pinned: bool,
    spawn_sent: bool,
}

impl SessionController {
    pub fn new(config: ClientConfig) -> Self {
        let caps = config.pools;
        let effects = Effects::new(caps.vfx + caps.text + caps.flash);
        Self::with_effects(config, effects)
    }

    /// Uses the given effect driver, e.g. a seeded one for replays.
    pub fn with_effects(config: ClientConfig, effects: Effects) -> Self {
        let players = PlayerManager::new(
            config.admission_limit,
            config.position_buffer_len,
            config.interpolation_delay_ms,
        );
        let enemies = EnemyManager::new(
            config.admission_limit,
            config.position_buffer_len,
            config.interpolation_delay_ms,
        );
        Self {
            pool: RenderPool::new(config.pools),
            zones: ZoneActivityTracker::new(),
            registry: ZoneRegistry::new(),
            players,
            enemies,
            effects,
            cadence: InputCadence::new(config.input_step_ms),
            events: EventQueue::default(),
            viewport: Rect::new(0.0, 0.0, config.viewport.width, config.viewport.height),
            viewport_pinned: false,
            spawn_sent: false,
            state: SessionState::Disconnected,
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn players(&self) -> &PlayerManager {
        &self.players
    }

    pub fn enemies(&self) -> &EnemyManager {
        &self.enemies
    }

    pub fn pool(&self) -> &RenderPool {
        &self.pool
    }

    pub fn zones(&self) -> &ZoneActivityTracker {
        &self.zones
    }

    pub fn registry(&self) -> &ZoneRegistry {
        &self.registry
    }

    /// Number of transient effects still running.
    pub fn active_effects(&self) -> usize {
        self.effects.len()
    }

    pub fn local_id(&self) -> Option<&str> {
        self.players.local_id()
    }

    /// Pending presentation events, oldest first.
    pub fn drain_events(&mut self) -> Vec<PresentationEvent> {
        self.events.drain()
    }

    pub fn viewport(&self) -> Rect {
        self.viewport
    }

    /// Pins the visible rectangle. `None` returns to following the local
    /// player.
    pub fn set_viewport(&mut self, viewport: Option<Rect>) {
        match viewport {
            Some(v) => {
                self.viewport = v;
                self.viewport_pinned = true;
            }
            None => self.viewport_pinned = false,
        }
    }

    pub fn follow_target(&self) -> Option<Vec2> {
        self.players.follow_target()
    }

    pub fn world_bounds(&self) -> Rect {
        self.registry.world_bounds(self.config.zone_extent_px)
    }

    // ─── Lifecycle ───

    pub fn begin_connect(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Disconnected, SessionState::Connecting)?;
        info!(server = %self.config.server_addr, "Connecting");
        Ok(())
    }

    pub fn on_connected(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Connecting, SessionState::Connected)?;
        self.cadence.reset();
        info!("Session connected");
        Ok(())
    }

    fn transition(&mut self, from: SessionState, to: SessionState) -> Result<(), SessionError> {
        if self.state != from {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Connection closed or failed. Safe to call in any state.
    pub fn on_disconnected(&mut self) {
        if self.state != SessionState::Disconnected {
            info!(state = ?self.state, "Session disconnected");
        }
        self.state = SessionState::Disconnected;
        self.cadence.reset();
        self.spawn_sent = false;

        if let Some(id) = self.players.local_id().map(str::to_owned) {
            self.players.remove(&id, &mut self.pool);
            self.players.clear_local_id();
        }
        if self.players.take_local_lost() {
            self.events.push(PresentationEvent::SessionEnded {
                reason: SessionEndReason::Disconnected,
            });
        }
        self.clear_world();
    }

    /// Builds the one spawn intent allowed per connection.
    pub fn request_spawn(&mut self, selection: CharacterSelection) -> Result<Outbound, SessionError> {
        if self.state != SessionState::Connected {
            return Err(SessionError::NotConnected(self.state));
        }
        if self.spawn_sent {
            return Err(SessionError::AlreadySpawned);
        }
        self.spawn_sent = true;
        info!(
            character_type = %selection.character_type,
            character_id = selection.character_id,
            "Spawn intent"
        );
        Ok(Outbound::SpawnIntent(selection))
    }

    // ─── Inbound ───

    /// Applies one inbound payload. A payload that is not a list is dropped
    /// whole; a single bad record is skipped and the rest still apply.
    pub fn on_payload(&mut self, payload: &[u8], now_ms: i64) -> Result<BatchReport, SessionError> {
        if self.state != SessionState::Connected {
            debug!(state = ?self.state, bytes = payload.len(), "Ignoring payload while not connected");
            return Err(SessionError::NotConnected(self.state));
        }
        let batch = match decode_batch(payload) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, bytes = payload.len(), "Dropping malformed batch");
                return Err(e.into());
            }
        };

        let mut report = BatchReport::default();
        for record in batch {
            report.records += 1;
            match record {
                Ok(record) => self.apply(record, now_ms, &mut report),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed record");
                    report.malformed += 1;
                }
            }
            if self.players.take_local_lost() {
                self.events.push(PresentationEvent::SessionEnded {
                    reason: SessionEndReason::PlayerRemoved,
                });
            }
        }

        self.players.reset_admission();
        self.enemies.reset_admission();
        Ok(report)
    }

    fn apply(&mut self, record: Record, now_ms: i64, report: &mut BatchReport) {
        match record {
            Record::Welcome(w) => self.on_welcome(w),
            Record::ActiveZoneSet(set) => {
                let culled = self.zones.apply_new_active_set(
                    set,
                    &mut self.pool,
                    &mut [&mut self.players, &mut self.enemies],
                );
                for (zone, removed) in culled {
                    report.culled += removed;
                    self.events.push(PresentationEvent::ZoneCulled {
                        zone_id: zone.0,
                        removed,
                    });
                }
            }
            Record::PlayerUpdate(u) => {
                let mut ctx = UpdateCtx {
                    zones: &self.zones,
                    pool: &mut self.pool,
                    effects: &mut self.effects,
                    viewport: self.viewport,
                    now_ms,
                };
                report.count(self.players.add_or_update(&u, &mut ctx));
            }
            Record::EnemyUpdate(u) => {
                let mut ctx = UpdateCtx {
                    zones: &self.zones,
                    pool: &mut self.pool,
                    effects: &mut self.effects,
                    viewport: self.viewport,
                    now_ms,
                };
                report.count(self.enemies.add_or_update(&u, &mut ctx));
            }
            Record::AbilityEffect(a) => self.on_ability(&a, now_ms),
            Record::TelegraphWarning(t) => self.on_telegraph(&t, now_ms),
            Record::LevelUp(l) => self.on_level_up(&l, now_ms),
            Record::PlayerDisconnected(p) => {
                if self.players.remove(&p.id, &mut self.pool) {
                    report.removed += 1;
                    info!(id = %p.id, "Player left");
                }
            }
            Record::Unrecognized { kind } => {
                debug!(kind = %kind, "Ignoring unrecognized record");
                report.unrecognized += 1;
            }
        }
    }

    fn on_welcome(&mut self, w: Welcome) {
        info!(local_id = %w.local_id, zones = w.zones.len(), "Welcome");
        self.players.set_local_id(w.local_id);
        self.registry.clear();
        self.registry.register_all(&w.zones);
    }

    fn on_ability(&mut self, a: &AbilityEffect, now_ms: i64) {
        let (radius, color) = if self.players.contains(&a.caster_id) {
            (PLAYER_ABILITY_RADIUS, PLAYER_ABILITY_COLOR)
        } else if self.enemies.contains(&a.caster_id) {
            (ENEMY_ABILITY_RADIUS, ENEMY_ABILITY_COLOR)
        } else {
            debug!(caster = %a.caster_id, ability = %a.ability_name, "Ability from untracked caster");
            return;
        };
        let at = Vec2::new(a.impact_x, a.impact_y);
        self.effects.ability_circle(
            &mut self.pool,
            at,
            a.radius.unwrap_or(radius),
            color,
            now_ms,
        );
    }

    fn on_telegraph(&mut self, t: &TelegraphWarning, now_ms: i64) {
        if !self.enemies.contains(&t.caster_id) {
            debug!(caster = %t.caster_id, "Telegraph from non-enemy caster");
            return;
        }
        self.effects.telegraph(
            &mut self.pool,
            Vec2::new(t.impact_x, t.impact_y),
            t.radius,
            i64::from(t.duration_ms),
            now_ms,
        );
    }

    fn on_level_up(&mut self, l: &LevelUp, now_ms: i64) {
        info!(level = l.new_level, atk = l.new_atk, "Level up");
        if let Some(at) = self.players.apply_level_up(l) {
            self.effects
                .level_up_text(&mut self.pool, at.offset(0.0, -LEVEL_TEXT_RISE), now_ms);
        }
        self.events.push(PresentationEvent::LevelUp {
            new_level: l.new_level,
            new_atk: l.new_atk,
            xp_on_current_level: l.game_xp_on_current_level,
            xp_total_for_next_level: l.game_xp_total_for_next_level,
        });
    }

    // ─── Frame ───

    /// Per-frame update: interpolates every entity, steps effects, moves
    /// the viewport and returns the input messages due this frame.
    pub fn tick(&mut self, now_ms: i64, dt_ms: f64, keys: Keys) -> Vec<Outbound> {
        self.players.interpolate(now_ms, &mut self.pool);
        self.enemies.interpolate(now_ms, &mut self.pool);
        self.effects.advance(now_ms, &mut self.pool);

        if !self.viewport_pinned {
            if let Some(target) = self.follow_target() {
                self.viewport = Rect::centered(target, self.viewport.width, self.viewport.height);
            }
        }

        if self.state != SessionState::Connected || self.players.local().is_none() {
            self.cadence.reset();
            return Vec::new();
        }
        let due = self.cadence.accumulate(dt_ms);
        (0..due).map(|_| build_input(keys)).collect()
    }

    /// Releases every pooled resource and forgets all world state.
    pub fn shutdown(&mut self) {
        self.clear_world();
        self.cadence.reset();
        self.spawn_sent = false;
        self.state = SessionState::Disconnected;
        info!("Session shut down");
    }

    /// World state belongs to one connection; the next one starts empty.
    fn clear_world(&mut self) {
        self.effects.clear(&mut self.pool);
        self.players.shutdown(&mut self.pool);
        self.enemies.shutdown(&mut self.pool);
        self.registry.clear();
        self.zones = ZoneActivityTracker::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realm_shared::{config::PoolCapacities, pool::Role};
    use serde_json::{json, Value};

    fn connected() -> SessionController {
        let mut s = SessionController::new(ClientConfig::default());
        s.begin_connect().unwrap();
        s.on_connected().unwrap();
        s
    }

    fn rec(kind: &str, data: Value) -> Value {
        json!({ "kind": kind, "data": data })
    }

    fn batch(records: Vec<Value>) -> Vec<u8> {
        serde_json::to_vec(&Value::Array(records)).unwrap()
    }

    fn welcome(id: &str) -> Value {
        rec("welcome", json!({ "localId": id, "zones": [] }))
    }

    fn zone_set(a: i64, b: i64, c: i64, d: i64) -> Value {
        rec(
            "activeZoneSet",
            json!({ "current": a, "xAxis": b, "yAxis": c, "diagonal": d }),
        )
    }

    fn player(id: &str, hp: i64, t: i64) -> Value {
        rec(
            "playerUpdate",
            json!({ "id": id, "x": 100, "y": 100, "zoneId": 1, "timestamp": t,
                    "maxHp": 100, "hp": hp, "maxAp": 10, "ap": 10 }),
        )
    }

    fn enemy(id: &str, zone: i64, hp: i64) -> Value {
        rec(
            "enemyUpdate",
            json!({ "id": id, "x": 200, "y": 200, "zoneId": zone, "timestamp": 0,
                    "kind": "easy", "maxHp": 100, "hp": hp }),
        )
    }

    fn session_ended(events: &[PresentationEvent]) -> Vec<SessionEndReason> {
        events
            .iter()
            .filter_map(|e| match e {
                PresentationEvent::SessionEnded { reason } => Some(*reason),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn lifecycle_rejects_out_of_order_edges() {
        let mut s = SessionController::new(ClientConfig::default());
        assert!(matches!(s.on_connected(), Err(SessionError::InvalidTransition { .. })));
        s.begin_connect().unwrap();
        assert!(matches!(s.begin_connect(), Err(SessionError::InvalidTransition { .. })));
        s.on_connected().unwrap();
        assert_eq!(s.state(), SessionState::Connected);
        s.on_disconnected();
        s.on_disconnected();
        assert_eq!(s.state(), SessionState::Disconnected);
    }

    #[test]
    fn payload_before_connect_is_refused() {
        let mut s = SessionController::new(ClientConfig::default());
        let r = s.on_payload(&batch(vec![welcome("p1")]), 0);
        assert!(matches!(r, Err(SessionError::NotConnected(SessionState::Disconnected))));
        assert_eq!(s.local_id(), None);
    }

    #[test]
    fn non_list_payload_is_dropped_whole() {
        let mut s = connected();
        let payload = serde_json::to_vec(&welcome("p1")).unwrap();
        assert!(matches!(s.on_payload(&payload, 0), Err(SessionError::Protocol(_))));
        assert_eq!(s.local_id(), None);
    }

    #[test]
    fn bad_and_unknown_records_do_not_stop_the_batch() {
        let mut s = connected();
        let report = s
            .on_payload(
                &batch(vec![
                    rec("weather", json!({})),
                    rec("activeZoneSet", json!({ "current": "nope" })),
                    welcome("p1"),
                ]),
                0,
            )
            .unwrap();
        assert_eq!(report.records, 3);
        assert_eq!(report.unrecognized, 1);
        assert_eq!(report.malformed, 1);
        assert_eq!(s.local_id(), Some("p1"));
    }

    #[test]
    fn admission_budget_resets_between_batches() {
        let mut s = connected();
        s.on_payload(&batch(vec![zone_set(1, 2, 3, 4)]), 0).unwrap();

        let first: Vec<_> = (0..25).map(|i| enemy(&format!("e{i}"), 1, 100)).collect();
        let report = s.on_payload(&batch(first.clone()), 0).unwrap();
        assert_eq!(report.created, 20);
        assert_eq!(report.skipped, 5);
        assert_eq!(s.enemies().len(), 20);
        assert!(s.enemies().get_all().all(|e| e.has_render_resources()));

        let report = s.on_payload(&batch(first), 0).unwrap();
        assert_eq!(report.created, 5);
        assert_eq!(report.updated, 20);
        assert_eq!(s.enemies().len(), 25);
    }

    #[test]
    fn zone_change_culls_and_reports() {
        let mut s = connected();
        s.on_payload(
            &batch(vec![
                zone_set(5, 6, 7, 8),
                enemy("a", 5, 100),
                enemy("b", 6, 100),
                enemy("c", 6, 100),
            ]),
            0,
        )
        .unwrap();
        let report = s.on_payload(&batch(vec![zone_set(6, 7, 8, 9)]), 0).unwrap();
        assert_eq!(report.culled, 1);
        assert!(!s.enemies().contains("a"));
        assert_eq!(s.enemies().len(), 2);
        assert_eq!(s.pool().in_use(Role::Body), 2);
        let events = s.drain_events();
        assert_eq!(events, vec![PresentationEvent::ZoneCulled { zone_id: 5, removed: 1 }]);
    }

    #[test]
    fn disconnect_ends_session_exactly_once() {
        let mut s = connected();
        s.on_payload(&batch(vec![welcome("p1"), zone_set(1, 2, 3, 4), player("p1", 100, 0)]), 0)
            .unwrap();
        assert!(s.players().contains("p1"));

        s.on_disconnected();
        assert_eq!(s.local_id(), None);
        assert!(!s.players().contains("p1"));
        assert_eq!(s.pool().in_use(Role::Body), 0);

        s.on_disconnected();
        let ended = session_ended(&s.drain_events());
        assert_eq!(ended, vec![SessionEndReason::Disconnected]);
    }

    #[test]
    fn reconnect_starts_from_an_empty_world() {
        let mut cfg = ClientConfig::default();
        cfg.pools = PoolCapacities::uniform(8);
        let mut s = SessionController::new(cfg);
        s.begin_connect().unwrap();
        s.on_connected().unwrap();
        s.on_payload(
            &batch(vec![
                welcome("p1"),
                zone_set(1, 2, 3, 4),
                player("p1", 100, 0),
                player("p2", 100, 0),
                enemy("e1", 1, 100),
            ]),
            0,
        )
        .unwrap();
        s.on_payload(&batch(vec![enemy("e1", 1, 70)]), 0).unwrap();
        assert!(s.active_effects() > 0);

        s.on_disconnected();
        assert_eq!(session_ended(&s.drain_events()), vec![SessionEndReason::Disconnected]);
        assert!(s.players().is_empty());
        assert!(s.enemies().is_empty());
        assert_eq!(s.active_effects(), 0);
        assert!(s.zones().active().is_none());

        s.begin_connect().unwrap();
        s.on_connected().unwrap();
        for role in Role::ALL {
            assert_eq!(s.pool().in_use(role), 0, "{role:?}");
        }
        // Zone 1 was active last time; without a fresh set nothing is admitted.
        let report = s.on_payload(&batch(vec![enemy("e2", 1, 100)]), 0).unwrap();
        assert_eq!(report.skipped, 1);
        assert!(s.enemies().is_empty());
    }

    #[test]
    fn frame_ticks_do_not_repeat_damage() {
        let mut s = connected();
        s.on_payload(&batch(vec![zone_set(1, 2, 3, 4), enemy("e1", 1, 100)]), 0)
            .unwrap();
        s.on_payload(&batch(vec![enemy("e1", 1, 75)]), 0).unwrap();
        assert_eq!(s.pool().in_use(Role::Text), 1);
        let running = s.active_effects();

        for now in [16, 32, 48, 64] {
            s.tick(now, 16.0, Keys::empty());
        }
        assert_eq!(s.pool().in_use(Role::Text), 1);
        assert!(s.active_effects() <= running);
    }

    #[test]
    fn disconnect_without_local_player_is_quiet() {
        let mut s = connected();
        s.on_payload(&batch(vec![welcome("p1")]), 0).unwrap();
        s.on_disconnected();
        assert_eq!(s.local_id(), None);
        assert!(session_ended(&s.drain_events()).is_empty());
    }

    #[test]
    fn local_death_ends_session() {
        let mut s = connected();
        s.on_payload(&batch(vec![welcome("p1"), zone_set(1, 2, 3, 4), player("p1", 100, 0)]), 0)
            .unwrap();
        s.on_payload(&batch(vec![player("p1", 0, 100)]), 0).unwrap();
        assert_eq!(s.local_id(), None);
        assert_eq!(session_ended(&s.drain_events()), vec![SessionEndReason::PlayerRemoved]);
    }

    #[test]
    fn input_cadence_needs_connection_and_local_player() {
        let mut s = connected();
        // No local player yet.
        assert!(s.tick(0, 350.0, Keys::UP).is_empty());

        s.on_payload(&batch(vec![welcome("p1"), zone_set(1, 2, 3, 4), player("p1", 100, 0)]), 0)
            .unwrap();
        let out = s.tick(16, 350.0, Keys::UP);
        assert_eq!(out.len(), 3);
        assert!(matches!(&out[0], Outbound::Input { keys } if keys.up));
        assert_eq!(s.tick(32, 40.0, Keys::UP).len(), 0);
        assert_eq!(s.tick(48, 10.0, Keys::UP).len(), 1);

        s.on_disconnected();
        assert!(s.tick(64, 500.0, Keys::UP).is_empty());
    }

    #[test]
    fn spawn_intent_is_sent_once_per_connection() {
        let sel = CharacterSelection {
            character_type: "gotchi".into(),
            character_id: 7,
        };
        let mut s = SessionController::new(ClientConfig::default());
        assert!(matches!(s.request_spawn(sel.clone()), Err(SessionError::NotConnected(_))));

        s.begin_connect().unwrap();
        s.on_connected().unwrap();
        assert!(matches!(s.request_spawn(sel.clone()), Ok(Outbound::SpawnIntent(_))));
        assert!(matches!(s.request_spawn(sel.clone()), Err(SessionError::AlreadySpawned)));

        s.on_disconnected();
        s.begin_connect().unwrap();
        s.on_connected().unwrap();
        assert!(s.request_spawn(sel).is_ok());
    }

    #[test]
    fn level_up_raises_event_and_text() {
        let mut s = connected();
        s.on_payload(&batch(vec![welcome("p1"), zone_set(1, 2, 3, 4), player("p1", 100, 0)]), 0)
            .unwrap();
        s.on_payload(
            &batch(vec![rec(
                "levelUp",
                json!({ "newLevel": 2, "newATK": 11, "gameXpOnCurrentLevel": 0,
                        "gameXpTotalForNextLevel": 200 }),
            )]),
            0,
        )
        .unwrap();
        assert_eq!(s.players().local().unwrap().stats().game_level, 2);
        assert_eq!(s.pool().in_use(Role::Text), 2);
        let events = s.drain_events();
        assert!(matches!(events[0], PresentationEvent::LevelUp { new_level: 2, new_atk: 11, .. }));
    }

    #[test]
    fn ability_circle_depends_on_caster_kind() {
        let mut s = connected();
        s.on_payload(
            &batch(vec![zone_set(1, 2, 3, 4), player("p1", 100, 0), enemy("e1", 1, 100)]),
            0,
        )
        .unwrap();
        s.on_payload(
            &batch(vec![
                rec("abilityEffect", json!({ "abilityName": "HammerSwing", "casterId": "p1",
                                             "impactX": 0, "impactY": 0 })),
                rec("abilityEffect", json!({ "abilityName": "HammerSwing", "casterId": "e1",
                                             "impactX": 0, "impactY": 0 })),
                rec("abilityEffect", json!({ "abilityName": "HammerSwing", "casterId": "nobody",
                                             "impactX": 0, "impactY": 0 })),
            ]),
            0,
        )
        .unwrap();
        let mut radii: Vec<_> = s.pool().iter_live(Role::Vfx).map(|(_, v)| (v.radius, v.color)).collect();
        radii.sort_by(|a, b| a.0.total_cmp(&b.0));
        assert_eq!(radii, vec![(70.0, 0xff0000), (100.0, 0xffffff)]);

        s.tick(250, 0.0, Keys::empty());
        assert_eq!(s.pool().in_use(Role::Vfx), 0);
    }

    #[test]
    fn telegraph_only_from_enemies() {
        let mut s = connected();
        s.on_payload(&batch(vec![zone_set(1, 2, 3, 4), player("p1", 100, 0), enemy("e1", 1, 100)]), 0)
            .unwrap();
        let warn = |caster: &str| {
            rec("telegraphWarning", json!({ "casterId": caster, "impactX": 1, "impactY": 1,
                                             "radius": 50, "durationMs": 800 }))
        };
        s.on_payload(&batch(vec![warn("p1"), warn("e1")]), 0).unwrap();
        assert_eq!(s.pool().in_use(Role::Vfx), 1);
    }

    #[test]
    fn viewport_follows_local_player_unless_pinned() {
        let mut s = connected();
        s.on_payload(&batch(vec![welcome("p1"), zone_set(1, 2, 3, 4), player("p1", 100, 0)]), 0)
            .unwrap();
        s.tick(0, 0.0, Keys::empty());
        assert!(s.viewport().contains(Vec2::new(100.0, 100.0)));
        assert_eq!(s.follow_target(), Some(Vec2::new(100.0, 100.0)));

        let pinned = Rect::new(9_000.0, 9_000.0, 10.0, 10.0);
        s.set_viewport(Some(pinned));
        s.tick(16, 0.0, Keys::empty());
        assert_eq!(s.viewport(), pinned);
    }

    #[test]
    fn shutdown_releases_every_slot() {
        let mut cfg = ClientConfig::default();
        cfg.pools = PoolCapacities::uniform(8);
        let mut s = SessionController::new(cfg);
        s.begin_connect().unwrap();
        s.on_connected().unwrap();
        s.on_payload(
            &batch(vec![welcome("p1"), zone_set(1, 2, 3, 4), player("p1", 100, 0), enemy("e1", 1, 100)]),
            0,
        )
        .unwrap();
        s.on_payload(&batch(vec![enemy("e1", 1, 60)]), 0).unwrap();
        s.shutdown();
        for role in Role::ALL {
            assert_eq!(s.pool().in_use(role), 0, "{role:?}");
        }
        assert!(s.enemies().is_empty());
        assert_eq!(s.state(), SessionState::Disconnected);
    }
}
