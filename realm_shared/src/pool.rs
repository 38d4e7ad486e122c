//! Render resource pools.
//!
//! Every visual the client draws for a world entity (body, shadow, status
//! bar, hit flash) or for a transient effect (VFX circle, floating text) lives
//! in a fixed-capacity, role-keyed arena created once at startup. Slots are
//! handed out through a free list, so acquire and release are O(1) and never
//! allocate.
//!
//! Handles carry a generation. Releasing bumps the slot's generation, which
//! makes every outstanding copy of the old handle stale: `get`/`get_mut`
//! return `None` for it and releasing it again is a no-op.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PoolCapacities;
use crate::math::Vec2;

/// What a pooled visual is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Body,
    Shadow,
    StatusBar,
    Flash,
    Vfx,
    Text,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Body,
        Role::Shadow,
        Role::StatusBar,
        Role::Flash,
        Role::Vfx,
        Role::Text,
    ];

    const fn index(self) -> usize {
        match self {
            Role::Body => 0,
            Role::Shadow => 1,
            Role::StatusBar => 2,
            Role::Flash => 3,
            Role::Vfx => 4,
            Role::Text => 5,
        }
    }
}

/// Full visual state of one pooled object, as a renderer would consume it.
#[derive(Debug, Clone, PartialEq)]
pub struct Visual {
    pub active: bool,
    pub visible: bool,
    pub position: Vec2,
    pub depth: i32,
    /// Atlas frame for sprites; empty for shapes and text.
    pub frame: String,
    pub alpha: f32,
    pub scale: f32,
    /// Anchor point in unit coordinates, `(0.5, 1.0)` is bottom-centre.
    pub origin: Vec2,
    pub flip_x: bool,
    /// Solid tint fill, used by hit-flash overlays.
    pub tint: Option<u32>,
    /// Fill colour for shapes, text colour for text.
    pub color: u32,
    pub width: f32,
    pub height: f32,
    pub radius: f32,
    pub font_px: u32,
    pub text: String,
}

impl Visual {
    fn blank() -> Self {
        Self {
            active: false,
            visible: false,
            position: Vec2::ZERO,
            depth: 0,
            frame: String::new(),
            alpha: 1.0,
            scale: 1.0,
            origin: Vec2::new(0.5, 0.5),
            flip_x: false,
            tint: None,
            color: 0xffffff,
            width: 0.0,
            height: 0.0,
            radius: 0.0,
            font_px: 0,
            text: String::new(),
        }
    }

    /// Resets to the role's default look, reusing string capacity.
    fn reset_for(&mut self, role: Role) {
        let mut frame = std::mem::take(&mut self.frame);
        let mut text = std::mem::take(&mut self.text);
        frame.clear();
        text.clear();
        *self = Self::blank();
        self.frame = frame;
        self.text = text;

        match role {
            Role::Body => {
                self.depth = 500;
                self.frame.push_str("easy.png");
                self.origin = Vec2::new(0.5, 1.0);
                self.width = 32.0;
                self.height = 32.0;
            }
            Role::Shadow => {
                self.depth = 499;
                self.frame.push_str("shadow.png");
                self.alpha = 0.5;
                self.width = 32.0;
                self.height = 16.0;
            }
            Role::StatusBar => {
                self.depth = 501;
                self.origin = Vec2::new(0.5, 1.0);
                self.color = 0xff0000;
                self.width = 32.0;
                self.height = 4.0;
            }
            Role::Flash => {
                self.depth = 502;
                self.frame.push_str("easy.png");
                self.alpha = 0.0;
                self.origin = Vec2::new(0.5, 1.0);
                self.tint = Some(0xffffff);
                self.width = 32.0;
                self.height = 32.0;
            }
            Role::Vfx => {
                self.depth = 900;
                self.radius = 1.0;
            }
            Role::Text => {
                self.depth = 3000;
                self.color = 0xff0000;
                self.font_px = 16;
            }
        }
    }

    /// Replaces the frame without giving up the buffer.
    pub fn set_frame(&mut self, frame: &str) {
        self.frame.clear();
        self.frame.push_str(frame);
    }

    /// Replaces the text without giving up the buffer.
    pub fn set_text(&mut self, text: &str) {
        self.text.clear();
        self.text.push_str(text);
    }
}

/// Reference to a pooled visual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    role: Role,
    index: u32,
    generation: u32,
}

impl Handle {
    pub fn role(&self) -> Role {
        self.role
    }
}

struct Slot {
    generation: u32,
    visual: Visual,
}

struct RolePool {
    role: Role,
    slots: Vec<Slot>,
    /// Indices of inactive slots; popped on acquire.
    free: Vec<u32>,
    peak: usize,
}

impl RolePool {
    fn new(role: Role, capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                visual: Visual::blank(),
            })
            .collect();
        // Reversed so the lowest index is handed out first.
        let free = (0..capacity as u32).rev().collect();
        Self {
            role,
            slots,
            free,
            peak: 0,
        }
    }

    fn in_use(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    fn acquire(&mut self) -> Option<Handle> {
        let index = self.free.pop()?;
        let slot = &mut self.slots[index as usize];
        slot.visual.reset_for(self.role);
        slot.visual.active = true;
        slot.visual.visible = true;
        let generation = slot.generation;
        self.peak = self.peak.max(self.in_use());
        Some(Handle {
            role: self.role,
            index,
            generation,
        })
    }

    fn live_slot_mut(&mut self, h: Handle) -> Option<&mut Slot> {
        self.slots
            .get_mut(h.index as usize)
            .filter(|s| s.generation == h.generation && s.visual.active)
    }

    fn release(&mut self, h: Handle) -> bool {
        let Some(slot) = self.live_slot_mut(h) else {
            return false;
        };
        slot.visual.active = false;
        slot.visual.visible = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(h.index);
        true
    }
}

/// Fixed-capacity pools for every [`Role`].
pub struct RenderPool {
    pools: [RolePool; 6],
}

impl RenderPool {
    pub fn new(capacities: PoolCapacities) -> Self {
        Self {
            pools: Role::ALL.map(|role| RolePool::new(role, capacities.for_role(role))),
        }
    }

    /// Takes an inactive slot, reset to the role's defaults and marked
    /// active + visible. `None` when every slot of the role is checked out.
    #[must_use]
    pub fn acquire(&mut self, role: Role) -> Option<Handle> {
        let pool = &mut self.pools[role.index()];
        let handle = pool.acquire();
        if handle.is_none() {
            debug!(role = ?role, capacity = pool.slots.len(), "Render pool exhausted");
        }
        handle
    }

    /// Returns a slot to its pool. Releasing a stale or already released
    /// handle does nothing and returns `false`.
    pub fn release(&mut self, handle: Handle) -> bool {
        self.pools[handle.role.index()].release(handle)
    }

    /// Visual state of a live handle.
    pub fn get(&self, handle: Handle) -> Option<&Visual> {
        self.pools[handle.role.index()]
            .slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation && s.visual.active)
            .map(|s| &s.visual)
    }

    /// Mutable visual state of a live handle.
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Visual> {
        self.pools[handle.role.index()]
            .live_slot_mut(handle)
            .map(|s| &mut s.visual)
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    pub fn capacity(&self, role: Role) -> usize {
        self.pools[role.index()].slots.len()
    }

    pub fn in_use(&self, role: Role) -> usize {
        self.pools[role.index()].in_use()
    }

    pub fn available(&self, role: Role) -> usize {
        self.pools[role.index()].free.len()
    }

    /// Highest simultaneous `in_use` seen for the role.
    pub fn peak(&self, role: Role) -> usize {
        self.pools[role.index()].peak
    }

    /// Iterates the live visuals of a role, for the renderer.
    pub fn iter_live(&self, role: Role) -> impl Iterator<Item = (Handle, &Visual)> {
        self.pools[role.index()]
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.visual.active)
            .map(move |(i, s)| {
                (
                    Handle {
                        role,
                        index: i as u32,
                        generation: s.generation,
                    },
                    &s.visual,
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_pool(n: usize) -> RenderPool {
        RenderPool::new(PoolCapacities::uniform(n))
    }

    #[test]
    fn acquire_marks_active_and_visible() {
        let mut pool = small_pool(2);
        let h = pool.acquire(Role::Body).unwrap();
        let v = pool.get(h).unwrap();
        assert!(v.active && v.visible);
        assert_eq!(v.depth, 500);
        assert_eq!(v.frame, "easy.png");
        assert_eq!(pool.in_use(Role::Body), 1);
        assert_eq!(pool.available(Role::Body), 1);
    }

    #[test]
    fn acquire_records_peak_and_current_generation() {
        let mut pool = small_pool(2);
        let a = pool.acquire(Role::Vfx).unwrap();
        let b = pool.acquire(Role::Vfx).unwrap();
        assert_eq!(pool.peak(Role::Vfx), 2);
        pool.release(a);
        pool.release(b);
        let c = pool.acquire(Role::Vfx).unwrap();
        assert!(pool.is_live(c));
        assert_ne!(c, a);
        assert_ne!(c, b);
        assert_eq!(pool.peak(Role::Vfx), 2);
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut pool = small_pool(2);
        assert!(pool.acquire(Role::Vfx).is_some());
        assert!(pool.acquire(Role::Vfx).is_some());
        assert!(pool.acquire(Role::Vfx).is_none());
        // Other roles are unaffected.
        assert!(pool.acquire(Role::Text).is_some());
    }

    #[test]
    fn release_is_idempotent() {
        let mut pool = small_pool(1);
        let h = pool.acquire(Role::Shadow).unwrap();
        assert!(pool.release(h));
        assert!(!pool.release(h));
        assert_eq!(pool.in_use(Role::Shadow), 0);
        assert_eq!(pool.available(Role::Shadow), 1);
    }

    #[test]
    fn stale_handle_cannot_touch_new_occupant() {
        let mut pool = small_pool(1);
        let old = pool.acquire(Role::Flash).unwrap();
        pool.release(old);
        let new = pool.acquire(Role::Flash).unwrap();
        assert_ne!(old, new);
        assert!(pool.get_mut(old).is_none());
        assert!(!pool.release(old));
        assert!(pool.is_live(new));
    }

    #[test]
    fn reacquire_resets_stale_visual_state() {
        let mut pool = small_pool(1);
        let h = pool.acquire(Role::Body).unwrap();
        {
            let v = pool.get_mut(h).unwrap();
            v.set_frame("boss.png");
            v.alpha = 0.1;
            v.flip_x = true;
            v.position = Vec2::new(40.0, 40.0);
        }
        pool.release(h);
        let h = pool.acquire(Role::Body).unwrap();
        let v = pool.get(h).unwrap();
        assert_eq!(v.frame, "easy.png");
        assert_eq!(v.alpha, 1.0);
        assert!(!v.flip_x);
        assert_eq!(v.position, Vec2::ZERO);
    }

    #[test]
    fn released_slots_are_reused_without_growing_peak() {
        let mut pool = small_pool(4);
        let handles: Vec<_> = (0..4).map(|_| pool.acquire(Role::StatusBar).unwrap()).collect();
        for h in handles {
            pool.release(h);
        }
        for _ in 0..4 {
            assert!(pool.acquire(Role::StatusBar).is_some());
        }
        assert_eq!(pool.peak(Role::StatusBar), 4);
        assert_eq!(pool.capacity(Role::StatusBar), 4);
    }

    #[test]
    fn iter_live_yields_usable_handles() {
        let mut pool = small_pool(3);
        let a = pool.acquire(Role::Text).unwrap();
        let _b = pool.acquire(Role::Text).unwrap();
        pool.release(a);
        let live: Vec<_> = pool.iter_live(Role::Text).map(|(h, _)| h).collect();
        assert_eq!(live.len(), 1);
        assert!(pool.is_live(live[0]));
    }
}
