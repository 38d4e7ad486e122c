//! Area-of-interest tracking.
//!
//! The server tells the client which four zones are relevant (the one the
//! local player stands in plus three neighbours). Slot labels follow the
//! player's movement direction, so a zone can move from `x_axis` to `current`
//! between two updates. Only a zone that is absent from *every* slot of the
//! new set is culled.
//!
//! The welcome handshake also lists every zone of the world map; those are
//! kept in a [`ZoneRegistry`] for the tilemap loader and camera bounds.

use std::collections::HashMap;

use realm_shared::{
    math::Rect,
    net::{ActiveZoneSet, ZoneDescriptor, ZoneId},
    pool::RenderPool,
};
use tracing::{debug, info};

/// Anything holding tracked entities tagged with a zone.
pub trait ZoneCull {
    /// Releases the pooled resources of every entity in `zone` and stops
    /// tracking it. Returns how many entities were removed.
    fn cull_zone(&mut self, zone: ZoneId, pool: &mut RenderPool) -> usize;
}

/// Holds the current four-slot active set.
#[derive(Debug, Default)]
pub struct ZoneActivityTracker {
    active: Option<ActiveZoneSet>,
}

impl ZoneActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last set received, if any.
    pub fn active(&self) -> Option<&ActiveZoneSet> {
        self.active.as_ref()
    }

    /// True when `zone` is in any slot of the current set. Before the first
    /// set arrives nothing is active.
    pub fn is_active(&self, zone: ZoneId) -> bool {
        self.active.map_or(false, |set| set.contains(zone))
    }

    /// Zones of the current set that `next` no longer covers, in slot order,
    /// each listed once.
    pub fn departing(&self, next: &ActiveZoneSet) -> Vec<ZoneId> {
        let Some(prev) = self.active else {
            return Vec::new();
        };
        let mut gone = Vec::with_capacity(4);
        for zone in prev.slots() {
            if !next.contains(zone) && !gone.contains(&zone) {
                gone.push(zone);
            }
        }
        gone
    }

    /// Culls every zone that left the set from all `holders`, then stores
    /// `next`. Returns `(zone, removed)` for each culled zone.
    pub fn apply_new_active_set(
        &mut self,
        next: ActiveZoneSet,
        pool: &mut RenderPool,
        holders: &mut [&mut dyn ZoneCull],
    ) -> Vec<(ZoneId, usize)> {
        let gone = self.departing(&next);
        let mut culled = Vec::with_capacity(gone.len());
        for zone in gone {
            let removed: usize = holders.iter_mut().map(|h| h.cull_zone(zone, pool)).sum();
            info!(zone = %zone, removed, "Zone left active set");
            culled.push((zone, removed));
        }
        debug!(
            current = %next.current,
            x_axis = %next.x_axis,
            y_axis = %next.y_axis,
            diagonal = %next.diagonal,
            "Active zone set updated"
        );
        self.active = Some(next);
        culled
    }
}

/// Zone geometry references received in the welcome handshake.
#[derive(Debug, Default)]
pub struct ZoneRegistry {
    zones: HashMap<ZoneId, ZoneDescriptor>,
    max_world_x: f32,
    max_world_y: f32,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every descriptor that references a real map. Zone 0 and empty
    /// or null map refs are placeholders and are skipped; they still count
    /// towards the world bounds.
    pub fn register_all(&mut self, descriptors: &[ZoneDescriptor]) {
        for d in descriptors {
            self.max_world_x = self.max_world_x.max(d.world_x);
            self.max_world_y = self.max_world_y.max(d.world_y);
            if d.zone_id == ZoneId(0) || matches!(d.map_ref.as_str(), "" | "nil" | "null") {
                debug!(zone = %d.zone_id, "Skipping placeholder zone");
                continue;
            }
            self.zones.insert(d.zone_id, d.clone());
        }
        info!(zones = self.zones.len(), "Zone registry loaded");
    }

    pub fn get(&self, zone: ZoneId) -> Option<&ZoneDescriptor> {
        self.zones.get(&zone)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// World rectangle covering every zone, for clamping the camera.
    pub fn world_bounds(&self, zone_extent_px: f32) -> Rect {
        Rect::new(
            0.0,
            0.0,
            self.max_world_x + zone_extent_px,
            self.max_world_y + zone_extent_px,
        )
    }

    pub fn clear(&mut self) {
        self.zones.clear();
        self.max_world_x = 0.0;
        self.max_world_y = 0.0;
    }
}
