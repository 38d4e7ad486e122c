//! Presentation events.
//!
//! The client core never calls into UI code. Anything the presentation layer
//! must react to (session over, level up, ...) is queued here and drained by
//! the host once per frame.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Signals surfaced to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PresentationEvent {
    /// The local player is gone (died or connection lost).
    SessionEnded { reason: SessionEndReason },
    /// The local player gained a level.
    LevelUp {
        new_level: u32,
        new_atk: i64,
        xp_on_current_level: i64,
        xp_total_for_next_level: i64,
    },
    /// A zone left the active set and its entities were dropped.
    ZoneCulled { zone_id: i64, removed: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEndReason {
    /// Local player reported at zero hp or removed by the server.
    PlayerRemoved,
    /// Transport closed or failed.
    Disconnected,
}

/// FIFO queue of presentation events.
#[derive(Debug, Default)]
pub struct EventQueue {
    queue: VecDeque<PresentationEvent>,
}

impl EventQueue {
    pub fn push(&mut self, e: PresentationEvent) {
        self.queue.push_back(e);
    }

    /// Drains all queued events, oldest first.
    pub fn drain(&mut self) -> Vec<PresentationEvent> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_is_fifo_and_empties() {
        let mut q = EventQueue::default();
        q.push(PresentationEvent::ZoneCulled { zone_id: 5, removed: 2 });
        q.push(PresentationEvent::SessionEnded {
            reason: SessionEndReason::Disconnected,
        });
        let drained = q.drain();
        assert_eq!(drained.len(), 2);
        assert!(matches!(drained[0], PresentationEvent::ZoneCulled { zone_id: 5, .. }));
        assert!(q.is_empty());
    }
}
