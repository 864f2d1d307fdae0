// src/pipeline/event_bus.rs
//
// Pending crossing events between the counting loop and whatever forwards
// them upstream. Bounded: if the consumer stalls, the oldest events go first.
// One warning per overflow episode; draining ends the episode.

use crate::types::CrossingEvent;
use std::collections::VecDeque;
use tracing::warn;

pub struct EventBus {
    events: VecDeque<CrossingEvent>,
    max_pending: usize,
    overflowing: bool,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        let max_pending = max_pending.max(1);
        Self {
            events: VecDeque::with_capacity(max_pending),
            max_pending,
            overflowing: false,
        }
    }

    /// Returns true when the oldest pending event was dropped to make room.
    pub fn publish(&mut self, event: CrossingEvent) -> bool {
        let dropped = self.events.len() >= self.max_pending;
        if dropped {
            if !self.overflowing {
                warn!(
                    "Event bus full ({} events), dropping oldest until drained",
                    self.max_pending
                );
                self.overflowing = true;
            }
            self.events.pop_front();
        }
        self.events.push_back(event);
        dropped
    }

    pub fn drain(&mut self) -> Vec<CrossingEvent> {
        self.overflowing = false;
        self.events.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CrossingDirection;

    fn event(track_id: u32) -> CrossingEvent {
        CrossingEvent {
            direction: CrossingDirection::AToB,
            inverted: false,
            in_increment: 1,
            out_increment: 0,
            track_id,
            timestamp_ms: track_id as f64,
        }
    }

    #[test]
    fn test_drops_oldest_when_full() {
        let mut bus = EventBus::new(2);
        assert!(!bus.publish(event(1)));
        assert!(!bus.publish(event(2)));
        assert!(bus.publish(event(3)));
        assert!(bus.publish(event(4)));
        assert_eq!(bus.pending_count(), 2);
        let ids: Vec<u32> = bus.drain().iter().map(|e| e.track_id).collect();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(bus.pending_count(), 0);
        assert!(!bus.publish(event(5)));
    }
}
