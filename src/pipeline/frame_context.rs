// src/pipeline/frame_context.rs
//
// Everything one tick produces. Decode, association, classification, state
// update and counting all write here; the context is folded into the totals
// and the shared snapshot only after every track has been processed.

use super::metrics::Counters;
use crate::types::{CrossingEvent, NormBox, Zone};
use serde::Serialize;

/// Per-track drawing data for the preview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackOverlay {
    pub id: u32,
    pub bbox: NormBox,
    pub zone: Zone,
    pub armed: bool,
    /// Confidence and depth would pass the counting gates
    pub countable: bool,
    pub depth_m: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct FrameContext {
    pub tick_id: u64,
    pub timestamp_ms: f64,
    pub counters: Counters,
    pub events: Vec<CrossingEvent>,
    pub overlays: Vec<TrackOverlay>,
}

impl FrameContext {
    pub fn new(tick_id: u64, timestamp_ms: f64) -> Self {
        Self {
            tick_id,
            timestamp_ms,
            counters: Counters::default(),
            events: Vec::new(),
            overlays: Vec::new(),
        }
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// (in, out) increments emitted this tick.
    pub fn net_counts(&self) -> (u32, u32) {
        self.events.iter().fold((0, 0), |(i, o), e| {
            (i + e.in_increment, o + e.out_increment)
        })
    }
}
