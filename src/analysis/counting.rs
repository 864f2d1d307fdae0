// src/analysis/counting.rs
//
// Turns a fire candidate into an accepted crossing or exactly one rejection.
//
// Gate precedence (first failure wins and names the counter):
//   zone → confidence → depth → bbox → age → hang → rearm → cooldown → movement

use super::crossing_state::{CrossState, FireCandidate};
use crate::depth::DepthReading;
use crate::types::{BboxLimits, CountingConfig, CrossingDirection, CrossingEvent, NormBox, Side, Tracklet};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    Zone,
    Confidence,
    DepthMissing,
    DepthOutOfRange,
    BboxSize,
    BboxAspect,
    BboxWidthDepth,
    Age,
    Hang,
    Rearm,
    Cooldown,
    Movement,
}

impl RejectReason {
    pub fn counter_name(&self) -> &'static str {
        match self {
            Self::Zone => "zone_reject",
            Self::Confidence => "conf_reject",
            Self::DepthMissing => "depth_missing",
            Self::DepthOutOfRange => "depth_reject",
            Self::BboxSize => "bbox_reject_size",
            Self::BboxAspect => "bbox_reject_ar",
            Self::BboxWidthDepth => "bbox_reject_wz",
            Self::Age => "age_reject",
            Self::Hang => "hang_reject",
            Self::Rearm => "rearm_reject",
            Self::Cooldown => "dup_reject",
            Self::Movement => "move_reject",
        }
    }
}

/// (in, out) increments for a side change. Only A→B and B→A count; `invert`
/// swaps the two.
pub fn transition_to_counts(start: i8, end: i8, invert: bool) -> (u32, u32) {
    let (count_in, count_out) = match (start, end) {
        (-1, 1) => (1, 0),
        (1, -1) => (0, 1),
        _ => (0, 0),
    };
    if invert {
        (count_out, count_in)
    } else {
        (count_in, count_out)
    }
}

pub struct CountingEngine {
    config: CountingConfig,
    model_width: u32,
    model_height: u32,
    /// Last accepted event of any track
    last_event_ms: Option<f64>,
}

impl CountingEngine {
    pub fn new(config: CountingConfig, model_width: u32, model_height: u32) -> Self {
        Self {
            config,
            model_width,
            model_height,
            last_event_ms: None,
        }
    }

    pub fn last_event_ms(&self) -> Option<f64> {
        self.last_event_ms
    }

    pub fn hang_timeout_ms(&self) -> f64 {
        self.config.hang_timeout_sec * 1000.0
    }

    /// Runs every gate for `candidate`. On success the event is emitted and
    /// both the global and the per-track event times move to `now_ms`.
    pub fn evaluate(
        &mut self,
        candidate: &FireCandidate,
        tracklet: &Tracklet,
        depth: DepthReading,
        state: &mut CrossState,
        now_ms: f64,
    ) -> Result<CrossingEvent, RejectReason> {
        let (in_increment, out_increment) = transition_to_counts(
            candidate.from.sign(),
            candidate.to.sign(),
            self.config.invert_direction,
        );
        if in_increment + out_increment != 1 {
            return Err(RejectReason::Zone);
        }

        self.check_gates(candidate, tracklet, depth, state, now_ms)?;

        let direction = match candidate.from {
            Side::A => CrossingDirection::AToB,
            Side::B => CrossingDirection::BToA,
        };
        let event = CrossingEvent {
            direction,
            inverted: self.config.invert_direction,
            in_increment,
            out_increment,
            track_id: tracklet.id,
            timestamp_ms: now_ms,
        };

        self.last_event_ms = Some(now_ms);
        state.record_event(now_ms);
        info!(
            "✓ Count {} track={} in+{} out+{} moved={:.3}{}",
            event.label(),
            tracklet.id,
            in_increment,
            out_increment,
            candidate.moved,
            if candidate.inferred { " (span)" } else { "" }
        );
        Ok(event)
    }

    fn check_gates(
        &self,
        candidate: &FireCandidate,
        tracklet: &Tracklet,
        depth: DepthReading,
        state: &CrossState,
        now_ms: f64,
    ) -> Result<(), RejectReason> {
        let c = &self.config;

        if tracklet.confidence < c.confidence_min {
            debug!(
                "track {} rejected: confidence {:.2} < {:.2}",
                tracklet.id, tracklet.confidence, c.confidence_min
            );
            return Err(RejectReason::Confidence);
        }

        match depth {
            DepthReading::Missing => return Err(RejectReason::DepthMissing),
            DepthReading::OutOfRange(m) => {
                debug!("track {} rejected: depth {:.2} m out of range", tracklet.id, m);
                return Err(RejectReason::DepthOutOfRange);
            }
            DepthReading::Disabled | DepthReading::InRange(_) => {}
        }

        self.check_bbox(&tracklet.bbox, depth.meters())?;

        if tracklet.age < c.min_track_age {
            return Err(RejectReason::Age);
        }

        if let Some(entered) = candidate.entered_middle_ms {
            if now_ms - entered > self.hang_timeout_ms() {
                return Err(RejectReason::Hang);
            }
        }

        if c.per_track_rearm_sec > 0.0 {
            if let Some(last) = state.last_event_ms {
                if now_ms - last < c.per_track_rearm_sec * 1000.0 {
                    return Err(RejectReason::Rearm);
                }
            }
        }

        if let Some(last) = self.last_event_ms {
            if now_ms - last < c.count_cooldown_sec * 1000.0 {
                return Err(RejectReason::Cooldown);
            }
        }

        if candidate.moved < c.min_move_norm {
            debug!(
                "track {} rejected: moved {:.3} < {:.3}",
                tracklet.id, candidate.moved, c.min_move_norm
            );
            return Err(RejectReason::Movement);
        }

        Ok(())
    }

    fn check_bbox(&self, bbox: &NormBox, depth_m: Option<f32>) -> Result<(), RejectReason> {
        let limits: &BboxLimits = &self.config.bbox;
        let (w_px, h_px) = bbox.pixel_size(self.model_width, self.model_height);

        if limits.has_size_limits() {
            let area = w_px * h_px;
            let fails = below(w_px, limits.min_w_px)
                || below(h_px, limits.min_h_px)
                || above(w_px, limits.max_w_px)
                || above(h_px, limits.max_h_px)
                || below(area, limits.min_area_px2)
                || above(area, limits.max_area_px2);
            if fails {
                return Err(RejectReason::BboxSize);
            }
        }

        if limits.has_aspect_limits() {
            if h_px <= 0.0 {
                return Err(RejectReason::BboxAspect);
            }
            let aspect = w_px / h_px;
            if below(aspect, limits.min_aspect) || above(aspect, limits.max_aspect) {
                return Err(RejectReason::BboxAspect);
            }
        }

        // Only meaningful with a depth value; depth gating off leaves it unchecked
        if limits.has_width_depth_limits() {
            if let Some(m) = depth_m {
                let width_depth = w_px * m;
                if below(width_depth, limits.min_width_depth)
                    || above(width_depth, limits.max_width_depth)
                {
                    return Err(RejectReason::BboxWidthDepth);
                }
            }
        }

        Ok(())
    }
}

fn below(value: f32, limit: Option<f32>) -> bool {
    matches!(limit, Some(min) if value < min)
}

fn above(value: f32, limit: Option<f32>) -> bool {
    matches!(limit, Some(max) if value > max)
}
