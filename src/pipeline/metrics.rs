// src/pipeline/metrics.rs
//
// Counting observability. Every rejection path and zone hit has its own
// counter; a sustained shift in one of them is the retuning signal.
//
// Each tick accumulates into its own `Counters` (carried by the frame
// context) and is merged into the process totals once the tick is complete.

use crate::analysis::RejectReason;
use crate::motion::MotionStatus;
use crate::types::Zone;
use serde::Serialize;
use std::time::Instant;

macro_rules! counters {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
        pub struct Counters {
            $($(#[$doc])* pub $name: u64,)*
        }

        impl Counters {
            pub fn merge(&mut self, other: &Counters) {
                $(self.$name += other.$name;)*
            }

            /// `(name, value)` for every counter, in declaration order.
            pub fn entries(&self) -> Vec<(&'static str, u64)> {
                vec![$((stringify!($name), self.$name),)*]
            }
        }
    };
}

counters! {
    /// Track messages (ticks) consumed
    messages,
    tracklets_total,
    /// Host backend: detections kept after NMS
    detections_total,
    decode_skipped_maps,
    decode_dropped_boxes,
    /// Input that did not match the configured track source
    input_mismatch,
    geometry_reject,
    roi_reject,
    zone_neg_hits,
    zone_mid_hits,
    zone_pos_hits,
    middle_entries,
    middle_inferred,
    middle_reject_side_frames,
    middle_stall,
    middle_abandoned,
    zone_flip_no_middle,
    zone_reject,
    conf_reject,
    depth_missing,
    depth_reject,
    depth_pass,
    bbox_reject_size,
    bbox_reject_ar,
    bbox_reject_wz,
    age_reject,
    hang_reject,
    rearm_reject,
    dup_reject,
    move_reject,
    lost_prune,
    tracker_removed,
    events_total,
    /// Accepted events pushed out of a full event bus before anyone drained them
    events_dropped,
    count_in,
    count_out,
    depth_updates,
    motion_updates,
}

impl Counters {
    pub fn record_zone(&mut self, zone: Zone) {
        match zone {
            Zone::SideA => self.zone_neg_hits += 1,
            Zone::Middle => self.zone_mid_hits += 1,
            Zone::SideB => self.zone_pos_hits += 1,
        }
    }

    pub fn record_reject(&mut self, reason: RejectReason) {
        let counter = match reason {
            RejectReason::Zone => &mut self.zone_reject,
            RejectReason::Confidence => &mut self.conf_reject,
            RejectReason::DepthMissing => &mut self.depth_missing,
            RejectReason::DepthOutOfRange => &mut self.depth_reject,
            RejectReason::BboxSize => &mut self.bbox_reject_size,
            RejectReason::BboxAspect => &mut self.bbox_reject_ar,
            RejectReason::BboxWidthDepth => &mut self.bbox_reject_wz,
            RejectReason::Age => &mut self.age_reject,
            RejectReason::Hang => &mut self.hang_reject,
            RejectReason::Rearm => &mut self.rearm_reject,
            RejectReason::Cooldown => &mut self.dup_reject,
            RejectReason::Movement => &mut self.move_reject,
        };
        *counter += 1;
    }

    /// Sum of every fire-time rejection counter.
    pub fn total_rejections(&self) -> u64 {
        self.zone_reject
            + self.conf_reject
            + self.depth_missing
            + self.depth_reject
            + self.bbox_reject_size
            + self.bbox_reject_ar
            + self.bbox_reject_wz
            + self.age_reject
            + self.hang_reject
            + self.rearm_reject
            + self.dup_reject
            + self.move_reject
    }
}

/// Process-wide totals owned by the counting thread.
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub totals: Counters,
    pub ticks: u64,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            totals: Counters::default(),
            ticks: 0,
            started_at: Instant::now(),
        }
    }

    pub fn merge_tick(&mut self, tick: &Counters) {
        self.totals.merge(tick);
        self.ticks += 1;
    }

    pub fn fps(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            self.ticks as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self, active_tracks: usize, motion: MotionStatus) -> TelemetrySnapshot {
        TelemetrySnapshot {
            count_in: self.totals.count_in,
            count_out: self.totals.count_out,
            active_tracks,
            ticks: self.ticks,
            fps: self.fps(),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
            motion,
            counters: self.totals.clone(),
        }
    }
}

/// Read-only view handed to diagnostics consumers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TelemetrySnapshot {
    pub count_in: u64,
    pub count_out: u64,
    pub active_tracks: usize,
    pub ticks: u64,
    pub fps: f64,
    pub elapsed_secs: f64,
    pub motion: MotionStatus,
    pub counters: Counters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_adds_every_counter() {
        let mut totals = Counters::default();
        let mut tick = Counters::default();
        tick.count_in = 1;
        tick.dup_reject = 2;
        tick.record_zone(Zone::Middle);
        totals.merge(&tick);
        totals.merge(&tick);
        assert_eq!(totals.count_in, 2);
        assert_eq!(totals.dup_reject, 4);
        assert_eq!(totals.zone_mid_hits, 2);
    }

    #[test]
    fn test_each_reason_hits_one_counter() {
        let reasons = [
            RejectReason::Zone,
            RejectReason::Confidence,
            RejectReason::DepthMissing,
            RejectReason::DepthOutOfRange,
            RejectReason::BboxSize,
            RejectReason::BboxAspect,
            RejectReason::BboxWidthDepth,
            RejectReason::Age,
            RejectReason::Hang,
            RejectReason::Rearm,
            RejectReason::Cooldown,
            RejectReason::Movement,
        ];
        for reason in reasons {
            let mut c = Counters::default();
            c.record_reject(reason);
            assert_eq!(c.total_rejections(), 1);
            let named = c
                .entries()
                .into_iter()
                .find(|(name, _)| *name == reason.counter_name())
                .map(|(_, v)| v);
            assert_eq!(named, Some(1), "{:?}", reason);
        }
    }

    #[test]
    fn test_summary_copies_totals() {
        let mut metrics = PipelineMetrics::new();
        let mut tick = Counters::default();
        tick.count_out = 3;
        metrics.merge_tick(&tick);
        let snap = metrics.summary(4, MotionStatus::default());
        assert_eq!(snap.count_out, 3);
        assert_eq!(snap.active_tracks, 4);
        assert_eq!(snap.ticks, 1);
        assert_eq!(snap.counters.count_out, 3);
    }
}
