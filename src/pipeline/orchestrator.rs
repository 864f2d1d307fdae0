// src/pipeline/orchestrator.rs
//
// One tick, start to finish:
//   source (decode → associate) → ROI → gate → CrossState → counting
// All tracks are processed before the tick's counters are merged and its
// events published.

use super::event_bus::EventBus;
use super::frame_context::{FrameContext, TrackOverlay};
use super::metrics::{Counters, PipelineMetrics, TelemetrySnapshot};
use crate::analysis::{
    CountingEngine, CrossState, GateClassifier, RejectReason, StepOutcome, TransitionParams,
};
use crate::depth::{DepthMap, DepthReading, DepthValidator};
use crate::error::ConfigError;
use crate::motion::{MotionMonitor, MotionSample};
use crate::tracking::{TrackBatch, TrackInput, TrackSource};
use crate::types::{Config, CrossingEvent, NormBox, RoiMode, Tracklet};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const MAX_PENDING_EVENTS: usize = 256;

pub struct CountingPipeline {
    config: Config,
    classifier: GateClassifier,
    params: TransitionParams,
    depth: DepthValidator,
    engine: CountingEngine,
    source: TrackSource,
    states: BTreeMap<u32, CrossState>,
    metrics: PipelineMetrics,
    events: EventBus,
    latest_depth: Option<DepthMap>,
    motion: MotionMonitor,
    roi: Option<NormBox>,
    lost_timeout_ms: f64,
    tick_id: u64,
    last_overlays: Vec<TrackOverlay>,
}

impl CountingPipeline {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let geometry = config.gate_geometry()?;
        let classifier = GateClassifier::new(geometry, &config.gate);
        let engine = CountingEngine::new(
            config.counting.clone(),
            config.backend.model_input_width,
            config.backend.model_input_height,
        );
        let params = TransitionParams {
            min_side_frames_before_middle: config.gate.min_side_frames_before_middle,
            hang_timeout_ms: engine.hang_timeout_ms(),
            infer_middle_from_span: config.gate.infer_middle_from_span,
        };
        let roi = config
            .gate
            .roi
            .map(|[x1, y1, x2, y2]| NormBox::new(x1, y1, x2, y2));

        info!(
            "✓ Counting pipeline ready: source={:?} axis={:?} lines=[{:.3}, {:.3}] h={:.3}",
            config.backend.kind,
            config.gate.axis,
            geometry.line_a(),
            geometry.line_b(),
            geometry.hysteresis()
        );

        Ok(Self {
            classifier,
            params,
            depth: DepthValidator::new(config.depth.clone()),
            engine,
            source: TrackSource::from_config(&config),
            states: BTreeMap::new(),
            metrics: PipelineMetrics::new(),
            events: EventBus::new(MAX_PENDING_EVENTS),
            latest_depth: None,
            motion: MotionMonitor::new(config.motion.enabled),
            roi,
            lost_timeout_ms: config.lost_timeout_ms(),
            tick_id: 0,
            last_overlays: Vec::new(),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn classifier(&self) -> &GateClassifier {
        &self.classifier
    }

    pub fn roi(&self) -> Option<NormBox> {
        self.roi
    }

    pub fn totals(&self) -> &Counters {
        &self.metrics.totals
    }

    pub fn active_tracks(&self) -> usize {
        self.states.len()
    }

    pub fn state(&self, track_id: u32) -> Option<&CrossState> {
        self.states.get(&track_id)
    }

    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    pub fn overlays(&self) -> &[TrackOverlay] {
        &self.last_overlays
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.metrics.summary(self.states.len(), self.motion.status())
    }

    /// Newest depth map replaces the cached one.
    pub fn update_depth(&mut self, map: DepthMap) {
        self.latest_depth = Some(map);
        self.metrics.totals.depth_updates += 1;
    }

    pub fn update_motion(&mut self, sample: &MotionSample) {
        if self.motion.update(sample) {
            self.metrics.totals.motion_updates += 1;
        }
    }

    /// Takes every accepted event since the last drain. Events also appear in
    /// each tick's `FrameContext`; a caller that only reads those should still
    /// drain here, or the bounded queue overflows and `events_dropped` grows.
    pub fn drain_events(&mut self) -> Vec<CrossingEvent> {
        self.events.drain()
    }

    pub fn process_tick(&mut self, input: TrackInput, timestamp_ms: f64) -> FrameContext {
        self.tick_id += 1;
        let mut ctx = FrameContext::new(self.tick_id, timestamp_ms);
        ctx.counters.messages += 1;

        let batch = match self.source.ingest(input, timestamp_ms) {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Tick {} input dropped: {}", self.tick_id, e);
                ctx.counters.input_mismatch += 1;
                TrackBatch::default()
            }
        };
        ctx.counters.detections_total += batch.detections;
        ctx.counters.decode_skipped_maps += batch.skipped_maps;
        ctx.counters.decode_dropped_boxes += batch.dropped_boxes;

        for id in &batch.pruned {
            if self.states.remove(id).is_some() {
                debug!("Track {} lost, state dropped", id);
            }
            ctx.counters.lost_prune += 1;
        }

        for tracklet in &batch.tracklets {
            self.process_tracklet(tracklet, &mut ctx);
        }

        self.prune_stale(&mut ctx);

        for event in &ctx.events {
            if self.events.publish(event.clone()) {
                ctx.counters.events_dropped += 1;
            }
        }
        self.metrics.merge_tick(&ctx.counters);
        self.last_overlays = ctx.overlays.clone();
        ctx
    }

    fn process_tracklet(&mut self, tracklet: &Tracklet, ctx: &mut FrameContext) {
        let now = ctx.timestamp_ms;
        ctx.counters.tracklets_total += 1;

        if !tracklet.status.is_live() {
            if self.states.remove(&tracklet.id).is_some() {
                debug!("Track {} {:?}, state dropped", tracklet.id, tracklet.status);
            }
            ctx.counters.tracker_removed += 1;
            return;
        }

        if tracklet.bbox.is_degenerate() {
            ctx.counters.geometry_reject += 1;
            return;
        }

        let state = self
            .states
            .entry(tracklet.id)
            .or_insert_with(|| CrossState::new(now));
        state.last_seen_ms = now;

        if let Some(roi) = &self.roi {
            let (cx, cy) = tracklet.bbox.centroid();
            if !roi.contains_point(cx, cy) {
                ctx.counters.roi_reject += 1;
                if self.config.gate.roi_mode == RoiMode::Hard {
                    state.reset();
                }
                return;
            }
        }

        let reading = self.classifier.read(&tracklet.bbox, state.side());
        ctx.counters.record_zone(reading.zone);
        let depth = self.depth.assess(&tracklet.bbox, self.latest_depth.as_ref());

        let outcome = state.observe(
            reading.zone,
            reading.axis_value,
            reading.spans_both,
            now,
            &self.params,
        );

        match outcome {
            StepOutcome::Unset
            | StepOutcome::Established(_)
            | StepOutcome::SideHeld
            | StepOutcome::MiddleHeld => {}
            StepOutcome::MiddleEntered => {
                ctx.counters.middle_entries += 1;
                debug!("Track {} armed from {:?}", tracklet.id, state.side());
            }
            StepOutcome::MiddleRejected => ctx.counters.middle_reject_side_frames += 1,
            StepOutcome::Stalled => {
                ctx.counters.middle_stall += 1;
                debug!("Track {} stalled in the doorway, reset", tracklet.id);
            }
            StepOutcome::Abandoned => ctx.counters.middle_abandoned += 1,
            StepOutcome::FlipWithoutMiddle { from, to } => {
                ctx.counters.zone_flip_no_middle += 1;
                debug!(
                    "Track {} jumped {:?} -> {:?} without a middle visit",
                    tracklet.id, from, to
                );
            }
            StepOutcome::Fire(candidate) => {
                if candidate.inferred {
                    ctx.counters.middle_inferred += 1;
                }
                let result = self
                    .engine
                    .evaluate(&candidate, tracklet, depth, state, now);

                let reached_depth =
                    !matches!(result, Err(RejectReason::Zone | RejectReason::Confidence));
                if reached_depth && matches!(depth, DepthReading::InRange(_)) {
                    ctx.counters.depth_pass += 1;
                }

                match result {
                    Ok(event) => {
                        ctx.counters.events_total += 1;
                        ctx.counters.count_in += event.in_increment as u64;
                        ctx.counters.count_out += event.out_increment as u64;
                        ctx.events.push(event);
                    }
                    Err(reason) => {
                        ctx.counters.record_reject(reason);
                        debug!(
                            "Track {} crossing {:?} -> {:?} rejected: {}",
                            tracklet.id,
                            candidate.from,
                            candidate.to,
                            reason.counter_name()
                        );
                    }
                }
            }
        }

        ctx.overlays.push(TrackOverlay {
            id: tracklet.id,
            bbox: tracklet.bbox,
            zone: reading.zone,
            armed: state.is_armed(),
            countable: tracklet.confidence >= self.config.counting.confidence_min
                && depth.passes(),
            depth_m: depth.meters(),
        });
    }

    /// Drops state for tracks the source stopped reporting.
    fn prune_stale(&mut self, ctx: &mut FrameContext) {
        let now = ctx.timestamp_ms;
        let timeout = self.lost_timeout_ms;
        let before = self.states.len();
        self.states.retain(|id, state| {
            let keep = now - state.last_seen_ms <= timeout;
            if !keep {
                debug!("Track {} stale for {:.0} ms, pruned", id, now - state.last_seen_ms);
            }
            keep
        });
        ctx.counters.lost_prune += (before - self.states.len()) as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BackendKind, CrossingDirection, Side, TrackStatus};
    use ndarray::{s, Array2, Array4};

    /// Gate defaults put line A at 0.375 and line B at 0.625 (h = 0.04).
    const A: f32 = 0.20;
    const MID: f32 = 0.50;
    const B: f32 = 0.80;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.counting.confidence_min = 0.5;
        config.counting.min_track_age = 1;
        config.counting.count_cooldown_sec = 0.0;
        config.counting.min_move_norm = 0.2;
        config.depth.min_valid_px = 4;
        config.preview.enabled = false;
        config
    }

    fn pipeline(config: Config) -> CountingPipeline {
        let mut p = CountingPipeline::new(config).unwrap();
        p.update_depth(DepthMap::new(Array2::from_elem((100, 100), 1000u16), 0.0));
        p
    }

    fn at(id: u32, center: f32, confidence: f32, age: u32) -> Tracklet {
        Tracklet {
            id,
            status: TrackStatus::Tracked,
            bbox: NormBox::new(center - 0.05, 0.2, center + 0.05, 0.8),
            confidence,
            age,
        }
    }

    /// Feeds one track through `centers`, one tick every 100 ms.
    fn run_track(p: &mut CountingPipeline, id: u32, centers: &[f32]) -> Vec<CrossingEvent> {
        let mut events = Vec::new();
        for (i, c) in centers.iter().enumerate() {
            let input = TrackInput::Tracklets(vec![at(id, *c, 0.9, i as u32 + 1)]);
            let ctx = p.process_tick(input, i as f64 * 100.0);
            events.extend(ctx.events);
        }
        events
    }

    #[test]
    fn test_round_trip_a_to_b_counts_in() {
        let mut p = pipeline(test_config());
        let events = run_track(&mut p, 1, &[A, A, MID, MID, B]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, CrossingDirection::AToB);
        assert_eq!((events[0].in_increment, events[0].out_increment), (1, 0));
        assert_eq!(events[0].timestamp_ms, 400.0);
        assert_eq!(p.totals().count_in, 1);
        assert_eq!(p.totals().count_out, 0);
        assert_eq!(p.totals().middle_entries, 1);
        assert_eq!(p.totals().depth_pass, 1);
        assert_eq!(p.drain_events().len(), 1);
    }

    #[test]
    fn test_return_to_start_side_does_not_count() {
        let mut config = test_config();
        config.gate.min_side_frames_before_middle = 1;
        let mut p = pipeline(config);
        let events = run_track(&mut p, 1, &[A, MID, A]);
        assert!(events.is_empty());
        let state = p.state(1).unwrap();
        assert_eq!(state.side(), Some(Side::A));
        assert!(!state.is_armed());
        assert_eq!(p.totals().middle_abandoned, 1);
    }

    #[test]
    fn test_low_confidence_rejects_but_advances() {
        let mut p = pipeline(test_config());
        run_track(&mut p, 1, &[A, A, MID, MID]);
        let ctx = p.process_tick(TrackInput::Tracklets(vec![at(1, B, 0.2, 5)]), 400.0);
        assert!(ctx.events.is_empty());
        assert_eq!(p.totals().conf_reject, 1);
        assert_eq!(p.totals().total_rejections(), 1);
        let state = p.state(1).unwrap();
        assert_eq!(state.side(), Some(Side::B));
        assert!(!state.is_armed());
    }

    #[test]
    fn test_missing_depth_rejects() {
        let mut p = CountingPipeline::new(test_config()).unwrap();
        let events = run_track(&mut p, 1, &[A, A, MID, MID, B]);
        assert!(events.is_empty());
        assert_eq!(p.totals().depth_missing, 1);
        assert_eq!(p.totals().depth_pass, 0);
    }

    #[test]
    fn test_opposite_crossings_same_tick() {
        let run = |reverse: bool| {
            let mut p = pipeline(test_config());
            let track1 = [A, A, MID, MID, B];
            let track2 = [B, B, MID, MID, A];
            let mut events = Vec::new();
            for i in 0..5 {
                let mut batch = vec![
                    at(1, track1[i], 0.9, i as u32 + 1),
                    at(2, track2[i], 0.9, i as u32 + 1),
                ];
                if reverse {
                    batch.reverse();
                }
                let ctx = p.process_tick(TrackInput::Tracklets(batch), i as f64 * 100.0);
                events.extend(ctx.events);
            }
            (events, p.totals().clone())
        };

        let (events, totals) = run(false);
        assert_eq!(events.len(), 2);
        assert_eq!(totals.count_in, 1);
        assert_eq!(totals.count_out, 1);

        let (reversed_events, reversed_totals) = run(true);
        assert_eq!(events, reversed_events);
        assert_eq!(totals, reversed_totals);
    }

    #[test]
    fn test_invert_direction_swaps_counts() {
        let mut config = test_config();
        config.counting.invert_direction = true;
        let mut p = pipeline(config);
        let events = run_track(&mut p, 1, &[A, A, MID, MID, B]);
        assert_eq!(events.len(), 1);
        assert_eq!((events[0].in_increment, events[0].out_increment), (0, 1));
        assert_eq!(events[0].label(), "a_to_b_inverted");
        assert_eq!(p.totals().count_in, 0);
        assert_eq!(p.totals().count_out, 1);
    }

    #[test]
    fn test_cooldown_prevents_double_count() {
        let mut config = test_config();
        config.counting.count_cooldown_sec = 1.8;
        let mut p = pipeline(config);
        let track1 = [A, A, MID, MID, B, B];
        let track2 = [A, A, A, MID, MID, B];
        let mut events = Vec::new();
        for i in 0..6 {
            let batch = vec![
                at(1, track1[i], 0.9, i as u32 + 1),
                at(2, track2[i], 0.9, i as u32 + 1),
            ];
            events.extend(p.process_tick(TrackInput::Tracklets(batch), i as f64 * 100.0).events);
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].track_id, 1);
        assert_eq!(p.totals().dup_reject, 1);
    }

    #[test]
    fn test_identical_input_identical_output() {
        let script: Vec<Vec<Tracklet>> = vec![
            vec![at(1, A, 0.9, 1), at(2, B, 0.9, 1)],
            vec![at(1, A, 0.9, 2), at(2, MID, 0.9, 2)],
            vec![at(1, MID, 0.9, 3), at(2, MID, 0.9, 3), at(3, MID, 0.9, 1)],
            vec![at(1, MID, 0.4, 4), at(2, A, 0.9, 4), at(3, A, 0.9, 2)],
            vec![at(1, B, 0.9, 5), at(3, A, 0.9, 3)],
        ];
        let run = || {
            let mut p = pipeline(test_config());
            let mut events = Vec::new();
            for (i, batch) in script.iter().enumerate() {
                let ctx = p.process_tick(TrackInput::Tracklets(batch.clone()), i as f64 * 100.0);
                events.extend(ctx.events);
            }
            (events, p.totals().clone())
        };
        let (first_events, first_totals) = run();
        let (second_events, second_totals) = run();
        assert_eq!(first_events, second_events);
        assert_eq!(first_totals, second_totals);
        for e in &first_events {
            assert_eq!(e.in_increment + e.out_increment, 1);
        }
    }

    #[test]
    fn test_hardware_lost_removes_state() {
        let mut p = pipeline(test_config());
        run_track(&mut p, 4, &[A, A]);
        assert_eq!(p.active_tracks(), 1);
        let mut lost = at(4, A, 0.9, 3);
        lost.status = TrackStatus::Lost;
        p.process_tick(TrackInput::Tracklets(vec![lost]), 200.0);
        assert_eq!(p.active_tracks(), 0);
        assert_eq!(p.totals().tracker_removed, 1);
    }

    #[test]
    fn test_stale_tracks_pruned() {
        let mut p = pipeline(test_config());
        run_track(&mut p, 1, &[A]);
        // default timeout: 5 frames at 10 fps
        p.process_tick(TrackInput::Tracklets(Vec::new()), 400.0);
        assert_eq!(p.active_tracks(), 1);
        p.process_tick(TrackInput::Tracklets(Vec::new()), 600.0);
        assert_eq!(p.active_tracks(), 0);
        assert_eq!(p.totals().lost_prune, 1);
    }

    #[test]
    fn test_roi_hard_resets_soft_keeps() {
        for (mode, expect_side) in [(RoiMode::Hard, None), (RoiMode::Soft, Some(Side::A))] {
            let mut config = test_config();
            config.gate.roi = Some([0.0, 0.0, 0.6, 1.0]);
            config.gate.roi_mode = mode;
            let mut p = pipeline(config);
            let events = run_track(&mut p, 1, &[A, A, MID, B]);
            assert!(events.is_empty());
            assert_eq!(p.totals().roi_reject, 1);
            assert_eq!(p.state(1).unwrap().side(), expect_side);
        }
    }

    #[test]
    fn test_degenerate_box_counted() {
        let mut p = pipeline(test_config());
        let mut flat = at(1, A, 0.9, 1);
        flat.bbox.y2 = flat.bbox.y1;
        p.process_tick(TrackInput::Tracklets(vec![flat]), 0.0);
        assert_eq!(p.totals().geometry_reject, 1);
        assert_eq!(p.active_tracks(), 0);
    }

    #[test]
    fn test_input_mismatch_is_counted_not_fatal() {
        let mut p = pipeline(test_config());
        let ctx = p.process_tick(TrackInput::HeadTensors(Vec::new()), 0.0);
        assert!(ctx.events.is_empty());
        assert_eq!(p.totals().input_mismatch, 1);
        assert_eq!(p.totals().messages, 1);
    }

    #[test]
    fn test_span_inferred_crossing() {
        let mut p = pipeline(test_config());
        // 0.7 wide: once the center is past line B the box still covers line A
        let wide = |center: f32, age: u32| Tracklet {
            bbox: NormBox::new(center - 0.35, 0.2, center + 0.35, 0.8),
            ..at(1, center, 0.9, age)
        };
        let mut events = Vec::new();
        for (i, center) in [0.30f32, 0.30, 0.68].iter().enumerate() {
            let ctx = p.process_tick(
                TrackInput::Tracklets(vec![wide(*center, i as u32 + 1)]),
                i as f64 * 100.0,
            );
            events.extend(ctx.events);
        }
        assert_eq!(events.len(), 1);
        assert_eq!(p.totals().middle_inferred, 1);
        assert_eq!(p.totals().middle_entries, 0);
    }

    #[test]
    fn test_explicit_middle_preferred_over_span() {
        let mut p = pipeline(test_config());
        // The middle frame and the far-side frame both span the two lines
        let wide = |center: f32, age: u32| Tracklet {
            bbox: NormBox::new(center - 0.35, 0.2, center + 0.35, 0.8),
            ..at(1, center, 0.9, age)
        };
        let mut events = Vec::new();
        for (i, center) in [0.30f32, 0.30, 0.50, 0.68].iter().enumerate() {
            let ctx = p.process_tick(
                TrackInput::Tracklets(vec![wide(*center, i as u32 + 1)]),
                i as f64 * 100.0,
            );
            events.extend(ctx.events);
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, CrossingDirection::AToB);
        assert_eq!(p.totals().middle_entries, 1);
        assert_eq!(p.totals().middle_inferred, 0);
    }

    #[test]
    fn test_undrained_event_queue_counts_drops() {
        let mut p = pipeline(test_config());
        for id in 0..=MAX_PENDING_EVENTS as u32 {
            run_track(&mut p, id, &[A, A, MID, B]);
        }
        assert_eq!(p.totals().events_total, MAX_PENDING_EVENTS as u64 + 1);
        assert_eq!(p.totals().events_dropped, 1);
        let pending = p.drain_events();
        assert_eq!(pending.len(), MAX_PENDING_EVENTS);
        assert_eq!(pending[0].track_id, 1);

        run_track(&mut p, 9999, &[A, A, MID, B]);
        assert_eq!(p.totals().events_dropped, 1);
        assert_eq!(p.drain_events().len(), 1);
    }

    /// One bright cell per tick on a 16×9 grid (stride 32 on 512×288).
    fn head_tensor(gx: usize, gy: usize) -> Array4<f32> {
        let bins = 16;
        let channels = 4 * bins + 1;
        let mut map = Array4::<f32>::zeros((1, channels, 9, 16));
        map.slice_mut(s![0, channels - 1, .., ..]).fill(-10.0);
        for side in 0..4 {
            for b in 0..bins {
                map[[0, side * bins + b, gy, gx]] = if b == 3 { 20.0 } else { -20.0 };
            }
        }
        map[[0, channels - 1, gy, gx]] = 4.0;
        map
    }

    #[test]
    fn test_host_backend_end_to_end() {
        let mut config = test_config();
        config.backend.kind = BackendKind::Host;
        config.depth.enabled = false;
        let mut p = CountingPipeline::new(config).unwrap();

        let mut events = Vec::new();
        for (i, gx) in [2usize, 3, 7, 8, 12].iter().enumerate() {
            let input = TrackInput::HeadTensors(vec![head_tensor(*gx, 4)]);
            events.extend(p.process_tick(input, i as f64 * 100.0).events);
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].track_id, 1);
        assert_eq!(events[0].direction, CrossingDirection::AToB);
        assert_eq!(p.totals().detections_total, 5);
        assert_eq!(p.active_tracks(), 1);
    }
}
