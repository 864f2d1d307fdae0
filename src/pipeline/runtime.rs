// src/pipeline/runtime.rs
//
// Counting thread main loop. Cooperative polling over three queues:
//   depth  -> drained to the newest map before each tick
//   motion -> drained to the newest sample (diagnostics only)
//   tracks -> one message per tick
// The loop never blocks on a receiver; an empty track queue sleeps briefly so
// the stop flag is observed promptly.

use super::metrics::{Counters, TelemetrySnapshot};
use super::orchestrator::CountingPipeline;
use super::snapshot::{SharedSnapshot, Snapshot};
use crate::depth::DepthMap;
use crate::motion::MotionSample;
use crate::tracking::TrackInput;
use crate::types::CrossingEvent;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const IDLE_SLEEP: Duration = Duration::from_millis(2);

/// One tick's worth of track input, stamped by the producer.
#[derive(Debug, Clone)]
pub struct TrackMessage {
    pub input: TrackInput,
    pub timestamp_ms: f64,
}

pub struct RuntimeInputs {
    pub tracks: Receiver<TrackMessage>,
    pub depth: Receiver<DepthMap>,
    pub motion: Receiver<MotionSample>,
}

pub struct CountingRuntime {
    pipeline: CountingPipeline,
    shared: Arc<SharedSnapshot>,
    stop: Arc<AtomicBool>,
    heartbeat_interval: Duration,
    event_sink: Option<Sender<CrossingEvent>>,
}

impl CountingRuntime {
    pub fn new(
        pipeline: CountingPipeline,
        shared: Arc<SharedSnapshot>,
        stop: Arc<AtomicBool>,
        heartbeat_interval_sec: f64,
    ) -> Self {
        Self {
            pipeline,
            shared,
            stop,
            heartbeat_interval: Duration::from_secs_f64(heartbeat_interval_sec.max(0.1)),
            event_sink: None,
        }
    }

    /// Accepted events are forwarded here after every tick.
    pub fn with_event_sink(mut self, sink: Sender<CrossingEvent>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Runs until the stop flag is set or the track queue disconnects.
    pub fn run(mut self, inputs: RuntimeInputs) -> TelemetrySnapshot {
        info!(
            "Counting loop started (source: {:?})",
            self.pipeline.config().backend.kind
        );
        let mut last_heartbeat = Instant::now();

        while !self.stop.load(Ordering::Relaxed) {
            self.drain_side_channels(&inputs);

            match inputs.tracks.try_recv() {
                Ok(msg) => {
                    let ctx = self.pipeline.process_tick(msg.input, msg.timestamp_ms);
                    if ctx.has_events() {
                        let (count_in, count_out) = ctx.net_counts();
                        debug!("Tick {}: +{} in, +{} out", ctx.tick_id, count_in, count_out);
                    }
                    self.forward_events();
                    self.shared.publish(Snapshot::capture(&self.pipeline));
                }
                Err(TryRecvError::Empty) => thread::sleep(IDLE_SLEEP),
                Err(TryRecvError::Disconnected) => {
                    debug!("Track queue closed");
                    break;
                }
            }

            if last_heartbeat.elapsed() >= self.heartbeat_interval {
                log_heartbeat(&self.pipeline.telemetry());
                last_heartbeat = Instant::now();
            }
        }

        // Anything accepted on the final tick still goes out.
        self.forward_events();
        let telemetry = self.pipeline.telemetry();
        self.shared.publish(Snapshot::capture(&self.pipeline));
        info!(
            "Counting loop stopped after {} ticks (in={}, out={})",
            telemetry.ticks, telemetry.count_in, telemetry.count_out
        );
        telemetry
    }

    fn drain_side_channels(&mut self, inputs: &RuntimeInputs) {
        let mut newest_depth = None;
        while let Ok(map) = inputs.depth.try_recv() {
            newest_depth = Some(map);
        }
        if let Some(map) = newest_depth {
            self.pipeline.update_depth(map);
        }

        let mut newest_motion = None;
        while let Ok(sample) = inputs.motion.try_recv() {
            newest_motion = Some(sample);
        }
        if let Some(sample) = newest_motion {
            self.pipeline.update_motion(&sample);
        }
    }

    fn forward_events(&mut self) {
        let events = self.pipeline.drain_events();
        let Some(sink) = &self.event_sink else {
            return;
        };
        for event in events {
            if sink.send(event).is_err() {
                warn!("Event consumer gone, further events are only counted");
                self.event_sink = None;
                return;
            }
        }
    }
}

fn log_heartbeat(t: &TelemetrySnapshot) {
    info!(
        "💓 in={} out={} active={} ticks={} fps={:.1} rejects={} [{}]",
        t.count_in,
        t.count_out,
        t.active_tracks,
        t.ticks,
        t.fps,
        t.counters.total_rejections(),
        rejection_summary(&t.counters)
    );
}

fn rejection_summary(c: &Counters) -> String {
    [
        ("zone", c.zone_reject),
        ("conf", c.conf_reject),
        ("depth_missing", c.depth_missing),
        ("depth", c.depth_reject),
        ("bbox_size", c.bbox_reject_size),
        ("bbox_ar", c.bbox_reject_ar),
        ("bbox_wz", c.bbox_reject_wz),
        ("age", c.age_reject),
        ("hang", c.hang_reject),
        ("rearm", c.rearm_reject),
        ("dup", c.dup_reject),
        ("move", c.move_reject),
        ("roi", c.roi_reject),
        ("stall", c.middle_stall),
        ("flip", c.zone_flip_no_middle),
    ]
    .iter()
    .map(|(name, v)| format!("{}={}", name, v))
    .collect::<Vec<_>>()
    .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Config, CrossingDirection, NormBox, TrackStatus, Tracklet};
    use crossbeam_channel::{bounded, unbounded};

    fn tracklet(cx: f32) -> Tracklet {
        Tracklet {
            id: 1,
            status: TrackStatus::Tracked,
            bbox: NormBox::new(cx - 0.05, 0.2, cx + 0.05, 0.8),
            confidence: 0.9,
            age: 10,
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.depth.enabled = false;
        config
    }

    #[test]
    fn test_runs_until_track_queue_closes() {
        let (track_tx, track_rx) = bounded(0);
        let (_depth_tx, depth_rx) = bounded::<DepthMap>(0);
        let (_motion_tx, motion_rx) = bounded::<MotionSample>(0);
        let (event_tx, event_rx) = unbounded();

        let shared = Arc::new(SharedSnapshot::new());
        let runtime = CountingRuntime::new(
            CountingPipeline::new(config()).unwrap(),
            shared.clone(),
            Arc::new(AtomicBool::new(false)),
            60.0,
        )
        .with_event_sink(event_tx);

        let handle = thread::spawn(move || {
            runtime.run(RuntimeInputs {
                tracks: track_rx,
                depth: depth_rx,
                motion: motion_rx,
            })
        });

        for (i, cx) in [0.2, 0.2, 0.5, 0.8].into_iter().enumerate() {
            track_tx
                .send(TrackMessage {
                    input: TrackInput::Tracklets(vec![tracklet(cx)]),
                    timestamp_ms: i as f64 * 100.0,
                })
                .unwrap();
        }
        drop(track_tx);

        let telemetry = handle.join().unwrap();
        assert_eq!(telemetry.ticks, 4);
        assert_eq!(telemetry.count_in, 1);

        let events: Vec<_> = event_rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, CrossingDirection::AToB);
        assert_eq!(shared.latest().scene.tick_id, 4);
    }

    #[test]
    fn test_stop_flag_ends_idle_loop() {
        let (_track_tx, track_rx) = bounded::<TrackMessage>(0);
        let (_depth_tx, depth_rx) = bounded::<DepthMap>(0);
        let (_motion_tx, motion_rx) = bounded::<MotionSample>(0);
        let stop = Arc::new(AtomicBool::new(true));

        let runtime = CountingRuntime::new(
            CountingPipeline::new(config()).unwrap(),
            Arc::new(SharedSnapshot::new()),
            stop,
            60.0,
        );
        let telemetry = runtime.run(RuntimeInputs {
            tracks: track_rx,
            depth: depth_rx,
            motion: motion_rx,
        });
        assert_eq!(telemetry.ticks, 0);
    }

    #[test]
    fn test_depth_is_applied_before_next_tick() {
        let (track_tx, track_rx) = bounded(0);
        let (depth_tx, depth_rx) = bounded(0);
        let (_motion_tx, motion_rx) = bounded::<MotionSample>(0);

        let runtime = CountingRuntime::new(
            CountingPipeline::new(config()).unwrap(),
            Arc::new(SharedSnapshot::new()),
            Arc::new(AtomicBool::new(false)),
            60.0,
        );
        let handle = thread::spawn(move || {
            runtime.run(RuntimeInputs {
                tracks: track_rx,
                depth: depth_rx,
                motion: motion_rx,
            })
        });

        depth_tx
            .send(DepthMap::from_vec(2, 2, vec![1500; 4], 0.0).unwrap())
            .unwrap();
        track_tx
            .send(TrackMessage {
                input: TrackInput::Tracklets(vec![tracklet(0.2)]),
                timestamp_ms: 0.0,
            })
            .unwrap();
        drop(track_tx);

        let telemetry = handle.join().unwrap();
        assert_eq!(telemetry.counters.depth_updates, 1);
        assert_eq!(telemetry.ticks, 1);
    }

    #[test]
    fn test_rejection_summary_lists_counters() {
        let mut c = Counters::default();
        c.dup_reject = 2;
        let s = rejection_summary(&c);
        assert!(s.contains("dup=2"));
        assert!(s.contains("hang=0"));
    }
}
