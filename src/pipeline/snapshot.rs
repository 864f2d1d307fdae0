// src/pipeline/snapshot.rs
//
// Hand-off between the counting thread and diagnostics readers. The counting
// thread builds a complete `Snapshot` and swaps it in under the lock once per
// tick; readers clone it out. Nobody holds the lock while working.

use super::frame_context::TrackOverlay;
use super::metrics::TelemetrySnapshot;
use super::orchestrator::CountingPipeline;
use crate::types::{CountAxis, NormBox};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Everything the preview needs to draw one frame.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreviewScene {
    pub tick_id: u64,
    pub axis: CountAxis,
    pub line_a: f32,
    pub line_b: f32,
    pub hysteresis: f32,
    pub roi: Option<NormBox>,
    pub tracks: Vec<TrackOverlay>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub telemetry: TelemetrySnapshot,
    pub scene: PreviewScene,
}

impl Snapshot {
    pub fn capture(pipeline: &CountingPipeline) -> Self {
        let classifier = pipeline.classifier();
        let geometry = classifier.geometry();
        Self {
            telemetry: pipeline.telemetry(),
            scene: PreviewScene {
                tick_id: pipeline.tick_id(),
                axis: classifier.axis(),
                line_a: geometry.line_a(),
                line_b: geometry.line_b(),
                hysteresis: geometry.hysteresis(),
                roi: pipeline.roi(),
                tracks: pipeline.overlays().to_vec(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub tick_id: u64,
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

#[derive(Default)]
pub struct SharedSnapshot {
    current: Mutex<Snapshot>,
    preview: Mutex<Option<PreviewFrame>>,
}

/// Writes are whole-value swaps, so a poisoned lock still holds a complete value.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SharedSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: Snapshot) {
        *lock(&self.current) = snapshot;
    }

    pub fn latest(&self) -> Snapshot {
        lock(&self.current).clone()
    }

    pub fn latest_scene(&self) -> PreviewScene {
        lock(&self.current).scene.clone()
    }

    pub fn store_preview(&self, frame: PreviewFrame) {
        *lock(&self.preview) = Some(frame);
    }

    pub fn preview(&self) -> Option<PreviewFrame> {
        lock(&self.preview).clone()
    }
}
