// src/pipeline/mod.rs

pub mod event_bus;
pub mod frame_context;
pub mod metrics;
pub mod orchestrator;
pub mod preview;
pub mod runtime;
pub mod snapshot;

pub use event_bus::EventBus;
pub use frame_context::{FrameContext, TrackOverlay};
pub use metrics::{Counters, PipelineMetrics, TelemetrySnapshot};
pub use orchestrator::CountingPipeline;
pub use preview::{render_scene, spawn_preview_worker};
pub use runtime::{CountingRuntime, RuntimeInputs, TrackMessage};
pub use snapshot::{PreviewFrame, PreviewScene, SharedSnapshot, Snapshot};
