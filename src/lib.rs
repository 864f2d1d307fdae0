// src/lib.rs
//
// Directional passenger counting at a vehicle doorway. Tracks (from the camera
// or decoded on the host) are classified against a two-line gate, each track
// runs a small crossing state machine, and candidate crossings pass a fixed
// chain of gates before they become IN/OUT events.

pub mod analysis;
pub mod config;
pub mod depth;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod motion;
pub mod pipeline;
pub mod replay;
pub mod tracking;
pub mod types;

pub use error::{ConfigError, SourceError};
pub use pipeline::{CountingPipeline, CountingRuntime};
pub use types::{Config, CrossingDirection, CrossingEvent};
