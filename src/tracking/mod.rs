// src/tracking/mod.rs

pub mod associator;
pub mod source;

pub use associator::{Association, HostAssociator, HostTrack};
pub use source::{TrackBatch, TrackInput, TrackSource};
