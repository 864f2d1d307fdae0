// src/analysis/mod.rs

pub mod counting;
pub mod crossing_state;
pub mod gate;

pub use counting::{transition_to_counts, CountingEngine, RejectReason};
pub use crossing_state::{CrossState, FireCandidate, StepOutcome, TransitionParams};
pub use gate::{GateClassifier, GateGeometry, GateReading};
