// src/detection/mod.rs

mod decoder;

pub use decoder::{sigmoid, DecodeOutput, Detection, DetectionDecoder};
