// src/tracking/source.rs
//
// Where a tick's tracklets come from. Both variants hand the counting
// pipeline the same `Tracklet` shape.

use super::associator::HostAssociator;
use crate::detection::DetectionDecoder;
use crate::error::SourceError;
use crate::types::{BackendKind, Config, Tracklet};
use ndarray::Array4;

/// Raw per-tick input from the camera module.
#[derive(Debug, Clone)]
pub enum TrackInput {
    /// Lifecycle records from the on-camera tracker
    Tracklets(Vec<Tracklet>),
    /// Detector head feature maps, one per stride
    HeadTensors(Vec<Array4<f32>>),
}

impl TrackInput {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Tracklets(_) => "tracklets",
            Self::HeadTensors(_) => "head tensors",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackBatch {
    pub tracklets: Vec<Tracklet>,
    /// Ids the source itself dropped as lost
    pub pruned: Vec<u32>,
    /// Host backend only
    pub detections: u64,
    pub skipped_maps: u64,
    pub dropped_boxes: u64,
}

pub enum TrackSource {
    Hardware,
    Host {
        decoder: DetectionDecoder,
        associator: HostAssociator,
    },
}

impl TrackSource {
    pub fn from_config(config: &Config) -> Self {
        match config.backend.kind {
            BackendKind::Hardware => Self::Hardware,
            BackendKind::Host => {
                let b = &config.backend;
                Self::Host {
                    decoder: DetectionDecoder::new(
                        b.decoder.clone(),
                        config.decoder_confidence_min(),
                        b.model_input_width,
                        b.model_input_height,
                    ),
                    associator: HostAssociator::new(
                        b.association.clone(),
                        b.model_input_width,
                        b.model_input_height,
                        config.lost_timeout_ms(),
                    ),
                }
            }
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Hardware => "hardware",
            Self::Host { .. } => "host",
        }
    }

    pub fn ingest(&mut self, input: TrackInput, now_ms: f64) -> Result<TrackBatch, SourceError> {
        match (self, input) {
            (Self::Hardware, TrackInput::Tracklets(mut tracklets)) => {
                tracklets.sort_by_key(|t| t.id);
                Ok(TrackBatch {
                    tracklets,
                    ..TrackBatch::default()
                })
            }
            (
                Self::Host {
                    decoder,
                    associator,
                },
                TrackInput::HeadTensors(maps),
            ) => {
                let decoded = decoder.decode(&maps);
                let association = associator.update(&decoded.detections, now_ms);
                Ok(TrackBatch {
                    tracklets: association.tracklets,
                    pruned: association.pruned,
                    detections: decoded.detections.len() as u64,
                    skipped_maps: decoded.skipped_maps,
                    dropped_boxes: decoded.dropped_boxes,
                })
            }
            (source, input) => Err(SourceError::InputMismatch {
                source_kind: source.kind_name(),
                input_kind: input.kind_name(),
            }),
        }
    }
}
