// src/depth.rs
//
// Head/shoulder distance estimate from the stereo depth map.
//
// The depth map may arrive at a different resolution and cadence than the
// tracks, so boxes are mapped through normalized coordinates. "No sample" is
// a normal reading, not an error: the counting gate fails closed on it.

use crate::geometry::to_pixel;
use crate::types::{DepthConfig, HeadRegion, NormBox};
use ndarray::{s, Array2};

/// Samples outside this band (millimetres) are sensor noise or invalid.
const VALID_DEPTH_MIN_MM: u16 = 200;
const VALID_DEPTH_MAX_MM: u16 = 10_000;

/// Per-pixel distances in millimetres, row-major `[height, width]`. Zero means
/// "no sample".
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    pub data: Array2<u16>,
    pub timestamp_ms: f64,
}

impl DepthMap {
    pub fn new(data: Array2<u16>, timestamp_ms: f64) -> Self {
        Self { data, timestamp_ms }
    }

    pub fn from_vec(
        width: usize,
        height: usize,
        samples_mm: Vec<u16>,
        timestamp_ms: f64,
    ) -> Option<Self> {
        Array2::from_shape_vec((height, width), samples_mm)
            .ok()
            .map(|data| Self { data, timestamp_ms })
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }
}

/// Result of checking one track against the depth map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DepthReading {
    /// Depth gating is switched off
    Disabled,
    Missing,
    OutOfRange(f32),
    InRange(f32),
}

impl DepthReading {
    pub fn meters(&self) -> Option<f32> {
        match self {
            Self::OutOfRange(m) | Self::InRange(m) => Some(*m),
            Self::Disabled | Self::Missing => None,
        }
    }

    pub fn passes(&self) -> bool {
        matches!(self, Self::Disabled | Self::InRange(_))
    }
}

pub struct DepthValidator {
    config: DepthConfig,
}

impl DepthValidator {
    pub fn new(config: DepthConfig) -> Self {
        Self { config }
    }

    pub fn assess(&self, bbox: &NormBox, map: Option<&DepthMap>) -> DepthReading {
        if !self.config.enabled {
            return DepthReading::Disabled;
        }
        match self.estimate_m(bbox, map) {
            None => DepthReading::Missing,
            Some(m) if m < self.config.min_m || m > self.config.max_m => {
                DepthReading::OutOfRange(m)
            }
            Some(m) => DepthReading::InRange(m),
        }
    }

    /// Median distance in metres over the head/shoulder band of `bbox`.
    pub fn estimate_m(&self, bbox: &NormBox, map: Option<&DepthMap>) -> Option<f32> {
        let map = map?;
        let (frame_h, frame_w) = (map.height(), map.width());
        if frame_h == 0 || frame_w == 0 {
            return None;
        }

        let x1 = to_pixel(bbox.x1.min(bbox.x2), frame_w);
        let x2 = to_pixel(bbox.x1.max(bbox.x2), frame_w);
        let y1 = to_pixel(bbox.y1.min(bbox.y2), frame_h);
        let y2 = to_pixel(bbox.y1.max(bbox.y2), frame_h);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        let head_h = ((y2 - y1) as f32 * self.config.head_fraction).round().max(1.0) as usize;
        let (row_start, row_end) = match self.config.head_region {
            HeadRegion::Top => (y1, (y1 + head_h).min(y2)),
            HeadRegion::Bottom => (y2.saturating_sub(head_h).max(y1), y2),
        };
        if row_end <= row_start {
            return None;
        }

        let band = map.data.slice(s![row_start..row_end, x1..x2]);
        let mut valid: Vec<u16> = band
            .iter()
            .copied()
            .filter(|&mm| (VALID_DEPTH_MIN_MM..=VALID_DEPTH_MAX_MM).contains(&mm))
            .collect();
        if valid.is_empty() || valid.len() < self.config.min_valid_px {
            return None;
        }

        let depth_mm = median(&mut valid);
        if depth_mm <= 0.0 {
            return None;
        }
        Some(depth_mm / 1000.0)
    }
}

fn median(values: &mut [u16]) -> f32 {
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] as f32 + values[mid] as f32) * 0.5
    } else {
        values[mid] as f32
    }
}
