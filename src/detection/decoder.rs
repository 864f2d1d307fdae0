// src/detection/decoder.rs
//
// Host-side decode of an anchor-free, distribution-regression detector head.
//
// Each feature map is a `[1, 4 * (reg_max + 1) + 1, H, W]` tensor: four
// side-distance distributions (left, top, right, bottom) followed by one
// person-confidence logit per grid cell.

use crate::geometry::iou;
use crate::types::{DecoderConfig, NormBox};
use ndarray::{s, Array4, ArrayView1};
use tracing::{debug, warn};

/// Feature maps whose horizontal and vertical strides disagree by more than
/// this are skipped.
const STRIDE_TOLERANCE: f32 = 1e-3;
const LOGIT_CLAMP: f32 = 50.0;
/// Boxes this thin (pixels) after clipping carry no usable position.
const MIN_SIDE_PX: f32 = 1.0;

/// Candidate person box in normalized frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: NormBox,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeOutput {
    pub detections: Vec<Detection>,
    pub skipped_maps: u64,
    pub dropped_boxes: u64,
}

/// Box in model-input pixels, before normalization.
#[derive(Debug, Clone, Copy)]
struct PixelBox {
    coords: [f32; 4],
    confidence: f32,
}

pub struct DetectionDecoder {
    config: DecoderConfig,
    confidence_min: f32,
    input_width: u32,
    input_height: u32,
}

impl DetectionDecoder {
    pub fn new(
        config: DecoderConfig,
        confidence_min: f32,
        input_width: u32,
        input_height: u32,
    ) -> Self {
        Self {
            config,
            confidence_min,
            input_width,
            input_height,
        }
    }

    pub fn channels(&self) -> usize {
        4 * (self.config.reg_max + 1) + 1
    }

    pub fn decode(&self, maps: &[Array4<f32>]) -> DecodeOutput {
        let mut output = DecodeOutput::default();
        let mut candidates = Vec::new();

        for map in maps {
            match self.decode_map(map, &mut output.dropped_boxes) {
                Some(boxes) => candidates.extend(boxes),
                None => output.skipped_maps += 1,
            }
        }

        let kept = nms(candidates, self.config.nms_iou, self.config.max_det);

        let (w, h) = (self.input_width as f32, self.input_height as f32);
        for pb in kept {
            let [x1, y1, x2, y2] = pb.coords;
            let bbox = NormBox::new(
                (x1 / w).clamp(0.0, 1.0),
                (y1 / h).clamp(0.0, 1.0),
                (x2 / w).clamp(0.0, 1.0),
                (y2 / h).clamp(0.0, 1.0),
            );
            if bbox.x2 <= bbox.x1 || bbox.y2 <= bbox.y1 {
                output.dropped_boxes += 1;
                continue;
            }
            output.detections.push(Detection {
                bbox,
                confidence: pb.confidence,
            });
        }

        debug!(
            "Decoded {} detections ({} maps skipped, {} boxes dropped)",
            output.detections.len(),
            output.skipped_maps,
            output.dropped_boxes
        );
        output
    }

    /// `None` when the map cannot be decoded at all.
    fn decode_map(&self, map: &Array4<f32>, dropped: &mut u64) -> Option<Vec<PixelBox>> {
        let (batch, channels, grid_h, grid_w) = map.dim();
        if batch != 1 || channels != self.channels() || grid_h == 0 || grid_w == 0 {
            warn!(
                "Skipping head map with shape {:?}, expected [1, {}, H, W]",
                map.shape(),
                self.channels()
            );
            return None;
        }

        let stride_w = self.input_width as f32 / grid_w as f32;
        let stride_h = self.input_height as f32 / grid_h as f32;
        if (stride_w - stride_h).abs() > STRIDE_TOLERANCE {
            warn!(
                "Skipping head map {}x{}: stride mismatch {:.3} vs {:.3}",
                grid_w, grid_h, stride_w, stride_h
            );
            return None;
        }
        let stride = stride_w;

        let bins = self.config.reg_max + 1;
        let conf_channel = channels - 1;
        let max_x = self.input_width as f32 - 1.0;
        let max_y = self.input_height as f32 - 1.0;
        let mut boxes = Vec::new();

        for gy in 0..grid_h {
            for gx in 0..grid_w {
                let logit = map[[0, conf_channel, gy, gx]];
                let confidence = sigmoid(logit.clamp(-LOGIT_CLAMP, LOGIT_CLAMP));
                if confidence < self.confidence_min {
                    continue;
                }

                let mut dist = [0.0f32; 4];
                for (side, d) in dist.iter_mut().enumerate() {
                    let logits = map.slice(s![0, side * bins..(side + 1) * bins, gy, gx]);
                    *d = expected_bin(logits) * stride;
                }

                let cx = (gx as f32 + 0.5) * stride;
                let cy = (gy as f32 + 0.5) * stride;
                let x1 = (cx - dist[0]).clamp(0.0, max_x);
                let y1 = (cy - dist[1]).clamp(0.0, max_y);
                let x2 = (cx + dist[2]).clamp(0.0, max_x);
                let y2 = (cy + dist[3]).clamp(0.0, max_y);

                if x2 - x1 <= MIN_SIDE_PX || y2 - y1 <= MIN_SIDE_PX {
                    *dropped += 1;
                    continue;
                }
                boxes.push(PixelBox {
                    coords: [x1, y1, x2, y2],
                    confidence,
                });
            }
        }

        Some(boxes)
    }
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Softmax over the bins, then the expected bin index.
fn expected_bin(logits: ArrayView1<f32>) -> f32 {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    let mut weighted = 0.0f32;
    for (i, &v) in logits.iter().enumerate() {
        let e = (v - max).exp();
        sum += e;
        weighted += i as f32 * e;
    }
    if sum > 0.0 {
        weighted / sum
    } else {
        0.0
    }
}

/// Class-agnostic greedy NMS. Equal scores keep decode order.
fn nms(mut boxes: Vec<PixelBox>, iou_threshold: f32, max_det: usize) -> Vec<PixelBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<PixelBox> = Vec::new();
    for candidate in boxes {
        if keep.len() >= max_det {
            break;
        }
        let suppressed = keep
            .iter()
            .any(|k| iou(&k.coords, &candidate.coords) > iou_threshold);
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}
