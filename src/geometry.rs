// src/geometry.rs
//
// Box math shared by the decoder, the associator and the gate.

use crate::types::{CountAxis, NormBox};

/// Extent of a box along the counting axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisSpan {
    pub min: f32,
    pub max: f32,
    pub center: f32,
}

impl NormBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).abs()
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).abs()
    }

    pub fn centroid(&self) -> (f32, f32) {
        ((self.x1 + self.x2) * 0.5, (self.y1 + self.y2) * 0.5)
    }

    /// Zero-area or non-finite boxes carry no usable position.
    pub fn is_degenerate(&self) -> bool {
        let finite = [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite());
        !finite || self.width() <= f32::EPSILON || self.height() <= f32::EPSILON
    }

    pub fn axis_span(&self, axis: CountAxis) -> AxisSpan {
        let (a, b) = match axis {
            CountAxis::X => (self.x1, self.x2),
            CountAxis::Y => (self.y1, self.y2),
        };
        let min = a.min(b);
        let max = a.max(b);
        AxisSpan {
            min,
            max,
            center: (min + max) * 0.5,
        }
    }

    pub fn as_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Size in pixels of a `width × height` frame.
    pub fn pixel_size(&self, width: u32, height: u32) -> (f32, f32) {
        (self.width() * width as f32, self.height() * height as f32)
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        self.x1 <= x && x <= self.x2 && self.y1 <= y && y <= self.y2
    }
}

/// Intersection over union of two `[x1, y1, x2, y2]` boxes in any common space.
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);

    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Normalized coordinate to a pixel index inside `[0, size - 1]`.
pub fn to_pixel(norm: f32, size: usize) -> usize {
    if size == 0 {
        return 0;
    }
    let px = (norm * size as f32).round();
    px.clamp(0.0, (size - 1) as f32) as usize
}

/// Euclidean distance between two normalized points, measured in pixels of
/// a `width × height` frame.
pub fn pixel_distance(a: (f32, f32), b: (f32, f32), width: u32, height: u32) -> f32 {
    let dx = (a.0 - b.0) * width as f32;
    let dy = (a.1 - b.1) * height as f32;
    (dx * dx + dy * dy).sqrt()
}
