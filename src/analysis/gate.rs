// src/analysis/gate.rs
//
// Two-line gate with a hysteresis band around each line.
//
//   side A            middle            side B
//   ─────────|·h·|─────────────|·h·|─────────
//         line_a              line_b
//
// Values inside either band classify as middle so a track sitting exactly on
// a line cannot oscillate between a side and the middle.

use crate::error::ConfigError;
use crate::geometry::AxisSpan;
use crate::types::{AnchorMode, CountAxis, GateConfig, NormBox, Side, Zone};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateGeometry {
    line_a: f32,
    line_b: f32,
    hysteresis: f32,
}

impl GateGeometry {
    pub fn new(line_a: f32, line_b: f32, hysteresis: f32) -> Result<Self, ConfigError> {
        let ordered = line_a.is_finite()
            && line_b.is_finite()
            && 0.0 < line_a
            && line_a < line_b
            && line_b < 1.0;
        if !ordered {
            return Err(ConfigError::invalid(
                "gate.line_gap",
                format!(
                    "gate lines must satisfy 0 < line_a < line_b < 1 (got {line_a:.3}, {line_b:.3})"
                ),
            ));
        }
        if hysteresis.is_nan() || hysteresis < 0.0 || 2.0 * hysteresis >= line_b - line_a {
            return Err(ConfigError::invalid(
                "gate.hysteresis",
                format!(
                    "hysteresis {hysteresis:.3} leaves no middle zone between {line_a:.3} and {line_b:.3}"
                ),
            ));
        }
        Ok(Self {
            line_a,
            line_b,
            hysteresis,
        })
    }

    pub fn line_a(&self) -> f32 {
        self.line_a
    }

    pub fn line_b(&self) -> f32 {
        self.line_b
    }

    pub fn hysteresis(&self) -> f32 {
        self.hysteresis
    }

    /// Outer edge of the side-A band; at or below is side A.
    pub fn side_a_limit(&self) -> f32 {
        self.line_a - self.hysteresis
    }

    /// Outer edge of the side-B band; at or above is side B.
    pub fn side_b_limit(&self) -> f32 {
        self.line_b + self.hysteresis
    }

    pub fn classify(&self, value: f32) -> Zone {
        if value <= self.side_a_limit() {
            Zone::SideA
        } else if value >= self.side_b_limit() {
            Zone::SideB
        } else {
            Zone::Middle
        }
    }

    /// True when the extent covers both lines beyond the hysteresis band.
    pub fn spans_both_lines(&self, span: &AxisSpan) -> bool {
        span.min <= self.side_a_limit() && span.max >= self.side_b_limit()
    }
}

/// Per-track view of the gate: axis value selection plus classification.
#[derive(Debug, Clone, Copy)]
pub struct GateClassifier {
    geometry: GateGeometry,
    axis: CountAxis,
    anchor_mode: AnchorMode,
}

/// Where one box sits relative to the gate on this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateReading {
    pub axis_value: f32,
    pub zone: Zone,
    pub spans_both: bool,
}

impl GateClassifier {
    pub fn new(geometry: GateGeometry, config: &GateConfig) -> Self {
        Self {
            geometry,
            axis: config.axis,
            anchor_mode: config.anchor_mode,
        }
    }

    pub fn geometry(&self) -> &GateGeometry {
        &self.geometry
    }

    pub fn axis(&self) -> CountAxis {
        self.axis
    }

    /// Axis value used for classification. In leading-edge mode an
    /// established track is measured by the edge facing the opposite side.
    pub fn anchor_value(&self, span: &AxisSpan, established: Option<Side>) -> f32 {
        match (self.anchor_mode, established) {
            (AnchorMode::LeadingEdge, Some(Side::A)) => span.max,
            (AnchorMode::LeadingEdge, Some(Side::B)) => span.min,
            _ => span.center,
        }
    }

    pub fn read(&self, bbox: &NormBox, established: Option<Side>) -> GateReading {
        let span = bbox.axis_span(self.axis);
        let axis_value = self.anchor_value(&span, established);
        GateReading {
            axis_value,
            zone: self.geometry.classify(axis_value),
            spans_both: self.geometry.spans_both_lines(&span),
        }
    }
}
