// src/config.rs
//
// YAML loading and eager validation. A value outside its range is a startup
// error; nothing is clamped at runtime.

use crate::analysis::gate::GateGeometry;
use crate::error::ConfigError;
use crate::types::Config;
use std::fs;
use tracing::debug;

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        let config = Self::from_yaml(&contents)?;
        debug!("Loaded config from {}", path);
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Gate lines derived from `axis_pos ∓ line_gap / 2`.
    pub fn gate_geometry(&self) -> Result<GateGeometry, ConfigError> {
        let half_gap = self.gate.line_gap / 2.0;
        GateGeometry::new(
            self.gate.axis_pos - half_gap,
            self.gate.axis_pos + half_gap,
            self.gate.hysteresis,
        )
    }

    /// Score floor applied by the host decoder.
    pub fn decoder_confidence_min(&self) -> f32 {
        self.backend
            .decoder
            .confidence_min
            .unwrap_or(self.counting.confidence_min * 0.75)
    }

    /// Lost-track timeout in milliseconds.
    pub fn lost_timeout_ms(&self) -> f64 {
        self.counting.max_lost_frames as f64 / self.backend.fps.max(1.0) * 1000.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.backend;
        check_range("backend.fps", b.fps, 0.5, 120.0)?;
        check_range("backend.model_input_width", b.model_input_width as f64, 160.0, 1920.0)?;
        check_range("backend.model_input_height", b.model_input_height as f64, 120.0, 1080.0)?;
        check_range("backend.decoder.nms_iou", b.decoder.nms_iou as f64, 0.01, 0.99)?;
        check_range("backend.decoder.max_det", b.decoder.max_det as f64, 1.0, 5000.0)?;
        check_range("backend.decoder.reg_max", b.decoder.reg_max as f64, 1.0, 64.0)?;
        if let Some(conf) = b.decoder.confidence_min {
            check_range("backend.decoder.confidence_min", conf as f64, 0.01, 0.99)?;
        }
        check_range(
            "backend.association.match_iou_min",
            b.association.match_iou_min as f64,
            0.0,
            0.95,
        )?;
        check_range(
            "backend.association.match_dist_px",
            b.association.match_dist_px as f64,
            5.0,
            500.0,
        )?;
        if b.association.max_jump_px < 0.0 {
            return Err(ConfigError::invalid(
                "backend.association.max_jump_px",
                "must be >= 0",
            ));
        }

        let g = &self.gate;
        check_range("gate.axis_pos", g.axis_pos as f64, 0.05, 0.95)?;
        check_range("gate.line_gap", g.line_gap as f64, 0.05, 0.60)?;
        check_range("gate.hysteresis", g.hysteresis as f64, 0.0, 0.20)?;
        check_range(
            "gate.min_side_frames_before_middle",
            g.min_side_frames_before_middle as f64,
            0.0,
            20.0,
        )?;
        if let Some([x1, y1, x2, y2]) = g.roi {
            let ordered = 0.0 <= x1 && x1 < x2 && x2 <= 1.0 && 0.0 <= y1 && y1 < y2 && y2 <= 1.0;
            if !ordered {
                return Err(ConfigError::invalid(
                    "gate.roi",
                    format!("must satisfy 0<=x1<x2<=1 and 0<=y1<y2<=1 (got {x1},{y1},{x2},{y2})"),
                ));
            }
        }
        self.gate_geometry()?;

        let c = &self.counting;
        check_range("counting.confidence_min", c.confidence_min as f64, 0.01, 0.99)?;
        check_range("counting.min_track_age", c.min_track_age as f64, 1.0, 100.0)?;
        check_range("counting.max_lost_frames", c.max_lost_frames as f64, 1.0, 50.0)?;
        check_range("counting.hang_timeout_sec", c.hang_timeout_sec, 0.5, 10.0)?;
        check_range("counting.count_cooldown_sec", c.count_cooldown_sec, 0.0, 10.0)?;
        check_range("counting.per_track_rearm_sec", c.per_track_rearm_sec, 0.0, 30.0)?;
        check_range("counting.min_move_norm", c.min_move_norm as f64, 0.02, 0.80)?;
        let limits = [
            ("counting.bbox.min_w_px", c.bbox.min_w_px),
            ("counting.bbox.min_h_px", c.bbox.min_h_px),
            ("counting.bbox.max_w_px", c.bbox.max_w_px),
            ("counting.bbox.max_h_px", c.bbox.max_h_px),
            ("counting.bbox.min_area_px2", c.bbox.min_area_px2),
            ("counting.bbox.max_area_px2", c.bbox.max_area_px2),
            ("counting.bbox.min_aspect", c.bbox.min_aspect),
            ("counting.bbox.max_aspect", c.bbox.max_aspect),
            ("counting.bbox.min_width_depth", c.bbox.min_width_depth),
            ("counting.bbox.max_width_depth", c.bbox.max_width_depth),
        ];
        for (field, value) in limits {
            if matches!(value, Some(v) if v < 0.0) {
                return Err(ConfigError::invalid(field, "must be >= 0"));
            }
        }

        let d = &self.depth;
        if d.enabled {
            check_range("depth.min_m", d.min_m as f64, 0.1, 10.0)?;
            check_range("depth.max_m", d.max_m as f64, 0.1, 10.0)?;
            if d.min_m >= d.max_m {
                return Err(ConfigError::invalid(
                    "depth.min_m",
                    format!("must be below depth.max_m ({} >= {})", d.min_m, d.max_m),
                ));
            }
            check_range("depth.head_fraction", d.head_fraction as f64, 0.05, 1.0)?;
            check_range("depth.min_valid_px", d.min_valid_px as f64, 1.0, 100_000.0)?;
        }

        let p = &self.preview;
        check_range("preview.fps", p.fps, 1.0, 30.0)?;
        check_range("preview.width", p.width as f64, 160.0, 1920.0)?;
        check_range("preview.height", p.height as f64, 120.0, 1080.0)?;
        check_range("preview.jpeg_quality", p.jpeg_quality as f64, 10.0, 95.0)?;

        if self.logging.heartbeat_interval_sec <= 0.0 {
            return Err(ConfigError::invalid(
                "logging.heartbeat_interval_sec",
                "must be > 0",
            ));
        }

        Ok(())
    }
}

fn check_range(field: &'static str, value: f64, low: f64, high: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= low && value <= high {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("must be in [{low}..{high}] (got {value})"),
        ))
    }
}
