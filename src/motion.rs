// src/motion.rs
//
// IMU samples from the camera module. Diagnostics only: nothing here feeds the
// counting decision.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// m/s²
    pub accel: Option<[f32; 3]>,
    /// rad/s
    pub gyro: Option<[f32; 3]>,
    pub timestamp_ms: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MotionStatus {
    pub accel_norm: Option<f32>,
    pub gyro_norm: Option<f32>,
    pub updates: u64,
    pub last_update_ms: Option<f64>,
}

pub struct MotionMonitor {
    enabled: bool,
    status: MotionStatus,
}

impl MotionMonitor {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            status: MotionStatus::default(),
        }
    }

    /// Returns false when motion input is disabled and the sample was dropped.
    pub fn update(&mut self, sample: &MotionSample) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(accel) = sample.accel {
            self.status.accel_norm = Some(norm(&accel));
        }
        if let Some(gyro) = sample.gyro {
            self.status.gyro_norm = Some(norm(&gyro));
        }
        self.status.updates += 1;
        self.status.last_update_ms = Some(sample.timestamp_ms);
        true
    }

    pub fn status(&self) -> MotionStatus {
        self.status
    }
}

fn norm(v: &[f32; 3]) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}
