// src/types.rs
//
// Configuration tree and the record types that flow through the counting
// pipeline. Defaults mirror the field-tuned values of the doorway units.

use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub gate: GateConfig,
    pub counting: CountingConfig,
    pub depth: DepthConfig,
    pub motion: MotionConfig,
    pub preview: PreviewConfig,
    pub logging: LoggingConfig,
}

/// Where track records come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// On-camera detector + object tracker, lifecycle events consumed as-is
    Hardware,
    /// Raw detector head tensors decoded and associated on the host
    Host,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Nominal tick rate. Converts `max_lost_frames` into a wall-clock timeout.
    pub fps: f64,
    /// Detector input size in pixels. Bounding-box gates and host association
    /// distances are expressed in this pixel space.
    pub model_input_width: u32,
    pub model_input_height: u32,
    pub decoder: DecoderConfig,
    pub association: AssociationConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Hardware,
            fps: 10.0,
            model_input_width: 512,
            model_input_height: 288,
            decoder: DecoderConfig::default(),
            association: AssociationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Score floor for kept grid cells. When unset, 0.75 × the counting
    /// confidence floor is used so borderline people still get a track.
    pub confidence_min: Option<f32>,
    /// IoU above which a lower-scored box is suppressed
    pub nms_iou: f32,
    /// Upper bound on boxes kept after NMS
    pub max_det: usize,
    /// Highest distribution bin index; each side has `reg_max + 1` bins
    pub reg_max: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            confidence_min: None,
            nms_iou: 0.5,
            max_det: 80,
            reg_max: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationConfig {
    /// Minimum IoU for the overlap-priority stage
    pub match_iou_min: f32,
    /// Maximum centroid jump (model-input pixels) for the distance stage
    pub match_dist_px: f32,
    /// Extra cap on the distance stage, 0 disables
    pub max_jump_px: f32,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            match_iou_min: 0.10,
            match_dist_px: 80.0,
            max_jump_px: 0.0,
        }
    }
}

/// Coordinate a track's position is measured along.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountAxis {
    /// Gate lines are vertical; people move left/right
    #[default]
    X,
    /// Gate lines are horizontal; people move up/down
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorMode {
    Center,
    /// Once a side is known, use the box edge advancing toward the other side
    LeadingEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiMode {
    /// Leaving the ROI resets the track's crossing state
    Hard,
    /// Frames outside the ROI are ignored, state is kept
    Soft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadRegion {
    Top,
    Bottom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub axis: CountAxis,
    /// Normalized position of the gate center along `axis`
    pub axis_pos: f32,
    /// Normalized distance between line A and line B
    pub line_gap: f32,
    /// Dead band around each line
    pub hysteresis: f32,
    pub anchor_mode: AnchorMode,
    /// Normalized `[x1, y1, x2, y2]`; tracks whose centroid is outside are not counted
    pub roi: Option<[f32; 4]>,
    pub roi_mode: RoiMode,
    /// Treat a box spanning both lines as a middle visit
    pub infer_middle_from_span: bool,
    /// Frames a track must hold its side before a middle entry arms it
    pub min_side_frames_before_middle: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            axis: CountAxis::X,
            axis_pos: 0.50,
            line_gap: 0.25,
            hysteresis: 0.04,
            anchor_mode: AnchorMode::Center,
            roi: None,
            roi_mode: RoiMode::Hard,
            infer_middle_from_span: true,
            min_side_frames_before_middle: 2,
        }
    }
}

/// Optional bounding-box plausibility limits. Sizes are model-input pixels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BboxLimits {
    pub min_w_px: Option<f32>,
    pub min_h_px: Option<f32>,
    pub max_w_px: Option<f32>,
    pub max_h_px: Option<f32>,
    pub min_area_px2: Option<f32>,
    pub max_area_px2: Option<f32>,
    /// Width / height
    pub min_aspect: Option<f32>,
    pub max_aspect: Option<f32>,
    /// Width in pixels × depth in metres; roughly constant for one body size
    pub min_width_depth: Option<f32>,
    pub max_width_depth: Option<f32>,
}

impl BboxLimits {
    pub fn has_size_limits(&self) -> bool {
        self.min_w_px.is_some()
            || self.min_h_px.is_some()
            || self.max_w_px.is_some()
            || self.max_h_px.is_some()
            || self.min_area_px2.is_some()
            || self.max_area_px2.is_some()
    }

    pub fn has_aspect_limits(&self) -> bool {
        self.min_aspect.is_some() || self.max_aspect.is_some()
    }

    pub fn has_width_depth_limits(&self) -> bool {
        self.min_width_depth.is_some() || self.max_width_depth.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CountingConfig {
    pub confidence_min: f32,
    pub min_track_age: u32,
    /// Frames without a match before a track is pruned
    pub max_lost_frames: u32,
    pub hang_timeout_sec: f64,
    /// Minimum time between any two counted events
    pub count_cooldown_sec: f64,
    /// Minimum time between two counted events of one track, 0 disables
    pub per_track_rearm_sec: f64,
    /// Minimum normalized travel since the side was last held
    pub min_move_norm: f32,
    pub invert_direction: bool,
    pub bbox: BboxLimits,
}

impl Default for CountingConfig {
    fn default() -> Self {
        Self {
            confidence_min: 0.65,
            min_track_age: 8,
            max_lost_frames: 5,
            hang_timeout_sec: 2.5,
            count_cooldown_sec: 1.8,
            per_track_rearm_sec: 0.0,
            min_move_norm: 0.18,
            invert_direction: false,
            bbox: BboxLimits::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthConfig {
    pub enabled: bool,
    pub min_m: f32,
    pub max_m: f32,
    /// Share of the box height sampled for head/shoulders
    pub head_fraction: f32,
    pub min_valid_px: usize,
    pub head_region: HeadRegion,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_m: 0.40,
            max_m: 1.50,
            head_fraction: 0.45,
            min_valid_px: 25,
            head_region: HeadRegion::Top,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub enabled: bool,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub enabled: bool,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fps: 10.0,
            width: 640,
            height: 400,
            jpeg_quality: 85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub heartbeat_interval_sec: f64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            heartbeat_interval_sec: 10.0,
        }
    }
}

// ============================================================================
// TRACK RECORDS
// ============================================================================

/// Axis-aligned box in normalized frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackStatus {
    New,
    Tracked,
    Lost,
    Removed,
}

impl TrackStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::New | Self::Tracked)
    }
}

/// One track observation for the current tick, regardless of source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tracklet {
    pub id: u32,
    pub status: TrackStatus,
    pub bbox: NormBox,
    pub confidence: f32,
    pub age: u32,
}

// ============================================================================
// ZONES AND EVENTS
// ============================================================================

/// An established side of the gate. There is no "middle" side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn sign(&self) -> i8 {
        match self {
            Self::A => -1,
            Self::B => 1,
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    SideA,
    Middle,
    SideB,
}

impl Zone {
    pub fn side(&self) -> Option<Side> {
        match self {
            Self::SideA => Some(Side::A),
            Self::Middle => None,
            Self::SideB => Some(Side::B),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossingDirection {
    AToB,
    BToA,
}

impl CrossingDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AToB => "a_to_b",
            Self::BToA => "b_to_a",
        }
    }
}

/// An accepted doorway crossing. Never retracted once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossingEvent {
    pub direction: CrossingDirection,
    /// Set when `invert_direction` swapped the in/out increments
    pub inverted: bool,
    pub in_increment: u32,
    pub out_increment: u32,
    pub track_id: u32,
    pub timestamp_ms: f64,
}

impl CrossingEvent {
    pub fn label(&self) -> String {
        if self.inverted {
            format!("{}_inverted", self.direction.as_str())
        } else {
            self.direction.as_str().to_string()
        }
    }
}
