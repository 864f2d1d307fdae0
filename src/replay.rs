// src/replay.rs
//
// JSON-lines replay of recorded sensor traffic. One record per line:
//
//   {"type":"tracklets","timestamp_ms":0.0,"tracklets":[...]}
//   {"type":"tensors","timestamp_ms":0.0,"maps":[{"shape":[1,65,9,16],"data":[...]}]}
//   {"type":"depth","timestamp_ms":0.0,"width":4,"height":4,"samples_mm":[...]}
//   {"type":"motion","timestamp_ms":0.0,"accel":[0,0,9.8],"gyro":null}
//
// Blank lines and lines starting with `#` are ignored.

use crate::depth::DepthMap;
use crate::motion::MotionSample;
use crate::pipeline::TrackMessage;
use crate::tracking::TrackInput;
use crate::types::Tracklet;
use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorRecord {
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayRecord {
    Tracklets {
        timestamp_ms: f64,
        tracklets: Vec<Tracklet>,
    },
    Tensors {
        timestamp_ms: f64,
        maps: Vec<TensorRecord>,
    },
    Depth {
        timestamp_ms: f64,
        width: usize,
        height: usize,
        samples_mm: Vec<u16>,
    },
    Motion {
        timestamp_ms: f64,
        #[serde(default)]
        accel: Option<[f32; 3]>,
        #[serde(default)]
        gyro: Option<[f32; 3]>,
    },
}

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("malformed record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tensor shape {shape:?} does not match {len} values")]
    TensorShape { shape: [usize; 4], len: usize },

    #[error("depth map {width}x{height} does not match {len} samples")]
    DepthShape {
        width: usize,
        height: usize,
        len: usize,
    },
}

/// Channel ends the replay feeds.
pub struct ReplaySenders {
    pub tracks: Sender<TrackMessage>,
    pub depth: Sender<DepthMap>,
    pub motion: Sender<MotionSample>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub lines: u64,
    pub track_messages: u64,
    pub depth_maps: u64,
    pub motion_samples: u64,
    pub skipped: u64,
}

pub fn parse_line(line: &str) -> Result<Option<ReplayRecord>, ReplayError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}

enum Decoded {
    Track(TrackMessage),
    Depth(DepthMap),
    Motion(MotionSample),
}

fn decode(record: ReplayRecord) -> Result<Decoded, ReplayError> {
    match record {
        ReplayRecord::Tracklets {
            timestamp_ms,
            tracklets,
        } => Ok(Decoded::Track(TrackMessage {
            input: TrackInput::Tracklets(tracklets),
            timestamp_ms,
        })),
        ReplayRecord::Tensors { timestamp_ms, maps } => {
            let tensors = maps
                .into_iter()
                .map(|m| {
                    let len = m.data.len();
                    Array4::from_shape_vec(m.shape, m.data)
                        .map_err(|_| ReplayError::TensorShape { shape: m.shape, len })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Decoded::Track(TrackMessage {
                input: TrackInput::HeadTensors(tensors),
                timestamp_ms,
            }))
        }
        ReplayRecord::Depth {
            timestamp_ms,
            width,
            height,
            samples_mm,
        } => {
            let len = samples_mm.len();
            DepthMap::from_vec(width, height, samples_mm, timestamp_ms)
                .map(Decoded::Depth)
                .ok_or(ReplayError::DepthShape { width, height, len })
        }
        ReplayRecord::Motion {
            timestamp_ms,
            accel,
            gyro,
        } => Ok(Decoded::Motion(MotionSample {
            accel,
            gyro,
            timestamp_ms,
        })),
    }
}

/// Streams every record from `reader` into the runtime queues, in file order.
///
/// Bad lines are logged and skipped. Returns early, without error, once the
/// runtime has dropped its receivers.
pub fn feed<R: BufRead>(reader: R, senders: &ReplaySenders) -> Result<ReplayStats> {
    let mut stats = ReplayStats::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading replay line {}", idx + 1))?;
        stats.lines += 1;

        let record = match parse_line(&line).and_then(|r| r.map(decode).transpose()) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => continue,
            Err(e) => {
                warn!("Replay line {} skipped: {}", idx + 1, e);
                stats.skipped += 1;
                continue;
            }
        };

        let delivered = match record {
            Decoded::Track(msg) => {
                stats.track_messages += 1;
                senders.tracks.send(msg).is_ok()
            }
            Decoded::Depth(map) => {
                stats.depth_maps += 1;
                senders.depth.send(map).is_ok()
            }
            Decoded::Motion(sample) => {
                stats.motion_samples += 1;
                senders.motion.send(sample).is_ok()
            }
        };
        if !delivered {
            debug!("Runtime stopped, replay ends at line {}", idx + 1);
            break;
        }
    }

    Ok(stats)
}
