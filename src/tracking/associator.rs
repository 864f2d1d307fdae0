// src/tracking/associator.rs
//
// Host-side tracker for units without an on-camera object tracker.
// Two-stage greedy association: overlap first, then centroid distance.

use crate::detection::Detection;
use crate::geometry::{iou, pixel_distance};
use crate::types::{AssociationConfig, NormBox, TrackStatus, Tracklet};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HostTrack {
    pub id: u32,
    pub bbox: NormBox,
    pub confidence: f32,
    pub age: u32,
    pub last_seen_ms: f64,
}

impl HostTrack {
    fn new(id: u32, det: &Detection, now_ms: f64) -> Self {
        Self {
            id,
            bbox: det.bbox,
            confidence: det.confidence,
            age: 1,
            last_seen_ms: now_ms,
        }
    }

    fn update_with_detection(&mut self, det: &Detection, now_ms: f64) {
        self.bbox = det.bbox;
        self.confidence = det.confidence;
        self.age += 1;
        self.last_seen_ms = now_ms;
    }

    fn as_tracklet(&self) -> Tracklet {
        Tracklet {
            id: self.id,
            status: TrackStatus::Tracked,
            bbox: self.bbox,
            confidence: self.confidence,
            age: self.age,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Association {
    /// Tracks matched or spawned this tick, ordered by id
    pub tracklets: Vec<Tracklet>,
    /// Ids dropped for exceeding the lost timeout
    pub pruned: Vec<u32>,
}

pub struct HostAssociator {
    config: AssociationConfig,
    model_width: u32,
    model_height: u32,
    lost_timeout_ms: f64,
    tracks: BTreeMap<u32, HostTrack>,
    next_id: u32,
}

impl HostAssociator {
    pub fn new(
        config: AssociationConfig,
        model_width: u32,
        model_height: u32,
        lost_timeout_ms: f64,
    ) -> Self {
        Self {
            config,
            model_width,
            model_height,
            lost_timeout_ms,
            tracks: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn get_track(&self, id: u32) -> Option<&HostTrack> {
        self.tracks.get(&id)
    }

    /// Upper bound on the stage-2 centroid jump, in model-input pixels.
    fn max_distance_px(&self) -> f32 {
        if self.config.max_jump_px > 0.0 {
            self.config.match_dist_px.min(self.config.max_jump_px)
        } else {
            self.config.match_dist_px
        }
    }

    pub fn update(&mut self, detections: &[Detection], now_ms: f64) -> Association {
        // ════════════════════════════════════════════════════════════════════
        // PRUNE LOST TRACKS
        // ════════════════════════════════════════════════════════════════════
        let timeout = self.lost_timeout_ms;
        let mut pruned = Vec::new();
        self.tracks.retain(|id, t| {
            let keep = now_ms - t.last_seen_ms <= timeout;
            if !keep {
                debug!("Track {} pruned (unseen {:.0} ms)", id, now_ms - t.last_seen_ms);
                pruned.push(*id);
            }
            keep
        });

        // Ascending id order; ties below fall back to it
        let track_ids: Vec<u32> = self.tracks.keys().copied().collect();
        let mut track_taken = vec![false; track_ids.len()];
        let mut det_taken = vec![false; detections.len()];
        let mut touched: Vec<u32> = Vec::with_capacity(detections.len());

        // ════════════════════════════════════════════════════════════════════
        // PHASE 1: OVERLAP PRIORITY
        // ════════════════════════════════════════════════════════════════════
        let mut iou_pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (ti, id) in track_ids.iter().enumerate() {
            let track_box = self.tracks[id].bbox.as_array();
            for (di, det) in detections.iter().enumerate() {
                let score = iou(&track_box, &det.bbox.as_array());
                if score >= self.config.match_iou_min && score > 0.0 {
                    iou_pairs.push((ti, di, score));
                }
            }
        }
        iou_pairs.sort_by(|a, b| {
            b.2.total_cmp(&a.2)
                .then_with(|| a.0.cmp(&b.0))
                .then_with(|| a.1.cmp(&b.1))
        });
        for (ti, di, _) in iou_pairs {
            if track_taken[ti] || det_taken[di] {
                continue;
            }
            track_taken[ti] = true;
            det_taken[di] = true;
            self.commit(track_ids[ti], &detections[di], now_ms, &mut touched);
        }

        // ════════════════════════════════════════════════════════════════════
        // PHASE 2: DISTANCE PRIORITY
        // ════════════════════════════════════════════════════════════════════
        let max_dist = self.max_distance_px();
        let mut dist_pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (ti, id) in track_ids.iter().enumerate() {
            if track_taken[ti] {
                continue;
            }
            let track_center = self.tracks[id].bbox.centroid();
            for (di, det) in detections.iter().enumerate() {
                if det_taken[di] {
                    continue;
                }
                let dist = pixel_distance(
                    track_center,
                    det.bbox.centroid(),
                    self.model_width,
                    self.model_height,
                );
                if dist <= max_dist {
                    dist_pairs.push((ti, di, dist));
                }
            }
        }
        dist_pairs.sort_by(|a, b| {
            a.2.partial_cmp(&b.2)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
                .then_with(|| a.1.cmp(&b.1))
        });
        for (ti, di, dist) in dist_pairs {
            if track_taken[ti] || det_taken[di] {
                continue;
            }
            track_taken[ti] = true;
            det_taken[di] = true;
            debug!("Track {} matched by distance ({:.0} px)", track_ids[ti], dist);
            self.commit(track_ids[ti], &detections[di], now_ms, &mut touched);
        }

        // ════════════════════════════════════════════════════════════════════
        // UNMATCHED DETECTIONS → NEW TRACKS
        // ════════════════════════════════════════════════════════════════════
        for (di, det) in detections.iter().enumerate() {
            if det_taken[di] {
                continue;
            }
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1).max(1);
            debug!(
                "New track {} at [{:.2},{:.2},{:.2},{:.2}] conf={:.2}",
                id, det.bbox.x1, det.bbox.y1, det.bbox.x2, det.bbox.y2, det.confidence
            );
            self.tracks.insert(id, HostTrack::new(id, det, now_ms));
            touched.push(id);
        }

        touched.sort_unstable();
        let tracklets = touched
            .iter()
            .filter_map(|id| self.tracks.get(id))
            .map(HostTrack::as_tracklet)
            .collect();

        Association { tracklets, pruned }
    }

    fn commit(&mut self, id: u32, det: &Detection, now_ms: f64, touched: &mut Vec<u32>) {
        if let Some(track) = self.tracks.get_mut(&id) {
            track.update_with_detection(det, now_ms);
            touched.push(id);
        }
    }
}
