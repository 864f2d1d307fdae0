// src/pipeline/preview.rs
//
// Diagnostic preview: gate lines, hysteresis bands, ROI and per-track boxes
// drawn onto a blank canvas and JPEG-encoded into the shared snapshot.
// Runs on its own thread at `preview.fps`; skipped frames are fine.

use super::snapshot::{PreviewFrame, PreviewScene, SharedSnapshot};
use crate::types::{CountAxis, NormBox, PreviewConfig};
use image::{ImageBuffer, ImageError, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

const BACKGROUND: Rgb<u8> = Rgb([24, 24, 24]);
const GATE_LINE: Rgb<u8> = Rgb([255, 255, 255]);
const HYSTERESIS_BAND: Rgb<u8> = Rgb([96, 96, 96]);
const ROI_OUTLINE: Rgb<u8> = Rgb([80, 160, 255]);
const TRACK_COUNTABLE: Rgb<u8> = Rgb([0, 220, 0]);
const TRACK_BLOCKED: Rgb<u8> = Rgb([255, 150, 0]);

pub fn render_scene(scene: &PreviewScene, width: u32, height: u32) -> RgbImage {
    let mut img: RgbImage = ImageBuffer::from_pixel(width, height, BACKGROUND);

    let g = scene;
    for (pos, color) in [
        (g.line_a - g.hysteresis, HYSTERESIS_BAND),
        (g.line_a + g.hysteresis, HYSTERESIS_BAND),
        (g.line_b - g.hysteresis, HYSTERESIS_BAND),
        (g.line_b + g.hysteresis, HYSTERESIS_BAND),
        (g.line_a, GATE_LINE),
        (g.line_b, GATE_LINE),
    ] {
        draw_gate_line(&mut img, scene.axis, pos, color);
    }

    if let Some(roi) = &scene.roi {
        draw_norm_box(&mut img, roi, ROI_OUTLINE);
    }

    for track in &scene.tracks {
        let color = if track.countable {
            TRACK_COUNTABLE
        } else {
            TRACK_BLOCKED
        };
        draw_norm_box(&mut img, &track.bbox, color);
        // Second outline marks an armed track
        if track.armed {
            let inset = NormBox::new(
                track.bbox.x1 + 0.005,
                track.bbox.y1 + 0.005,
                track.bbox.x2 - 0.005,
                track.bbox.y2 - 0.005,
            );
            draw_norm_box(&mut img, &inset, color);
        }
    }

    img
}

fn draw_gate_line(img: &mut RgbImage, axis: CountAxis, pos: f32, color: Rgb<u8>) {
    let (w, h) = (img.width() as f32, img.height() as f32);
    match axis {
        CountAxis::X => {
            let x = pos * w;
            draw_line_segment_mut(img, (x, 0.0), (x, h - 1.0), color);
        }
        CountAxis::Y => {
            let y = pos * h;
            draw_line_segment_mut(img, (0.0, y), (w - 1.0, y), color);
        }
    }
}

fn draw_norm_box(img: &mut RgbImage, bbox: &NormBox, color: Rgb<u8>) {
    let (w, h) = (img.width() as f32, img.height() as f32);
    let x1 = (bbox.x1.min(bbox.x2).clamp(0.0, 1.0) * w) as i32;
    let y1 = (bbox.y1.min(bbox.y2).clamp(0.0, 1.0) * h) as i32;
    let x2 = (bbox.x1.max(bbox.x2).clamp(0.0, 1.0) * w) as i32;
    let y2 = (bbox.y1.max(bbox.y2).clamp(0.0, 1.0) * h) as i32;
    let rect = Rect::at(x1, y1).of_size((x2 - x1).max(1) as u32, (y2 - y1).max(1) as u32);
    draw_hollow_rect_mut(img, rect, color);
}

pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    img.write_with_encoder(encoder)?;
    Ok(buf.into_inner())
}

/// Starts the preview thread. It exits once `stop` is set.
pub fn spawn_preview_worker(
    shared: Arc<SharedSnapshot>,
    config: PreviewConfig,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("preview".to_string())
        .spawn(move || run_preview(shared, config, stop))
}

fn run_preview(shared: Arc<SharedSnapshot>, config: PreviewConfig, stop: Arc<AtomicBool>) {
    let interval = Duration::from_secs_f64(1.0 / config.fps.max(1.0));
    let mut last_tick = None;
    let mut rendered = 0u64;
    info!(
        "Preview worker started ({}x{} @ {:.0} fps)",
        config.width, config.height, config.fps
    );

    while !stop.load(Ordering::Relaxed) {
        thread::sleep(interval);

        let scene = shared.latest_scene();
        if last_tick == Some(scene.tick_id) {
            continue;
        }
        last_tick = Some(scene.tick_id);

        let img = render_scene(&scene, config.width, config.height);
        match encode_jpeg(&img, config.jpeg_quality) {
            Ok(jpeg) => {
                shared.store_preview(PreviewFrame {
                    tick_id: scene.tick_id,
                    width: config.width,
                    height: config.height,
                    jpeg,
                });
                rendered += 1;
            }
            Err(e) => warn!("Preview encode failed: {}", e),
        }
    }

    debug!("Preview worker stopped after {} frames", rendered);
}
