// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, unbounded};
use doorway_counter::pipeline::{
    spawn_preview_worker, CountingPipeline, CountingRuntime, RuntimeInputs, SharedSnapshot,
};
use doorway_counter::replay::{self, ReplaySenders};
use doorway_counter::types::{Config, CrossingEvent};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "doorway-counter", about = "Doorway passenger counter")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// JSON-lines recording to replay (stdin when omitted)
    #[arg(short, long)]
    replay: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.to_string_lossy().to_string();
    let config = Config::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("doorway_counter={}", config.logging.level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚪 Doorway counter starting");
    info!(
        "✓ Configuration loaded: backend={:?}, axis={:?}, axis_pos={:.2}, gap={:.2}, hysteresis={:.2}",
        config.backend.kind,
        config.gate.axis,
        config.gate.axis_pos,
        config.gate.line_gap,
        config.gate.hysteresis
    );

    let pipeline = CountingPipeline::new(config.clone()).context("building counting pipeline")?;
    let shared = Arc::new(SharedSnapshot::new());
    let stop = Arc::new(AtomicBool::new(false));

    // Zero-capacity queues: the replay advances one record per receive, so the
    // counting loop sees depth, motion and tracks in file order.
    let (track_tx, track_rx) = bounded(0);
    let (depth_tx, depth_rx) = bounded(0);
    let (motion_tx, motion_rx) = bounded(0);
    let (event_tx, event_rx) = unbounded::<CrossingEvent>();

    let runtime = CountingRuntime::new(
        pipeline,
        shared.clone(),
        stop.clone(),
        config.logging.heartbeat_interval_sec,
    )
    .with_event_sink(event_tx);

    let counting = thread::Builder::new()
        .name("counting".to_string())
        .spawn(move || {
            runtime.run(RuntimeInputs {
                tracks: track_rx,
                depth: depth_rx,
                motion: motion_rx,
            })
        })
        .context("spawning counting thread")?;

    let preview = if config.preview.enabled {
        Some(
            spawn_preview_worker(shared.clone(), config.preview.clone(), stop.clone())
                .context("spawning preview thread")?,
        )
    } else {
        info!("⚪ Preview disabled in config");
        None
    };

    let replay_path = args.replay.clone();
    let feeder = thread::Builder::new()
        .name("replay".to_string())
        .spawn(move || -> Result<replay::ReplayStats> {
            let senders = ReplaySenders {
                tracks: track_tx,
                depth: depth_tx,
                motion: motion_tx,
            };
            match replay_path {
                Some(path) => {
                    let file = File::open(&path)
                        .with_context(|| format!("opening replay {}", path.display()))?;
                    replay::feed(BufReader::new(file), &senders)
                }
                None => replay::feed(io::stdin().lock(), &senders),
            }
        })
        .context("spawning replay thread")?;

    let printer = tokio::task::spawn_blocking(move || {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for event in event_rx.iter() {
            match serde_json::to_string(&event) {
                Ok(line) => {
                    if writeln!(out, "{}", line).and_then(|_| out.flush()).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Event not serializable: {}", e),
            }
        }
    });

    let signal_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping");
            signal_stop.store(true, Ordering::Relaxed);
        }
    });

    let telemetry = tokio::task::spawn_blocking(move || counting.join())
        .await
        .context("waiting for counting thread")?
        .map_err(|_| anyhow::anyhow!("counting thread panicked"))?;
    stop.store(true, Ordering::Relaxed);

    // Stdin replay may still be blocked on a read after an interrupt.
    if feeder.is_finished() {
        match feeder.join() {
            Ok(Ok(stats)) => info!(
                "Replay: {} lines, {} track messages, {} depth maps, {} motion samples, {} skipped",
                stats.lines,
                stats.track_messages,
                stats.depth_maps,
                stats.motion_samples,
                stats.skipped
            ),
            Ok(Err(e)) => error!("Replay failed: {:#}", e),
            Err(_) => error!("Replay thread panicked"),
        }
    }

    if let Some(handle) = preview {
        if handle.join().is_err() {
            warn!("Preview thread panicked");
        }
    }
    if let Err(e) = printer.await {
        warn!("Event printer failed: {}", e);
    }

    info!("\n📊 Final Report:");
    info!("  IN: {}  OUT: {}", telemetry.count_in, telemetry.count_out);
    info!("  Ticks: {} ({:.1} FPS)", telemetry.ticks, telemetry.fps);
    info!(
        "  Rejections: {} (dup={}, conf={}, depth={}, move={})",
        telemetry.counters.total_rejections(),
        telemetry.counters.dup_reject,
        telemetry.counters.conf_reject,
        telemetry.counters.depth_reject + telemetry.counters.depth_missing,
        telemetry.counters.move_reject
    );
    if let Some(accel) = telemetry.motion.accel_norm {
        info!("  Last accel norm: {:.2} m/s²", accel);
    }

    Ok(())
}
