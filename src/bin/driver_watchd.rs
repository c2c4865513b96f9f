//! driver_watchd - driver behaviour monitor daemon
//!
//! This daemon:
//! 1. Loads configuration (DRIVER_WATCH_CONFIG file, then environment)
//! 2. Opens the local event store
//! 3. Runs the detection-to-alert pipeline on the synthetic camera
//! 4. Logs pipeline health every few seconds until Ctrl-C or --duration

use anyhow::{anyhow, Result};
use clap::Parser;
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use driver_watch::{
    camera::SyntheticCameraConfig, config::MonitorConfig, detect::InferenceEngine, LogAlarm,
    LogHaptics, LogListener, LogNotifier, Pipeline, PipelineParts, PipelineSettings,
    ScriptedEngine, SqliteStore, StaticPermission, StoreClient, SyntheticCamera,
};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Stop after this many seconds (runs until Ctrl-C when unset).
    #[arg(long)]
    duration: Option<u64>,
    /// Toggle between front and back camera every N seconds.
    #[arg(long, value_name = "SECS")]
    toggle_every: Option<u64>,
    /// Alarm clip reported by the log-backed audio alarm.
    #[arg(long, default_value = "alarm.mp3")]
    alarm_clip: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = MonitorConfig::load()?;
    let store = Arc::new(StoreClient::start(SqliteStore::open(&cfg.db_path)?)?);

    let engine: Box<dyn InferenceEngine> = match &cfg.engine.script_path {
        Some(path) => Box::new(ScriptedEngine::from_file(path)),
        None => Box::new(default_script()),
    };
    let camera = SyntheticCamera::new(SyntheticCameraConfig {
        width: cfg.camera.width,
        height: cfg.camera.height,
        fps: cfg.camera.fps,
        ..SyntheticCameraConfig::default()
    });

    let parts = PipelineParts {
        camera: Box::new(camera),
        permission: Box::new(StaticPermission::granted()),
        engine,
        haptics: Box::new(LogHaptics::default()),
        alarm: Box::new(LogAlarm::new(args.alarm_clip.clone())),
        store: Arc::clone(&store),
        notifier: Arc::new(LogNotifier),
        listener: Box::new(LogListener),
    };
    let pipeline = Pipeline::open(PipelineSettings::from_config(&cfg), parts)?;

    log::info!("driver_watchd running. writing to {}", cfg.db_path);
    log::info!(
        "user_id={}, monitored={:?}, resync={}ms",
        cfg.user_id,
        cfg.alert.monitored_labels,
        cfg.alert.resync_interval.as_millis()
    );

    let (stop_tx, stop_rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let started = Instant::now();
    let deadline = args.duration.map(|secs| started + Duration::from_secs(secs));
    let toggle_every = args.toggle_every.filter(|secs| *secs > 0).map(Duration::from_secs);
    let mut last_toggle = Instant::now();

    loop {
        match stop_rx.recv_timeout(HEALTH_LOG_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                log::info!("shutdown signal received");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        let snapshot = pipeline.snapshot()?;
        let worker = pipeline.worker_stats();
        log::info!(
            "health: alert={:?} facing={} bound={} frames offered={} dropped={} analyzed={} events={} stored={}/{}",
            snapshot.alert,
            snapshot.facing,
            snapshot.bound,
            snapshot.frames.offered,
            snapshot.frames.dropped,
            worker.analyzed(),
            snapshot.events_issued,
            store.metrics().writes_ok(),
            store.metrics().writes_ok() + store.metrics().writes_failed()
        );

        if let Some(every) = toggle_every {
            if last_toggle.elapsed() >= every {
                match pipeline.toggle_camera() {
                    Ok(facing) => log::info!("toggled to {} camera", facing),
                    Err(e) => log::warn!("camera toggle failed: {}", e),
                }
                last_toggle = Instant::now();
            }
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::info!("run duration reached");
            break;
        }
    }

    pipeline.close();
    store.shutdown();
    Ok(())
}

/// Focused for a while, then distracted long enough to trigger resyncs.
fn default_script() -> ScriptedEngine {
    let labels = vec!["focused".to_string(), "distracted".to_string()];
    let steps = vec![
        vec!["focused".to_string()],
        vec!["distracted".to_string()],
        vec!["distracted".to_string()],
        vec!["distracted".to_string(), "focused".to_string()],
        vec![],
    ];
    ScriptedEngine::new(labels, steps).with_frames_per_step(100)
}
