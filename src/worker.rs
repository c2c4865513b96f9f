//! Analysis worker.
//!
//! One background thread takes the latest frame from the slot, preprocesses
//! it and runs the engine, one inference at a time. Outcomes go to the
//! coordination thread over a channel; the worker never touches alert state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{anyhow, Result};
use crossbeam_channel::Sender;

use crate::detect::{DetectionOutcome, EngineHandle};
use crate::frame::FrameSlot;
use crate::preprocess::Preprocessor;

#[derive(Debug, Default)]
pub struct WorkerStats {
    analyzed: AtomicU64,
    preprocess_dropped: AtomicU64,
    detect_failed: AtomicU64,
}

impl WorkerStats {
    pub fn analyzed(&self) -> u64 {
        self.analyzed.load(Ordering::Relaxed)
    }

    pub fn preprocess_dropped(&self) -> u64 {
        self.preprocess_dropped.load(Ordering::Relaxed)
    }

    pub fn detect_failed(&self) -> u64 {
        self.detect_failed.load(Ordering::Relaxed)
    }
}

pub struct AnalysisWorker {
    slot: Arc<FrameSlot>,
    stats: Arc<WorkerStats>,
    join: Option<JoinHandle<()>>,
}

impl AnalysisWorker {
    pub fn spawn(
        slot: Arc<FrameSlot>,
        engine: Arc<EngineHandle>,
        outcomes: Sender<DetectionOutcome>,
    ) -> Result<Self> {
        let stats = Arc::new(WorkerStats::default());
        let thread_slot = Arc::clone(&slot);
        let thread_stats = Arc::clone(&stats);
        let join = std::thread::Builder::new()
            .name("analysis".to_string())
            .spawn(move || run(&thread_slot, &engine, &outcomes, &thread_stats))
            .map_err(|e| anyhow!("failed to spawn analysis thread: {}", e))?;
        Ok(Self {
            slot,
            stats,
            join: Some(join),
        })
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Close the slot and wait for the in-flight frame, if any. Idempotent.
    ///
    /// Frames offered after this point are rejected by the slot.
    pub fn shutdown(&mut self) {
        self.slot.close();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("analysis thread panicked");
            }
        }
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    slot: &FrameSlot,
    engine: &EngineHandle,
    outcomes: &Sender<DetectionOutcome>,
    stats: &WorkerStats,
) {
    let preprocessor = Preprocessor::new();
    while let Some(frame) = slot.take() {
        let sequence = frame.sequence;
        let image = match preprocessor.prepare(frame) {
            Ok(image) => image,
            Err(e) => {
                stats.preprocess_dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("frame #{} dropped: {}", sequence, e);
                continue;
            }
        };

        let outcome = match engine.detect(&image) {
            None => {
                log::debug!("engine released; analysis stopping");
                break;
            }
            Some(Ok(outcome)) => outcome,
            Some(Err(e)) => {
                stats.detect_failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("inference failed on frame #{}: {}", sequence, e);
                continue;
            }
        };
        stats.analyzed.fetch_add(1, Ordering::Relaxed);

        if outcomes.send(outcome).is_err() {
            log::debug!("coordinator gone; analysis stopping");
            break;
        }
    }
    log::debug!("analysis thread stopped");
}
