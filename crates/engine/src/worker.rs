//! Per-process worker loop.
//!
//! One long-lived Tokio task per worker: crash recovery once at startup,
//! an immediate drain, then drains on demand (enqueue wakes) and on a
//! safety-net ticker. A non-blocking instance-scoped mutex guarantees a
//! single drain in flight per worker, so overlapping wakes and ticks
//! collapse into one cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use atelier_core::queue::DRAIN_INTERVAL_SECS;
use atelier_db::repositories::{QueueLockRepo, QueueRepo};
use sqlx::PgPool;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::pipeline::GenerationPipeline;

/// Schedules queue drains for one worker process.
pub struct QueueWorker {
    pool: PgPool,
    pipeline: Arc<GenerationPipeline>,
    drain_guard: tokio::sync::Mutex<()>,
    started: AtomicBool,
    wake: Notify,
}

impl QueueWorker {
    pub fn new(pool: PgPool, pipeline: Arc<GenerationPipeline>) -> Arc<Self> {
        Arc::new(Self {
            pool,
            pipeline,
            drain_guard: tokio::sync::Mutex::new(()),
            started: AtomicBool::new(false),
            wake: Notify::new(),
        })
    }

    /// Start the worker. Idempotent: only the first call recovers crashed
    /// state and spawns the drain task; later calls are no-ops.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("Queue worker already started");
            return;
        }

        let worker = Arc::clone(self);
        tokio::spawn(async move {
            worker.recover_startup_state().await;

            tracing::info!(
                interval_secs = DRAIN_INTERVAL_SECS,
                "Queue worker started",
            );

            worker.run_cycle().await;

            let mut ticker = tokio::time::interval(Duration::from_secs(DRAIN_INTERVAL_SECS));
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Queue worker shutting down");
                        break;
                    }
                    _ = worker.wake.notified() => worker.run_cycle().await,
                    _ = ticker.tick() => worker.run_cycle().await,
                }
            }
        });
    }

    /// Request a drain soon. Called by the enqueue path so new items do
    /// not wait out the safety-net ticker.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Run one drain cycle unless one is already in flight in this
    /// process. Errors are logged and swallowed so the loop keeps going.
    pub async fn run_cycle(&self) {
        let Ok(_guard) = self.drain_guard.try_lock() else {
            tracing::debug!("Drain already running; skipping cycle");
            return;
        };

        match self.pipeline.process_queue().await {
            Ok(0) => tracing::debug!("Drain cycle found no eligible items"),
            Ok(processed) => {
                tracing::info!(processed, "Drain cycle finished");
                match QueueRepo::cleanup(&self.pool).await {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "Pruned old terminal queue rows"),
                    Err(e) => tracing::warn!(error = %e, "Queue retention cleanup failed"),
                }
            }
            Err(e) => tracing::error!(error = %e, "Drain cycle failed"),
        }
    }

    /// Startup crash recovery: requeue items a dead worker abandoned and
    /// drop any stale leases left behind.
    async fn recover_startup_state(&self) {
        match QueueLockRepo::reset_stale_processing(&self.pool).await {
            Ok(reset) => tracing::info!(reset, "Startup recovery: requeued abandoned items"),
            Err(e) => tracing::error!(error = %e, "Startup recovery sweep failed"),
        }
        match QueueLockRepo::cleanup_stale(&self.pool).await {
            Ok(removed) => tracing::info!(removed, "Startup recovery: removed stale leases"),
            Err(e) => tracing::error!(error = %e, "Stale lease cleanup failed"),
        }
    }
}
