use std::sync::Arc;

use anyhow::{Context, Result};
use pageflip_core::{DocumentBackend, RenderExecutor, RenderJob, RenderOutcome};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

/// Rasterizes jobs on a small rayon pool and posts each outcome to `outcomes`.
pub struct PoolExecutor {
    pool: ThreadPool,
    outcomes: UnboundedSender<RenderOutcome>,
}

impl PoolExecutor {
    pub fn new(threads: usize, outcomes: UnboundedSender<RenderOutcome>) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|index| format!("pageflip-render-{index}"))
            .build()
            .context("failed to start render pool")?;
        Ok(Self { pool, outcomes })
    }
}

impl RenderExecutor for PoolExecutor {
    fn submit(&self, backend: Arc<dyn DocumentBackend>, job: RenderJob) {
        let outcomes = self.outcomes.clone();
        self.pool.spawn(move || {
            if job.token.is_cancelled() {
                trace!(task = job.task, "render job cancelled before it started");
            }
            let outcome = job.execute(backend.as_ref());
            let _ = outcomes.send(outcome);
        });
    }
}
