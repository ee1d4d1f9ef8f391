use crate::error::SharePointError;
use once_cell::sync::Lazy;
use rayon::ThreadPool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Upper bound for a configured worker count.
pub const MAX_WORKERS: usize = 16;

const SLOW_EXTRACTION: Duration = Duration::from_millis(500);

static SHARED: Lazy<Arc<ExtractionPool>> = Lazy::new(|| {
    Arc::new(ExtractionPool::new(0).expect("failed to build extraction pool"))
});

/// Workers used when none are configured: leave a core for the async
/// runtime, and use at most four.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(2)
        .clamp(1, 4)
}

/// Bounded rayon pool that runs document extraction off the async runtime.
#[derive(Debug)]
pub struct ExtractionPool {
    pool: ThreadPool,
    workers: usize,
    in_flight: Arc<AtomicUsize>,
}

impl ExtractionPool {
    /// `workers == 0` picks [`default_workers`]; larger values are capped at
    /// [`MAX_WORKERS`].
    pub fn new(workers: usize) -> Result<Self, SharePointError> {
        let workers = match workers {
            0 => default_workers(),
            n => n.min(MAX_WORKERS),
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("sharepoint-extract-{idx}"))
            .build()
            .map_err(|e| SharePointError::Internal(format!("extraction pool: {}", e)))?;
        debug!(target: "sharepoint.cpu_pool", workers, "extraction pool started");
        Ok(Self {
            pool,
            workers,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Process-wide pool with the default size.
    pub fn shared() -> Arc<Self> {
        SHARED.clone()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` on the pool and await its result. Panics surface as
    /// `Extraction` errors.
    pub async fn run<F, R>(&self, job: F) -> Result<R, SharePointError>
    where
        F: FnOnce() -> Result<R, SharePointError> + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let queued = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        if queued > self.workers * 2 {
            info!(
                target: "sharepoint.cpu_pool",
                queued,
                workers = self.workers,
                "extraction backlog growing"
            );
        } else {
            debug!(target: "sharepoint.cpu_pool", queued, "extraction queued");
        }

        let in_flight = Arc::clone(&self.in_flight);
        let start = Instant::now();
        self.pool.spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job))
                .map_err(|payload| {
                    let reason = payload
                        .downcast_ref::<&str>()
                        .map(|msg| (*msg).to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    SharePointError::Extraction(format!("extractor panicked: {}", reason))
                })
                .and_then(|inner| inner);
            let _ = tx.send(result);

            let remaining = in_flight.fetch_sub(1, Ordering::Relaxed) - 1;
            let elapsed = start.elapsed();
            if elapsed > SLOW_EXTRACTION {
                info!(
                    target: "sharepoint.cpu_pool",
                    remaining,
                    latency_ms = elapsed.as_millis() as u64,
                    "slow extraction"
                );
            }
        });

        rx.await
            .map_err(|err| SharePointError::Internal(format!("extraction pool join error: {}", err)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn job_result_is_returned() {
        let value = ExtractionPool::shared().run(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn panics_become_extraction_errors() {
        let pool = ExtractionPool::new(1).unwrap();
        let err = pool.run::<_, ()>(|| panic!("boom")).await.unwrap_err();
        assert!(matches!(err, SharePointError::Extraction(ref m) if m.contains("boom")));
        assert_eq!(pool.run(|| Ok("still alive")).await.unwrap(), "still alive");
    }

    #[test]
    fn worker_count_follows_configuration() {
        assert_eq!(ExtractionPool::new(3).unwrap().workers(), 3);
        assert_eq!(ExtractionPool::new(64).unwrap().workers(), MAX_WORKERS);
        let auto = ExtractionPool::new(0).unwrap().workers();
        assert!((1..=4).contains(&auto));
        assert_eq!(auto, default_workers());
    }
}
