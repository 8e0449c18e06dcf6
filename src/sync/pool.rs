//! Bounded worker pool with a wait-for-all barrier.
//!
//! Each stage hands the pool a fixed list of keyed inputs. `min(width, n)`
//! tasks pull inputs from a shared queue, and results flow back over a channel
//! into a map keyed by the input key. [`WorkerPool::run`] returns only after
//! every worker has finished, so the map it returns is complete.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::SyncError;

/// Minimum allowed pool width.
pub const MIN_WIDTH: usize = 1;

/// Maximum allowed pool width.
pub const MAX_WIDTH: usize = 100;

/// Default width of the children-fetch and download stages.
pub const DEFAULT_FETCH_WIDTH: usize = 16;

/// Default width of the ingestion stage.
pub const DEFAULT_INGEST_WIDTH: usize = 8;

/// A worker pool of fixed width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    width: usize,
}

impl WorkerPool {
    /// Creates a pool running at most `width` units at once.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConcurrency`] outside `1..=100`.
    pub fn new(width: usize) -> Result<Self, SyncError> {
        if !(MIN_WIDTH..=MAX_WIDTH).contains(&width) {
            return Err(SyncError::InvalidConcurrency { value: width });
        }
        Ok(Self { width })
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Runs `work` over every input and returns the results keyed by input key.
    ///
    /// A unit whose worker panics has no entry in the returned map; callers
    /// treat a missing key as a failure.
    pub async fn run<I, T, F, Fut>(
        &self,
        stage: &'static str,
        inputs: Vec<(String, I)>,
        work: F,
    ) -> HashMap<String, T>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let total = inputs.len();
        if total == 0 {
            return HashMap::new();
        }

        let workers = self.width.min(total);
        let queue = Arc::new(Mutex::new(inputs.into_iter()));
        let work = Arc::new(work);
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, T)>();

        debug!(stage, total, workers, "starting worker pool");

        let mut join_set = JoinSet::new();
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let work = Arc::clone(&work);
            let tx = tx.clone();
            join_set.spawn(async move {
                loop {
                    let next = queue.lock().await.next();
                    let Some((key, input)) = next else {
                        break;
                    };
                    // Each unit runs in its own task; a panic loses only that unit.
                    match tokio::spawn(work(input)).await {
                        Ok(output) => {
                            if tx.send((key, output)).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(stage, key = %key, error = %e, "unit failed to complete"),
                    }
                }
            });
        }
        drop(tx);

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                warn!(stage, error = %e, "worker task failed");
            }
        }

        let mut results = HashMap::with_capacity(total);
        while let Some((key, output)) = rx.recv().await {
            results.insert(key, output);
        }

        debug!(stage, total, completed = results.len(), "worker pool finished");
        results
    }
}
