//! Bounded pool for blocking driver and language-model calls.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Semaphore;

pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    Closed,
    Panicked,
    Cancelled,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("worker pool is closed"),
            Self::Panicked => f.write_str("worker panicked while running a blocking call"),
            Self::Cancelled => f.write_str("blocking call was cancelled"),
        }
    }
}

impl Error for PoolError {}

/// Runs blocking closures on tokio's blocking threads, at most `size` at a time.
///
/// The permit is held by the worker thread for the whole call, so the bound
/// applies to running work rather than to submitted futures.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Runs `job` on a worker and awaits its result.
    ///
    /// # Errors
    /// Returns `PoolError` if the pool is closed or the job panics.
    pub async fn run<F, T>(&self, job: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        });
        handle.await.map_err(|err| {
            if err.is_panic() {
                PoolError::Panicked
            } else {
                PoolError::Cancelled
            }
        })
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}
