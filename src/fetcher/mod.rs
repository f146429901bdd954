//! Bounded concurrent execution of independent fetch jobs.
//!
//! [`ConcurrentFetcher`] applies a caller-supplied async fetch function to a
//! batch of `(url, args)` jobs with at most `workers` running at once, and
//! returns once every job has finished. A failing or panicking job never
//! stops its siblings. The fetcher does not retry; retries belong to the
//! transport underneath the fetch function.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fetcher_core::fetcher::ConcurrentFetcher;
//! use fetcher_core::request::{RequestExecutor, RequestOptions};
//! use fetcher_core::session::SessionManager;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Arc::new(SessionManager::open(Vec::<(String, String)>::new())?);
//! let executor = RequestExecutor::new(session);
//! let fetcher = ConcurrentFetcher::new(8)?;
//!
//! let stats = fetcher
//!     .run(
//!         move |url, page: u32| {
//!             let executor = executor.clone();
//!             async move {
//!                 executor
//!                     .get(&url, RequestOptions::new().query("page", page.to_string()))
//!                     .await
//!             }
//!         },
//!         (1..=8).map(|page| ("https://example.com/list".to_string(), page)),
//!     )
//!     .await?;
//! println!("completed {}, failed {}", stats.completed(), stats.failed());
//! # Ok(())
//! # }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

/// Minimum allowed pool size.
const MIN_WORKERS: usize = 1;

/// Maximum allowed pool size.
const MAX_WORKERS: usize = 100;

/// Default pool size if not specified.
pub const DEFAULT_WORKERS: usize = 10;

/// Error type for fetcher operations.
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// Invalid pool size provided.
    #[error("invalid worker count {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Outcome counts of one [`ConcurrentFetcher::run`].
#[derive(Debug, Default)]
pub struct FetchStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    panicked: AtomicUsize,
}

impl FetchStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs whose fetch function returned `Ok`.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Jobs whose fetch function returned `Err`.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Jobs whose task panicked.
    #[must_use]
    pub fn panicked(&self) -> usize {
        self.panicked.load(Ordering::SeqCst)
    }

    /// All jobs that ran.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed() + self.failed() + self.panicked()
    }

    fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> Self {
        Self {
            completed: AtomicUsize::new(self.completed()),
            failed: AtomicUsize::new(self.failed()),
            panicked: AtomicUsize::new(self.panicked()),
        }
    }
}

/// Fixed-size pool of concurrent fetch workers.
///
/// # Concurrency Model
///
/// - Each job runs in its own Tokio task
/// - A semaphore permit is acquired before a job is spawned and released when
///   it finishes, so at most `workers` jobs are in flight
/// - Completion order is unspecified
#[derive(Debug)]
pub struct ConcurrentFetcher {
    semaphore: Arc<Semaphore>,
    workers: usize,
}

impl ConcurrentFetcher {
    /// Creates a pool with `workers` slots.
    ///
    /// # Errors
    ///
    /// Returns [`FetcherError::InvalidConcurrency`] outside 1-100.
    #[instrument(level = "debug")]
    pub fn new(workers: usize) -> Result<Self, FetcherError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&workers) {
            return Err(FetcherError::InvalidConcurrency { value: workers });
        }
        debug!(workers, "creating concurrent fetcher");
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(workers)),
            workers,
        })
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `fetch(url, args)` for every job and waits for all of them.
    ///
    /// Job failures are logged and counted, never propagated. Callers that
    /// need per-job results collect them inside `fetch`.
    ///
    /// # Errors
    ///
    /// Returns [`FetcherError::SemaphoreClosed`] if the pool was shut down.
    /// Jobs already spawned still run to completion.
    #[instrument(skip(self, fetch, jobs), fields(workers = self.workers))]
    pub async fn run<F, Fut, A, T, E, J>(&self, fetch: F, jobs: J) -> Result<FetchStats, FetcherError>
    where
        F: Fn(String, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        A: Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
        J: IntoIterator<Item = (String, A)>,
    {
        let fetch = Arc::new(fetch);
        let stats = Arc::new(FetchStats::new());
        let mut handles = Vec::new();
        let mut spawn_error = None;

        for (url, args) in jobs {
            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    spawn_error = Some(FetcherError::SemaphoreClosed);
                    break;
                }
            };

            let fetch = Arc::clone(&fetch);
            let stats = Arc::clone(&stats);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                debug!(url = %url, "job started");
                match fetch(url.clone(), args).await {
                    Ok(_) => stats.increment_completed(),
                    Err(error) => {
                        warn!(url = %url, error = %error, "job failed");
                        stats.increment_failed();
                    }
                }
            }));
        }

        debug!(task_count = handles.len(), "waiting for jobs to complete");
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "job task panicked");
                stats.increment_panicked();
            }
        }

        info!(
            completed = stats.completed(),
            failed = stats.failed(),
            panicked = stats.panicked(),
            "batch complete"
        );

        if let Some(error) = spawn_error {
            return Err(error);
        }
        Ok(Arc::try_unwrap(stats).unwrap_or_else(|shared| shared.snapshot()))
    }

    /// [`run`](Self::run) for jobs that carry no arguments.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub async fn run_urls<F, Fut, T, E, U>(&self, fetch: F, urls: U) -> Result<FetchStats, FetcherError>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
        U: IntoIterator<Item = String>,
    {
        self.run(move |url, ()| fetch(url), urls.into_iter().map(|url| (url, ())))
            .await
    }

    /// Stops accepting jobs. Calls to [`run`](Self::run) after this fail with
    /// [`FetcherError::SemaphoreClosed`].
    pub fn shutdown(&self) {
        self.semaphore.close();
    }
}
