//! Worker pool for running build tasks off the calling thread.
//!
//! Build tasks can recurse deeply. Callers that already spent much of their
//! stack on template translation hand the task to a pool thread with a large,
//! known stack instead of running it inline.
//!
//! # Lifecycle
//!
//! - [`WorkerPool::start`] creates the threads (named `<prefix><n>`).
//! - [`WorkerPool::submit`] queues a job and returns a [`Completion`].
//! - [`WorkerPool::shutdown`] stops accepting jobs. Jobs already queued still
//!   run and their completions still resolve.
//!
//! # Concurrency
//!
//! At most `threads` jobs run at once. The default of one thread makes the
//! pool single-flight: jobs run one after another in submission order.
//!
//! There is no cancellation or timeout. [`Completion::wait`] blocks until the
//! job returns; if the job panics, or its pool thread goes away, the wait
//! fails with [`Error::WorkerLost`] instead of returning silently. Do not
//! wait on a single-thread pool from one of its own jobs.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};

use parking_lot::RwLock;

use crate::error::{Error, Result};

/// Settings for a worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Pool name used in logs and errors
    pub name: String,

    /// Prefix of worker thread names
    pub thread_prefix: String,

    /// Maximum number of concurrently running jobs
    pub threads: usize,

    /// Stack size of each worker thread in bytes
    pub stack_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "javac".to_string(),
            thread_prefix: "javac-".to_string(),
            threads: 1,
            stack_size: 16 * 1024 * 1024,
        }
    }
}

/// Explicitly started pool of worker threads.
pub struct WorkerPool {
    name: String,
    threads: usize,
    pool: RwLock<Option<rayon::ThreadPool>>,
}

impl WorkerPool {
    /// Start a pool.
    pub fn start(config: PoolConfig) -> Result<Arc<Self>> {
        let threads = config.threads.max(1);
        let prefix = config.thread_prefix.clone();
        let pool_name = config.name.clone();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .stack_size(config.stack_size)
            .thread_name(move |idx| format!("{prefix}{idx}"))
            .panic_handler(move |_| {
                tracing::error!("Job panicked on a '{}' worker thread", pool_name);
            })
            .build()
            .map_err(|e| Error::PoolBuild(e.to_string()))?;

        tracing::debug!(
            "Started worker pool '{}' with {} thread(s), {} byte stacks",
            config.name,
            threads,
            config.stack_size
        );

        Ok(Arc::new(Self {
            name: config.name,
            threads,
            pool: RwLock::new(Some(pool)),
        }))
    }

    /// Start a single-flight pool with default settings.
    pub fn start_default() -> Result<Arc<Self>> {
        Self::start(PoolConfig::default())
    }

    /// Queue a job.
    pub fn submit<T, F>(&self, job_name: &str, job: F) -> Result<Completion<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let guard = self.pool.read();
        let pool = guard
            .as_ref()
            .ok_or_else(|| Error::PoolShutdown(self.name.clone()))?;

        let (tx, rx) = mpsc::sync_channel(1);
        pool.spawn(move || {
            // The receiver may be gone if the caller stopped waiting.
            let _ = tx.send(job());
        });

        Ok(Completion {
            job: job_name.to_string(),
            rx,
        })
    }

    /// Queue a job and block until it finishes.
    pub fn run<T, F>(&self, job_name: &str, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.submit(job_name, job)?.wait()
    }

    /// Stop accepting jobs.
    pub fn shutdown(&self) {
        if self.pool.write().take().is_some() {
            tracing::debug!("Worker pool '{}' shut down", self.name);
        }
    }

    pub fn is_running(&self) -> bool {
        self.pool.read().is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Concurrency bound.
    pub fn threads(&self) -> usize {
        self.threads
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handle to the result of a queued job.
pub struct Completion<T> {
    job: String,
    rx: Receiver<T>,
}

impl<T> Completion<T> {
    /// Block until the job finishes.
    pub fn wait(self) -> Result<T> {
        self.rx.recv().map_err(|_| Error::WorkerLost(self.job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_run_on_named_worker() {
        let pool = WorkerPool::start_default().unwrap();
        let name = pool
            .run("name", || thread::current().name().map(str::to_string))
            .unwrap();
        assert_eq!(name.as_deref(), Some("javac-0"));
        assert_eq!(pool.threads(), 1);
    }

    #[test]
    fn test_single_thread_pool_serializes_jobs() {
        let pool = WorkerPool::start_default().unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let completions: Vec<_> = (0..6)
            .map(|_| {
                let running = Arc::clone(&running);
                let max_seen = Arc::clone(&max_seen);
                pool.submit("job", move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .unwrap()
            })
            .collect();

        for completion in completions {
            completion.wait().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deep_recursion_fits_worker_stack() {
        fn depth(n: u64) -> u64 {
            let pad = [n; 64];
            if n == 0 { 0 } else { std::hint::black_box(pad)[0] / n + depth(n - 1) }
        }
        let pool = WorkerPool::start_default().unwrap();
        assert_eq!(pool.run("recurse", || depth(5_000)).unwrap(), 5_000);
    }

    #[test]
    fn test_panicking_job_reports_worker_lost() {
        let pool = WorkerPool::start_default().unwrap();
        let result: Result<()> = pool.run("boom", || panic!("task blew up"));
        assert!(matches!(result, Err(Error::WorkerLost(job)) if job == "boom"));

        // The pool keeps serving jobs afterwards
        assert_eq!(pool.run("after", || 7).unwrap(), 7);
    }

    #[test]
    fn test_submit_after_shutdown() {
        let pool = WorkerPool::start_default().unwrap();
        pool.shutdown();
        assert!(!pool.is_running());
        assert!(matches!(pool.submit("late", || ()), Err(Error::PoolShutdown(_))));
    }
}
