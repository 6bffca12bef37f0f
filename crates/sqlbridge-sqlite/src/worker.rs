//! Worker pool for blocking native calls.
//!
//! Every call into libsqlite3 that may block (open, prepare, step, exec) runs
//! on a [`WorkerPool`] thread. Dispatching a job returns a [`Completion`],
//! which can be awaited from any executor or waited on synchronously.

use serde::Deserialize;
use sqlbridge_core::error::ConfigError;
use sqlbridge_core::{Error, Result};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::oneshot;

/// Configuration for a [`WorkerPool`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Upper bound on threads running native calls at once.
    pub max_blocking_threads: usize,
    /// Name given to worker threads.
    pub thread_name: String,
    /// How long an idle worker thread is kept, in milliseconds.
    pub keep_alive_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_blocking_threads: 4,
            thread_name: "sqlbridge-sqlite".to_string(),
            keep_alive_ms: 10_000,
        }
    }
}

impl WorkerPoolConfig {
    /// Set the thread bound.
    pub fn max_blocking_threads(mut self, n: usize) -> Self {
        self.max_blocking_threads = n;
        self
    }

    /// Set the idle keep-alive.
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive_ms = u64::try_from(keep_alive.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

struct WorkerInner {
    runtime: Option<Runtime>,
    config: WorkerPoolConfig,
}

impl Drop for WorkerInner {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            // Running jobs finish on their own; nothing waits for them here.
            runtime.shutdown_background();
        }
    }
}

/// A pool of threads executing blocking native calls.
///
/// Cheap to clone; clones share the same threads. The threads stop once the
/// last clone is dropped.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<WorkerInner>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Start a pool.
    pub fn new(config: WorkerPoolConfig) -> Result<Self> {
        if config.max_blocking_threads == 0 {
            return Err(config_error("max_blocking_threads must be greater than 0", None));
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.max_blocking_threads)
            .thread_name(config.thread_name.clone())
            .thread_keep_alive(Duration::from_millis(config.keep_alive_ms))
            .build()
            .map_err(|e| config_error("failed to start worker pool", Some(e)))?;

        tracing::debug!(
            max_blocking_threads = config.max_blocking_threads,
            thread_name = %config.thread_name,
            "worker pool started"
        );

        Ok(Self {
            inner: Arc::new(WorkerInner {
                runtime: Some(runtime),
                config,
            }),
        })
    }

    /// Start a pool with the default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(WorkerPoolConfig::default())
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.inner.config
    }

    /// Run `job` on a worker thread.
    pub fn dispatch<T, F>(&self, job: F) -> Completion<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        match &self.inner.runtime {
            Some(runtime) => {
                runtime.spawn_blocking(move || {
                    // The receiver may already be gone; the result is then unused.
                    let _ = tx.send(job());
                });
            }
            None => drop(tx),
        }
        Completion { rx }
    }
}

fn config_error(message: &str, source: Option<std::io::Error>) -> Error {
    Error::Config(ConfigError {
        message: message.to_string(),
        source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
    })
}

/// Refuse to block a thread owned by a tokio runtime.
pub(crate) fn ensure_blocking_allowed() -> Result<()> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(Error::Unsupported(
            "blocking wait inside an async runtime".to_string(),
        ));
    }
    Ok(())
}

/// The single result of one dispatched job.
///
/// Resolves to [`Error::NoResult`] if the job ended without producing a
/// value, e.g. because it panicked.
#[must_use = "a completion does nothing unless awaited or waited on"]
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Completion<T> {
    /// A completion that is already resolved.
    pub fn ready(result: Result<T>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }

    /// Block the current thread until the job finishes.
    ///
    /// Fails with [`Error::Unsupported`] on a thread that belongs to a tokio
    /// runtime, where blocking would stall or abort it. Await the completion
    /// there instead.
    pub fn wait(self) -> Result<T> {
        ensure_blocking_allowed()?;
        self.rx.blocking_recv().unwrap_or(Err(Error::NoResult))
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::NoResult)))
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;

    #[test]
    fn test_dispatch_and_wait() {
        let pool = WorkerPool::with_defaults().unwrap();
        let name = pool
            .dispatch(|| Ok(std::thread::current().name().map(str::to_string)))
            .wait()
            .unwrap();
        assert_eq!(name.as_deref(), Some("sqlbridge-sqlite"));
    }

    #[test]
    fn test_dispatch_and_await() {
        let pool = WorkerPool::with_defaults().unwrap();
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let value = rt.block_on(async { pool.dispatch(|| Ok(21 * 2)).await });
        assert_eq!(value.unwrap(), 42);
    }

    #[test]
    fn test_errors_pass_through() {
        let pool = WorkerPool::with_defaults().unwrap();
        let err = pool
            .dispatch::<(), _>(|| Err(Error::syntax("bad")))
            .wait()
            .unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn test_panicking_job_yields_no_result() {
        let pool = WorkerPool::with_defaults().unwrap();
        let result = pool.dispatch::<(), _>(|| panic!("job failed")).wait();
        assert!(matches!(result, Err(Error::NoResult)));
    }

    #[test]
    fn test_wait_inside_tokio_runtime_is_rejected() {
        let pool = WorkerPool::with_defaults().unwrap();
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("create tokio runtime");
        let result = rt.block_on(async { pool.dispatch(|| Ok(1)).wait() });
        assert!(matches!(result, Err(Error::Unsupported(_))));
        // awaiting works on the same runtime
        let value = rt.block_on(async { pool.dispatch(|| Ok(2)).await });
        assert_eq!(value.unwrap(), 2);
    }

    #[test]
    fn test_ready_completion() {
        assert_eq!(Completion::ready(Ok(5)).wait().unwrap(), 5);
    }

    #[test]
    fn test_zero_threads_rejected() {
        let err = WorkerPool::new(WorkerPoolConfig::default().max_blocking_threads(0)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_config_deserialize() {
        let config: WorkerPoolConfig =
            serde_json::from_str(r#"{"max_blocking_threads": 2}"#).unwrap();
        assert_eq!(config.max_blocking_threads, 2);
        assert_eq!(config.thread_name, "sqlbridge-sqlite");
    }
}
