//! Running the async sub-agent from synchronous tool code.
//!
//! Tools are called from the blocking pool, where a tokio runtime is usually
//! already entered; blocking on a nested runtime there would panic. So the
//! check is explicit: inside a runtime, the work gets a dedicated thread with
//! its own runtime; outside one, a fresh runtime on the calling thread.

use std::future::Future;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tokio::runtime::{Builder, Handle};
use tracing::{debug, warn};

use crate::error::{AgentError, Result};

/// Drive the future produced by `make` to completion, or give up after `limit`.
pub fn run_bounded<F, Fut, T>(limit: Duration, make: F) -> Result<T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = T>,
    T: Send + 'static,
{
    if Handle::try_current().is_ok() {
        debug!("runtime active on this thread, using a worker thread");
        on_worker_thread(limit, make)
    } else {
        on_this_thread(limit, make)
    }
}

fn on_this_thread<F, Fut, T>(limit: Duration, make: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let runtime = Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(async {
        tokio::time::timeout(limit, make())
            .await
            .map_err(|_| AgentError::Timeout(limit))
    })
}

fn on_worker_thread<F, Fut, T>(limit: Duration, make: F) -> Result<T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = T>,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("browser-agent".to_string())
        .spawn(move || {
            let _ = tx.send(on_this_thread(limit, make));
        })?;

    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            // The worker is detached; it stops at its own deadline.
            warn!(limit_secs = limit.as_secs(), "worker thread missed its deadline");
            Err(AgentError::Timeout(limit))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(AgentError::Worker(
            "worker thread exited without a result".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_directly_without_a_runtime() {
        let caller = thread::current().id();
        let (value, ran_on) = run_bounded(Duration::from_secs(5), || async {
            (42, thread::current().id())
        })
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(ran_on, caller);
    }

    #[tokio::test]
    async fn uses_a_worker_thread_inside_a_runtime() {
        let caller = thread::current().id();
        let (value, ran_on) = run_bounded(Duration::from_secs(5), || async {
            tokio::task::yield_now().await;
            (7, thread::current().id())
        })
        .unwrap();
        assert_eq!(value, 7);
        assert_ne!(ran_on, caller);
    }

    #[tokio::test]
    async fn works_from_the_blocking_pool() {
        let out = tokio::task::spawn_blocking(|| {
            run_bounded(Duration::from_secs(5), || async { "done" })
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(out, "done");
    }

    #[test]
    fn times_out_on_this_thread() {
        let err = run_bounded(Duration::from_millis(50), || {
            tokio::time::sleep(Duration::from_secs(5))
        })
        .unwrap_err();
        assert!(matches!(err, AgentError::Timeout(_)));
    }

    #[tokio::test]
    async fn times_out_on_worker_thread() {
        let err = run_bounded(Duration::from_millis(50), || {
            tokio::time::sleep(Duration::from_secs(5))
        })
        .unwrap_err();
        assert!(matches!(err, AgentError::Timeout(_)));
    }

    #[tokio::test]
    async fn worker_panic_is_reported() {
        let err = run_bounded::<_, _, ()>(Duration::from_secs(5), || async {
            panic!("sub-agent crashed");
        })
        .unwrap_err();
        assert!(matches!(err, AgentError::Worker(_)));
    }
}
