//! Single-flight coordination.
//!
//! A `Flight` lets many callers ask for the same piece of work while only
//! the first one (the leader) actually starts it. Everyone, leader included,
//! registers a one-shot channel and waits on it. The work runs on its own
//! task, so a caller that stops waiting never cancels it, and a panic inside
//! the work is turned into an error for every waiter instead of leaving the
//! flight stuck.

use chartmill_core::IndexError;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

type Waiter<T> = oneshot::Sender<Result<T, IndexError>>;

/// Deduplicates concurrent runs of one operation for one tenant.
///
/// `None` means idle. `Some(waiters)` means a worker is in flight and will
/// deliver its result to every registered waiter.
pub struct Flight<T> {
    operation: &'static str,
    waiters: Arc<Mutex<Option<Vec<Waiter<T>>>>>,
}

impl<T> Clone for Flight<T> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation,
            waiters: Arc::clone(&self.waiters),
        }
    }
}

impl<T> std::fmt::Debug for Flight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flight")
            .field("operation", &self.operation)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl<T> Flight<T> {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            waiters: Arc::new(Mutex::new(None)),
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn in_flight(&self) -> bool {
        self.waiters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Number of callers currently waiting on the in-flight worker.
    pub fn waiter_count(&self) -> usize {
        self.waiters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(0, Vec::len)
    }
}

impl<T> Flight<T>
where
    T: Clone + Send + 'static,
{
    /// Register as a waiter. Returns the receiver and whether the caller
    /// became the leader and must start the work.
    fn join(&self) -> (oneshot::Receiver<Result<T, IndexError>>, bool) {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.waiters.lock().unwrap_or_else(|e| e.into_inner());
        let leader = match waiters.as_mut() {
            Some(pending) => {
                pending.push(tx);
                false
            }
            None => {
                *waiters = Some(vec![tx]);
                true
            }
        };
        (rx, leader)
    }

    /// Hand `result` to every waiter and return to idle. Waiters that
    /// stopped listening are skipped.
    fn complete(&self, result: Result<T, IndexError>) -> usize {
        let waiters = self
            .waiters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .unwrap_or_default();
        let count = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
        count
    }

    /// Join the flight, starting `work` on a new task if nothing is in
    /// flight, and wait for the shared result.
    ///
    /// `work` is only called by the leader.
    pub async fn run<F, Fut>(&self, tenant: &str, work: F) -> Result<T, IndexError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, IndexError>> + Send + 'static,
    {
        let (rx, leader) = self.join();

        if leader {
            let landing = Landing {
                flight: self.clone(),
                tenant: tenant.to_string(),
                landed: false,
            };
            let work = work();
            tokio::spawn(async move {
                let result = match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::error!(
                            tenant = %landing.tenant,
                            operation = landing.flight.operation,
                            "Worker panicked"
                        );
                        Err(IndexError::WorkerPanicked {
                            tenant: landing.tenant.clone(),
                            operation: landing.flight.operation.to_string(),
                        })
                    }
                };
                landing.land(result);
            });
        }

        rx.await.unwrap_or_else(|_| {
            Err(IndexError::WorkerLost {
                tenant: tenant.to_string(),
                operation: self.operation.to_string(),
            })
        })
    }
}

/// Completes the flight exactly once. If the worker task is dropped before
/// landing (runtime shutdown, abort), waiters get `WorkerLost` and the
/// flight goes back to idle.
struct Landing<T>
where
    T: Clone + Send + 'static,
{
    flight: Flight<T>,
    tenant: String,
    landed: bool,
}

impl<T> Landing<T>
where
    T: Clone + Send + 'static,
{
    fn land(mut self, result: Result<T, IndexError>) {
        self.landed = true;
        self.flight.complete(result);
    }
}

impl<T> Drop for Landing<T>
where
    T: Clone + Send + 'static,
{
    fn drop(&mut self) {
        if !self.landed {
            self.flight.complete(Err(IndexError::WorkerLost {
                tenant: self.tenant.clone(),
                operation: self.flight.operation.to_string(),
            }));
        }
    }
}
