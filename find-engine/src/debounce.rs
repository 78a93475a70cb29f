//! Trailing-edge debouncing with a shared result.
//!
//! Every call restarts the timer and replaces the pending arguments. When the
//! timer finally fires, the action runs once with the newest arguments and
//! every caller coalesced into that window receives a clone of its result.
//! Once fired, an action always runs to completion; only timers that have not
//! fired yet are cancelled.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::trace;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type Action<A, T> = Arc<dyn Fn(A) -> BoxFuture<T> + Send + Sync>;

struct Pending<A, T> {
    generation: u64,
    timer: Option<JoinHandle<()>>,
    latest: Option<A>,
    waiters: Vec<oneshot::Sender<T>>,
}

pub struct Debouncer<A, T> {
    delay: Duration,
    action: Action<A, T>,
    pending: Arc<Mutex<Pending<A, T>>>,
}

impl<A, T> Debouncer<A, T>
where
    A: Send + 'static,
    T: Clone + Send + 'static,
{
    pub fn new<F>(delay: Duration, action: F) -> Self
    where
        F: Fn(A) -> BoxFuture<T> + Send + Sync + 'static,
    {
        Self {
            delay,
            action: Arc::new(action),
            pending: Arc::new(Mutex::new(Pending {
                generation: 0,
                timer: None,
                latest: None,
                waiters: Vec::new(),
            })),
        }
    }

    /// Schedules the action. Resolves with the result of the dispatch this
    /// call was coalesced into, or `None` if the debouncer was dropped first.
    pub async fn call(&self, args: A) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&self.pending);
            pending.generation += 1;
            pending.latest = Some(args);
            pending.waiters.push(tx);
            if let Some(timer) = pending.timer.take() {
                trace!(waiters = pending.waiters.len(), "debounce timer restarted");
                timer.abort();
            }
            pending.timer = Some(self.spawn_timer(pending.generation));
        }
        rx.await.ok()
    }

    /// True while a timer is armed and has not fired.
    pub fn is_armed(&self) -> bool {
        lock(&self.pending).timer.is_some()
    }

    fn spawn_timer(&self, generation: u64) -> JoinHandle<()> {
        let pending = Arc::clone(&self.pending);
        let action = Arc::clone(&self.action);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let (args, waiters) = {
                let mut pending = lock(&pending);
                if pending.generation != generation {
                    return;
                }
                pending.timer = None;
                (pending.latest.take(), std::mem::take(&mut pending.waiters))
            };
            let Some(args) = args else {
                return;
            };
            trace!(waiters = waiters.len(), "debounce timer fired");
            let result = action(args).await;
            for waiter in waiters {
                let _ = waiter.send(result.clone());
            }
        })
    }
}

impl<A, T> Debouncer<A, T> {
    /// Disarms an unfired timer. Callers waiting on it resolve with `None`.
    pub fn cancel(&self) {
        let mut pending = lock(&self.pending);
        pending.generation += 1;
        pending.latest = None;
        pending.waiters.clear();
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
    }
}

impl<A, T> Drop for Debouncer<A, T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock<A, T>(pending: &Mutex<Pending<A, T>>) -> MutexGuard<'_, Pending<A, T>> {
    match pending.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
