//! Latest-wins plumbing for debounced lookups.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;
use tokio::{sync::watch, task::JoinHandle};

/// Monotonic counter per lookup channel. A response is applied only if no
/// newer request was issued after it.
#[derive(Debug, Default)]
pub struct RequestGeneration {
    counter: AtomicU64,
}

impl RequestGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        self.current() == ticket
    }
}

type Lookup<T, R> = Arc<dyn Fn(T) -> BoxFuture<'static, R> + Send + Sync>;

/// Debounced input channel. Every [`Debounced::push`] restarts the delay;
/// only the newest lookup's result is published. Dropping it clears the
/// pending timer and suppresses any lookup still in flight.
pub struct Debounced<T, R> {
    delay: Duration,
    generation: Arc<RequestGeneration>,
    timer: Mutex<Option<JoinHandle<()>>>,
    lookup: Lookup<T, R>,
    latest: Arc<watch::Sender<Option<R>>>,
}

impl<T, R> std::fmt::Debug for Debounced<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debounced")
            .field("delay", &self.delay)
            .field("generation", &self.generation.current())
            .finish_non_exhaustive()
    }
}

impl<T, R> Debounced<T, R>
where
    T: Send + 'static,
    R: Send + Sync + 'static,
{
    pub fn new<F>(delay: Duration, lookup: F) -> Self
    where
        F: Fn(T) -> BoxFuture<'static, R> + Send + Sync + 'static,
    {
        let (latest, _) = watch::channel(None);
        Self {
            delay,
            generation: Arc::new(RequestGeneration::new()),
            timer: Mutex::new(None),
            lookup: Arc::new(lookup),
            latest: Arc::new(latest),
        }
    }

    pub fn push(&self, input: T) {
        let ticket = self.generation.issue();
        let delay = self.delay;
        let generation = Arc::clone(&self.generation);
        let lookup = Arc::clone(&self.lookup);
        let latest = Arc::clone(&self.latest);

        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !generation.is_current(ticket) {
                return;
            }
            // the request itself is never cancelled, only its effect
            tokio::spawn(async move {
                let result = lookup(input).await;
                if generation.is_current(ticket) {
                    latest.send_replace(Some(result));
                } else {
                    tracing::debug!(ticket, "dropping stale lookup result");
                }
            });
        });

        let mut slot = match self.timer.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = slot.replace(timer) {
            previous.abort();
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<R>> {
        self.latest.subscribe()
    }
}

impl<T, R> Drop for Debounced<T, R> {
    fn drop(&mut self) {
        self.generation.issue();
        let slot = match self.timer.get_mut() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(timer) = slot.take() {
            timer.abort();
        }
    }
}
