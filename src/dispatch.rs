//! Rate-limited delivery of notifications to the chat sink.
//!
//! Tasks are delivered one at a time by a single background drain task,
//! spaced at least `min_interval` apart. A task the sink rejects with a
//! rate-limit response goes back to the front of the queue; any other
//! failure drops it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{error, info, instrument, warn};

use crate::chat::ChatService;
use crate::model::NotificationTask;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
/// Longest wait honoured from a sink's `Retry-After` hint.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Counters accumulated over the queue's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: usize,
    pub rate_limited: usize,
    pub dropped: usize,
}

#[derive(Clone)]
pub struct DispatchQueue {
    inner: Arc<Inner>,
}

struct Inner {
    chat: Arc<dyn ChatService>,
    min_interval: Duration,
    poll_interval: Duration,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    tasks: VecDeque<NotificationTask>,
    draining: bool,
    last_send: Option<Instant>,
    /// Earliest next attempt after a rate-limit response.
    not_before: Option<Instant>,
    stats: DispatchStats,
    worker: Option<JoinHandle<()>>,
}

impl DispatchQueue {
    pub fn new(chat: Arc<dyn ChatService>, min_interval: Duration) -> Self {
        Self::with_poll_interval(chat, min_interval, DEFAULT_POLL_INTERVAL)
    }

    /// `poll_interval` is used by `wait_for_drain` when another waiter holds
    /// the drain task handle.
    pub fn with_poll_interval(
        chat: Arc<dyn ChatService>,
        min_interval: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                chat,
                min_interval,
                poll_interval,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Append a task and make sure a drain is running. Does not wait for delivery.
    /// Must be called from within a Tokio runtime.
    pub fn enqueue(&self, task: NotificationTask) {
        let mut state = self.inner.lock();
        state.tasks.push_back(task);
        if !state.draining {
            self.inner.start_drain(&mut state);
        }
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.inner.lock();
        state.tasks.is_empty() && !state.draining
    }

    pub fn stats(&self) -> DispatchStats {
        self.inner.lock().stats
    }

    /// Resolve once the queue is empty and no drain is running.
    #[instrument(skip_all)]
    pub async fn wait_for_drain(&self) -> DispatchStats {
        loop {
            let worker = {
                let mut state = self.inner.lock();
                if state.tasks.is_empty() && !state.draining {
                    return state.stats;
                }
                state.worker.take()
            };

            match worker {
                Some(handle) => {
                    if let Err(err) = handle.await {
                        error!(?err, "chat drain task failed");
                        let mut state = self.inner.lock();
                        state.draining = false;
                        if !state.tasks.is_empty() {
                            self.inner.start_drain(&mut state);
                        }
                    }
                }
                // another waiter holds the handle
                None => sleep(self.inner.poll_interval).await,
            }
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_drain(self: &Arc<Self>, state: &mut QueueState) {
        state.draining = true;
        let inner = Arc::clone(self);
        state.worker = Some(tokio::spawn(async move { inner.drain().await }));
    }

    /// How long to wait before the next send may go out.
    fn pacing_delay(&self, state: &QueueState, now: Instant) -> Option<Duration> {
        let mut ready = now;
        if let Some(last) = state.last_send {
            ready = ready.max(last + self.min_interval);
        }
        if let Some(not_before) = state.not_before {
            ready = ready.max(not_before);
        }
        (ready > now).then(|| ready - now)
    }

    async fn drain(self: Arc<Self>) {
        info!(pending = self.lock().tasks.len(), "processing chat notifications");
        loop {
            let delay = {
                let mut state = self.lock();
                if state.tasks.is_empty() {
                    // same critical section as enqueue's check
                    state.draining = false;
                    break;
                }
                self.pacing_delay(&state, Instant::now())
            };
            if let Some(delay) = delay {
                sleep(delay).await;
            }

            let task = {
                let mut state = self.lock();
                match state.tasks.pop_front() {
                    Some(task) => task,
                    None => continue,
                }
            };

            let result = self.chat.post(&task).await;

            let mut state = self.lock();
            match result {
                Ok(()) => {
                    state.last_send = Some(Instant::now());
                    state.stats.delivered += 1;
                    info!(id = %task.record.id, "chat notification sent");
                }
                Err(err) if err.is_rate_limited() => {
                    let backoff = rate_limit_backoff(err.retry_after(), self.min_interval);
                    warn!(id = %task.record.id, ?backoff, "chat rate limit hit; requeueing");
                    state.not_before = Some(Instant::now() + backoff);
                    state.stats.rate_limited += 1;
                    state.tasks.push_front(task);
                }
                Err(err) => {
                    warn!(?err, id = %task.record.id, "chat notification failed; dropping");
                    state.stats.dropped += 1;
                }
            }
        }
        info!("finished processing chat notifications");
    }
}

/// Wait after a rate-limit response: the sink's hint, kept between the
/// pacing interval and `MAX_RETRY_AFTER`.
fn rate_limit_backoff(retry_after: Option<Duration>, min_interval: Duration) -> Duration {
    match retry_after {
        Some(hint) => hint.min(MAX_RETRY_AFTER).max(min_interval),
        None => min_interval,
    }
}
