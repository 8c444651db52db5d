//! Per-provider request queue
//!
//! Serializes calls to one provider, spacing dispatches at least
//! `min_interval` apart and bounding how many requests may wait. A single
//! worker task drains the queue and exits when it is empty; the next
//! enqueue starts a new one.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::config::QueueConfig;
use crate::error::ProviderError;
use crate::models::{GeocodeResult, Source};
use crate::providers::GeocodeProvider;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Request queue is full ({capacity} pending)")]
    Full { capacity: usize },
}

/// Tier a request waits in. High requests are dispatched before any normal
/// one; both tiers share the same capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Priority {
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    pub min_interval: Duration,
    pub max_queue_size: usize,
    pub spacing: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(500),
            max_queue_size: 100,
            spacing: Duration::from_millis(10),
        }
    }
}

impl From<&QueueConfig> for QueueSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            min_interval: config.min_interval(),
            max_queue_size: config.max_queue_size,
            spacing: config.spacing(),
        }
    }
}

type Completion = oneshot::Sender<Result<GeocodeResult, ProviderError>>;

struct QueueItem {
    city: String,
    enqueued_at: Instant,
    completion: Completion,
}

#[derive(Default)]
struct QueueState {
    high: VecDeque<QueueItem>,
    normal: VecDeque<QueueItem>,
    processing: bool,
    last_dispatch: Option<Instant>,
}

impl QueueState {
    fn pending(&self) -> usize {
        self.high.len() + self.normal.len()
    }

    fn pop(&mut self) -> Option<QueueItem> {
        self.high.pop_front().or_else(|| self.normal.pop_front())
    }
}

struct Inner {
    provider: Arc<dyn GeocodeProvider>,
    settings: QueueSettings,
    state: Mutex<QueueState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Rate-limited FIFO in front of one [`GeocodeProvider`].
#[derive(Clone)]
pub struct RequestQueue {
    inner: Arc<Inner>,
}

/// Pending result of an enqueued request.
#[must_use = "the request is dispatched regardless, but its result is lost unless awaited"]
pub struct Ticket {
    receiver: oneshot::Receiver<Result<GeocodeResult, ProviderError>>,
}

impl Future for Ticket {
    type Output = Result<GeocodeResult, ProviderError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ProviderError::Interrupted)))
    }
}

impl RequestQueue {
    pub fn new(provider: Arc<dyn GeocodeProvider>, settings: QueueSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                settings,
                state: Mutex::default(),
            }),
        }
    }

    #[must_use]
    pub fn source(&self) -> Source {
        self.inner.provider.source()
    }

    #[must_use]
    pub fn settings(&self) -> QueueSettings {
        self.inner.settings
    }

    /// Requests waiting to be dispatched; the one in flight is not counted.
    #[must_use]
    pub fn queue_length(&self) -> usize {
        self.inner.lock().pending()
    }

    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.inner.lock().processing
    }

    /// Queue a lookup of `city`.
    ///
    /// Rejects immediately when `max_queue_size` requests are already
    /// waiting. Must be called from within a tokio runtime.
    pub fn enqueue(&self, city: &str, priority: Priority) -> Result<Ticket, QueueError> {
        let (completion, receiver) = oneshot::channel();
        let item = QueueItem {
            city: city.to_string(),
            enqueued_at: Instant::now(),
            completion,
        };

        let mut state = self.inner.lock();
        if state.pending() >= self.inner.settings.max_queue_size {
            return Err(QueueError::Full {
                capacity: self.inner.settings.max_queue_size,
            });
        }

        match priority {
            Priority::High => state.high.push_back(item),
            Priority::Normal => state.normal.push_back(item),
        }

        if !state.processing {
            state.processing = true;
            tokio::spawn(Worker::new(self.inner.clone()).run());
        }

        Ok(Ticket { receiver })
    }
}

/// Resets the processing flag if the worker dies without draining.
struct Worker {
    inner: Arc<Inner>,
    drained: bool,
}

impl Worker {
    fn new(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            drained: false,
        }
    }

    async fn run(mut self) {
        let settings = self.inner.settings;
        let source = self.inner.provider.source();

        loop {
            let (item, wait) = {
                let mut state = self.inner.lock();
                let Some(item) = state.pop() else {
                    state.processing = false;
                    drop(state);
                    self.drained = true;
                    return;
                };
                let wait = state
                    .last_dispatch
                    .map(|last| settings.min_interval.saturating_sub(last.elapsed()))
                    .unwrap_or_default();
                (item, wait)
            };

            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }

            debug!(
                "Dispatching '{}' to {} after {:?} in queue",
                item.city,
                source,
                item.enqueued_at.elapsed()
            );
            let result = self.inner.provider.geocode(&item.city).await;
            self.inner.lock().last_dispatch = Some(Instant::now());

            if item.completion.send(result).is_err() {
                debug!("Caller for '{}' no longer waiting", item.city);
            }

            tokio::time::sleep(settings.spacing).await;
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if !self.drained {
            error!(
                "{} queue worker stopped unexpectedly",
                self.inner.provider.source()
            );
            self.inner.lock().processing = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::models::GeoCoordinate;

    /// Records dispatch order and time; cities starting with "?" are not found.
    #[derive(Default)]
    struct RecordingProvider {
        calls: Mutex<Vec<(String, Instant)>>,
    }

    impl RecordingProvider {
        fn cities(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
        }

        fn times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
        }
    }

    #[async_trait]
    impl GeocodeProvider for RecordingProvider {
        fn source(&self) -> Source {
            Source::OpenStreetMap
        }

        async fn geocode(&self, city: &str) -> Result<GeocodeResult, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push((city.to_string(), Instant::now()));
            if city.starts_with('?') {
                return Err(ProviderError::NotFound);
            }
            Ok(GeocodeResult::new(
                GeoCoordinate::new(1.0, 2.0).unwrap(),
                Source::OpenStreetMap,
            ))
        }
    }

    fn queue(provider: Arc<RecordingProvider>, max_queue_size: usize) -> RequestQueue {
        RequestQueue::new(
            provider,
            QueueSettings {
                max_queue_size,
                ..QueueSettings::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_when_full_until_drained() {
        let provider = Arc::new(RecordingProvider::default());
        let queue = queue(provider.clone(), 3);

        let tickets: Vec<Ticket> = ["a", "b", "c"]
            .iter()
            .map(|c| queue.enqueue(c, Priority::Normal).unwrap())
            .collect();
        assert_eq!(queue.queue_length(), 3);
        assert_eq!(
            queue.enqueue("d", Priority::Normal).err(),
            Some(QueueError::Full { capacity: 3 })
        );
        assert_eq!(
            queue.enqueue("d", Priority::High).err(),
            Some(QueueError::Full { capacity: 3 })
        );

        for ticket in tickets {
            assert!(ticket.await.is_ok());
        }
        assert_eq!(queue.queue_length(), 0);
        assert!(queue.enqueue("d", Priority::Normal).unwrap().await.is_ok());
        assert_eq!(provider.cities(), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatches_are_spaced_by_min_interval() {
        let provider = Arc::new(RecordingProvider::default());
        let queue = queue(provider.clone(), 100);

        let tickets: Vec<Ticket> = (0..4)
            .map(|i| queue.enqueue(&format!("city-{i}"), Priority::Normal).unwrap())
            .collect();
        futures::future::join_all(tickets).await;

        let times = provider.times();
        assert_eq!(times.len(), 4);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_high_priority_jumps_the_queue() {
        let provider = Arc::new(RecordingProvider::default());
        let queue = queue(provider.clone(), 100);

        let a = queue.enqueue("a", Priority::Normal).unwrap();
        let b = queue.enqueue("b", Priority::Normal).unwrap();
        let c = queue.enqueue("c", Priority::High).unwrap();
        let d = queue.enqueue("d", Priority::High).unwrap();
        let _ = tokio::join!(a, b, c, d);

        assert_eq!(provider.cities(), vec!["c", "d", "a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_errors_reach_the_caller() {
        let provider = Arc::new(RecordingProvider::default());
        let queue = queue(provider, 100);

        let result = queue.enqueue("?nowhere", Priority::Normal).unwrap().await;
        assert_eq!(result, Err(ProviderError::NotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_goes_idle_when_empty() {
        let provider = Arc::new(RecordingProvider::default());
        let queue = queue(provider, 100);

        queue.enqueue("a", Priority::Normal).unwrap().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!queue.is_processing());
    }
}
