//! Request admission, de-duplication and LIFO dispatch.
//!
//! At most one load runs per key. Later requests for a key already queued or
//! running only add their sink to the fan-out list. Queued requests are
//! started newest first so the images the user scrolled to last win.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tracing::{debug, error, trace, warn};

use crate::domain::entities::{CacheKey, LoadRequest, RequestState};
use crate::domain::errors::CacheError;
use crate::domain::ports::SinkRef;

use super::pipeline::FetchPipeline;
use super::ui_context::{Delivery, DeliverySender};

/// What happened to a submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// A new load was queued.
    Queued,
    /// A load for the key was already pending; the sink joined it.
    Absorbed,
}

struct InFlight {
    state: RequestState,
    sinks: Vec<SinkRef>,
}

type InFlightMap = Arc<Mutex<HashMap<CacheKey, InFlight>>>;

/// Admits requests and runs them on a bounded set of workers.
pub struct RequestScheduler {
    in_flight: InFlightMap,
    request_tx: mpsc::UnboundedSender<LoadRequest>,
}

/// State shared by the dispatch loop and its workers.
struct WorkerContext {
    pipeline: Arc<FetchPipeline>,
    in_flight: InFlightMap,
    deliveries: DeliverySender,
}

impl RequestScheduler {
    /// Starts the dispatch loop on `runtime` with `concurrency` workers.
    #[must_use]
    pub fn spawn(
        runtime: &Handle,
        pipeline: Arc<FetchPipeline>,
        deliveries: DeliverySender,
        concurrency: usize,
    ) -> Self {
        let in_flight: InFlightMap = Arc::new(Mutex::new(HashMap::new()));
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let context = Arc::new(WorkerContext {
            pipeline,
            in_flight: in_flight.clone(),
            deliveries,
        });
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

        runtime.spawn(Self::run_dispatch_loop(request_rx, context, semaphore));

        Self {
            in_flight,
            request_tx,
        }
    }

    /// Registers `sink` for `request`, queueing a load only if none is pending.
    pub fn submit(&self, request: LoadRequest, sink: SinkRef) -> Submission {
        let mut in_flight = self.in_flight.lock();

        if let Some(entry) = in_flight.get_mut(&request.key) {
            let known = entry
                .sinks
                .iter()
                .any(|s| std::ptr::addr_eq(Arc::as_ptr(s), Arc::as_ptr(&sink)));
            if !known {
                entry.sinks.push(sink);
            }
            trace!(key = %request.key, sinks = entry.sinks.len(), "Joined pending load");
            return Submission::Absorbed;
        }

        let key = request.key.clone();
        if let Err(e) = self.request_tx.send(request) {
            error!(key = %key, "Failed to queue load request: {}", e);
            return Submission::Queued;
        }
        in_flight.insert(
            key.clone(),
            InFlight {
                state: RequestState::Queued,
                sinks: vec![sink],
            },
        );
        debug!(key = %key, "Queued load request");
        Submission::Queued
    }

    /// State of the pending load for `key`, if any.
    #[must_use]
    pub fn state(&self, key: &CacheKey) -> Option<RequestState> {
        self.in_flight.lock().get(key).map(|entry| entry.state)
    }

    /// Number of keys queued or running.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    async fn run_dispatch_loop(
        mut request_rx: mpsc::UnboundedReceiver<LoadRequest>,
        context: Arc<WorkerContext>,
        semaphore: Arc<Semaphore>,
    ) {
        let mut stack: Vec<LoadRequest> = Vec::new();

        loop {
            tokio::select! {
                biased;
                request = request_rx.recv() => {
                    match request {
                        Some(request) => stack.push(request),
                        None => break,
                    }
                }
                Ok(permit) = semaphore.clone().acquire_owned(), if !stack.is_empty() => {
                    if let Some(request) = stack.pop() {
                        tokio::spawn(context.clone().run(request, permit));
                    }
                }
            }
        }
        debug!(dropped = stack.len(), "Dispatch loop stopped");
    }
}

impl WorkerContext {
    async fn run(self: Arc<Self>, request: LoadRequest, _permit: OwnedSemaphorePermit) {
        let key = request.key.clone();
        self.transition(&key, RequestState::Running);

        // Run the load as its own task so a panic still settles the request.
        let pipeline = self.pipeline.clone();
        let result = match tokio::spawn(async move { pipeline.load(&request).await }).await {
            Ok(result) => result,
            Err(e) => Err(CacheError::Io(format!("load task failed: {e}"))),
        };

        let outcome = match &result {
            Ok(loaded) => {
                debug!(key = %key, source = %loaded.source, "Load completed");
                RequestState::Completed
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Load failed");
                RequestState::Failed
            }
        };
        let sinks = self.transition(&key, outcome);

        for sink in sinks {
            let delivery = Delivery {
                sink,
                key: key.clone(),
                result: result.clone(),
            };
            if self.deliveries.send(delivery).is_err() {
                trace!(key = %key, "UI context gone, dropping delivery");
                break;
            }
        }
    }

    /// Moves `key` to `next`. A terminal state also retires the entry and
    /// returns its sinks, so later submits start a fresh load.
    fn transition(&self, key: &CacheKey, next: RequestState) -> Vec<SinkRef> {
        let mut in_flight = self.in_flight.lock();
        let Some(entry) = in_flight.get_mut(key) else {
            return Vec::new();
        };
        if entry.state.can_transition_to(next) {
            trace!(key = %key, from = %entry.state, to = %next, "Request state change");
            entry.state = next;
        } else {
            error!(key = %key, from = %entry.state, to = %next, "Invalid request state change");
        }

        if next.is_terminal() {
            in_flight.remove(key).map(|entry| entry.sinks).unwrap_or_default()
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ImageSource, TargetSize};
    use crate::domain::ports::mocks::{MockFetchPort, MockShowView};
    use crate::domain::ports::{ByteStream, FetchPort, NoOpImageCache};
    use crate::infrastructure::image::downsampler::Downsampler;
    use crate::infrastructure::image::memory_cache::MemoryImageCache;
    use crate::infrastructure::image::tiered_cache::TieredImageCache;
    use bytes::Bytes;
    use futures_util::StreamExt;
    use std::io::Cursor;
    use std::time::Duration;

    fn png() -> Bytes {
        let mut buf = Vec::new();
        image::DynamicImage::new_rgb8(8, 8)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .expect("encode png");
        Bytes::from(buf)
    }

    /// Body that arrives after `delay`.
    fn slow_body(delay: Duration) -> ByteStream {
        let bytes = png();
        futures_util::stream::once(async move {
            tokio::time::sleep(delay).await;
            Ok(bytes)
        })
        .boxed()
    }

    fn pipeline(fetcher: impl FetchPort + 'static) -> Arc<FetchPipeline> {
        let cache = TieredImageCache::new(
            Arc::new(MemoryImageCache::new(1 << 24)),
            Arc::new(NoOpImageCache),
        );
        Arc::new(FetchPipeline::new(
            cache,
            Arc::new(fetcher),
            Arc::new(Downsampler::new()),
        ))
    }

    fn scheduler(
        fetcher: impl FetchPort + 'static,
        concurrency: usize,
    ) -> (RequestScheduler, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler =
            RequestScheduler::spawn(&Handle::current(), pipeline(fetcher), tx, concurrency);
        (scheduler, rx)
    }

    fn request(name: &str) -> LoadRequest {
        LoadRequest::new(
            format!("http://example.com/{name}.png"),
            TargetSize::original(),
        )
    }

    async fn wait_for_state(scheduler: &RequestScheduler, key: &CacheKey, state: RequestState) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while scheduler.state(key) != Some(state) {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("state reached");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_duplicate_requests_fetch_once_and_fan_out() {
        let mut fetcher = MockFetchPort::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(slow_body(Duration::from_millis(100))));
        let (scheduler, mut rx) = scheduler(fetcher, 4);

        let first = MockShowView::new();
        let second = MockShowView::new();
        let req = request("dup");
        let key = req.key.clone();

        assert_eq!(scheduler.submit(req.clone(), first.clone()), Submission::Queued);
        assert_eq!(scheduler.submit(req.clone(), second.clone()), Submission::Absorbed);
        // Same sink again is not delivered twice.
        assert_eq!(scheduler.submit(req, first.clone()), Submission::Absorbed);
        assert_eq!(scheduler.in_flight_count(), 1);

        let mut delivered = Vec::new();
        for _ in 0..2 {
            let delivery = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("delivery in time")
                .expect("channel open");
            assert_eq!(delivery.key, key);
            let loaded = delivery.result.expect("loaded");
            assert_eq!(loaded.source, ImageSource::Network);
            delivered.push(delivery.sink);
        }
        assert!(delivered.iter().any(|s| std::ptr::addr_eq(Arc::as_ptr(s), Arc::as_ptr(&first))));
        assert!(delivered.iter().any(|s| std::ptr::addr_eq(Arc::as_ptr(s), Arc::as_ptr(&second))));
        assert!(rx.try_recv().is_err());
        assert_eq!(scheduler.in_flight_count(), 0);
        assert_eq!(scheduler.state(&key), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queued_requests_run_newest_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut fetcher = MockFetchPort::new();
        {
            let order = order.clone();
            fetcher.expect_fetch().times(4).returning(move |url| {
                order.lock().push(url.to_string());
                Ok(slow_body(Duration::from_millis(50)))
            });
        }
        let (scheduler, mut rx) = scheduler(fetcher, 1);
        let sink = MockShowView::new();

        let blocker = request("a");
        let blocker_key = blocker.key.clone();
        scheduler.submit(blocker, sink.clone());
        wait_for_state(&scheduler, &blocker_key, RequestState::Running).await;

        for name in ["b", "c", "d"] {
            assert_eq!(scheduler.submit(request(name), sink.clone()), Submission::Queued);
        }
        assert_eq!(scheduler.state(&request("d").key), Some(RequestState::Queued));

        for _ in 0..4 {
            tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("delivery in time")
                .expect("channel open");
        }

        let fetched: Vec<String> = order.lock().clone();
        assert_eq!(
            fetched,
            vec![
                "http://example.com/a.png",
                "http://example.com/d.png",
                "http://example.com/c.png",
                "http://example.com/b.png",
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failure_is_delivered_and_settles_request() {
        let mut fetcher = MockFetchPort::new();
        fetcher
            .expect_fetch()
            .times(2)
            .returning(|_| Err(CacheError::Network("HTTP 404: Not Found".into())));
        let (scheduler, mut rx) = scheduler(fetcher, 2);
        let sink = MockShowView::new();
        let req = request("missing");

        scheduler.submit(req.clone(), sink.clone());
        let delivery = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("delivery in time")
            .expect("channel open");
        assert!(delivery.result.is_err());
        assert_eq!(scheduler.in_flight_count(), 0);

        // A later request for the same key is a fresh attempt.
        assert_eq!(scheduler.submit(req, sink), Submission::Queued);
        let delivery = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("delivery in time")
            .expect("channel open");
        assert!(delivery.result.is_err());
    }

    #[test]
    fn test_terminal_state_retires_entry() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let context = WorkerContext {
            pipeline: pipeline(MockFetchPort::new()),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            deliveries: tx,
        };
        let key = request("retire").key;
        context.in_flight.lock().insert(
            key.clone(),
            InFlight {
                state: RequestState::Queued,
                sinks: vec![MockShowView::new() as SinkRef],
            },
        );

        assert!(context.transition(&key, RequestState::Running).is_empty());
        assert_eq!(
            context.in_flight.lock().get(&key).map(|entry| entry.state),
            Some(RequestState::Running)
        );

        assert_eq!(context.transition(&key, RequestState::Completed).len(), 1);
        assert!(context.in_flight.lock().is_empty());
        assert!(context.transition(&key, RequestState::Failed).is_empty());
    }
}
