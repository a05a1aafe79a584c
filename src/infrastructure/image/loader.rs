//! Async image loading orchestrator.
//!
//! Implements a three-tier lookup: Memory -> Disk -> Network, on a worker
//! runtime owned by the loader. Results come back to the thread that built
//! the loader through its [`UiContext`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::domain::entities::{CacheKey, LoadRequest, RequestState, TargetSize};
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::{FetchPort, ImageCachePort, NoOpImageCache, ResizerPort, SinkRef};
use crate::infrastructure::config::ImageLoaderConfig;

use super::binding::SinkBinding;
use super::disk_cache::DiskImageCache;
use super::downsampler::Downsampler;
use super::http_fetcher::HttpFetcher;
use super::memory_cache::MemoryImageCache;
use super::pipeline::FetchPipeline;
use super::scheduler::{RequestScheduler, Submission};
use super::tiered_cache::TieredImageCache;
use super::ui_context::UiContext;

/// How a load request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Found in memory and shown immediately.
    Bound,
    /// A new background load was started.
    Queued,
    /// Joined a load already pending for the same key.
    Absorbed,
}

impl From<Submission> for RequestOutcome {
    fn from(submission: Submission) -> Self {
        match submission {
            Submission::Queued => Self::Queued,
            Submission::Absorbed => Self::Absorbed,
        }
    }
}

/// Orchestrates image loading from memory, disk, and network.
pub struct ImageLoader {
    runtime: Option<Runtime>,
    handle: Handle,
    memory_cache: Arc<MemoryImageCache>,
    disk_cache: Arc<DiskImageCache>,
    scheduler: RequestScheduler,
    config: ImageLoaderConfig,
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ImageLoader {
    /// Creates a loader fetching through `fetcher`.
    ///
    /// Must be called on the UI thread, outside any async runtime: the returned
    /// [`UiContext`] marks the calling thread and is the only place sinks are
    /// updated.
    ///
    /// # Errors
    /// Returns error if the worker runtime cannot be started. A disk tier that
    /// fails to initialise is disabled, not an error.
    pub fn new(
        config: ImageLoaderConfig,
        fetcher: Arc<dyn FetchPort>,
    ) -> CacheResult<(Self, UiContext)> {
        let core_workers = config.core_workers();
        let max_workers = config.max_workers();
        let thread_counter = AtomicUsize::new(0);
        let runtime = Builder::new_multi_thread()
            .worker_threads(core_workers)
            .max_blocking_threads(max_workers)
            .thread_keep_alive(config.keep_alive())
            .thread_name_fn(move || {
                let n = thread_counter.fetch_add(1, Ordering::Relaxed) + 1;
                format!("ImageLoader#{n}")
            })
            .enable_all()
            .build()
            .map_err(|e| CacheError::io("failed to start loader runtime", &e))?;
        let handle = runtime.handle().clone();

        let resizer: Arc<dyn ResizerPort> = Arc::new(Downsampler::new());
        let memory_cache = Arc::new(MemoryImageCache::with_heap_budget(
            config.heap_budget(),
            config.memory_cache_divisor,
        ));

        let cache_dir = config.effective_cache_dir();
        let disk_cache = Arc::new(if config.disk_cache_enabled {
            runtime.block_on(DiskImageCache::open(
                cache_dir,
                config.disk_cache_size,
                resizer.clone(),
            ))
        } else {
            DiskImageCache::disabled(cache_dir, config.disk_cache_size, resizer.clone())
        });

        let backing: Arc<dyn ImageCachePort> = if disk_cache.is_enabled() {
            disk_cache.clone()
        } else {
            Arc::new(NoOpImageCache)
        };
        let pipeline = Arc::new(FetchPipeline::new(
            TieredImageCache::new(memory_cache.clone(), backing),
            fetcher,
            resizer,
        ));

        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let scheduler = RequestScheduler::spawn(&handle, pipeline, delivery_tx, core_workers);

        info!(
            core_workers,
            max_workers,
            memory_budget = memory_cache.capacity(),
            disk_enabled = disk_cache.is_enabled(),
            "Image loader started"
        );

        let loader = Self {
            runtime: Some(runtime),
            handle,
            memory_cache,
            disk_cache,
            scheduler,
            config,
        };
        Ok((loader, UiContext::new(delivery_rx)))
    }

    /// Creates a loader fetching over HTTP.
    ///
    /// # Errors
    /// Returns error if the HTTP client or the worker runtime cannot be created.
    pub fn with_defaults(config: ImageLoaderConfig) -> CacheResult<(Self, UiContext)> {
        let fetcher = HttpFetcher::new(config.timeout(), config.connect_timeout())?;
        Self::new(config, Arc::new(fetcher))
    }

    /// Shows the image at `url` in `sink`, loading it in the background if needed.
    ///
    /// The sink is retagged (and cleared, if it showed something else) before
    /// anything else happens, so an older load finishing later cannot
    /// overwrite it. A memory hit binds synchronously.
    pub fn request_load(&self, url: &str, target: TargetSize, sink: &SinkRef) -> RequestOutcome {
        let request = LoadRequest::new(url, target);
        SinkBinding::prepare(sink.as_ref(), &request.key);

        if let Some(bitmap) = self.memory_cache.get_if_cached(&request.key) {
            trace!(key = %request.key, "Bound from memory cache");
            SinkBinding::bind(sink.as_ref(), &request.key, bitmap);
            return RequestOutcome::Bound;
        }

        self.scheduler.submit(request, sink.clone()).into()
    }

    /// State of the pending load for `url`, if one is queued or running.
    #[must_use]
    pub fn request_state(&self, url: &str) -> Option<RequestState> {
        self.scheduler.state(&CacheKey::from_url(url))
    }

    /// Returns the number of pending loads.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.scheduler.in_flight_count()
    }

    /// Memory tier.
    #[must_use]
    pub fn memory_cache(&self) -> &Arc<MemoryImageCache> {
        &self.memory_cache
    }

    /// Disk tier. Its async methods must be driven through [`Self::spawn`]
    /// or [`Self::block_on`].
    #[must_use]
    pub fn disk_cache(&self) -> &Arc<DiskImageCache> {
        &self.disk_cache
    }

    /// Configuration the loader was built with.
    #[must_use]
    pub const fn config(&self) -> &ImageLoaderConfig {
        &self.config
    }

    /// Runs `future` on the loader's workers.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Drives `future` to completion on the calling thread.
    ///
    /// # Panics
    /// If called from within an async runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }

    /// Clears both caches. The memory tier is cleared immediately, the disk
    /// tier on a worker.
    pub fn clear_all(&self) -> JoinHandle<CacheResult<()>> {
        self.memory_cache.clear();
        let disk_cache = self.disk_cache.clone();
        self.spawn(async move {
            disk_cache.clear().await?;
            info!("Cleared all image caches");
            Ok(())
        })
    }
}

impl Drop for ImageLoader {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            debug!("Shutting down image loader");
            runtime.shutdown_background();
        }
    }
}
