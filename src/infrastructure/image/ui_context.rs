//! UI-affinity context: the only place sinks are mutated.
//!
//! Workers never touch a sink. They post a [`Delivery`] that the thread
//! owning the [`UiContext`] consumes, re-validating the binding before any
//! visual change. That thread is also marked so the disk tier can refuse to
//! run on it.

use std::cell::Cell;
use std::marker::PhantomData;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::domain::entities::{CacheKey, LoadedImage};
use crate::domain::errors::CacheResult;
use crate::domain::ports::SinkRef;

use super::binding::SinkBinding;

thread_local! {
    static UI_CONTEXTS: Cell<usize> = const { Cell::new(0) };
}

/// Returns true if the current thread owns a live [`UiContext`].
#[must_use]
pub fn is_ui_thread() -> bool {
    UI_CONTEXTS.with(Cell::get) > 0
}

/// Panics when called from a thread that owns a [`UiContext`].
///
/// # Panics
/// Always, on the UI thread. Blocking I/O there is a programming error.
pub fn assert_off_ui_thread(operation: &str) {
    assert!(
        !is_ui_thread(),
        "{operation} must not run on the UI thread"
    );
}

/// A finished load addressed to one sink.
pub struct Delivery {
    /// Sink that asked for the image.
    pub sink: SinkRef,
    /// Key the load was issued for.
    pub key: CacheKey,
    /// Bitmap and source, or why nothing was produced.
    pub result: CacheResult<LoadedImage>,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("key", &self.key)
            .field("ok", &self.result.is_ok())
            .finish_non_exhaustive()
    }
}

/// Sending half used by workers.
pub type DeliverySender = mpsc::UnboundedSender<Delivery>;

/// What happened to a delivery on the UI context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Sink still wanted the key; bitmap shown.
    Applied,
    /// Sink was retagged in the meantime; bitmap dropped.
    Stale,
    /// The load failed; nothing to show.
    Failed,
}

/// Receiving end of the delivery channel, bound to the thread that created it.
pub struct UiContext {
    rx: mpsc::UnboundedReceiver<Delivery>,
    // Not Send: the owning thread is the UI thread.
    _thread_bound: PhantomData<*const ()>,
}

impl UiContext {
    /// Wraps a receiver and marks the current thread as the UI thread.
    #[must_use]
    pub fn new(rx: mpsc::UnboundedReceiver<Delivery>) -> Self {
        UI_CONTEXTS.with(|count| count.set(count.get() + 1));
        Self {
            rx,
            _thread_bound: PhantomData,
        }
    }

    /// Applies every delivery already queued and returns how many were handled.
    ///
    /// Never blocks; meant to be called once per UI frame or tick.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(delivery) = self.rx.try_recv() {
            Self::dispatch(delivery);
            handled += 1;
        }
        handled
    }

    /// Waits for the next delivery and applies it.
    ///
    /// Returns `None` once the engine has shut down.
    pub async fn dispatch_next(&mut self) -> Option<DeliveryOutcome> {
        let delivery = self.rx.recv().await?;
        Some(Self::dispatch(delivery))
    }

    fn dispatch(delivery: Delivery) -> DeliveryOutcome {
        let Delivery { sink, key, result } = delivery;
        match result {
            Ok(loaded) => {
                if SinkBinding::bind(sink.as_ref(), &key, loaded.bitmap) {
                    trace!(key = %key, source = %loaded.source, "Delivered image to sink");
                    DeliveryOutcome::Applied
                } else {
                    DeliveryOutcome::Stale
                }
            }
            Err(e) => {
                debug!(key = %key, error = %e, "Load failed, sink left untouched");
                DeliveryOutcome::Failed
            }
        }
    }
}

impl Drop for UiContext {
    fn drop(&mut self) {
        UI_CONTEXTS.with(|count| count.set(count.get().saturating_sub(1)));
    }
}

impl std::fmt::Debug for UiContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiContext").finish_non_exhaustive()
    }
}
