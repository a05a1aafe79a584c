//! Sink side of the binding protocol.

use std::sync::Arc;

use crate::domain::entities::{Bitmap, CacheKey};

/// A UI target that displays one image at a time.
///
/// The pending key is the only state shared with the engine: a completed
/// load is applied only while it still matches. Methods are called on the
/// UI context only, but the reference travels through worker threads.
pub trait ShowView: Send + Sync {
    /// Key the view is currently waiting for, if any.
    fn pending_key(&self) -> Option<CacheKey>;

    /// Retags the view.
    fn set_pending_key(&self, key: Option<CacheKey>);

    /// Displays a decoded bitmap.
    fn apply_result(&self, bitmap: Arc<Bitmap>);

    /// Removes whatever is displayed.
    fn clear_result(&self);
}

/// Shared handle to a sink.
pub type SinkRef = Arc<dyn ShowView>;

#[cfg(test)]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;

    /// Mock view recording every bitmap applied to it.
    #[derive(Default)]
    pub struct MockShowView {
        pending: Mutex<Option<CacheKey>>,
        applied: Mutex<Vec<Arc<Bitmap>>>,
        clears: Mutex<usize>,
    }

    impl MockShowView {
        /// Creates an untagged view.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Bitmaps applied so far, oldest first.
        pub fn applied(&self) -> Vec<Arc<Bitmap>> {
            self.applied.lock().clone()
        }

        /// Number of times the display was cleared.
        pub fn clear_count(&self) -> usize {
            *self.clears.lock()
        }
    }

    impl ShowView for MockShowView {
        fn pending_key(&self) -> Option<CacheKey> {
            self.pending.lock().clone()
        }

        fn set_pending_key(&self, key: Option<CacheKey>) {
            *self.pending.lock() = key;
        }

        fn apply_result(&self, bitmap: Arc<Bitmap>) {
            self.applied.lock().push(bitmap);
        }

        fn clear_result(&self) {
            *self.clears.lock() += 1;
        }
    }
}
