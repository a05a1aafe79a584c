//! Sink tagging: stale results must never overwrite a retagged sink.

use std::sync::Arc;

use tracing::trace;

use crate::domain::entities::{Bitmap, CacheKey};
use crate::domain::ports::ShowView;

/// Binding rules between a sink and the key it is waiting for.
pub struct SinkBinding;

impl SinkBinding {
    /// Tags `sink` with `key` ahead of a load.
    ///
    /// A sink switching to a different key is cleared first so it never keeps
    /// showing the previous image. Returns true if the tag changed.
    pub fn prepare(sink: &dyn ShowView, key: &CacheKey) -> bool {
        if sink.pending_key().as_ref() == Some(key) {
            return false;
        }
        sink.clear_result();
        sink.set_pending_key(Some(key.clone()));
        true
    }

    /// Applies `bitmap` if `sink` is still tagged with `key`.
    ///
    /// Returns false, leaving the sink untouched, when the tag has moved on.
    pub fn bind(sink: &dyn ShowView, key: &CacheKey, bitmap: Arc<Bitmap>) -> bool {
        if sink.pending_key().as_ref() != Some(key) {
            trace!(key = %key, "Sink retagged, dropping stale result");
            return false;
        }
        sink.apply_result(bitmap);
        true
    }
}
