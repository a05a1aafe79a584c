//! Load requests and their lifecycle.

use super::{CacheKey, TargetSize};

/// A request to load one image for display at a given size.
///
/// Requests are identified by key alone: two requests with the same key are
/// duplicates regardless of target size.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Key derived from [`Self::url`].
    pub key: CacheKey,
    /// Source URL fetched on a full cache miss.
    pub url: String,
    /// Size the decoded bitmap should cover.
    pub target: TargetSize,
}

impl LoadRequest {
    /// Creates a request, deriving its key from the URL.
    #[must_use]
    pub fn new(url: impl Into<String>, target: TargetSize) -> Self {
        let url = url.into();
        Self {
            key: CacheKey::from_url(&url),
            url,
            target,
        }
    }
}

/// Lifecycle of a scheduled request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    /// Waiting in the scheduler queue.
    #[default]
    Queued,
    /// Picked up by a worker.
    Running,
    /// Finished with a bitmap.
    Completed,
    /// Finished without a bitmap.
    Failed,
}

impl RequestState {
    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition. Nothing returns to `Queued`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running) | (Self::Running, Self::Completed | Self::Failed)
        )
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
