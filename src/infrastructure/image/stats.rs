//! Cache statistics shared by both tiers.

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Tier the numbers belong to.
    pub tier: &'static str,
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub entries: usize,
    /// Bytes accounted to cached images.
    pub bytes: u64,
}

impl CacheStats {
    /// Builds stats from raw counters.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(tier: &'static str, hits: u64, misses: u64, entries: usize, bytes: u64) -> Self {
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            tier,
            hits,
            misses,
            hit_rate,
            entries,
            bytes,
        }
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} cache: {} images, {} bytes, {:.1}% hit rate ({} hits, {} misses)",
            self.tier, self.entries, self.bytes, self.hit_rate, self.hits, self.misses
        )
    }
}
