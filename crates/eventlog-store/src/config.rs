//! Tunables for an [`EventStore`](crate::store::EventStore).

/// Settings fixed when the store is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Capacity of the type registry's recency cache.
    pub cache_size: usize,
    /// Events recorded concurrently by `EventStore::record_events`.
    pub recorder_concurrency: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_size: 1_000,
            recorder_concurrency: 1,
        }
    }
}
