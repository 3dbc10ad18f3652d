//! Dependencies shared by every controller

use crate::signals::RevalidationSignals;
use agentview_cache::CacheStore;
use agentview_core::ClientConfig;

/// Handle bundle passed explicitly into each controller
///
/// Constructed once at application start; tests build isolated instances.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    /// Shared snapshot cache
    pub cache: CacheStore,
    /// Focus/reconnect trigger hub
    pub signals: RevalidationSignals,
}

impl QueryContext {
    /// Create context from its parts
    #[inline]
    #[must_use]
    pub fn new(cache: CacheStore, signals: RevalidationSignals) -> Self {
        Self { cache, signals }
    }

    /// Create context with a cache sized by configuration
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            CacheStore::new(config.cache_ttl, config.cache_capacity),
            RevalidationSignals::default(),
        )
    }
}
