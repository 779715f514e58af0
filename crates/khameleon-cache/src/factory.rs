//! Cache construction from configuration

use khameleon_core::{CacheConfig, CachePolicy};
use tracing::debug;

use crate::{CacheError, CacheHooks, FragmentCache, LruCache, Result, RingCache};

/// Build the cache a session is configured for
pub fn create_cache(config: &CacheConfig, hooks: CacheHooks) -> Result<Box<dyn FragmentCache>> {
    if config.cache_size == 0 {
        return Err(CacheError::InvalidCapacity(config.cache_size));
    }
    debug!(policy = ?config.policy, size = config.cache_size, "Creating fragment cache");

    let cache: Box<dyn FragmentCache> = match config.policy {
        CachePolicy::RingIndex => Box::new(RingCache::new(config.cache_size, hooks)),
        CachePolicy::Lru => Box::new(
            LruCache::new(config.cache_size, hooks)
                .with_replace_on_write(config.replace_on_write),
        ),
    };
    Ok(cache)
}
