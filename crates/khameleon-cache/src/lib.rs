//! # Khameleon Cache
//!
//! Fragment storage for pushed artifacts under two eviction policies.
//!
//! ```text
//!   frame ──► write(payload, header, frame) ──► store ──► BlockEvent ──► engine
//!                                                 │
//!                                  get(key) ◄─────┘ (fragment set + total)
//! ```
//!
//! - [`LruCache`]: whole entries keyed by query, bounded by key count,
//!   least-recently-used key evicted on overflow
//! - [`RingCache`]: a FIFO ring of `(key, fragment)` slots bounded by
//!   `cache_size`; fragments are reference counted and freed when their last
//!   slot leaves the ring
//!
//! Both emit a [`BlockEvent`] per ingested fragment over an unbounded tokio
//! channel so the engine can resolve the owning request in arrival order.

mod cache;
mod error;
mod factory;
mod lru;
mod ring;
mod stats;

pub use cache::{BlockEvent, BlockNotifier, CacheHooks, FragmentCache, CACHE_SOURCE};
pub use error::{CacheError, Result};
pub use factory::create_cache;
pub use lru::LruCache;
pub use ring::RingCache;
pub use stats::CacheStats;

/// Prelude for common imports
pub mod prelude {
    pub use super::{
        create_cache, BlockEvent, CacheHooks, CacheStats, FragmentCache, LruCache, Result,
        RingCache,
    };
}
