//! The server-side caching layer: attribute cache (positive and negative),
//! directory-listing cache, and the read-ahead buffer pool.
//!
//! All caches share the same concurrency discipline: one mutex per cache,
//! held for the whole get/put critical section. There are no read-to-write
//! lock upgrades; an entry is never consulted after its LRU link may have
//! been moved by another thread. The caches are consulted by the filesystem
//! façade only, which also owns the invalidation policy.

mod lru;

pub mod attr;
pub mod dir;
pub mod readahead;

pub use attr::{AttrCache, CachedAttr};
pub use dir::{DirCache, DirCacheEntry};
pub use readahead::{ReadAheadHit, ReadAheadPool};

pub(crate) use lru::LruList;
