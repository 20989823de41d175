//! Time-bounded LRU cache for file attributes, with negative-lookup entries.
//!
//! Positive entries remember the attributes of a path; negative entries
//! remember that a path did not exist, with a separate (typically shorter)
//! TTL so that a burst of lookups for a missing file does not hammer the
//! backing store. Any mutation of a path must invalidate it here, and any
//! operation that creates a child under a directory must drop the negative
//! entries of that directory's children (see
//! [`AttrCache::invalidate_negative_in_dir`]).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::protocol::xdr::nfs3;

use super::LruList;

/// Result of a cache probe.
#[derive(Clone, Debug)]
pub enum CachedAttr {
    /// The path exists and these were its attributes
    Positive(nfs3::fattr3),
    /// The path was recently confirmed not to exist
    Negative,
}

#[derive(Clone)]
struct Entry {
    attr: Option<nfs3::fattr3>,
    valid_until: Instant,
    lru_idx: usize,
}

struct Inner {
    entries: HashMap<String, Entry>,
    lru: LruList<String>,
    max_entries: usize,
}

/// Bounded LRU attribute cache keyed by absolute path.
pub struct AttrCache {
    // One mutex for the whole structure; every operation is a single
    // critical section so an entry's LRU link cannot move under a reader.
    inner: Mutex<Inner>,
    positive_ttl: Duration,
    negative_ttl: Duration,
    negative_enabled: bool,
    configured_max: usize,
}

impl AttrCache {
    /// Creates a cache holding at most `max_entries` paths.
    pub fn new(
        max_entries: usize,
        positive_ttl: Duration,
        negative_ttl: Duration,
        negative_enabled: bool,
    ) -> Self {
        AttrCache {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                lru: LruList::new(),
                max_entries,
            }),
            positive_ttl,
            negative_ttl,
            negative_enabled,
            configured_max: max_entries,
        }
    }

    /// Looks up `path`, promoting a hit to most-recently-used. An expired
    /// entry is removed and reported as a miss.
    pub fn get(&self, path: &str) -> Option<CachedAttr> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let expired = match inner.entries.get(path) {
            Some(entry) => now >= entry.valid_until,
            None => return None,
        };
        if expired {
            if let Some(entry) = inner.entries.remove(path) {
                inner.lru.remove(entry.lru_idx);
            }
            return None;
        }
        let entry = inner.entries.get(path).cloned().unwrap();
        inner.lru.touch(entry.lru_idx);
        Some(match entry.attr {
            Some(attr) => CachedAttr::Positive(attr),
            None => CachedAttr::Negative,
        })
    }

    /// Records the attributes of `path`.
    pub fn put(&self, path: &str, attr: nfs3::fattr3) {
        self.insert(path, Some(attr));
    }

    /// Records that `path` does not exist. A no-op when negative caching is
    /// disabled.
    pub fn put_negative(&self, path: &str) {
        if self.negative_enabled {
            self.insert(path, None);
        }
    }

    fn insert(&self, path: &str, attr: Option<nfs3::fattr3>) {
        let ttl = if attr.is_some() { self.positive_ttl } else { self.negative_ttl };
        let valid_until = Instant::now() + ttl;
        let mut inner = self.inner.lock().unwrap();
        if inner.max_entries == 0 {
            return;
        }
        if let Some(existing) = inner.entries.get_mut(path) {
            existing.attr = attr;
            existing.valid_until = valid_until;
            let idx = existing.lru_idx;
            inner.lru.touch(idx);
            return;
        }
        let idx = inner.lru.push_front(path.to_string());
        inner.entries.insert(path.to_string(), Entry { attr, valid_until, lru_idx: idx });
        Self::evict_over_cap(&mut inner);
    }

    /// Drops the entry for `path`, positive or negative.
    pub fn invalidate(&self, path: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.remove(path) {
            inner.lru.remove(entry.lru_idx);
        }
    }

    /// Drops every negative entry whose parent directory is `dir`. Called
    /// after CREATE/MKDIR/SYMLINK/RENAME so that a previously missing name
    /// is looked up afresh.
    pub fn invalidate_negative_in_dir(&self, dir: &str) {
        let mut inner = self.inner.lock().unwrap();
        let doomed: Vec<String> = inner
            .entries
            .iter()
            .filter(|(path, entry)| entry.attr.is_none() && parent_of(path) == dir)
            .map(|(path, _)| path.clone())
            .collect();
        for path in doomed {
            if let Some(entry) = inner.entries.remove(&path) {
                inner.lru.remove(entry.lru_idx);
            }
        }
    }

    /// Number of live entries (positive and negative).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// True when the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The capacity the cache was built with, before any pressure shrink.
    pub fn configured_max_entries(&self) -> usize {
        self.configured_max
    }

    /// Current capacity.
    pub fn max_entries(&self) -> usize {
        self.inner.lock().unwrap().max_entries
    }

    /// Adjusts capacity, evicting LRU entries immediately if the new cap is
    /// below the current population. Used by the memory-pressure monitor.
    pub fn set_max_entries(&self, max_entries: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.max_entries = max_entries;
        Self::evict_over_cap(&mut inner);
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.lru = LruList::new();
    }

    fn evict_over_cap(inner: &mut Inner) {
        while inner.entries.len() > inner.max_entries {
            let Some(victim) = inner.lru.lru_key() else { break };
            if let Some(entry) = inner.entries.remove(&victim) {
                inner.lru.remove(entry.lru_idx);
            }
        }
    }
}

/// Parent directory of an absolute path, with `/` as its own parent.
pub(crate) fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "/",
    }
}
