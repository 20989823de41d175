//! Time-bounded LRU cache for directory listings.
//!
//! A cached listing is the complete ordered entry vector for one directory;
//! READDIR pagination slices into it by cookie index. Directories larger
//! than the per-directory cap are never cached, so a pathological directory
//! cannot monopolize the cache memory.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::protocol::xdr::nfs3;
use crate::vfs::FileTime;

use super::LruList;

/// One child entry of a cached directory listing.
#[derive(Clone, Debug)]
pub struct DirCacheEntry {
    /// Entry name
    pub name: String,
    /// Server-assigned file id of the child
    pub fileid: nfs3::fileid3,
    /// Child object type
    pub ftype: nfs3::ftype3,
    /// Child size in bytes
    pub size: u64,
    /// Child modification time
    pub mtime: FileTime,
}

impl DirCacheEntry {
    /// Synthesizes wire attributes from the listing fields, for
    /// READDIRPLUS entries whose full attributes are not cached. Mode and
    /// ownership are placeholders; clients needing them exactly issue a
    /// GETATTR on the entry's handle.
    pub fn to_fattr3(&self, fileid: nfs3::fileid3) -> nfs3::fattr3 {
        let mode = match self.ftype {
            nfs3::ftype3::NF3DIR => 0o755,
            _ => 0o644,
        };
        let mtime: nfs3::nfstime3 = self.mtime.into();
        nfs3::fattr3 {
            ftype: self.ftype,
            mode,
            nlink: 1,
            uid: 0,
            gid: 0,
            size: self.size,
            used: self.size,
            rdev: nfs3::specdata3::default(),
            fsid: 0,
            fileid,
            atime: mtime,
            mtime,
            ctime: mtime,
        }
    }
}

struct Entry {
    listing: Vec<DirCacheEntry>,
    valid_until: Instant,
    lru_idx: usize,
}

struct Inner {
    entries: HashMap<String, Entry>,
    lru: LruList<String>,
    max_entries: usize,
}

/// Bounded LRU directory-listing cache keyed by directory path.
pub struct DirCache {
    // Whole-operation mutex, same discipline as the attribute cache.
    inner: Mutex<Inner>,
    ttl: Duration,
    max_dir_size: usize,
}

impl DirCache {
    /// Creates a cache for at most `max_entries` directories, refusing to
    /// cache any directory with more than `max_dir_size` children.
    pub fn new(max_entries: usize, max_dir_size: usize, ttl: Duration) -> Self {
        DirCache {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                lru: LruList::new(),
                max_entries,
            }),
            ttl,
            max_dir_size,
        }
    }

    /// Returns the cached listing of `dir`, promoting it to MRU. Expired
    /// entries are removed and reported as a miss.
    pub fn get(&self, dir: &str) -> Option<Vec<DirCacheEntry>> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let expired = match inner.entries.get(dir) {
            Some(entry) => now >= entry.valid_until,
            None => return None,
        };
        if expired {
            if let Some(entry) = inner.entries.remove(dir) {
                inner.lru.remove(entry.lru_idx);
            }
            return None;
        }
        let entry = inner.entries.get(dir).unwrap();
        let listing = entry.listing.clone();
        let idx = entry.lru_idx;
        inner.lru.touch(idx);
        Some(listing)
    }

    /// Stores the listing of `dir`. Oversized directories are not cached.
    pub fn put(&self, dir: &str, listing: Vec<DirCacheEntry>) {
        if listing.len() > self.max_dir_size {
            return;
        }
        let valid_until = Instant::now() + self.ttl;
        let mut inner = self.inner.lock().unwrap();
        if inner.max_entries == 0 {
            return;
        }
        if let Some(existing) = inner.entries.get_mut(dir) {
            existing.listing = listing;
            existing.valid_until = valid_until;
            let idx = existing.lru_idx;
            inner.lru.touch(idx);
            return;
        }
        let idx = inner.lru.push_front(dir.to_string());
        inner.entries.insert(dir.to_string(), Entry { listing, valid_until, lru_idx: idx });
        while inner.entries.len() > inner.max_entries {
            let Some(victim) = inner.lru.lru_key() else { break };
            if let Some(entry) = inner.entries.remove(&victim) {
                inner.lru.remove(entry.lru_idx);
            }
        }
    }

    /// Drops the listing of `dir`. Called on any mutation of the
    /// directory's contents.
    pub fn invalidate(&self, dir: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.remove(dir) {
            inner.lru.remove(entry.lru_idx);
        }
    }

    /// Number of cached directories.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// True when no directory is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every listing.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.lru = LruList::new();
    }
}
