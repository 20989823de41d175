//! Read-ahead buffer pool: per-file sliding windows of file data kept ahead
//! of sequential readers.
//!
//! After a READ that fills its requested count, the façade issues one
//! best-effort follow-on read of the configured window and stores it here.
//! A later READ fully contained in a buffer is served from memory; partial
//! overlap is a miss. A read starting exactly at the end of a buffer whose
//! fill stopped short of the window is an end-of-file answer, not a miss.
//!
//! The pool is bounded both in buffer count and in total bytes, with strict
//! LRU eviction, and is the first cache shrunk under memory pressure.

use std::collections::HashMap;
use std::sync::Mutex;

use super::LruList;

/// A successful probe of the pool.
#[derive(Debug)]
pub struct ReadAheadHit {
    /// Bytes served from the buffer; empty means end of file
    pub data: Vec<u8>,
    /// True when the returned range ends at the file's last byte
    pub eof: bool,
}

struct Buffer {
    data: Vec<u8>,
    offset: u64,
    // the fill stopped short of the window, so data ends at EOF
    ends_at_eof: bool,
    lru_idx: usize,
}

struct Inner {
    buffers: HashMap<String, Buffer>,
    lru: LruList<String>,
    total_bytes: usize,
    max_files: usize,
    max_memory: usize,
}

/// Bounded pool of per-file read-ahead buffers keyed by file path.
pub struct ReadAheadPool {
    // Whole-operation mutex, same discipline as the other caches.
    inner: Mutex<Inner>,
    window: usize,
    configured_max_files: usize,
    configured_max_memory: usize,
}

impl ReadAheadPool {
    /// Creates a pool of at most `max_files` buffers of `window` bytes each,
    /// holding at most `max_memory` bytes in total.
    pub fn new(window: usize, max_files: usize, max_memory: usize) -> Self {
        ReadAheadPool {
            inner: Mutex::new(Inner {
                buffers: HashMap::new(),
                lru: LruList::new(),
                total_bytes: 0,
                max_files,
                max_memory,
            }),
            window,
            configured_max_files: max_files,
            configured_max_memory: max_memory,
        }
    }

    /// The follow-on read size.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Serves `count` bytes at `offset` of `path` from the buffer, if the
    /// range is fully contained. Promotes the buffer to MRU on a hit.
    pub fn get(&self, path: &str, offset: u64, count: u32) -> Option<ReadAheadHit> {
        let mut inner = self.inner.lock().unwrap();
        let buffer = inner.buffers.get(path)?;
        let buf_end = buffer.offset + buffer.data.len() as u64;
        if offset == buf_end && buffer.ends_at_eof {
            let idx = buffer.lru_idx;
            inner.lru.touch(idx);
            return Some(ReadAheadHit { data: Vec::new(), eof: true });
        }
        if offset < buffer.offset {
            return None;
        }
        let want_end = offset.checked_add(u64::from(count))?;
        if want_end > buf_end {
            return None;
        }
        let start = (offset - buffer.offset) as usize;
        let end = (want_end - buffer.offset) as usize;
        let data = buffer.data[start..end].to_vec();
        let eof = buffer.ends_at_eof && want_end == buf_end;
        let idx = buffer.lru_idx;
        inner.lru.touch(idx);
        Some(ReadAheadHit { data, eof })
    }

    /// Installs (or replaces) the buffer for `path`, evicting LRU buffers
    /// until both the file-count and total-byte caps hold. Oversized or
    /// empty fills are discarded.
    pub fn insert(&self, path: &str, offset: u64, data: Vec<u8>, ends_at_eof: bool) {
        let mut inner = self.inner.lock().unwrap();
        if data.is_empty() || data.len() > inner.max_memory || inner.max_files == 0 {
            return;
        }
        if let Some(old) = inner.buffers.remove(path) {
            inner.total_bytes -= old.data.len();
            inner.lru.remove(old.lru_idx);
        }
        while inner.buffers.len() + 1 > inner.max_files
            || inner.total_bytes + data.len() > inner.max_memory
        {
            if !Self::evict_lru(&mut inner) {
                return;
            }
        }
        let idx = inner.lru.push_front(path.to_string());
        inner.total_bytes += data.len();
        inner
            .buffers
            .insert(path.to_string(), Buffer { data, offset, ends_at_eof, lru_idx: idx });
    }

    /// Drops the buffer for exactly `path`. Called on write, truncate,
    /// remove and rename.
    pub fn invalidate(&self, path: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(buffer) = inner.buffers.remove(path) {
            inner.total_bytes -= buffer.data.len();
            inner.lru.remove(buffer.lru_idx);
        }
    }

    /// Current (buffer count, total bytes) usage.
    pub fn usage(&self) -> (usize, usize) {
        let inner = self.inner.lock().unwrap();
        (inner.buffers.len(), inner.total_bytes)
    }

    /// The limits the pool was built with, before any pressure shrink.
    pub fn configured_limits(&self) -> (usize, usize) {
        (self.configured_max_files, self.configured_max_memory)
    }

    /// Current limits.
    pub fn limits(&self) -> (usize, usize) {
        let inner = self.inner.lock().unwrap();
        (inner.max_files, inner.max_memory)
    }

    /// Adjusts the caps, evicting immediately while either is exceeded.
    /// Used by the memory-pressure monitor.
    pub fn set_limits(&self, max_files: usize, max_memory: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.max_files = max_files;
        inner.max_memory = max_memory;
        while inner.buffers.len() > inner.max_files || inner.total_bytes > inner.max_memory {
            if !Self::evict_lru(&mut inner) {
                break;
            }
        }
    }

    /// Drops every buffer.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.buffers.clear();
        inner.lru = LruList::new();
        inner.total_bytes = 0;
    }

    fn evict_lru(inner: &mut Inner) -> bool {
        let Some(victim) = inner.lru.lru_key() else { return false };
        if let Some(buffer) = inner.buffers.remove(&victim) {
            inner.total_bytes -= buffer.data.len();
            inner.lru.remove(buffer.lru_idx);
            true
        } else {
            false
        }
    }
}
