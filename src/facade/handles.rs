//! The file-handle registry: the bidirectional mapping between the opaque
//! 64-bit handles clients hold and the server's path nodes.
//!
//! Handle 0 is reserved as invalid. Allocation always returns the smallest
//! available handle: released handles go onto a min-heap free list and are
//! preferred over extending the counter, so handle values stay small and
//! reuse is predictable.
//!
//! The registry is a single reader/writer lock; `get` takes the read lock
//! only. Closing a node's backing file is never done under the registry
//! lock: `release` removes the entry and returns it, and the caller drops
//! the file object after the lock is gone.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::net::IpAddr;
use std::sync::{Arc, RwLock};

use super::node::Node;

/// A registry entry: the node a handle refers to and the client address the
/// handle was minted for (used to return its quota slot).
pub struct HandleEntry {
    /// The node the handle resolves to
    pub node: Arc<Node>,
    /// Client address charged for this handle, if quotas are active
    pub owner: Option<IpAddr>,
}

struct Inner {
    map: HashMap<u64, HandleEntry>,
    free: BinaryHeap<Reverse<u64>>,
    next: u64,
}

/// Registry of live file handles.
pub struct HandleRegistry {
    inner: RwLock<Inner>,
}

impl HandleRegistry {
    /// Creates an empty registry. The first allocated handle is 1.
    pub fn new() -> HandleRegistry {
        HandleRegistry {
            inner: RwLock::new(Inner { map: HashMap::new(), free: BinaryHeap::new(), next: 1 }),
        }
    }

    /// Mints the smallest available non-zero handle for `node`.
    pub fn allocate(&self, node: Arc<Node>, owner: Option<IpAddr>) -> u64 {
        let mut inner = self.inner.write().unwrap();
        let handle = match inner.free.pop() {
            Some(Reverse(handle)) => handle,
            None => {
                let handle = inner.next;
                inner.next += 1;
                handle
            }
        };
        inner.map.insert(handle, HandleEntry { node, owner });
        handle
    }

    /// Resolves a handle to its node. Read lock only.
    pub fn get(&self, handle: u64) -> Option<Arc<Node>> {
        self.inner.read().unwrap().map.get(&handle).map(|entry| entry.node.clone())
    }

    /// Removes a handle, returning its entry so the caller can close the
    /// node's backing file and return the quota slot outside this lock.
    pub fn release(&self, handle: u64) -> Option<HandleEntry> {
        let mut inner = self.inner.write().unwrap();
        let entry = inner.map.remove(&handle)?;
        inner.free.push(Reverse(handle));
        Some(entry)
    }

    /// Empties the registry, returning every entry for out-of-lock cleanup.
    /// Used at server shutdown.
    pub fn release_all(&self) -> Vec<(u64, HandleEntry)> {
        let mut inner = self.inner.write().unwrap();
        let entries: Vec<(u64, HandleEntry)> = inner.map.drain().collect();
        for (handle, _) in &entries {
            inner.free.push(Reverse(*handle));
        }
        entries
    }

    /// Number of live handles.
    pub fn count(&self) -> usize {
        self.inner.read().unwrap().map.len()
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        HandleRegistry::new()
    }
}
