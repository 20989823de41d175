//! An intrusive doubly-linked recency list over slab indices.
//!
//! Cache maps store their values in a `HashMap` keyed by path and keep the
//! slot index of each entry; the list orders those slots from most- to
//! least-recently used. All operations are O(1). The list stores each
//! entry's key so that eviction can find the map entry to drop.

#[derive(Debug)]
struct Slot<K> {
    key: Option<K>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Recency list: head is most recently used, tail is the eviction candidate.
#[derive(Debug)]
pub(crate) struct LruList<K> {
    slots: Vec<Slot<K>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<K: Clone> LruList<K> {
    pub(crate) fn new() -> Self {
        LruList { slots: Vec::new(), free: Vec::new(), head: None, tail: None, len: 0 }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Inserts a new entry at the MRU position and returns its slot index.
    pub(crate) fn push_front(&mut self, key: K) -> usize {
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Slot { key: Some(key), prev: None, next: None };
                idx
            }
            None => {
                self.slots.push(Slot { key: Some(key), prev: None, next: None });
                self.slots.len() - 1
            }
        };
        self.attach_front(idx);
        self.len += 1;
        idx
    }

    /// Moves an existing entry to the MRU position.
    pub(crate) fn touch(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.detach(idx);
        self.attach_front(idx);
    }

    /// Removes an entry from the list, freeing its slot.
    pub(crate) fn remove(&mut self, idx: usize) -> Option<K> {
        let key = self.slots[idx].key.take()?;
        self.detach(idx);
        self.free.push(idx);
        self.len -= 1;
        Some(key)
    }

    /// Returns the key of the least-recently-used entry, if any.
    pub(crate) fn lru_key(&self) -> Option<K> {
        let idx = self.tail?;
        self.slots[idx].key.clone()
    }

    fn attach_front(&mut self, idx: usize) {
        self.slots[idx].prev = None;
        self.slots[idx].next = self.head;
        if let Some(old_head) = self.head {
            self.slots[old_head].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        self.slots[idx].prev = None;
        self.slots[idx].next = None;
    }
}
