//! Suppression of retransmitted calls.
//!
//! NFS clients retransmit calls they believe were lost, and replaying a
//! non-idempotent call (a WRITE, a RENAME) can corrupt data. This server is
//! TCP-only, so a retransmission arrives on the same connection that carried
//! the original call; each connection therefore keeps its own journal of
//! transaction ids rather than consulting any server-wide table. A call
//! whose xid is already journaled - still in flight, or answered within the
//! retention period - is dropped without a reply.
//!
//! Completed xids are queued in completion order, so expiry pops from the
//! front of the queue instead of sweeping the whole journal. In-flight xids
//! never expire. The journal is dropped with its connection, which is the
//! teardown path: there is no cross-client state to clean up.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-connection journal of recently seen transaction ids.
pub struct CallDedup {
    retention: Duration,
    inner: Mutex<Journal>,
}

#[derive(Default)]
struct Journal {
    // xid -> None while the call is in flight, Some(completion time) after
    seen: HashMap<u32, Option<Instant>>,
    // completion order, front is the oldest answered call
    completed: VecDeque<(Instant, u32)>,
}

impl CallDedup {
    /// Creates a journal that remembers answered calls for `retention`.
    pub fn new(retention: Duration) -> CallDedup {
        CallDedup { retention, inner: Mutex::new(Journal::default()) }
    }

    /// Admits one call: true when the xid is new (it is marked in flight),
    /// false when it repeats an in-flight or recently answered call and
    /// must be dropped without a reply.
    pub fn begin(&self, xid: u32) -> bool {
        let mut journal = self.inner.lock().unwrap();
        let now = Instant::now();
        while let Some(&(completed_at, old_xid)) = journal.completed.front() {
            if now.duration_since(completed_at) < self.retention {
                break;
            }
            journal.completed.pop_front();
            // the xid may have been journaled again since this completion
            if matches!(journal.seen.get(&old_xid), Some(Some(t)) if *t == completed_at) {
                journal.seen.remove(&old_xid);
            }
        }
        match journal.seen.entry(xid) {
            Entry::Vacant(slot) => {
                slot.insert(None);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Marks a call answered, starting its retention clock. A xid that was
    /// never admitted is ignored.
    pub fn complete(&self, xid: u32) {
        let mut journal = self.inner.lock().unwrap();
        let now = Instant::now();
        if let Some(state) = journal.seen.get_mut(&xid) {
            if state.is_none() {
                *state = Some(now);
                journal.completed.push_back((now, xid));
            }
        }
    }

    /// Number of xids currently journaled (in flight plus retained).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().seen.len()
    }

    /// True when nothing is journaled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
