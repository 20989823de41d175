//! Lightweight server counters.
//!
//! Everything here is an atomic so the hot paths never take a lock to
//! record an event. Accept-error counting lives on the connection tracker;
//! this module counts per-procedure-class deadline expiries and served
//! calls.

use std::sync::atomic::{AtomicU64, Ordering};

/// Procedure classes sharing a configured deadline.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimeoutClass {
    /// LOOKUP
    Lookup,
    /// READ
    Read,
    /// WRITE and COMMIT
    Write,
    /// READDIR and READDIRPLUS
    Readdir,
    /// CREATE, MKDIR, SYMLINK, MKNOD
    Create,
    /// REMOVE and RMDIR
    Remove,
    /// RENAME
    Rename,
    /// Everything else
    Default,
}

const CLASS_COUNT: usize = 8;

impl TimeoutClass {
    fn index(self) -> usize {
        match self {
            TimeoutClass::Lookup => 0,
            TimeoutClass::Read => 1,
            TimeoutClass::Write => 2,
            TimeoutClass::Readdir => 3,
            TimeoutClass::Create => 4,
            TimeoutClass::Remove => 5,
            TimeoutClass::Rename => 6,
            TimeoutClass::Default => 7,
        }
    }
}

/// Server-wide counters, shared by all connections.
#[derive(Default)]
pub struct ServerStats {
    calls: AtomicU64,
    timeouts: [AtomicU64; CLASS_COUNT],
}

impl ServerStats {
    /// Creates zeroed counters.
    pub fn new() -> ServerStats {
        ServerStats::default()
    }

    /// Counts one dispatched NFS call.
    pub fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    /// NFS calls dispatched so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Counts one expired deadline in `class`.
    pub fn record_timeout(&self, class: TimeoutClass) {
        self.timeouts[class.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Expired deadlines recorded for `class`.
    pub fn timeouts(&self, class: TimeoutClass) -> u64 {
        self.timeouts[class.index()].load(Ordering::Relaxed)
    }
}
