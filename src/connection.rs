//! The active-connection registry.
//!
//! Every accepted connection is registered here until it closes. The
//! tracker enforces the connection-count admission cap, stamps per
//! connection last-activity times for the idle reaper, and guarantees that
//! unregistration is idempotent: the handler exit path, the reaper and
//! server shutdown can all try to tear down the same connection without
//! double-decrementing the count.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::debug;

/// One live connection's bookkeeping record.
pub struct ConnectionRecord {
    id: u64,
    peer: SocketAddr,
    // milliseconds since the tracker epoch
    last_activity_ms: AtomicU64,
    close_requested: AtomicBool,
    closed: Notify,
    unregistered: AtomicBool,
}

impl ConnectionRecord {
    /// The server-assigned connection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The peer address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Stamps the record as active now.
    pub fn touch(&self, epoch: Instant) {
        let now_ms = epoch.elapsed().as_millis() as u64;
        self.last_activity_ms.store(now_ms, Ordering::Relaxed);
    }

    /// How long the connection has been idle.
    pub fn idle_for(&self, epoch: Instant) -> Duration {
        let now_ms = epoch.elapsed().as_millis() as u64;
        let last = self.last_activity_ms.load(Ordering::Relaxed);
        Duration::from_millis(now_ms.saturating_sub(last))
    }

    /// Asks the connection's handler task to close the socket.
    pub fn request_close(&self) {
        self.close_requested.store(true, Ordering::Release);
        self.closed.notify_one();
    }

    /// Resolves once a close has been requested.
    pub async fn wait_closed(&self) {
        while !self.close_requested.load(Ordering::Acquire) {
            self.closed.notified().await;
        }
    }
}

/// Registry of live connections with an admission cap.
pub struct ConnectionTracker {
    epoch: Instant,
    max_connections: usize,
    next_id: AtomicU64,
    connections: RwLock<HashMap<u64, Arc<ConnectionRecord>>>,
    accept_errors: AtomicU64,
}

impl ConnectionTracker {
    /// Creates a tracker admitting at most `max_connections` concurrent
    /// connections (zero means unlimited).
    pub fn new(max_connections: usize) -> ConnectionTracker {
        ConnectionTracker {
            epoch: Instant::now(),
            max_connections,
            next_id: AtomicU64::new(1),
            connections: RwLock::new(HashMap::new()),
            accept_errors: AtomicU64::new(0),
        }
    }

    /// The instant connection idle times are measured from.
    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    /// Registers a connection, or refuses it when the cap is reached.
    pub fn try_register(&self, peer: SocketAddr) -> Option<Arc<ConnectionRecord>> {
        let mut connections = self.connections.write().unwrap();
        if self.max_connections > 0 && connections.len() >= self.max_connections {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = Arc::new(ConnectionRecord {
            id,
            peer,
            last_activity_ms: AtomicU64::new(self.epoch.elapsed().as_millis() as u64),
            close_requested: AtomicBool::new(false),
            closed: Notify::new(),
            unregistered: AtomicBool::new(false),
        });
        connections.insert(id, record.clone());
        Some(record)
    }

    /// Removes a connection. Latched: only the first call per record does
    /// anything, so duplicate teardown paths are harmless. Returns whether
    /// this call performed the removal.
    pub fn unregister(&self, record: &ConnectionRecord) -> bool {
        if record.unregistered.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.connections.write().unwrap().remove(&record.id);
        true
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.connections.read().unwrap().len()
    }

    /// Requests closure of every connection idle longer than
    /// `idle_timeout`; returns how many were asked to close.
    pub fn reap_idle(&self, idle_timeout: Duration) -> usize {
        let idle: Vec<Arc<ConnectionRecord>> = {
            let connections = self.connections.read().unwrap();
            connections
                .values()
                .filter(|record| record.idle_for(self.epoch) > idle_timeout)
                .cloned()
                .collect()
        };
        for record in &idle {
            debug!("reaping idle connection #{} from {}", record.id, record.peer);
            record.request_close();
        }
        idle.len()
    }

    /// Requests closure of every connection. Used at shutdown.
    pub fn close_all(&self) {
        let records: Vec<Arc<ConnectionRecord>> =
            self.connections.read().unwrap().values().cloned().collect();
        for record in records {
            record.request_close();
        }
    }

    /// Counts one failed accept.
    pub fn record_accept_error(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Failed accepts so far.
    pub fn accept_errors(&self) -> u64 {
        self.accept_errors.load(Ordering::Relaxed)
    }
}
