//! Multi-level token-bucket rate limiting.
//!
//! Four bucket layers compose with AND: one global bucket, one bucket per
//! client address, one per connection, and one per (client address,
//! operation class) pair for the expensive classes (large reads, large
//! writes, directory listings, mounts). A request passes only if every
//! applicable layer has a token.
//!
//! Each bucket sits behind its own mutex; the maps handing out buckets are
//! read-locked on the hot path so contention scales with the number of
//! distinct callers rather than with request volume. Per-address state that
//! has not been touched for the cleanup interval is reaped opportunistically.
//!
//! File-handle admission is a separate counter pair (per address and
//! global): allocation fails fast once either cap would be exceeded.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use tracing::debug;

use crate::config::RateLimitConfig;

/// Operation classes with dedicated per-address buckets.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum OpClass {
    /// READ larger than the large-I/O threshold
    ReadLarge,
    /// WRITE larger than the large-I/O threshold
    WriteLarge,
    /// READDIR or READDIRPLUS
    Readdir,
    /// MOUNT MNT
    Mount,
}

/// A token bucket refilled continuously at `refill_per_sec`, clamped to
/// `capacity`.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(refill_per_sec: f64, capacity: f64) -> Self {
        TokenBucket { tokens: capacity, capacity, refill_per_sec, last_refill: Instant::now() }
    }

    /// Accrues fractional tokens for the elapsed time and takes one if
    /// available.
    fn try_take(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

struct IpState {
    bucket: Mutex<TokenBucket>,
    last_seen: Mutex<Instant>,
}

/// The composed limiter. One instance per server.
pub struct RateLimiter {
    config: RateLimitConfig,
    global: Mutex<TokenBucket>,
    per_ip: RwLock<HashMap<IpAddr, Arc<IpState>>>,
    per_conn: RwLock<HashMap<u64, Arc<Mutex<TokenBucket>>>>,
    per_class: RwLock<HashMap<(IpAddr, OpClass), Arc<IpState>>>,
    handles_global: AtomicUsize,
    handles_per_ip: Mutex<HashMap<IpAddr, usize>>,
    last_cleanup: Mutex<Instant>,
}

impl RateLimiter {
    /// Builds a limiter from its configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        let global = TokenBucket::new(config.global_rps, config.global_rps);
        RateLimiter {
            config,
            global: Mutex::new(global),
            per_ip: RwLock::new(HashMap::new()),
            per_conn: RwLock::new(HashMap::new()),
            per_class: RwLock::new(HashMap::new()),
            handles_global: AtomicUsize::new(0),
            handles_per_ip: Mutex::new(HashMap::new()),
            last_cleanup: Mutex::new(Instant::now()),
        }
    }

    /// Admits one request from `ip` on connection `conn_id`: the global,
    /// per-address and per-connection buckets must all have a token.
    pub fn check_request(&self, ip: IpAddr, conn_id: u64) -> bool {
        self.maybe_cleanup();
        if !self.global.lock().unwrap().try_take() {
            debug!("rate limit: global bucket exhausted");
            return false;
        }
        let ip_state = self.ip_state(ip);
        *ip_state.last_seen.lock().unwrap() = Instant::now();
        if !ip_state.bucket.lock().unwrap().try_take() {
            debug!("rate limit: per-ip bucket exhausted for {ip}");
            return false;
        }
        let conn_bucket = self.conn_bucket(conn_id);
        if !conn_bucket.lock().unwrap().try_take() {
            debug!("rate limit: per-connection bucket exhausted for #{conn_id}");
            return false;
        }
        true
    }

    /// Admits one operation of `class` from `ip`.
    pub fn check_class(&self, ip: IpAddr, class: OpClass) -> bool {
        let state = self.class_state(ip, class);
        *state.last_seen.lock().unwrap() = Instant::now();
        let admitted = state.bucket.lock().unwrap().try_take();
        if !admitted {
            debug!("rate limit: {class:?} bucket exhausted for {ip}");
        }
        admitted
    }

    /// Reserves one file-handle slot for `ip`, failing fast when either the
    /// per-address or the global cap would be exceeded.
    pub fn try_acquire_handle(&self, ip: IpAddr) -> bool {
        let mut per_ip = self.handles_per_ip.lock().unwrap();
        let count = per_ip.entry(ip).or_insert(0);
        if *count >= self.config.max_handles_per_ip {
            return false;
        }
        let global = self.handles_global.load(Ordering::Relaxed);
        if global >= self.config.max_handles_global {
            return false;
        }
        *count += 1;
        self.handles_global.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Returns a file-handle slot previously acquired for `ip`.
    pub fn release_handle(&self, ip: IpAddr) {
        let mut per_ip = self.handles_per_ip.lock().unwrap();
        if let Some(count) = per_ip.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                per_ip.remove(&ip);
            }
        }
        let _ = self
            .handles_global
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }

    /// Live file handles across all clients.
    pub fn handles_in_use(&self) -> usize {
        self.handles_global.load(Ordering::Relaxed)
    }

    /// Drops the bucket of a closed connection.
    pub fn drop_connection(&self, conn_id: u64) {
        self.per_conn.write().unwrap().remove(&conn_id);
    }

    fn ip_state(&self, ip: IpAddr) -> Arc<IpState> {
        if let Some(state) = self.per_ip.read().unwrap().get(&ip) {
            return state.clone();
        }
        let mut map = self.per_ip.write().unwrap();
        map.entry(ip)
            .or_insert_with(|| {
                Arc::new(IpState {
                    bucket: Mutex::new(TokenBucket::new(
                        self.config.per_ip_rps,
                        self.config.per_ip_burst,
                    )),
                    last_seen: Mutex::new(Instant::now()),
                })
            })
            .clone()
    }

    fn conn_bucket(&self, conn_id: u64) -> Arc<Mutex<TokenBucket>> {
        if let Some(bucket) = self.per_conn.read().unwrap().get(&conn_id) {
            return bucket.clone();
        }
        let mut map = self.per_conn.write().unwrap();
        map.entry(conn_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(TokenBucket::new(
                    self.config.per_conn_rps,
                    self.config.per_conn_burst,
                )))
            })
            .clone()
    }

    fn class_state(&self, ip: IpAddr, class: OpClass) -> Arc<IpState> {
        if let Some(state) = self.per_class.read().unwrap().get(&(ip, class)) {
            return state.clone();
        }
        let (refill, capacity) = match class {
            OpClass::ReadLarge => (self.config.read_large_rps, self.config.read_large_rps),
            OpClass::WriteLarge => (self.config.write_large_rps, self.config.write_large_rps),
            OpClass::Readdir => (self.config.readdir_rps, self.config.readdir_rps),
            // mount is configured per minute
            OpClass::Mount => (self.config.mount_per_minute / 60.0, self.config.mount_per_minute),
        };
        let mut map = self.per_class.write().unwrap();
        map.entry((ip, class))
            .or_insert_with(|| {
                Arc::new(IpState {
                    bucket: Mutex::new(TokenBucket::new(refill, capacity.max(1.0))),
                    last_seen: Mutex::new(Instant::now()),
                })
            })
            .clone()
    }

    /// Reaps per-address state idle longer than the cleanup interval. Runs
    /// at most once per interval, piggybacked on request admission.
    fn maybe_cleanup(&self) {
        let now = Instant::now();
        {
            let mut last = self.last_cleanup.lock().unwrap();
            if now.duration_since(*last) < self.config.cleanup_interval {
                return;
            }
            *last = now;
        }
        let cutoff = self.config.cleanup_interval;
        self.per_ip
            .write()
            .unwrap()
            .retain(|_, state| now.duration_since(*state.last_seen.lock().unwrap()) < cutoff);
        self.per_class
            .write()
            .unwrap()
            .retain(|_, state| now.duration_since(*state.last_seen.lock().unwrap()) < cutoff);
    }
}
