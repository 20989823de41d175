//! Adaptive memory-pressure monitoring.
//!
//! A background task samples the process's resident-set fraction of total
//! system memory on a fixed interval. Crossing the high watermark upward
//! shrinks the attribute-cache entry cap and the read-ahead caps by the
//! configured step (evicting immediately); falling below the low watermark
//! restores the limits toward their configured values by the same step.
//! Between the watermarks nothing changes, which gives the control loop
//! hysteresis.
//!
//! Sampling reads `/proc/self/status` and `/proc/meminfo` on Linux; on other
//! platforms no sample is available and the monitor idles.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{AttrCache, ReadAheadPool};
use crate::config::MemoryPressureConfig;

/// Background memory watcher driving cache shrink/restore.
pub struct MemoryMonitor {
    config: MemoryPressureConfig,
    attr_cache: Arc<AttrCache>,
    read_ahead: Arc<ReadAheadPool>,
    // shrink steps currently applied, for staged restore
    steps_applied: AtomicU32,
    last_usage_percent: AtomicU32,
}

impl MemoryMonitor {
    /// Builds a monitor over the given caches.
    pub fn new(
        config: MemoryPressureConfig,
        attr_cache: Arc<AttrCache>,
        read_ahead: Arc<ReadAheadPool>,
    ) -> Arc<Self> {
        Arc::new(MemoryMonitor {
            config,
            attr_cache,
            read_ahead,
            steps_applied: AtomicU32::new(0),
            last_usage_percent: AtomicU32::new(0),
        })
    }

    /// Spawns the sampling loop. `idle_timeout` clamps the check interval to
    /// at most half of it so a pressured server reacts before connections
    /// are reaped.
    pub fn spawn(self: &Arc<Self>, idle_timeout: Duration) -> JoinHandle<()> {
        let monitor = self.clone();
        let mut interval = monitor.config.check_interval;
        let half_idle = idle_timeout / 2;
        if !half_idle.is_zero() && interval > half_idle {
            interval = half_idle;
        }
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(100)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.sample_once();
            }
        })
    }

    /// Takes one sample and applies watermark transitions. Also usable
    /// directly from tests.
    pub fn sample_once(&self) {
        let Some(fraction) = memory_usage_fraction() else { return };
        self.apply_usage(fraction);
    }

    /// Applies the watermark state machine to an observed usage fraction.
    pub fn apply_usage(&self, fraction: f64) {
        self.last_usage_percent.store((fraction * 100.0) as u32, Ordering::Relaxed);
        if fraction >= self.config.high_watermark {
            self.shrink();
        } else if fraction <= self.config.low_watermark {
            self.restore();
        }
    }

    /// Most recent usage observation, as an integer percentage.
    pub fn last_usage_percent(&self) -> u32 {
        self.last_usage_percent.load(Ordering::Relaxed)
    }

    /// Shrink steps currently in effect.
    pub fn pressure_level(&self) -> u32 {
        self.steps_applied.load(Ordering::Relaxed)
    }

    fn shrink(&self) {
        let steps = self.steps_applied.fetch_add(1, Ordering::Relaxed) + 1;
        let factor = (1.0 - self.config.shrink_step).powi(steps as i32);
        let attr_cap = scaled(self.attr_cache.configured_max_entries(), factor);
        let (files_cap, memory_cap) = self.read_ahead.configured_limits();
        info!(
            steps,
            attr_cap,
            "memory pressure above high watermark, shrinking caches"
        );
        self.attr_cache.set_max_entries(attr_cap);
        self.read_ahead.set_limits(scaled(files_cap, factor), scaled(memory_cap, factor));
    }

    fn restore(&self) {
        let previous = self.steps_applied.load(Ordering::Relaxed);
        if previous == 0 {
            return;
        }
        let steps = previous - 1;
        self.steps_applied.store(steps, Ordering::Relaxed);
        let factor = (1.0 - self.config.shrink_step).powi(steps as i32);
        let attr_cap = scaled(self.attr_cache.configured_max_entries(), factor);
        let (files_cap, memory_cap) = self.read_ahead.configured_limits();
        debug!(steps, attr_cap, "memory pressure below low watermark, restoring cache limits");
        self.attr_cache.set_max_entries(attr_cap);
        self.read_ahead.set_limits(scaled(files_cap, factor), scaled(memory_cap, factor));
    }
}

fn scaled(value: usize, factor: f64) -> usize {
    ((value as f64) * factor).round().max(1.0) as usize
}

/// Resident-set size over total system memory, when the platform exposes it.
#[cfg(target_os = "linux")]
pub fn memory_usage_fraction() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let rss_kib = parse_kib_line(&status, "VmRSS:")?;
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let total_kib = parse_kib_line(&meminfo, "MemTotal:")?;
    if total_kib == 0 {
        return None;
    }
    Some(rss_kib as f64 / total_kib as f64)
}

/// See the Linux implementation; other platforms report no sample.
#[cfg(not(target_os = "linux"))]
pub fn memory_usage_fraction() -> Option<f64> {
    None
}

#[cfg(target_os = "linux")]
fn parse_kib_line(content: &str, prefix: &str) -> Option<u64> {
    content
        .lines()
        .find(|line| line.starts_with(prefix))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}
