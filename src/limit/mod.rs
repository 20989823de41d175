//! Load-shedding subsystems: the multi-level token-bucket rate limiter and
//! the adaptive memory-pressure monitor.

pub mod memory;
pub mod rate;

pub use memory::MemoryMonitor;
pub use rate::{OpClass, RateLimiter};
