//! Server configuration.
//!
//! Everything is a plain struct with a `Default`; the embedding application
//! builds a [`ServerConfig`] and hands it to the listener. There is no file
//! or flag parsing here (the process entry point is not this crate's
//! concern).

use std::net::IpAddr;
use std::time::Duration;

use ipnet::IpNet;

/// Hard ceiling on the READ/WRITE transfer size, regardless of configuration.
pub const MAX_TRANSFER_SIZE: u32 = 1 << 20;

/// Default preferred transfer size.
pub const DEFAULT_TRANSFER_SIZE: u32 = 64 * 1024;

/// Request size above which a READ or WRITE is classified as large for
/// rate-limiting purposes.
pub const LARGE_IO_THRESHOLD: u32 = 64 * 1024;

/// Credential rewriting policy applied after authentication.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SquashMode {
    /// Leave credentials untouched
    #[default]
    None,
    /// Map uid 0 to the nobody pair
    Root,
    /// Map every credential to the nobody pair
    All,
}

/// The uid/gid pair substituted by squashing.
pub const NOBODY_UID: u32 = 65534;
/// See [`NOBODY_UID`].
pub const NOBODY_GID: u32 = 65534;

/// One entry of the client allow-list: a bare address or a network.
#[derive(Copy, Clone, Debug)]
pub enum AllowedIp {
    /// A single address
    Addr(IpAddr),
    /// A CIDR network
    Net(IpNet),
}

impl AllowedIp {
    /// Parses either a bare IP address or a CIDR network.
    pub fn parse(s: &str) -> Result<AllowedIp, String> {
        if let Ok(addr) = s.parse::<IpAddr>() {
            return Ok(AllowedIp::Addr(addr));
        }
        s.parse::<IpNet>()
            .map(AllowedIp::Net)
            .map_err(|e| format!("invalid address or CIDR {s:?}: {e}"))
    }

    /// True when `addr` matches this entry.
    pub fn matches(&self, addr: IpAddr) -> bool {
        match self {
            AllowedIp::Addr(a) => *a == addr,
            AllowedIp::Net(net) => net.contains(&addr),
        }
    }
}

/// Attribute-cache tuning.
#[derive(Clone, Debug)]
pub struct AttrCacheConfig {
    /// TTL of positive entries
    pub timeout: Duration,
    /// Maximum number of cached paths
    pub size: usize,
    /// Whether failed lookups are cached
    pub cache_negative_lookups: bool,
    /// TTL of negative entries
    pub negative_timeout: Duration,
}

impl Default for AttrCacheConfig {
    fn default() -> Self {
        AttrCacheConfig {
            timeout: Duration::from_secs(5),
            size: 10_000,
            cache_negative_lookups: true,
            negative_timeout: Duration::from_secs(2),
        }
    }
}

/// Directory-listing cache tuning.
#[derive(Clone, Debug)]
pub struct DirCacheConfig {
    /// TTL of a cached listing
    pub timeout: Duration,
    /// Maximum number of cached directories
    pub size: usize,
    /// Directories with more entries than this are not cached
    pub max_dir_size: usize,
}

impl Default for DirCacheConfig {
    fn default() -> Self {
        DirCacheConfig {
            timeout: Duration::from_secs(5),
            size: 1_000,
            max_dir_size: 10_000,
        }
    }
}

/// Read-ahead buffer pool tuning.
#[derive(Clone, Debug)]
pub struct ReadAheadConfig {
    /// Master switch
    pub enabled: bool,
    /// Follow-on read window in bytes
    pub size: usize,
    /// Maximum number of buffered files
    pub max_files: usize,
    /// Maximum total bytes across all buffers
    pub max_memory: usize,
}

impl Default for ReadAheadConfig {
    fn default() -> Self {
        ReadAheadConfig {
            enabled: true,
            size: 128 * 1024,
            max_files: 100,
            max_memory: 100 * 1024 * 1024,
        }
    }
}

/// Memory-pressure monitor tuning.
#[derive(Clone, Debug)]
pub struct MemoryPressureConfig {
    /// Master switch
    pub adapt_to_memory_pressure: bool,
    /// Usage fraction above which caches are shrunk
    pub high_watermark: f64,
    /// Usage fraction below which limits are restored
    pub low_watermark: f64,
    /// Sampling period; clamped to at most half the idle timeout
    pub check_interval: Duration,
    /// Fraction removed from (or restored to) each limit per crossing
    pub shrink_step: f64,
}

impl Default for MemoryPressureConfig {
    fn default() -> Self {
        MemoryPressureConfig {
            adapt_to_memory_pressure: false,
            high_watermark: 0.8,
            low_watermark: 0.6,
            check_interval: Duration::from_secs(10),
            shrink_step: 0.3,
        }
    }
}

/// Token-bucket and quota settings for the multi-level rate limiter.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// Whole-server requests per second (bucket capacity equals one second
    /// of refill)
    pub global_rps: f64,
    /// Per-client-address requests per second
    pub per_ip_rps: f64,
    /// Per-client-address burst capacity
    pub per_ip_burst: f64,
    /// Per-connection requests per second
    pub per_conn_rps: f64,
    /// Per-connection burst capacity
    pub per_conn_burst: f64,
    /// Large (> 64 KiB) READs per second per client address
    pub read_large_rps: f64,
    /// Large (> 64 KiB) WRITEs per second per client address
    pub write_large_rps: f64,
    /// READDIR/READDIRPLUS calls per second per client address
    pub readdir_rps: f64,
    /// MNT calls per minute per client address
    pub mount_per_minute: f64,
    /// Cap on live file handles per client address
    pub max_handles_per_ip: usize,
    /// Cap on live file handles server-wide
    pub max_handles_global: usize,
    /// Idle per-key state older than this is reaped
    pub cleanup_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            global_rps: 10_000.0,
            per_ip_rps: 1_000.0,
            per_ip_burst: 1_000.0,
            per_conn_rps: 500.0,
            per_conn_burst: 500.0,
            read_large_rps: 100.0,
            write_large_rps: 100.0,
            readdir_rps: 200.0,
            mount_per_minute: 60.0,
            max_handles_per_ip: 1_000,
            max_handles_global: 10_000,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Per-procedure-class deadlines. A procedure that misses its deadline
/// replies NFS3ERR_JUKEBOX and its worker is cancelled.
#[derive(Clone, Debug)]
pub struct ProcedureTimeouts {
    /// LOOKUP deadline
    pub lookup: Duration,
    /// READ deadline
    pub read: Duration,
    /// WRITE deadline
    pub write: Duration,
    /// READDIR and READDIRPLUS deadline
    pub readdir: Duration,
    /// CREATE/MKDIR/SYMLINK/MKNOD deadline
    pub create: Duration,
    /// REMOVE and RMDIR deadline
    pub remove: Duration,
    /// RENAME deadline
    pub rename: Duration,
    /// Deadline for everything else
    pub default: Duration,
}

impl ProcedureTimeouts {
    /// The deadline configured for a timeout class.
    pub fn duration_for(&self, class: crate::stats::TimeoutClass) -> Duration {
        use crate::stats::TimeoutClass;
        match class {
            TimeoutClass::Lookup => self.lookup,
            TimeoutClass::Read => self.read,
            TimeoutClass::Write => self.write,
            TimeoutClass::Readdir => self.readdir,
            TimeoutClass::Create => self.create,
            TimeoutClass::Remove => self.remove,
            TimeoutClass::Rename => self.rename,
            TimeoutClass::Default => self.default,
        }
    }
}

impl Default for ProcedureTimeouts {
    fn default() -> Self {
        ProcedureTimeouts {
            lookup: Duration::from_secs(10),
            read: Duration::from_secs(30),
            write: Duration::from_secs(60),
            readdir: Duration::from_secs(30),
            create: Duration::from_secs(15),
            remove: Duration::from_secs(15),
            rename: Duration::from_secs(20),
            default: Duration::from_secs(30),
        }
    }
}

/// TCP socket tuning applied to the listening socket (and inherited by
/// accepted connections where the platform does so).
#[derive(Clone, Debug)]
pub struct SocketConfig {
    /// Enable SO_KEEPALIVE
    pub tcp_keep_alive: bool,
    /// Enable TCP_NODELAY on accepted connections
    pub tcp_no_delay: bool,
    /// SO_SNDBUF, if set
    pub send_buffer_size: Option<u32>,
    /// SO_RCVBUF, if set
    pub receive_buffer_size: Option<u32>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        SocketConfig {
            tcp_keep_alive: true,
            tcp_no_delay: true,
            send_buffer_size: None,
            receive_buffer_size: None,
        }
    }
}

/// Minimum accepted TLS version for the external stream wrapper.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum TlsVersion {
    /// TLS 1.2
    #[default]
    Tls12,
    /// TLS 1.3
    Tls13,
}

/// Client certificate requirements for the external stream wrapper.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ClientAuthMode {
    /// No client certificate requested
    #[default]
    None,
    /// Client certificate requested but optional
    Request,
    /// Client certificate required and verified
    Require,
}

/// TLS settings. This crate does not terminate TLS itself; the embedding
/// application wraps the stream. The struct is carried here so one config
/// object describes the whole deployment.
#[derive(Clone, Debug, Default)]
pub struct TlsConfig {
    /// Whether the deployment expects TLS-wrapped connections
    pub enabled: bool,
    /// Minimum protocol version
    pub min_version: TlsVersion,
    /// Maximum protocol version
    pub max_version: TlsVersion,
    /// Client certificate policy
    pub client_auth_mode: ClientAuthMode,
    /// PEM-encoded certificate chain
    pub certificate_chain: Vec<u8>,
    /// PEM-encoded private key
    pub private_key: Vec<u8>,
    /// Skip peer verification (testing only)
    pub insecure_skip_verify: bool,
}

/// Complete server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Reject every mutating procedure with NFS3ERR_ROFS
    pub read_only: bool,
    /// Require client source ports below 1024
    pub secure: bool,
    /// Credential rewriting policy
    pub squash: SquashMode,
    /// Allowed client addresses; empty means unrestricted
    pub allowed_ips: Vec<AllowedIp>,
    /// Preferred and maximum per-call READ/WRITE size, capped at
    /// [`MAX_TRANSFER_SIZE`]
    pub transfer_size: u32,
    /// Attribute cache settings
    pub attr_cache: AttrCacheConfig,
    /// Directory cache settings
    pub dir_cache: DirCacheConfig,
    /// Read-ahead settings
    pub read_ahead: ReadAheadConfig,
    /// Memory-pressure settings
    pub memory: MemoryPressureConfig,
    /// Concurrent heavy-procedure limit (a semaphore over backend calls);
    /// zero means four times the available parallelism
    pub max_workers: usize,
    /// Cap on concurrently open backing files kept by nodes
    pub max_open_files: usize,
    /// Connection admission cap; zero means unlimited
    pub max_connections: usize,
    /// Connections idle longer than this are closed by the reaper
    pub idle_timeout: Duration,
    /// Socket tuning
    pub socket: SocketConfig,
    /// Rate limiting; `None` disables it
    pub rate_limit: Option<RateLimitConfig>,
    /// Per-procedure deadlines
    pub timeouts: ProcedureTimeouts,
    /// TLS deployment description (not terminated by this crate)
    pub tls: TlsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            read_only: false,
            secure: false,
            squash: SquashMode::None,
            allowed_ips: Vec::new(),
            transfer_size: DEFAULT_TRANSFER_SIZE,
            attr_cache: AttrCacheConfig::default(),
            dir_cache: DirCacheConfig::default(),
            read_ahead: ReadAheadConfig::default(),
            memory: MemoryPressureConfig::default(),
            max_workers: 0,
            max_open_files: 1_000,
            max_connections: 1_000,
            idle_timeout: Duration::from_secs(300),
            socket: SocketConfig::default(),
            rate_limit: None,
            timeouts: ProcedureTimeouts::default(),
            tls: TlsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// The effective per-call data cap: the configured transfer size clamped
    /// to the protocol ceiling.
    pub fn max_io_size(&self) -> u32 {
        self.transfer_size.clamp(1, MAX_TRANSFER_SIZE)
    }

    /// True when `addr` passes the allow-list (an empty list allows all).
    pub fn ip_allowed(&self, addr: IpAddr) -> bool {
        self.allowed_ips.is_empty() || self.allowed_ips.iter().any(|entry| entry.matches(addr))
    }

    /// The effective worker cap.
    pub fn effective_max_workers(&self) -> usize {
        if self.max_workers > 0 {
            self.max_workers
        } else {
            4 * std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
        }
    }
}
