//! The TCP listener and connection lifecycle.
//!
//! [`NfsTcpListener`] binds the serving socket (applying the configured
//! socket options), wires up the shared subsystems (façade, rate limiter,
//! connection tracker, mount table), and runs the accept loop. Each
//! accepted connection passes the fast allow-list check and the
//! connection-count admission gate before a handler task is spawned for
//! it.
//!
//! The handler task is the whole per-connection pipeline: it reads one
//! RPC record, dispatches it, awaits the reply, writes it, and only then
//! reads the next call. One call in flight per connection gives the
//! protocol's reply-ordering guarantee with no queueing machinery, and a
//! procedure stuck at its deadline stalls only its own connection.
//!
//! Two background tasks are started at bind time: the idle reaper, which
//! closes connections whose last activity is older than the idle timeout,
//! and (when enabled) the memory-pressure monitor. Both are aborted when
//! the listener is dropped.

use std::io::Cursor;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection::{ConnectionRecord, ConnectionTracker};
use crate::facade::VfsFacade;
use crate::limit::{MemoryMonitor, RateLimiter};
use crate::protocol::nfs::mount::MountTable;
use crate::protocol::rpc::{self, CallDedup, Credentials};
use crate::stats::ServerStats;
use crate::vfs::Filesystem;

/// How long each connection's journal remembers answered calls for
/// retransmission suppression.
const DEDUP_RETENTION: Duration = Duration::from_secs(60);

/// Initial capacity of a connection's reply buffer.
const REPLY_BUFFER_CAPACITY: usize = 8192;

/// Common operations of an NFS-over-TCP server.
#[async_trait]
pub trait NfsTcp: Send + Sync {
    /// The port actually bound (useful after binding port 0).
    fn get_listen_port(&self) -> u16;

    /// The address actually bound.
    fn get_listen_ip(&self) -> IpAddr;

    /// Accepts and serves connections until the listener fails.
    async fn handle_forever(&self) -> std::io::Result<()>;
}

/// An NFSv3 + MOUNTv3 server on one TCP listening socket.
pub struct NfsTcpListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    facade: Arc<VfsFacade>,
    config: Arc<ServerConfig>,
    limiter: Option<Arc<RateLimiter>>,
    tracker: Arc<ConnectionTracker>,
    mounts: Arc<MountTable>,
    export_name: Arc<String>,
    stats: Arc<ServerStats>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl NfsTcpListener {
    /// Binds to `ipstr` (an `ip:port` pair) and assembles the server
    /// around `backend`.
    pub async fn bind(
        ipstr: &str,
        backend: Arc<dyn Filesystem>,
        config: ServerConfig,
    ) -> std::io::Result<NfsTcpListener> {
        let addr: SocketAddr = ipstr.parse().map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "listen address must be of the form ip:port",
            )
        })?;
        let config = Arc::new(config);
        if config.tls.enabled {
            warn!("tls.enabled is set; this listener speaks plain TCP and \
                   expects the embedding application to wrap the stream");
        }

        let socket = if addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
        socket.set_reuseaddr(true)?;
        socket.set_keepalive(config.socket.tcp_keep_alive)?;
        if let Some(size) = config.socket.send_buffer_size {
            socket.set_send_buffer_size(size)?;
        }
        if let Some(size) = config.socket.receive_buffer_size {
            socket.set_recv_buffer_size(size)?;
        }
        socket.bind(addr)?;
        let listener = socket.listen(1024)?;
        let local_addr = listener.local_addr()?;
        info!("listening on {local_addr}");

        let limiter = config.rate_limit.clone().map(|cfg| Arc::new(RateLimiter::new(cfg)));
        let facade = VfsFacade::new(backend, config.clone(), limiter.clone());
        let tracker = Arc::new(ConnectionTracker::new(config.max_connections));

        let server = NfsTcpListener {
            listener,
            local_addr,
            facade: facade.clone(),
            config: config.clone(),
            limiter,
            tracker: tracker.clone(),
            mounts: Arc::new(MountTable::new()),
            export_name: Arc::new("/".to_string()),
            stats: Arc::new(ServerStats::new()),
            background: Mutex::new(Vec::new()),
        };

        server.spawn_reaper();
        if config.memory.adapt_to_memory_pressure {
            let monitor = MemoryMonitor::new(
                config.memory.clone(),
                facade.attr_cache().clone(),
                facade
                    .read_ahead()
                    .cloned()
                    .unwrap_or_else(|| Arc::new(crate::cache::ReadAheadPool::new(0, 0, 0))),
            );
            let handle = monitor.spawn(config.idle_timeout);
            server.background.lock().unwrap().push(handle);
        }
        Ok(server)
    }

    /// Sets the export path advertised to MOUNT clients. Normalized to a
    /// single leading slash and no trailing slash.
    pub fn with_export_name<S: AsRef<str>>(&mut self, export_name: S) {
        self.export_name = Arc::new(format!(
            "/{}",
            export_name.as_ref().trim_end_matches('/').trim_start_matches('/')
        ));
    }

    /// The façade serving this listener (exposed for tests and embedding
    /// applications).
    pub fn facade(&self) -> &Arc<VfsFacade> {
        &self.facade
    }

    /// The connection tracker.
    pub fn tracker(&self) -> &Arc<ConnectionTracker> {
        &self.tracker
    }

    /// The mount-record table.
    pub fn mounts(&self) -> &Arc<MountTable> {
        &self.mounts
    }

    /// Server-wide counters.
    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    /// Closes every connection and releases all server state. Clients
    /// reconnect and recover via NFS statelessness.
    pub async fn shutdown(&self) {
        info!("shutting down: closing {} connections", self.tracker.count());
        self.tracker.close_all();
        self.facade.shutdown().await;
        for task in self.background.lock().unwrap().drain(..) {
            task.abort();
        }
    }

    fn spawn_reaper(&self) {
        let tracker = self.tracker.clone();
        let idle_timeout = self.config.idle_timeout;
        let mut period = idle_timeout / 2;
        if period > Duration::from_secs(60) {
            period = Duration::from_secs(60);
        }
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period.max(Duration::from_millis(100)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let reaped = tracker.reap_idle(idle_timeout);
                if reaped > 0 {
                    debug!("idle reaper closed {reaped} connections");
                }
            }
        });
        self.background.lock().unwrap().push(handle);
    }

    fn make_context(&self, record: &ConnectionRecord) -> rpc::Context {
        rpc::Context {
            conn_id: record.id(),
            client_addr: record.peer(),
            auth: Credentials::default(),
            facade: self.facade.clone(),
            config: self.config.clone(),
            limiter: self.limiter.clone(),
            stats: self.stats.clone(),
            export_name: self.export_name.clone(),
            mounts: self.mounts.clone(),
            // the journal is this connection's own and dies with it
            dedup: Arc::new(CallDedup::new(DEDUP_RETENTION)),
        }
    }
}

impl Drop for NfsTcpListener {
    fn drop(&mut self) {
        for task in self.background.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl NfsTcp for NfsTcpListener {
    fn get_listen_port(&self) -> u16 {
        self.local_addr.port()
    }

    fn get_listen_ip(&self) -> IpAddr {
        self.local_addr.ip()
    }

    async fn handle_forever(&self) -> std::io::Result<()> {
        loop {
            let (socket, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    self.tracker.record_accept_error();
                    warn!("accept failed: {e}");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            };
            // fast reject before any registration
            if !self.config.ip_allowed(peer.ip()) {
                debug!("rejecting {peer}: not in allow-list");
                continue;
            }
            let Some(record) = self.tracker.try_register(peer) else {
                warn!("rejecting {peer}: connection limit reached");
                continue;
            };
            let _ = socket.set_nodelay(self.config.socket.tcp_no_delay);
            info!("accepting connection #{} from {peer}", record.id());

            let context = self.make_context(&record);
            let tracker = self.tracker.clone();
            let limiter = self.limiter.clone();
            tokio::spawn(async move {
                if let Err(e) = process_socket(socket, context, record.clone(), &tracker).await {
                    debug!("connection #{} ended: {e:?}", record.id());
                }
                record.request_close();
                if tracker.unregister(&record) {
                    if let Some(limiter) = &limiter {
                        limiter.drop_connection(record.id());
                    }
                }
            });
        }
    }
}

/// Drives one established connection: one call at a time, each read,
/// dispatched, and answered before the next record is read. Exits when the
/// peer closes at a record boundary or a close is requested (idle reap or
/// shutdown). Activity is stamped at every record and reply so the idle
/// reaper only sees genuinely quiet connections.
async fn process_socket(
    socket: tokio::net::TcpStream,
    context: rpc::Context,
    record: Arc<ConnectionRecord>,
    tracker: &ConnectionTracker,
) -> Result<(), anyhow::Error> {
    let (mut reader, mut writer) = socket.into_split();
    let epoch = tracker.epoch();

    loop {
        let incoming = tokio::select! {
            incoming = rpc::read_record(&mut reader) => incoming,
            _ = record.wait_closed() => {
                debug!("connection #{} asked to close", record.id());
                return Ok(());
            }
        };
        let Some(call_bytes) = incoming? else {
            // clean end of stream
            return Ok(());
        };
        record.touch(epoch);

        let mut reply: Vec<u8> = Vec::with_capacity(REPLY_BUFFER_CAPACITY);
        let replied =
            rpc::handle_rpc(&mut Cursor::new(call_bytes), &mut reply, context.clone()).await?;
        // a retransmission produces no reply at all
        if replied {
            rpc::write_fragment(&mut writer, &reply).await?;
            record.touch(epoch);
        }
    }
}
