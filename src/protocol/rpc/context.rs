//! Per-connection execution context for RPC processing.
//!
//! One [`Context`] is created per accepted connection and cloned into every
//! processing stage. It carries the connection's identity (address, id), the
//! per-call resolved credentials, the connection's retransmission journal,
//! and shared handles to the façade, the rate limiter and the mount-record
//! table.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::facade::VfsFacade;
use crate::limit::RateLimiter;
use crate::protocol::nfs::mount::MountTable;
use crate::stats::ServerStats;

use super::{CallDedup, Credentials};

/// Everything a procedure handler needs to process one call.
#[derive(Clone)]
pub struct Context {
    /// Server-assigned connection id, used as the per-connection rate key
    pub conn_id: u64,

    /// The peer's address
    pub client_addr: SocketAddr,

    /// Credentials of the current call, post-squash. Refreshed by the
    /// dispatcher for every call on the connection.
    pub auth: Credentials,

    /// The filesystem façade serving this export
    pub facade: Arc<VfsFacade>,

    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Rate limiter, when enabled
    pub limiter: Option<Arc<RateLimiter>>,

    /// Server-wide counters
    pub stats: Arc<ServerStats>,

    /// The export path advertised to MOUNT clients
    pub export_name: Arc<String>,

    /// Mount records for DUMP/UMNT bookkeeping
    pub mounts: Arc<MountTable>,

    /// This connection's retransmission journal; dies with the connection
    pub dedup: Arc<CallDedup>,
}

impl Context {
    /// The limiter, if rate limiting is enabled.
    pub fn limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.limiter.as_ref()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("rpc::Context")
            .field("conn_id", &self.conn_id)
            .field("client_addr", &self.client_addr)
            .field("auth", &self.auth)
            .finish()
    }
}
