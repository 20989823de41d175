//! nfs-tundra - an embeddable NFS version 3 server in Rust.
//!
//! This library exposes any implementation of the
//! [`vfs::Filesystem`] capability trait to real NFS clients over TCP,
//! speaking NFSv3 (RFC 1813) and MOUNTv3 (RFC 1813 Appendix I) over Sun
//! RPC (RFC 5531) with XDR encoding (RFC 4506).
//!
//! ## Main components
//!
//! - `vfs`: the narrow, path-based backing-filesystem interface a backend
//!   implements. Everything else is the server's job.
//! - `tcp`: the TCP listener, connection admission, idle reaping, and the
//!   per-connection processing loop.
//! - `protocol`: the wire stack - XDR serialization with length-bounded
//!   decoding, the RPC dispatcher with AUTH_SYS validation and access
//!   control, and the NFSv3/MOUNTv3 procedure handlers.
//! - `facade`: the filesystem façade owning the node table, the file-handle
//!   registry, and cache invalidation.
//! - `cache`: the attribute cache (with negative-lookup entries), the
//!   directory-listing cache, and the read-ahead buffer pool.
//! - `limit`: the multi-level token-bucket rate limiter and the adaptive
//!   memory-pressure monitor.
//! - `config`: plain-struct server configuration.
//!
//! ## Usage
//!
//! Implement [`vfs::Filesystem`], build a [`config::ServerConfig`], bind an
//! [`tcp::NfsTcpListener`] and call
//! [`handle_forever`](tcp::NfsTcp::handle_forever).
//!
//! All state is in-memory: after a restart clients recover through NFSv3
//! statelessness, with outstanding file handles answered by
//! `NFS3ERR_STALE`.

pub mod cache;
pub mod config;
pub mod connection;
pub mod facade;
pub mod fs_util;
pub mod limit;
pub mod protocol;
pub mod stats;
pub mod tcp;
pub mod vfs;

pub use protocol::xdr;
