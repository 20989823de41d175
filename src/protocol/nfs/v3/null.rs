//! Implementation of the NULL procedure (procedure 0) for NFS version 3 as
//! defined in RFC 1813 section 3.3.0.
//!
//! NULL does no work. It is used by clients to measure round-trip time and
//! to probe that the server is alive.

use std::io::Write;

use tracing::debug;

use crate::protocol::xdr::{self, Serialize};

/// Handles the NFSv3 NULL procedure: an empty accepted reply.
pub fn nfsproc3_null(xid: u32, output: &mut impl Write) -> Result<(), anyhow::Error> {
    debug!("nfsproc3_null({xid})");
    xdr::rpc::make_success_reply(xid).serialize(output)?;
    Ok(())
}
