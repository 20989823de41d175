//! Implementation of the MOUNT NULL procedure (procedure 0), RFC 1813
//! Appendix I section I.4.1: do nothing.

use std::io::Write;

use tracing::debug;

use crate::protocol::xdr::{self, Serialize};

/// Handles the MOUNT NULL procedure: an empty accepted reply.
pub fn mountproc3_null(xid: u32, output: &mut impl Write) -> Result<(), anyhow::Error> {
    debug!("mountproc3_null({xid})");
    xdr::rpc::make_success_reply(xid).serialize(output)?;
    Ok(())
}
