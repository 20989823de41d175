//! Implementation of the UMNTALL procedure (procedure 4) for MOUNT version
//! 3 as defined in RFC 1813 Appendix I section I.4.5.
//!
//! UMNTALL removes every mount record of the calling client.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, Serialize};

/// Handles the MOUNT UMNTALL procedure.
pub async fn mountproc3_umnt_all(
    xid: u32,
    _input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    debug!("mountproc3_umnt_all({xid})");
    context.mounts.remove_all(context.client_addr.ip());
    xdr::rpc::make_success_reply(xid).serialize(output)?;
    Ok(())
}
