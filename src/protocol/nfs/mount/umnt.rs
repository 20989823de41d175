//! Implementation of the UMNT procedure (procedure 3) for MOUNT version 3
//! as defined in RFC 1813 Appendix I section I.4.4.
//!
//! UMNT removes the caller's mount record for one export path. The reply
//! is void, and no file handles are revoked: NFS itself is stateless.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, mount, Serialize};

/// Handles the MOUNT UMNT procedure.
pub async fn mountproc3_umnt(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let path = deserialize::<mount::dirpath>(input)?;
    let utf8path = std::str::from_utf8(path.as_ref()).unwrap_or_default();
    debug!("mountproc3_umnt({xid},{utf8path:?})");

    context.mounts.remove(context.client_addr.ip(), utf8path);
    xdr::rpc::make_success_reply(xid).serialize(output)?;
    Ok(())
}
