//! Implementation of the GETATTR procedure (procedure 1) for NFS version 3
//! as defined in RFC 1813 section 3.3.1.
//!
//! GETATTR retrieves the attributes of a filesystem object. Clients call it
//! constantly, so the attribute cache sits directly on this path.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

/// Handles the NFSv3 GETATTR procedure: file handle in, attributes out.
pub async fn nfsproc3_getattr(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let handle = deserialize::<nfs3::nfs_fh3>(input)?;
    debug!("nfsproc3_getattr({xid},{handle:?})");

    let node = match context.facade.resolve(&handle) {
        Ok(node) => node,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            return Ok(());
        }
    };
    match context.facade.getattr(&node).await {
        Ok(attr) => {
            debug!("nfsproc3_getattr success {xid} --> {attr:?}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            attr.serialize(output)?;
        }
        Err(stat) => {
            debug!("nfsproc3_getattr error {xid} --> {stat:?}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
        }
    }
    Ok(())
}
