//! Implementation of the ACCESS procedure (procedure 4) for NFS version 3
//! as defined in RFC 1813 section 3.3.4.
//!
//! ACCESS checks which of the requested operations the caller may perform
//! on an object, evaluated against the object's mode bits, the caller's
//! squashed credentials, and the server's read-only flag. The reply is the
//! granted subset of the requested bitmask.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

/// Handles the NFSv3 ACCESS procedure.
pub async fn nfsproc3_access(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let handle = deserialize::<nfs3::nfs_fh3>(input)?;
    let requested = deserialize::<u32>(input)?;
    debug!("nfsproc3_access({xid},{handle:?},{requested:#x})");

    let node = match context.facade.resolve(&handle) {
        Ok(node) => node,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::post_op_attr::Void.serialize(output)?;
            return Ok(());
        }
    };
    let obj_attr = context.facade.post_op(&node).await;
    match context.facade.access(&node, requested, context.auth.uid, context.auth.gid).await {
        Ok(granted) => {
            debug!("nfsproc3_access success {xid} --> {granted:#x}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            obj_attr.serialize(output)?;
            granted.serialize(output)?;
        }
        Err(stat) => {
            debug!("nfsproc3_access error {xid} --> {stat:?}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            obj_attr.serialize(output)?;
        }
    }
    Ok(())
}
