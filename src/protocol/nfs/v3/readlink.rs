//! Implementation of the READLINK procedure (procedure 5) for NFS version 3
//! as defined in RFC 1813 section 3.3.5.
//!
//! READLINK returns the target path of a symbolic link. Calling it on
//! anything that is not a symlink is NFS3ERR_INVAL.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

/// Handles the NFSv3 READLINK procedure.
pub async fn nfsproc3_readlink(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let handle = deserialize::<nfs3::nfs_fh3>(input)?;
    debug!("nfsproc3_readlink({xid},{handle:?})");

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
    match context.facade.readlink(&node).await {
        Ok(target) => {
            debug!("nfsproc3_readlink success {xid} --> {target:?}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            obj_attr.serialize(output)?;
            target.serialize(output)?;
        }
        Err(stat) => {
            debug!("nfsproc3_readlink error {xid} --> {stat:?}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            obj_attr.serialize(output)?;
        }
    }
    Ok(())
}
