//! Implementation of the REMOVE procedure (procedure 12) for NFS version 3
//! as defined in RFC 1813 section 3.3.12.
//!
//! REMOVE deletes a file or symbolic link. Removing a directory with this
//! procedure is NFS3ERR_ISDIR; RMDIR is the directory-shaped twin.

use std::io::{Read, Write};

use tracing::{debug, error};

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

/// Handles the NFSv3 REMOVE procedure.
pub async fn nfsproc3_remove(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let dirops = deserialize::<nfs3::diropargs3>(input)?;
    debug!("nfsproc3_remove({xid},{dirops:?})");

    let dir = match context.facade.resolve(&dirops.dir) {
        Ok(node) => node,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    match context.facade.remove(&dir, &dirops.name).await {
        Ok(wcc) => {
            debug!("nfsproc3_remove success {xid}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            wcc.serialize(output)?;
        }
        Err(stat) => {
            error!("nfsproc3_remove error {xid}({:?}) --> {stat:?}", dirops.name);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
        }
    }
    Ok(())
}
