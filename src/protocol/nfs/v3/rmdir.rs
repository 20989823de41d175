//! Implementation of the RMDIR procedure (procedure 13) for NFS version 3
//! as defined in RFC 1813 section 3.3.13.
//!
//! RMDIR removes an empty directory: a non-empty one is NFS3ERR_NOTEMPTY,
//! a non-directory is NFS3ERR_NOTDIR.

use std::io::{Read, Write};

use tracing::{debug, error};

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

/// Handles the NFSv3 RMDIR procedure.
pub async fn nfsproc3_rmdir(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let dirops = deserialize::<nfs3::diropargs3>(input)?;
    debug!("nfsproc3_rmdir({xid},{dirops:?})");

    let dir = match context.facade.resolve(&dirops.dir) {
        Ok(node) => node,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    match context.facade.rmdir(&dir, &dirops.name).await {
        Ok(wcc) => {
            debug!("nfsproc3_rmdir success {xid}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            wcc.serialize(output)?;
        }
        Err(stat) => {
            error!("nfsproc3_rmdir error {xid}({:?}) --> {stat:?}", dirops.name);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
        }
    }
    Ok(())
}
