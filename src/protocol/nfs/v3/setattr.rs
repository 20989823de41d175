//! Implementation of the SETATTR procedure (procedure 2) for NFS version 3
//! as defined in RFC 1813 section 3.3.2.
//!
//! SETATTR changes the attributes of a filesystem object: mode, ownership,
//! size, and times, each optionally. The client may supply a ctime guard;
//! if the object's current ctime does not match, the server refuses with
//! NFS3ERR_NOT_SYNC so racing clients notice each other.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

/// Handles the NFSv3 SETATTR procedure, returning WCC data for the object.
pub async fn nfsproc3_setattr(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::SETATTR3args>(input)?;
    debug!("nfsproc3_setattr({xid},{args:?})");

    let node = match context.facade.resolve(&args.object) {
        Ok(node) => node,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    match context.facade.setattr(&node, &args.new_attributes, &args.guard).await {
        Ok(wcc) => {
            debug!("nfsproc3_setattr success {xid}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            wcc.serialize(output)?;
        }
        Err(stat) => {
            debug!("nfsproc3_setattr error {xid} --> {stat:?}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
        }
    }
    Ok(())
}
