//! Implementation of the FSSTAT procedure (procedure 18) for NFS version 3
//! as defined in RFC 1813 section 3.3.18.
//!
//! The backing-filesystem interface carries no volume statistics, so the
//! reply advertises generous synthetic totals. Clients use these for `df`
//! output only; enforcement of real limits is the backend's business.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

const TOTAL_BYTES: u64 = 8 << 40;
const FREE_BYTES: u64 = 4 << 40;
const TOTAL_FILES: u64 = 1 << 20;

/// Handles the NFSv3 FSSTAT procedure.
pub async fn nfsproc3_fsstat(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let handle = deserialize::<nfs3::nfs_fh3>(input)?;
    debug!("nfsproc3_fsstat({xid},{handle:?})");

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
    let res = nfs3::fs::FSSTAT3resok {
        obj_attributes: obj_attr,
        tbytes: TOTAL_BYTES,
        fbytes: FREE_BYTES,
        abytes: FREE_BYTES,
        tfiles: TOTAL_FILES,
        ffiles: TOTAL_FILES / 2,
        afiles: TOTAL_FILES / 2,
        invarsec: 0,
    };
    xdr::rpc::make_success_reply(xid).serialize(output)?;
    nfs3::nfsstat3::NFS3_OK.serialize(output)?;
    res.serialize(output)?;
    Ok(())
}
