//! Implementation of the WRITE procedure (procedure 7) for NFS version 3 as
//! defined in RFC 1813 section 3.3.7.
//!
//! WRITE stores data at the given offset. The stability flag is honored:
//! DATA_SYNC and FILE_SYNC data is synced to the backing store before the
//! reply, so acknowledged synchronous data can never be lost by this
//! server. Offset overflow and oversized counts are NFS3ERR_INVAL; a
//! count that disagrees with the data length is GARBAGE_ARGS.

use std::io::{Read, Write};

use tracing::{debug, error};

use crate::config::LARGE_IO_THRESHOLD;
use crate::limit::OpClass;
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

/// Handles the NFSv3 WRITE procedure.
pub async fn nfsproc3_write(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::file::WRITE3args>(input)?;
    debug!("nfsproc3_write({xid}, offset {}, count {})", args.offset, args.count);

    if args.data.len() != args.count as usize {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    }

    if args.count > LARGE_IO_THRESHOLD {
        if let Some(limiter) = context.limiter() {
            if !limiter.check_class(context.client_addr.ip(), OpClass::WriteLarge) {
                xdr::rpc::make_success_reply(xid).serialize(output)?;
                nfs3::nfsstat3::NFS3ERR_JUKEBOX.serialize(output)?;
                nfs3::wcc_data::default().serialize(output)?;
                return Ok(());
            }
        }
    }

    let node = match context.facade.resolve(&args.file) {
        Ok(node) => node,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    match context.facade.write(&node, args.offset, &args.data, args.stable).await {
        Ok(result) => {
            let res = nfs3::file::WRITE3resok {
                file_wcc: result.wcc,
                count: result.count,
                committed: result.committed,
                verf: context.facade.write_verifier(),
            };
            debug!("nfsproc3_write success {xid} --> {} bytes {:?}", res.count, res.committed);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            res.serialize(output)?;
        }
        Err(stat) => {
            error!("nfsproc3_write error {xid} --> {stat:?}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
        }
    }
    Ok(())
}
