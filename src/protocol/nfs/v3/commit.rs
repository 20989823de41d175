//! Implementation of the COMMIT procedure (procedure 21) for NFS version 3
//! as defined in RFC 1813 section 3.3.21.
//!
//! COMMIT makes previously UNSTABLE-written data durable and returns the
//! server's write verifier. The verifier is fixed for one server instance
//! and changes on restart, which is how clients detect that unacknowledged
//! unstable data may have been lost and must be rewritten.

use std::io::{Read, Write};

use tracing::{debug, error};

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

/// Handles the NFSv3 COMMIT procedure.
pub async fn nfsproc3_commit(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::file::COMMIT3args>(input)?;
    debug!("nfsproc3_commit({xid},{args:?})");

    if args.offset.checked_add(u64::from(args.count)).is_none() {
        xdr::rpc::make_success_reply(xid).serialize(output)?;
        nfs3::nfsstat3::NFS3ERR_INVAL.serialize(output)?;
        nfs3::wcc_data::default().serialize(output)?;
        return Ok(());
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
    match context.facade.commit(&node, args.offset, args.count).await {
        Ok((wcc, verf)) => {
            let res = nfs3::file::COMMIT3resok { file_wcc: wcc, verf };
            debug!("nfsproc3_commit success {xid}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            res.serialize(output)?;
        }
        Err(stat) => {
            error!("nfsproc3_commit error {xid} --> {stat:?}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
        }
    }
    Ok(())
}
