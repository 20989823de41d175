//! Implementation of the SYMLINK procedure (procedure 10) for NFS version 3
//! as defined in RFC 1813 section 3.3.10.
//!
//! Backends without symlink capability surface NFS3ERR_NOTSUPP.

use std::io::{Read, Write};

use tracing::{debug, error};

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

/// Handles the NFSv3 SYMLINK procedure.
pub async fn nfsproc3_symlink(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::dir::SYMLINK3args>(input)?;
    debug!("nfsproc3_symlink({xid},{args:?})");

    let dir = match context.facade.resolve(&args.dirops.dir) {
        Ok(node) => node,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    let client = Some(context.client_addr.ip());
    match context
        .facade
        .symlink(
            &dir,
            &args.dirops.name,
            &args.symlink.symlink_data,
            &args.symlink.symlink_attributes,
            client,
        )
        .await
    {
        Ok(result) => {
            let res = nfs3::file::CREATE3resok {
                obj: nfs3::post_op_fh3::handle(result.fh),
                obj_attributes: nfs3::post_op_attr::attributes(result.attr),
                dir_wcc: result.dir_wcc,
            };
            debug!("nfsproc3_symlink success {xid}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            res.serialize(output)?;
        }
        Err(stat) => {
            error!("nfsproc3_symlink error {xid}({:?}) --> {stat:?}", args.dirops.name);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
        }
    }
    Ok(())
}
