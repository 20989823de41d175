//! Implementation of the MKDIR procedure (procedure 9) for NFS version 3 as
//! defined in RFC 1813 section 3.3.9.

use std::io::{Read, Write};

use tracing::{debug, error};

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

/// Handles the NFSv3 MKDIR procedure: creates a directory and returns its
/// handle, attributes and the parent's WCC data.
pub async fn nfsproc3_mkdir(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::dir::MKDIR3args>(input)?;
    debug!("nfsproc3_mkdir({xid},{args:?})");

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
    match context.facade.mkdir(&dir, &args.dirops.name, &args.attributes, client).await {
        Ok(result) => {
            let res = nfs3::file::CREATE3resok {
                obj: nfs3::post_op_fh3::handle(result.fh),
                obj_attributes: nfs3::post_op_attr::attributes(result.attr),
                dir_wcc: result.dir_wcc,
            };
            debug!("nfsproc3_mkdir success {xid}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            res.serialize(output)?;
        }
        Err(stat) => {
            error!("nfsproc3_mkdir error {xid}({:?}) --> {stat:?}", args.dirops.name);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
        }
    }
    Ok(())
}
