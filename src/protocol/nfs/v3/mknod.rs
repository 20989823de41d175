//! Implementation of the MKNOD procedure (procedure 11) for NFS version 3
//! as defined in RFC 1813 section 3.3.11.
//!
//! The backing-filesystem interface has no device-file capability, so the
//! arguments are decoded (and validated) and the call is answered with
//! NFS3ERR_NOTSUPP, with best-effort WCC data for the directory.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

/// Handles the NFSv3 MKNOD procedure: always unsupported.
pub async fn nfsproc3_mknod(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::dir::MKNOD3args>(input)?;
    debug!("nfsproc3_mknod({xid},{args:?}) --> NOTSUPP");

    let dir_wcc = match context.facade.resolve(&args.where_dir.dir) {
        Ok(dir) => {
            let attr = context.facade.post_op(&dir).await;
            nfs3::wcc_data { before: nfs3::pre_op_attr::Void, after: attr }
        }
        Err(_) => nfs3::wcc_data::default(),
    };
    xdr::rpc::make_success_reply(xid).serialize(output)?;
    nfs3::nfsstat3::NFS3ERR_NOTSUPP.serialize(output)?;
    dir_wcc.serialize(output)?;
    Ok(())
}
