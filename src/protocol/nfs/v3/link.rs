//! Implementation of the LINK procedure (procedure 15) for NFS version 3 as
//! defined in RFC 1813 section 3.3.15.
//!
//! Hard links are not a capability of the backing-filesystem interface, so
//! LINK is answered with NFS3ERR_NOTSUPP after argument validation.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

/// Handles the NFSv3 LINK procedure: always unsupported.
pub async fn nfsproc3_link(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::file::LINK3args>(input)?;
    debug!("nfsproc3_link({xid},{args:?}) --> NOTSUPP");

    let file_attr = match context.facade.resolve(&args.file) {
        Ok(node) => context.facade.post_op(&node).await,
        Err(_) => nfs3::post_op_attr::Void,
    };
    xdr::rpc::make_success_reply(xid).serialize(output)?;
    nfs3::nfsstat3::NFS3ERR_NOTSUPP.serialize(output)?;
    file_attr.serialize(output)?;
    nfs3::wcc_data::default().serialize(output)?;
    Ok(())
}
