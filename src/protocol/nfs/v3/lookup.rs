//! Implementation of the LOOKUP procedure (procedure 3) for NFS version 3
//! as defined in RFC 1813 section 3.3.3.
//!
//! LOOKUP translates a name within a directory into a file handle plus
//! attributes. The name is validated before any backend access: dot names,
//! separators, NUL bytes and over-long names are rejected, so a handle can
//! never be minted for anything outside the export root. The negative
//! cache answers repeated lookups of missing names without touching the
//! backing store.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

/// Handles the NFSv3 LOOKUP procedure.
pub async fn nfsproc3_lookup(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let dirops = deserialize::<nfs3::diropargs3>(input)?;
    debug!("nfsproc3_lookup({xid},{dirops:?})");

    let dir = match context.facade.resolve(&dirops.dir) {
        Ok(node) => node,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::post_op_attr::Void.serialize(output)?;
            return Ok(());
        }
    };
    let dir_attr = context.facade.post_op(&dir).await;
    let client = Some(context.client_addr.ip());

    match context.facade.lookup(&dir, &dirops.name, client).await {
        Ok((fh, attr)) => {
            debug!("nfsproc3_lookup success {xid} --> {attr:?}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            fh.serialize(output)?;
            nfs3::post_op_attr::attributes(attr).serialize(output)?;
            dir_attr.serialize(output)?;
        }
        Err(stat) => {
            debug!("nfsproc3_lookup error {xid}({:?}) --> {stat:?}", dirops.name);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            dir_attr.serialize(output)?;
        }
    }
    Ok(())
}
