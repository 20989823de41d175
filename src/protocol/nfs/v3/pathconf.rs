//! Implementation of the PATHCONF procedure (procedure 20) for NFS version
//! 3 as defined in RFC 1813 section 3.3.20.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

/// Handles the NFSv3 PATHCONF procedure: static naming limits. Names are
/// case-sensitive, preserved, and never silently truncated; hard links are
/// unsupported, so linkmax is 1.
pub async fn nfsproc3_pathconf(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let handle = deserialize::<nfs3::nfs_fh3>(input)?;
    debug!("nfsproc3_pathconf({xid},{handle:?})");

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
    let res = nfs3::fs::PATHCONF3resok {
        obj_attributes: obj_attr,
        linkmax: 1,
        name_max: nfs3::NFS3_MAXNAMLEN,
        no_trunc: true,
        chown_restricted: true,
        case_insensitive: false,
        case_preserving: true,
    };
    xdr::rpc::make_success_reply(xid).serialize(output)?;
    nfs3::nfsstat3::NFS3_OK.serialize(output)?;
    res.serialize(output)?;
    Ok(())
}
