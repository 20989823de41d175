//! Implementation of the FSINFO procedure (procedure 19) for NFS version 3
//! as defined in RFC 1813 section 3.3.19.
//!
//! FSINFO is where the server advertises its transfer-size preferences:
//! the configured transfer size is both the preferred and the maximum
//! READ/WRITE size. Hard links are not advertised (the backing interface
//! has none); symlinks and settable times are.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

/// Handles the NFSv3 FSINFO procedure.
pub async fn nfsproc3_fsinfo(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let handle = deserialize::<nfs3::nfs_fh3>(input)?;
    debug!("nfsproc3_fsinfo({xid},{handle:?})");

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
    let io_size = context.config.max_io_size();
    let res = nfs3::fs::fsinfo3 {
        obj_attributes: obj_attr,
        rtmax: io_size,
        rtpref: io_size,
        rtmult: 4096,
        wtmax: io_size,
        wtpref: io_size,
        wtmult: 4096,
        dtpref: 64 * 1024,
        maxfilesize: u64::MAX >> 1,
        time_delta: nfs3::nfstime3 { seconds: 0, nseconds: 1 },
        properties: nfs3::fs::FSF_SYMLINK | nfs3::fs::FSF_HOMOGENEOUS | nfs3::fs::FSF_CANSETTIME,
    };
    xdr::rpc::make_success_reply(xid).serialize(output)?;
    nfs3::nfsstat3::NFS3_OK.serialize(output)?;
    res.serialize(output)?;
    Ok(())
}
