//! Implementation of the RENAME procedure (procedure 14) for NFS version 3
//! as defined in RFC 1813 section 3.3.14.
//!
//! RENAME is atomic to the extent the backing store guarantees it. Both
//! parent directories' caches and both paths' negative entries are dropped
//! so clients immediately see the move.

use std::io::{Read, Write};

use tracing::{debug, error};

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

/// Handles the NFSv3 RENAME procedure.
pub async fn nfsproc3_rename(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::dir::RENAME3args>(input)?;
    debug!("nfsproc3_rename({xid},{args:?})");

    let from_dir = match context.facade.resolve(&args.from.dir) {
        Ok(node) => node,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    let to_dir = match context.facade.resolve(&args.to.dir) {
        Ok(node) => node,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    match context.facade.rename(&from_dir, &args.from.name, &to_dir, &args.to.name).await {
        Ok((from_wcc, to_wcc)) => {
            debug!("nfsproc3_rename success {xid}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            from_wcc.serialize(output)?;
            to_wcc.serialize(output)?;
        }
        Err(stat) => {
            error!("nfsproc3_rename error {xid} --> {stat:?}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
        }
    }
    Ok(())
}
