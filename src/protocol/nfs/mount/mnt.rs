//! Implementation of the MNT procedure (procedure 1) for MOUNT version 3 as
//! defined in RFC 1813 Appendix I section I.4.2.
//!
//! MNT resolves an export path to its root file handle and reports the
//! authentication flavors this server accepts (AUTH_NONE and AUTH_SYS).
//! A successful mount is recorded in the advisory mount table for DUMP.
//! Mount attempts are admitted through the per-address mount bucket.

use std::io::{Read, Write};

use num_traits::cast::ToPrimitive;
use tracing::debug;

use crate::limit::OpClass;
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, mount, nfs3, Serialize};

fn to_mountstat3(stat: nfs3::nfsstat3) -> mount::mountstat3 {
    match stat {
        nfs3::nfsstat3::NFS3ERR_NOENT => mount::mountstat3::MNT3ERR_NOENT,
        nfs3::nfsstat3::NFS3ERR_ACCES => mount::mountstat3::MNT3ERR_ACCES,
        nfs3::nfsstat3::NFS3ERR_NOTDIR => mount::mountstat3::MNT3ERR_NOTDIR,
        nfs3::nfsstat3::NFS3ERR_INVAL => mount::mountstat3::MNT3ERR_INVAL,
        nfs3::nfsstat3::NFS3ERR_NAMETOOLONG => mount::mountstat3::MNT3ERR_NAMETOOLONG,
        _ => mount::mountstat3::MNT3ERR_SERVERFAULT,
    }
}

/// Handles the MOUNT MNT procedure.
pub async fn mountproc3_mnt(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let path = deserialize::<mount::dirpath>(input)?;
    let utf8path = std::str::from_utf8(path.as_ref()).unwrap_or_default();
    debug!("mountproc3_mnt({xid},{utf8path:?})");

    if let Some(limiter) = context.limiter() {
        if !limiter.check_class(context.client_addr.ip(), OpClass::Mount) {
            debug!("mount bucket exhausted for {}", context.client_addr);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            mount::mountstat3::MNT3ERR_SERVERFAULT.serialize(output)?;
            return Ok(());
        }
    }

    // the client mounts "<export_name>[/subdir]"; resolve the remainder
    // against the export root
    let Some(subpath) = utf8path.strip_prefix(context.export_name.as_str()) else {
        debug!("{xid} --> no matching export for {utf8path:?}");
        xdr::rpc::make_success_reply(xid).serialize(output)?;
        mount::mountstat3::MNT3ERR_NOENT.serialize(output)?;
        return Ok(());
    };
    let local = format!("/{}", subpath.trim_start_matches('/').trim_end_matches('/'));

    let client = context.client_addr.ip();
    match context.facade.resolve_export_path(&local, Some(client)).await {
        Ok(fh) => {
            let response = mount::mountres3_ok {
                fhandle: fh.data,
                auth_flavors: vec![
                    xdr::rpc::auth_flavor::AUTH_NONE.to_u32().unwrap(),
                    xdr::rpc::auth_flavor::AUTH_SYS.to_u32().unwrap(),
                ],
            };
            debug!("{xid} --> {response:?}");
            context.mounts.add(client, utf8path);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            mount::mountstat3::MNT3_OK.serialize(output)?;
            response.serialize(output)?;
        }
        Err(stat) => {
            debug!("{xid} --> {stat:?}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            to_mountstat3(stat).serialize(output)?;
        }
    }
    Ok(())
}
