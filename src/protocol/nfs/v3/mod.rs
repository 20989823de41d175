//! NFSv3 (RFC 1813) procedure dispatch.
//!
//! All 22 procedures are implemented, each in its own module. The
//! dispatcher enforces, in order: the program version, request throttling
//! (replying NFS3ERR_JUKEBOX with the correct empty result shape for the
//! procedure), and the per-procedure deadline. Handlers serialize their
//! reply into a scratch buffer; a handler that misses its deadline is
//! cancelled at its next suspension point, its partial output is discarded,
//! and the client receives NFS3ERR_JUKEBOX, which it will retry with
//! backoff.
//!
//! Argument-decode failures anywhere inside a handler surface here and are
//! answered with GARBAGE_ARGS; they never terminate the connection.

use std::io::{Read, Write};

use num_traits::cast::FromPrimitive;
use tracing::{debug, warn};

use crate::protocol::rpc;
use crate::protocol::xdr::{self, nfs3, Serialize};
use crate::stats::TimeoutClass;

mod access;
mod commit;
mod create;
mod fsinfo;
mod fsstat;
mod getattr;
mod link;
mod lookup;
mod mkdir;
mod mknod;
mod null;
mod pathconf;
mod read;
mod readdir;
mod readdirplus;
mod readlink;
mod remove;
mod rename;
mod reply_budget;
mod rmdir;
mod setattr;
mod symlink;
mod write;

use access::nfsproc3_access;
use commit::nfsproc3_commit;
use create::nfsproc3_create;
use fsinfo::nfsproc3_fsinfo;
use fsstat::nfsproc3_fsstat;
use getattr::nfsproc3_getattr;
use link::nfsproc3_link;
use lookup::nfsproc3_lookup;
use mkdir::nfsproc3_mkdir;
use mknod::nfsproc3_mknod;
use null::nfsproc3_null;
use pathconf::nfsproc3_pathconf;
use read::nfsproc3_read;
use readdir::nfsproc3_readdir;
use readdirplus::nfsproc3_readdirplus;
use readlink::nfsproc3_readlink;
use remove::nfsproc3_remove;
use rename::nfsproc3_rename;
use rmdir::nfsproc3_rmdir;
use setattr::nfsproc3_setattr;
use symlink::nfsproc3_symlink;
use write::nfsproc3_write;

/// Routes one NFSv3 call to its handler.
pub async fn handle_nfs(
    xid: u32,
    call: xdr::rpc::call_body,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
    throttled: bool,
) -> Result<(), anyhow::Error> {
    if call.vers != nfs3::VERSION {
        warn!("invalid NFS version {} != {}", call.vers, nfs3::VERSION);
        xdr::rpc::prog_mismatch_reply_message(xid, nfs3::VERSION).serialize(output)?;
        return Ok(());
    }
    let prog = nfs3::NFSProgram::from_u32(call.proc).unwrap_or(nfs3::NFSProgram::INVALID);

    if prog == nfs3::NFSProgram::NFSPROC3_NULL {
        return nfsproc3_null(xid, output);
    }
    if prog == nfs3::NFSProgram::INVALID {
        warn!("unknown NFS procedure {}", call.proc);
        xdr::rpc::proc_unavail_reply_message(xid).serialize(output)?;
        return Ok(());
    }
    if throttled {
        debug!("throttling xid {xid} ({prog:?}) from {}", context.client_addr);
        return write_jukebox_reply(xid, prog, output);
    }

    // Handlers write into a scratch buffer so an expired deadline can
    // discard a half-built reply.
    context.stats.record_call();
    let mut body: Vec<u8> = Vec::new();
    let class = timeout_class(prog);
    let deadline = context.config.timeouts.duration_for(class);
    match tokio::time::timeout(deadline, dispatch(prog, xid, input, &mut body, context)).await {
        Ok(Ok(())) => {
            output.write_all(&body)?;
        }
        Ok(Err(e)) if rpc::is_decode_error(&e) => {
            debug!("garbage args for xid {xid} ({prog:?}): {e}");
            xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        }
        Ok(Err(e)) => return Err(e),
        Err(_elapsed) => {
            warn!("{prog:?} deadline of {deadline:?} expired for xid {xid}");
            context.stats.record_timeout(class);
            write_jukebox_reply(xid, prog, output)?;
        }
    }
    Ok(())
}

async fn dispatch(
    prog: nfs3::NFSProgram,
    xid: u32,
    input: &mut impl Read,
    output: &mut Vec<u8>,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    use nfs3::NFSProgram::*;
    match prog {
        NFSPROC3_GETATTR => nfsproc3_getattr(xid, input, output, context).await,
        NFSPROC3_SETATTR => nfsproc3_setattr(xid, input, output, context).await,
        NFSPROC3_LOOKUP => nfsproc3_lookup(xid, input, output, context).await,
        NFSPROC3_ACCESS => nfsproc3_access(xid, input, output, context).await,
        NFSPROC3_READLINK => nfsproc3_readlink(xid, input, output, context).await,
        NFSPROC3_READ => nfsproc3_read(xid, input, output, context).await,
        NFSPROC3_WRITE => nfsproc3_write(xid, input, output, context).await,
        NFSPROC3_CREATE => nfsproc3_create(xid, input, output, context).await,
        NFSPROC3_MKDIR => nfsproc3_mkdir(xid, input, output, context).await,
        NFSPROC3_SYMLINK => nfsproc3_symlink(xid, input, output, context).await,
        NFSPROC3_MKNOD => nfsproc3_mknod(xid, input, output, context).await,
        NFSPROC3_REMOVE => nfsproc3_remove(xid, input, output, context).await,
        NFSPROC3_RMDIR => nfsproc3_rmdir(xid, input, output, context).await,
        NFSPROC3_RENAME => nfsproc3_rename(xid, input, output, context).await,
        NFSPROC3_LINK => nfsproc3_link(xid, input, output, context).await,
        NFSPROC3_READDIR => nfsproc3_readdir(xid, input, output, context).await,
        NFSPROC3_READDIRPLUS => nfsproc3_readdirplus(xid, input, output, context).await,
        NFSPROC3_FSSTAT => nfsproc3_fsstat(xid, input, output, context).await,
        NFSPROC3_FSINFO => nfsproc3_fsinfo(xid, input, output, context).await,
        NFSPROC3_PATHCONF => nfsproc3_pathconf(xid, input, output, context).await,
        NFSPROC3_COMMIT => nfsproc3_commit(xid, input, output, context).await,
        NFSPROC3_NULL | INVALID => unreachable!("handled by the caller"),
    }
}

/// The deadline class of a procedure.
fn timeout_class(prog: nfs3::NFSProgram) -> TimeoutClass {
    use nfs3::NFSProgram::*;
    match prog {
        NFSPROC3_LOOKUP => TimeoutClass::Lookup,
        NFSPROC3_READ => TimeoutClass::Read,
        NFSPROC3_WRITE | NFSPROC3_COMMIT => TimeoutClass::Write,
        NFSPROC3_READDIR | NFSPROC3_READDIRPLUS => TimeoutClass::Readdir,
        NFSPROC3_CREATE | NFSPROC3_MKDIR | NFSPROC3_SYMLINK | NFSPROC3_MKNOD => {
            TimeoutClass::Create
        }
        NFSPROC3_REMOVE | NFSPROC3_RMDIR => TimeoutClass::Remove,
        NFSPROC3_RENAME => TimeoutClass::Rename,
        _ => TimeoutClass::Default,
    }
}

/// Replies NFS3ERR_JUKEBOX with the procedure's empty failure shape.
/// Shared by request throttling and deadline expiry; clients treat it as
/// transient and retry with backoff.
pub(crate) fn write_jukebox_reply(
    xid: u32,
    prog: nfs3::NFSProgram,
    output: &mut impl Write,
) -> Result<(), anyhow::Error> {
    use nfs3::NFSProgram::*;
    xdr::rpc::make_success_reply(xid).serialize(output)?;
    nfs3::nfsstat3::NFS3ERR_JUKEBOX.serialize(output)?;
    match prog {
        // resfail is void
        NFSPROC3_GETATTR | NFSPROC3_NULL | INVALID => {}
        // resfail carries one post_op_attr
        NFSPROC3_LOOKUP | NFSPROC3_ACCESS | NFSPROC3_READLINK | NFSPROC3_READ
        | NFSPROC3_READDIR | NFSPROC3_READDIRPLUS | NFSPROC3_FSSTAT | NFSPROC3_FSINFO
        | NFSPROC3_PATHCONF => {
            nfs3::post_op_attr::Void.serialize(output)?;
        }
        // resfail carries one wcc_data
        NFSPROC3_SETATTR | NFSPROC3_WRITE | NFSPROC3_CREATE | NFSPROC3_MKDIR
        | NFSPROC3_SYMLINK | NFSPROC3_MKNOD | NFSPROC3_REMOVE | NFSPROC3_RMDIR
        | NFSPROC3_COMMIT => {
            nfs3::wcc_data::default().serialize(output)?;
        }
        NFSPROC3_RENAME => {
            nfs3::wcc_data::default().serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
        }
        NFSPROC3_LINK => {
            nfs3::post_op_attr::Void.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
        }
    }
    Ok(())
}
