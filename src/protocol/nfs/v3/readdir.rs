//! Implementation of the READDIR procedure (procedure 16) for NFS version 3
//! as defined in RFC 1813 section 3.3.16.
//!
//! Pagination is cookie-based: a cookie is the 1-based index of the last
//! entry already returned, zero starts iteration. The cookie verifier packs
//! the directory's mtime; a stale verifier (the directory changed between
//! pages) is NFS3ERR_BAD_COOKIE. The reply never exceeds the client's
//! `count` budget, tracked with a counting writer while entries are
//! serialized one at a time.

use std::io::{Read, Write};

use tracing::{debug, error, trace};

use crate::fs_util::cookieverf_from_mtime;
use crate::limit::OpClass;
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

use super::reply_budget::BudgetedWriter;

// room reserved for the reply envelope, attributes and trailing flags
const REPLY_OVERHEAD: u32 = 128;

/// Handles the NFSv3 READDIR procedure.
pub async fn nfsproc3_readdir(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::dir::READDIR3args>(input)?;
    debug!("nfsproc3_readdir({xid},{args:?})");

    if let Some(limiter) = context.limiter() {
        if !limiter.check_class(context.client_addr.ip(), OpClass::Readdir) {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3ERR_JUKEBOX.serialize(output)?;
            nfs3::post_op_attr::Void.serialize(output)?;
            return Ok(());
        }
    }

    let dir = match context.facade.resolve(&args.dir) {
        Ok(node) => node,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::post_op_attr::Void.serialize(output)?;
            return Ok(());
        }
    };
    let (entries, dir_attr) = match context.facade.readdir(&dir).await {
        Ok(listing) => listing,
        Err(stat) => {
            error!("nfsproc3_readdir error {xid} --> {stat:?}");
            let attr = context.facade.post_op(&dir).await;
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            attr.serialize(output)?;
            return Ok(());
        }
    };

    let verifier = cookieverf_from_mtime(dir_attr.mtime);
    let start = args.cookie as usize;
    let stale_verifier =
        args.cookieverf != nfs3::cookieverf3::default() && args.cookieverf != verifier;
    if stale_verifier || start > entries.len() {
        debug!("nfsproc3_readdir bad cookie {xid}: cookie {start}, stale {stale_verifier}");
        xdr::rpc::make_success_reply(xid).serialize(output)?;
        nfs3::nfsstat3::NFS3ERR_BAD_COOKIE.serialize(output)?;
        nfs3::post_op_attr::attributes(dir_attr).serialize(output)?;
        return Ok(());
    }
    if args.count <= REPLY_OVERHEAD {
        xdr::rpc::make_success_reply(xid).serialize(output)?;
        nfs3::nfsstat3::NFS3ERR_TOOSMALL.serialize(output)?;
        nfs3::post_op_attr::attributes(dir_attr).serialize(output)?;
        return Ok(());
    }
    let max_bytes_allowed = (args.count - REPLY_OVERHEAD) as usize;

    let mut reply = BudgetedWriter::new(output, max_bytes_allowed);
    xdr::rpc::make_success_reply(xid).serialize(&mut reply)?;
    nfs3::nfsstat3::NFS3_OK.serialize(&mut reply)?;
    nfs3::post_op_attr::attributes(dir_attr).serialize(&mut reply)?;
    verifier.serialize(&mut reply)?;

    let mut all_entries_written = true;
    let mut written = 0_usize;
    for (index, entry) in entries.iter().enumerate().skip(start) {
        let wire_entry = nfs3::dir::entry3 {
            fileid: entry.fileid,
            name: entry.name.as_str().into(),
            cookie: (index + 1) as nfs3::cookie3,
        };
        let mut entry_buf: Vec<u8> = Vec::new();
        // leading true marks one more list element
        true.serialize(&mut entry_buf)?;
        wire_entry.serialize(&mut entry_buf)?;
        if !reply.fits(entry_buf.len()) {
            trace!("nfsproc3_readdir truncating at entry {index}");
            all_entries_written = false;
            break;
        }
        reply.write_all(&entry_buf)?;
        written += 1;
    }
    // terminate the entry list
    false.serialize(&mut reply)?;
    let eof = all_entries_written;
    eof.serialize(&mut reply)?;
    debug!(
        "nfsproc3_readdir {xid}: start {start}, wrote {written}/{} entries in {} bytes, eof {eof}",
        entries.len(),
        reply.bytes_written()
    );
    Ok(())
}
