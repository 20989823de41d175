//! Implementation of the READDIRPLUS procedure (procedure 17) for NFS
//! version 3 as defined in RFC 1813 section 3.3.17.
//!
//! READDIRPLUS is READDIR with attributes and a file handle attached to
//! every entry, saving the client a LOOKUP per name. Two budgets apply:
//! `dircount` limits the directory bytes (ids, names, cookies) and
//! `maxcount` the total reply. Attributes come from the listing cache;
//! when the per-client handle quota is exhausted mid-listing the entry's
//! handle is omitted (the protocol allows it) rather than failing the call.

use std::io::{Read, Write};

use tracing::{debug, error, trace};

use crate::fs_util::cookieverf_from_mtime;
use crate::limit::OpClass;
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

use super::reply_budget::BudgetedWriter;

const REPLY_OVERHEAD: u32 = 128;

/// Handles the NFSv3 READDIRPLUS procedure.
pub async fn nfsproc3_readdirplus(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::dir::READDIRPLUS3args>(input)?;
    debug!("nfsproc3_readdirplus({xid},{args:?})");

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
            error!("nfsproc3_readdirplus error {xid} --> {stat:?}");
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
        debug!("nfsproc3_readdirplus bad cookie {xid}: cookie {start}, stale {stale_verifier}");
        xdr::rpc::make_success_reply(xid).serialize(output)?;
        nfs3::nfsstat3::NFS3ERR_BAD_COOKIE.serialize(output)?;
        nfs3::post_op_attr::attributes(dir_attr).serialize(output)?;
        return Ok(());
    }
    if args.maxcount <= REPLY_OVERHEAD {
        xdr::rpc::make_success_reply(xid).serialize(output)?;
        nfs3::nfsstat3::NFS3ERR_TOOSMALL.serialize(output)?;
        nfs3::post_op_attr::attributes(dir_attr).serialize(output)?;
        return Ok(());
    }
    let max_bytes_allowed = (args.maxcount - REPLY_OVERHEAD) as usize;
    let max_dir_bytes = args.dircount as usize;

    let mut reply = BudgetedWriter::new(output, max_bytes_allowed);
    xdr::rpc::make_success_reply(xid).serialize(&mut reply)?;
    nfs3::nfsstat3::NFS3_OK.serialize(&mut reply)?;
    nfs3::post_op_attr::attributes(dir_attr).serialize(&mut reply)?;
    verifier.serialize(&mut reply)?;

    let client = Some(context.client_addr.ip());
    let mut all_entries_written = true;
    let mut accumulated_dircount = 0_usize;
    let mut written = 0_usize;
    for (index, entry) in entries.iter().enumerate().skip(start) {
        let child = context.facade.child_node(&dir, &entry.name);
        let name_handle = match &child {
            Ok(node) => match context.facade.ensure_handle(node, client) {
                Ok(fh) => nfs3::post_op_fh3::handle(fh),
                // quota exhausted: the client falls back to LOOKUP
                Err(_) => nfs3::post_op_fh3::Void,
            },
            Err(_) => nfs3::post_op_fh3::Void,
        };
        let name_attributes = match &child {
            Ok(node) => {
                nfs3::post_op_attr::attributes(context.facade.listing_attr(node, entry))
            }
            Err(_) => nfs3::post_op_attr::Void,
        };
        let wire_entry = nfs3::dir::entryplus3 {
            fileid: entry.fileid,
            name: entry.name.as_str().into(),
            cookie: (index + 1) as nfs3::cookie3,
            name_attributes,
            name_handle,
        };
        let added_dircount = std::mem::size_of::<nfs3::fileid3>()
            + std::mem::size_of::<u32>()
            + entry.name.len()
            + std::mem::size_of::<nfs3::cookie3>();
        let mut entry_buf: Vec<u8> = Vec::new();
        true.serialize(&mut entry_buf)?;
        wire_entry.serialize(&mut entry_buf)?;
        if !reply.fits(entry_buf.len()) || accumulated_dircount + added_dircount >= max_dir_bytes {
            trace!("nfsproc3_readdirplus truncating at entry {index}");
            all_entries_written = false;
            break;
        }
        reply.write_all(&entry_buf)?;
        accumulated_dircount += added_dircount;
        written += 1;
    }
    false.serialize(&mut reply)?;
    let eof = all_entries_written;
    eof.serialize(&mut reply)?;
    debug!(
        "nfsproc3_readdirplus {xid}: start {start}, wrote {written}/{} entries in {} bytes, eof {eof}",
        entries.len(),
        reply.bytes_written()
    );
    Ok(())
}
