//! RPC record framing and the call dispatcher.
//!
//! Incoming bytes are reassembled from record-marking fragments (RFC 5531
//! §11) by [`read_record`], capped at [`MAX_RPC_RECORD_LENGTH`] per record.
//! Each complete record runs through [`handle_rpc`]: header decode,
//! retransmission check, credential validation, request-level rate
//! limiting, and routing to the NFS or MOUNT program handler. Anything
//! other than those two programs is answered with PROG_UNAVAIL.
//!
//! There is no reply pipeline here: the connection task in `tcp` reads one
//! record, awaits its reply, writes it, and only then reads the next call,
//! so replies are in call order by construction.
//!
//! Decode failures of the procedure arguments surface as GARBAGE_ARGS
//! replies inside the program handlers; a failure to decode the RPC header
//! itself is unrecoverable for the connection and terminates it.

use std::io::{Read, Write};

use anyhow::anyhow;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, trace, warn};

use crate::protocol::xdr::{self, deserialize, mount, nfs3, Serialize};
use crate::protocol::{nfs, rpc};

/// Hard cap on a reassembled RPC record: the 1 MiB transfer ceiling plus
/// generous protocol overhead.
pub const MAX_RPC_RECORD_LENGTH: usize = 2 * 1024 * 1024;

/// True when an error from a procedure handler is an XDR argument-decode
/// failure (malformed or short arguments), which is answered with
/// GARBAGE_ARGS rather than terminating the connection.
pub(crate) fn is_decode_error(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<std::io::Error>().map(std::io::Error::kind),
        Some(std::io::ErrorKind::InvalidData) | Some(std::io::ErrorKind::UnexpectedEof)
    )
}

/// Processes a single RPC record: decodes the envelope, enforces the
/// protocol version, drops retransmissions, authenticates, applies the
/// request-level rate limit, and routes to the program handler.
///
/// Returns true when a reply was produced, false when the record was
/// silently dropped (retransmission).
pub async fn handle_rpc(
    input: &mut impl Read,
    output: &mut impl Write,
    mut context: rpc::Context,
) -> Result<bool, anyhow::Error> {
    let recv = deserialize::<xdr::rpc::rpc_msg>(input)?;
    let xid = recv.xid;
    let xdr::rpc::rpc_body::CALL(call) = recv.body else {
        error!("unexpectedly received a Reply instead of a Call");
        return Err(anyhow!("bad RPC call format"));
    };

    if call.rpcvers != 2 {
        warn!("invalid RPC version {} != 2", call.rpcvers);
        xdr::rpc::rpc_vers_mismatch(xid).serialize(output)?;
        return Ok(true);
    }

    if !context.dedup.begin(xid) {
        debug!("retransmission detected, xid: {xid}, client: {}", context.client_addr);
        return Ok(false);
    }

    match rpc::authenticate(&call.cred, context.client_addr, &context.config) {
        Ok(creds) => context.auth = creds,
        Err(stat) => {
            debug!("denying xid {xid} from {}: {stat:?}", context.client_addr);
            xdr::rpc::auth_error_reply_message(xid, stat).serialize(output)?;
            context.dedup.complete(xid);
            return Ok(true);
        }
    }

    let throttled = match context.limiter() {
        Some(limiter) => {
            !limiter.check_request(context.client_addr.ip(), context.conn_id)
        }
        None => false,
    };

    let res = match call.prog {
        nfs3::PROGRAM => {
            nfs::v3::handle_nfs(xid, call, input, output, &context, throttled).await
        }
        mount::PROGRAM => {
            nfs::mount::handle_mount(xid, call, input, output, &context, throttled).await
        }
        unknown_program => {
            trace!("unknown RPC program {unknown_program}, replying PROG_UNAVAIL");
            xdr::rpc::prog_unavail_reply_message(xid).serialize(output)?;
            Ok(())
        }
    }
    .map(|_| true);
    context.dedup.complete(xid);
    res
}

/// Reads one complete record-marked RPC record from the stream,
/// reassembling fragments. The running record size is validated against
/// [`MAX_RPC_RECORD_LENGTH`] before any fragment payload is read.
///
/// Returns `Ok(None)` when the peer closed the stream at a record boundary
/// (the normal end of a connection); end-of-stream inside a record is an
/// error.
pub async fn read_record(
    stream: &mut (impl AsyncRead + Unpin),
) -> Result<Option<Vec<u8>>, anyhow::Error> {
    let mut record: Vec<u8> = Vec::new();
    loop {
        let mut header_buf = [0_u8; 4];
        match stream.read_exact(&mut header_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof && record.is_empty() => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }
        let fragment_header = u32::from_be_bytes(header_buf);
        let is_last = (fragment_header & (1 << 31)) > 0;
        let length = (fragment_header & ((1 << 31) - 1)) as usize;
        trace!("reading fragment length:{length}, last:{is_last}");
        if record.len().saturating_add(length) > MAX_RPC_RECORD_LENGTH {
            return Err(anyhow!(
                "RPC record length {} exceeds max {}",
                length,
                MAX_RPC_RECORD_LENGTH
            ));
        }
        let start_offset = record.len();
        record.resize(start_offset + length, 0);
        stream.read_exact(&mut record[start_offset..]).await?;
        if is_last {
            return Ok(Some(record));
        }
    }
}

/// Writes `buf` to the stream as record-marking fragments.
pub async fn write_fragment(
    stream: &mut (impl AsyncWrite + Unpin),
    buf: &[u8],
) -> Result<(), anyhow::Error> {
    const MAX_FRAGMENT_SIZE: usize = (1 << 31) - 1;

    let mut offset = 0;
    while offset < buf.len() {
        let remaining = buf.len() - offset;
        let fragment_size = std::cmp::min(remaining, MAX_FRAGMENT_SIZE);
        let is_last = offset + fragment_size >= buf.len();
        // high bit marks the last fragment
        let fragment_header =
            if is_last { fragment_size as u32 | (1 << 31) } else { fragment_size as u32 };

        stream.write_all(&u32::to_be_bytes(fragment_header)).await?;
        trace!("writing fragment length:{fragment_size}, last:{is_last}");
        stream.write_all(&buf[offset..offset + fragment_size]).await?;
        offset += fragment_size;
    }
    Ok(())
}
