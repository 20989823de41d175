//! MOUNT protocol version 3 implementation (RFC 1813 Appendix I).
//!
//! The MOUNT protocol bootstraps NFS access: MNT hands a client the root
//! file handle of an export, EXPORT advertises what is exported and to
//! whom, and DUMP/UMNT/UMNTALL maintain the advisory mount-record table.
//! The records exist for DUMP reporting only; NFS is stateless, so
//! unmounting never revokes file handles.

use std::io::{Read, Write};
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::SystemTime;

use num_traits::cast::FromPrimitive;
use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, mount, Serialize};

mod dump;
mod export;
mod mnt;
mod null;
mod umnt;
mod umnt_all;

use dump::mountproc3_dump;
use export::mountproc3_export;
use mnt::mountproc3_mnt;
use null::mountproc3_null;
use umnt::mountproc3_umnt;
use umnt_all::mountproc3_umnt_all;

/// One advisory mount record, as reported by DUMP.
#[derive(Clone, Debug)]
pub struct MountRecord {
    /// Client address (MOUNT has no authenticated hostname)
    pub client: IpAddr,
    /// The export path the client mounted
    pub export: String,
    /// When the mount was recorded
    pub mounted_at: SystemTime,
}

/// The advisory table of active mounts.
#[derive(Default)]
pub struct MountTable {
    records: Mutex<Vec<MountRecord>>,
}

impl MountTable {
    /// Creates an empty table.
    pub fn new() -> MountTable {
        MountTable::default()
    }

    /// Records a mount, replacing any previous record of the same client
    /// and export.
    pub fn add(&self, client: IpAddr, export: &str) {
        let mut records = self.records.lock().unwrap();
        records.retain(|r| !(r.client == client && r.export == export));
        records.push(MountRecord {
            client,
            export: export.to_string(),
            mounted_at: SystemTime::now(),
        });
    }

    /// Removes the record of one client/export pair.
    pub fn remove(&self, client: IpAddr, export: &str) {
        self.records
            .lock()
            .unwrap()
            .retain(|r| !(r.client == client && r.export == export));
    }

    /// Removes every record of one client.
    pub fn remove_all(&self, client: IpAddr) {
        self.records.lock().unwrap().retain(|r| r.client != client);
    }

    /// A snapshot of all records.
    pub fn list(&self) -> Vec<MountRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// True when no mounts are recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Routes one MOUNT program call to its handler.
pub async fn handle_mount(
    xid: u32,
    call: xdr::rpc::call_body,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
    throttled: bool,
) -> Result<(), anyhow::Error> {
    if call.vers != mount::VERSION {
        debug!("invalid MOUNT version {} != {}", call.vers, mount::VERSION);
        xdr::rpc::prog_mismatch_reply_message(xid, mount::VERSION).serialize(output)?;
        return Ok(());
    }
    let prog = mount::MountProgram::from_u32(call.proc).unwrap_or(mount::MountProgram::INVALID);

    // MNT is the only MOUNT procedure with a status to throttle through;
    // the rest are trivial and processed regardless.
    if throttled && prog == mount::MountProgram::MOUNTPROC3_MNT {
        debug!("throttling MNT xid {xid} from {}", context.client_addr);
        xdr::rpc::make_success_reply(xid).serialize(output)?;
        mount::mountstat3::MNT3ERR_SERVERFAULT.serialize(output)?;
        return Ok(());
    }

    let result = match prog {
        mount::MountProgram::MOUNTPROC3_NULL => mountproc3_null(xid, output),
        mount::MountProgram::MOUNTPROC3_MNT => mountproc3_mnt(xid, input, output, context).await,
        mount::MountProgram::MOUNTPROC3_DUMP => mountproc3_dump(xid, output, context),
        mount::MountProgram::MOUNTPROC3_UMNT => {
            mountproc3_umnt(xid, input, output, context).await
        }
        mount::MountProgram::MOUNTPROC3_UMNTALL => {
            mountproc3_umnt_all(xid, input, output, context).await
        }
        mount::MountProgram::MOUNTPROC3_EXPORT => mountproc3_export(xid, output, context),
        mount::MountProgram::INVALID => {
            xdr::rpc::proc_unavail_reply_message(xid).serialize(output)?;
            Ok(())
        }
    };
    match result {
        Ok(()) => Ok(()),
        // handlers decode their arguments before writing any reply bytes,
        // so a decode failure can still be answered in-band
        Err(e) if rpc::is_decode_error(&e) => {
            debug!("garbage MOUNT args for xid {xid}: {e}");
            xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}
