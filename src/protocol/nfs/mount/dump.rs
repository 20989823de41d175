//! Implementation of the DUMP procedure (procedure 2) for MOUNT version 3
//! as defined in RFC 1813 Appendix I section I.4.3.
//!
//! DUMP returns the advisory mount-record list as an XDR linked list of
//! (hostname, directory) pairs.

use std::io::Write;

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, mount, Serialize};

/// Handles the MOUNT DUMP procedure.
pub fn mountproc3_dump(
    xid: u32,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let records = context.mounts.list();
    debug!("mountproc3_dump({xid}) --> {} records", records.len());

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    for record in &records {
        true.serialize(output)?;
        let body = mount::mountbody {
            ml_hostname: record.client.to_string().as_str().into(),
            ml_directory: record.export.as_str().into(),
        };
        body.serialize(output)?;
    }
    false.serialize(output)?;
    Ok(())
}
