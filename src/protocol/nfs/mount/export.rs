//! Implementation of the EXPORT procedure (procedure 5) for MOUNT version 3
//! as defined in RFC 1813 Appendix I section I.4.6.
//!
//! EXPORT lists the exported directory and the client groups allowed to
//! reach it (the configured allow-list, rendered as address/CIDR strings;
//! an empty group list means unrestricted).

use std::io::Write;

use tracing::debug;

use crate::config::AllowedIp;
use crate::protocol::rpc;
use crate::protocol::xdr::{self, mount, Serialize};

/// Handles the MOUNT EXPORT procedure.
pub fn mountproc3_export(
    xid: u32,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    debug!("mountproc3_export({xid})");

    let groups: Vec<mount::name> = context
        .config
        .allowed_ips
        .iter()
        .map(|entry| match entry {
            AllowedIp::Addr(addr) => addr.to_string().as_str().into(),
            AllowedIp::Net(net) => net.to_string().as_str().into(),
        })
        .collect();
    let node = mount::exportnode {
        ex_dir: context.export_name.as_str().into(),
        ex_groups: groups,
    };

    xdr::rpc::make_success_reply(xid).serialize(output)?;
    true.serialize(output)?;
    node.serialize(output)?;
    false.serialize(output)?;
    Ok(())
}
