//! Credential validation and access control for incoming calls.
//!
//! Every call passes through [`authenticate`] after its header is decoded:
//! the credential flavor is parsed (AUTH_NONE and AUTH_SYS only), the peer
//! address is checked against the export allow-list, the privileged-port
//! requirement is applied, and the squash policy rewrites the resulting
//! uid/gid pair. Any failure is surfaced at the RPC layer as MSG_DENIED
//! with the returned [`auth_stat`](rpc::auth_stat).

use std::io::Cursor;
use std::net::SocketAddr;

use tracing::{debug, warn};

use crate::config::{ServerConfig, SquashMode, NOBODY_GID, NOBODY_UID};
use crate::protocol::xdr::{deserialize, rpc};

/// The resolved identity of a caller, after squashing.
#[derive(Clone, Debug)]
pub struct Credentials {
    /// Effective user id
    pub uid: u32,
    /// Effective group id
    pub gid: u32,
    /// Auxiliary group ids
    pub gids: Vec<u32>,
    /// Client machine name from AUTH_SYS, if any
    pub machinename: String,
}

impl Default for Credentials {
    fn default() -> Credentials {
        // unauthenticated callers act as nobody
        Credentials {
            uid: NOBODY_UID,
            gid: NOBODY_GID,
            gids: Vec::new(),
            machinename: String::new(),
        }
    }
}

/// Validates the credential of one call and applies the access-control
/// policy for `peer`. Returns the effective credentials, or the auth status
/// to deny the call with.
pub fn authenticate(
    cred: &rpc::opaque_auth,
    peer: SocketAddr,
    config: &ServerConfig,
) -> Result<Credentials, rpc::auth_stat> {
    let mut creds = match cred.flavor {
        rpc::auth_flavor::AUTH_NONE => Credentials::default(),
        rpc::auth_flavor::AUTH_SYS => {
            let parsed: rpc::auth_sys =
                deserialize(&mut Cursor::new(&cred.body)).map_err(|e| {
                    warn!("malformed AUTH_SYS credential from {peer}: {e}");
                    rpc::auth_stat::AUTH_BADCRED
                })?;
            Credentials {
                uid: parsed.uid,
                gid: parsed.gid,
                gids: parsed.gids,
                machinename: String::from_utf8_lossy(&parsed.machinename).into_owned(),
            }
        }
        other => {
            debug!("rejecting unsupported auth flavor {other:?} from {peer}");
            return Err(rpc::auth_stat::AUTH_REJECTEDCRED);
        }
    };

    if !config.ip_allowed(peer.ip()) {
        debug!("peer {peer} not in allow-list");
        return Err(rpc::auth_stat::AUTH_TOOWEAK);
    }
    if config.secure && peer.port() >= 1024 {
        debug!("peer {peer} rejected: unprivileged source port");
        return Err(rpc::auth_stat::AUTH_TOOWEAK);
    }

    match config.squash {
        SquashMode::None => {}
        SquashMode::Root => {
            if creds.uid == 0 {
                creds.uid = NOBODY_UID;
                creds.gid = NOBODY_GID;
            }
        }
        SquashMode::All => {
            creds.uid = NOBODY_UID;
            creds.gid = NOBODY_GID;
        }
    }
    Ok(creds)
}
