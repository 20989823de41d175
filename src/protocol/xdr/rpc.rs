//! Data structures for the Remote Procedure Call protocol as defined in
//! RFC 5531. These cover the message envelope shared by the NFS and MOUNT
//! programs: call/reply bodies, credentials, and the canned reply shapes the
//! dispatcher emits for protocol-level failures.

// The complete RFC structure set is implemented even where the server only
// produces (or only consumes) a given message.
#![allow(dead_code)]
// Keep original RFC naming conventions for consistency with the specification
#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::cast::FromPrimitive;

use super::*;

/// RFC 5531 caps the opaque body of an `opaque_auth` at 400 bytes.
pub const MAX_AUTH_BODY_LEN: u32 = 400;

/// Maximum machine name length inside AUTH_SYS credentials.
pub const MAX_MACHINE_NAME_LEN: u32 = 255;

/// Maximum number of auxiliary group ids accepted in AUTH_SYS credentials.
pub const MAX_AUTH_GIDS: u32 = 16;

/// Authentication status codes carried in MSG_DENIED replies.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum auth_stat {
    /// Invalid credentials (could not be parsed or verified)
    #[default]
    AUTH_BADCRED = 1,
    /// Credentials rejected; the client must begin a new session
    AUTH_REJECTEDCRED = 2,
    /// Invalid verifier
    AUTH_BADVERF = 3,
    /// Verifier expired or replayed
    AUTH_REJECTEDVERF = 4,
    /// Authentication rejected by server policy
    AUTH_TOOWEAK = 5,
}
SerializeEnum!(auth_stat);
DeserializeEnum!(auth_stat);

/// Authentication flavor identifiers.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum auth_flavor {
    /// No authentication
    #[default]
    AUTH_NONE = 0,
    /// UNIX-style uid/gid credentials
    AUTH_SYS = 1,
    /// Short-form authentication
    AUTH_SHORT = 2,
    /// DES authentication
    AUTH_DES = 3,
}
SerializeEnum!(auth_flavor);
DeserializeEnum!(auth_flavor);

/// UNIX-style credentials carried in the AUTH_SYS opaque body.
///
/// The body layout is: stamp, machine name, uid, gid, auxiliary gids. All
/// variable parts are bounded during deserialization; a violation is a parse
/// failure which the dispatcher answers with MSG_DENIED / AUTH_BADCRED.
#[derive(Clone, Debug, Default)]
pub struct auth_sys {
    /// Arbitrary client-chosen stamp
    pub stamp: u32,
    /// Name of the client machine
    pub machinename: Vec<u8>,
    /// Effective user id of the caller
    pub uid: u32,
    /// Effective group id of the caller
    pub gid: u32,
    /// Auxiliary group ids, at most [`MAX_AUTH_GIDS`]
    pub gids: Vec<u32>,
}

impl Serialize for auth_sys {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.stamp.serialize(dest)?;
        write_opaque(dest, &self.machinename)?;
        self.uid.serialize(dest)?;
        self.gid.serialize(dest)?;
        self.gids.serialize(dest)
    }
}

impl Deserialize for auth_sys {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.stamp.deserialize(src)?;
        self.machinename = read_opaque_max(src, MAX_MACHINE_NAME_LEN)?;
        self.uid.deserialize(src)?;
        self.gid.deserialize(src)?;
        let count = deserialize::<u32>(src)?;
        if count > MAX_AUTH_GIDS {
            return Err(invalid_data(format!("auth_sys gid count {count} exceeds cap")));
        }
        self.gids.clear();
        for _ in 0..count {
            self.gids.push(deserialize::<u32>(src)?);
        }
        Ok(())
    }
}

/// An authentication field as carried on the wire: a flavor discriminant and
/// an opaque body interpreted according to the flavor.
#[derive(Clone, Debug)]
pub struct opaque_auth {
    /// The authentication mechanism in use
    pub flavor: auth_flavor,
    /// The opaque body for that mechanism, at most 400 bytes
    pub body: Vec<u8>,
}

impl Default for opaque_auth {
    fn default() -> opaque_auth {
        opaque_auth { flavor: auth_flavor::AUTH_NONE, body: Vec::new() }
    }
}

impl Serialize for opaque_auth {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.flavor.serialize(dest)?;
        write_opaque(dest, &self.body)
    }
}

impl Deserialize for opaque_auth {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.flavor.deserialize(src)?;
        self.body = read_opaque_max(src, MAX_AUTH_BODY_LEN)?;
        Ok(())
    }
}

/// The RPC message envelope: a transaction id followed by either a CALL or a
/// REPLY body. The xid is only used to match replies to calls and to detect
/// retransmissions; it is not a sequence number.
#[derive(Clone, Debug, Default)]
pub struct rpc_msg {
    /// Transaction identifier chosen by the client
    pub xid: u32,
    /// Call or reply payload
    pub body: rpc_body,
}
DeserializeStruct!(rpc_msg, xid, body);
SerializeStruct!(rpc_msg, xid, body);

/// Discriminated body of an RPC message.
#[derive(Clone, Debug)]
#[repr(u32)]
pub enum rpc_body {
    /// A call to a remote procedure
    CALL(call_body),
    /// A reply from a remote procedure
    REPLY(reply_body),
}

impl Default for rpc_body {
    fn default() -> rpc_body {
        rpc_body::CALL(call_body::default())
    }
}

impl Serialize for rpc_body {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            rpc_body::CALL(v) => {
                0_u32.serialize(dest)?;
                v.serialize(dest)
            }
            rpc_body::REPLY(v) => {
                1_u32.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for rpc_body {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match deserialize::<u32>(src)? {
            0 => *self = rpc_body::CALL(deserialize(src)?),
            1 => *self = rpc_body::REPLY(deserialize(src)?),
            msg_type => {
                return Err(invalid_data(format!("invalid message type in rpc_body: {msg_type}")))
            }
        }
        Ok(())
    }
}

/// The body of an RPC call: program routing plus two auth fields.
#[derive(Clone, Debug, Default)]
pub struct call_body {
    /// RPC protocol version, must be 2
    pub rpcvers: u32,
    /// Program number to call
    pub prog: u32,
    /// Version of that program
    pub vers: u32,
    /// Procedure within the program
    pub proc: u32,
    /// Caller credentials
    pub cred: opaque_auth,
    /// Caller verifier
    pub verf: opaque_auth,
    // procedure-specific arguments follow in the record
}
DeserializeStruct!(call_body, rpcvers, prog, vers, proc, cred, verf);
SerializeStruct!(call_body, rpcvers, prog, vers, proc, cred, verf);

/// The body of an RPC reply: accepted or denied.
#[derive(Clone, Debug)]
pub enum reply_body {
    /// The call was accepted (though processing may still have failed)
    MSG_ACCEPTED(accepted_reply),
    /// The call was rejected at the RPC layer
    MSG_DENIED(rejected_reply),
}

impl Default for reply_body {
    fn default() -> reply_body {
        reply_body::MSG_ACCEPTED(accepted_reply::default())
    }
}

impl Serialize for reply_body {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            reply_body::MSG_ACCEPTED(v) => {
                0_u32.serialize(dest)?;
                v.serialize(dest)
            }
            reply_body::MSG_DENIED(v) => {
                1_u32.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for reply_body {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match deserialize::<u32>(src)? {
            0 => *self = reply_body::MSG_ACCEPTED(deserialize(src)?),
            1 => *self = reply_body::MSG_DENIED(deserialize(src)?),
            reply_stat => {
                return Err(invalid_data(format!(
                    "invalid reply status in reply_body: {reply_stat}"
                )))
            }
        }
        Ok(())
    }
}

/// Range of program versions supported, returned on version mismatch.
#[derive(Copy, Clone, Debug, Default)]
pub struct mismatch_info {
    /// Lowest supported version
    pub low: u32,
    /// Highest supported version
    pub high: u32,
}
DeserializeStruct!(mismatch_info, low, high);
SerializeStruct!(mismatch_info, low, high);

/// Reply to a call the server accepted. The verifier authenticates the
/// server back to the client (always AUTH_NONE here); the data union is
/// discriminated by the accept status.
#[derive(Clone, Debug, Default)]
pub struct accepted_reply {
    /// Server verifier
    pub verf: opaque_auth,
    /// Accept status plus status-specific data
    pub reply_data: accept_body,
}
DeserializeStruct!(accepted_reply, verf, reply_data);
SerializeStruct!(accepted_reply, verf, reply_data);

/// Outcomes of an accepted RPC call.
#[derive(Clone, Debug, Default)]
#[repr(u32)]
pub enum accept_body {
    /// Call completed; procedure-specific results follow in the record
    #[default]
    SUCCESS,
    /// The requested program is not served here
    PROG_UNAVAIL,
    /// The program version is not served; the supported range follows
    PROG_MISMATCH(mismatch_info),
    /// The procedure number is unknown
    PROC_UNAVAIL,
    /// The procedure arguments could not be decoded
    GARBAGE_ARGS,
    /// Internal server error
    SYSTEM_ERR,
}

impl Serialize for accept_body {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            accept_body::SUCCESS => 0_u32.serialize(dest),
            accept_body::PROG_UNAVAIL => 1_u32.serialize(dest),
            accept_body::PROG_MISMATCH(v) => {
                2_u32.serialize(dest)?;
                v.serialize(dest)
            }
            accept_body::PROC_UNAVAIL => 3_u32.serialize(dest),
            accept_body::GARBAGE_ARGS => 4_u32.serialize(dest),
            accept_body::SYSTEM_ERR => 5_u32.serialize(dest),
        }
    }
}

impl Deserialize for accept_body {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match deserialize::<u32>(src)? {
            0 => *self = accept_body::SUCCESS,
            1 => *self = accept_body::PROG_UNAVAIL,
            2 => *self = accept_body::PROG_MISMATCH(deserialize(src)?),
            3 => *self = accept_body::PROC_UNAVAIL,
            4 => *self = accept_body::GARBAGE_ARGS,
            5 => *self = accept_body::SYSTEM_ERR,
            accept_stat => {
                return Err(invalid_data(format!(
                    "invalid accept stat in accept_body: {accept_stat}"
                )))
            }
        }
        Ok(())
    }
}

/// Reply to a call the server rejected: either an RPC version mismatch or an
/// authentication failure.
#[derive(Clone, Debug)]
pub enum rejected_reply {
    /// RPC version not supported; supported range follows
    RPC_MISMATCH(mismatch_info),
    /// Authentication rejected for the given reason
    AUTH_ERROR(auth_stat),
}

impl Default for rejected_reply {
    fn default() -> rejected_reply {
        rejected_reply::AUTH_ERROR(auth_stat::default())
    }
}

impl Serialize for rejected_reply {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            rejected_reply::RPC_MISMATCH(v) => {
                0_u32.serialize(dest)?;
                v.serialize(dest)
            }
            rejected_reply::AUTH_ERROR(v) => {
                1_u32.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for rejected_reply {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match deserialize::<u32>(src)? {
            0 => *self = rejected_reply::RPC_MISMATCH(deserialize(src)?),
            1 => *self = rejected_reply::AUTH_ERROR(deserialize(src)?),
            stat => {
                return Err(invalid_data(format!("invalid reject stat in rejected_reply: {stat}")))
            }
        }
        Ok(())
    }
}

/// Builds a reply indicating the requested procedure is unknown.
pub fn proc_unavail_reply_message(xid: u32) -> rpc_msg {
    let reply = reply_body::MSG_ACCEPTED(accepted_reply {
        verf: opaque_auth::default(),
        reply_data: accept_body::PROC_UNAVAIL,
    });
    rpc_msg { xid, body: rpc_body::REPLY(reply) }
}

/// Builds a reply indicating the requested program is not served here.
pub fn prog_unavail_reply_message(xid: u32) -> rpc_msg {
    let reply = reply_body::MSG_ACCEPTED(accepted_reply {
        verf: opaque_auth::default(),
        reply_data: accept_body::PROG_UNAVAIL,
    });
    rpc_msg { xid, body: rpc_body::REPLY(reply) }
}

/// Builds a reply indicating a program version mismatch.
pub fn prog_mismatch_reply_message(xid: u32, accepted_ver: u32) -> rpc_msg {
    let reply = reply_body::MSG_ACCEPTED(accepted_reply {
        verf: opaque_auth::default(),
        reply_data: accept_body::PROG_MISMATCH(mismatch_info {
            low: accepted_ver,
            high: accepted_ver,
        }),
    });
    rpc_msg { xid, body: rpc_body::REPLY(reply) }
}

/// Builds a reply indicating the procedure arguments could not be decoded.
pub fn garbage_args_reply_message(xid: u32) -> rpc_msg {
    let reply = reply_body::MSG_ACCEPTED(accepted_reply {
        verf: opaque_auth::default(),
        reply_data: accept_body::GARBAGE_ARGS,
    });
    rpc_msg { xid, body: rpc_body::REPLY(reply) }
}

/// Builds a MSG_DENIED reply for an RPC version other than 2.
pub fn rpc_vers_mismatch(xid: u32) -> rpc_msg {
    let reply = reply_body::MSG_DENIED(rejected_reply::RPC_MISMATCH(mismatch_info {
        low: 2,
        high: 2,
    }));
    rpc_msg { xid, body: rpc_body::REPLY(reply) }
}

/// Builds a MSG_DENIED reply carrying an authentication failure.
pub fn auth_error_reply_message(xid: u32, stat: auth_stat) -> rpc_msg {
    let reply = reply_body::MSG_DENIED(rejected_reply::AUTH_ERROR(stat));
    rpc_msg { xid, body: rpc_body::REPLY(reply) }
}

/// Builds the accepted-success envelope; the procedure-specific result is
/// serialized immediately after it.
pub fn make_success_reply(xid: u32) -> rpc_msg {
    let reply = reply_body::MSG_ACCEPTED(accepted_reply {
        verf: opaque_auth::default(),
        reply_data: accept_body::SUCCESS,
    });
    rpc_msg { xid, body: rpc_body::REPLY(reply) }
}
