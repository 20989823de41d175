//! RPC (Remote Procedure Call) protocol implementation as specified in
//! RFC 5531.
//!
//! This layer owns everything between the TCP byte stream and the procedure
//! handlers:
//!
//! 1. Record-marked message framing with a hard record-size cap
//! 2. Credential validation: AUTH_NONE/AUTH_SYS parsing, the client
//!    allow-list, the privileged-port requirement, and uid/gid squashing
//! 3. Request-level rate limiting (global, per-address, per-connection)
//! 4. Per-connection retransmission suppression
//! 5. Program and version routing with the canned error replies
//!    (PROG_UNAVAIL, PROG_MISMATCH, PROC_UNAVAIL, GARBAGE_ARGS)
//!
//! Reply ordering needs no machinery of its own: the connection task in
//! `tcp` processes one call to completion before reading the next, so
//! replies leave in call order by construction.

mod auth;
mod context;
mod dedup;
mod wire;

pub use auth::{authenticate, Credentials};
pub use context::Context;
pub use dedup::CallDedup;
pub use wire::{handle_rpc, read_record, write_fragment, MAX_RPC_RECORD_LENGTH};

pub(crate) use wire::is_decode_error;
