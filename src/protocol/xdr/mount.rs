//! XDR data structures for the MOUNT version 3 protocol (RFC 1813
//! Appendix I): procedure numbers, status codes, and the list shapes
//! returned by DUMP and EXPORT.

#![allow(dead_code)]
// Keep original RFC naming conventions for consistency with the specification
#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::cast::FromPrimitive;

use super::*;

/// MOUNT program number for RPC.
pub const PROGRAM: u32 = 100005;
/// MOUNT protocol version 3.
pub const VERSION: u32 = 3;

/// Maximum bytes in a path name.
pub const MNTPATHLEN: u32 = 1024;
/// Maximum bytes in a name.
pub const MNTNAMLEN: u32 = 255;
/// Maximum bytes in a V3 file handle.
pub const FHSIZE3: u32 = 64;

/// A server directory path, at most [`MNTPATHLEN`] bytes on the wire.
pub type dirpath = nfs3::nfsstring<MNTPATHLEN>;
/// A client host name, at most [`MNTNAMLEN`] bytes on the wire.
pub type name = nfs3::nfsstring<MNTNAMLEN>;

/// Status codes returned by MOUNT protocol operations.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum mountstat3 {
    /// No error
    #[default]
    MNT3_OK = 0,
    /// Not owner
    MNT3ERR_PERM = 1,
    /// No such file or directory
    MNT3ERR_NOENT = 2,
    /// I/O error
    MNT3ERR_IO = 5,
    /// Permission denied
    MNT3ERR_ACCES = 13,
    /// Not a directory
    MNT3ERR_NOTDIR = 20,
    /// Invalid argument
    MNT3ERR_INVAL = 22,
    /// Filename too long
    MNT3ERR_NAMETOOLONG = 63,
    /// Operation not supported
    MNT3ERR_NOTSUPP = 10004,
    /// A failure on the server
    MNT3ERR_SERVERFAULT = 10006,
}
SerializeEnum!(mountstat3);
DeserializeEnum!(mountstat3);

/// Successful MNT result: the root file handle of the export plus the
/// authentication flavors the server accepts.
#[derive(Clone, Debug, Default)]
pub struct mountres3_ok {
    /// Root file handle for the mounted export
    pub fhandle: Vec<u8>,
    /// Accepted authentication flavors
    pub auth_flavors: Vec<u32>,
}
DeserializeStruct!(mountres3_ok, fhandle, auth_flavors);
SerializeStruct!(mountres3_ok, fhandle, auth_flavors);

/// One element of the DUMP reply list: who mounted what.
#[derive(Clone, Debug, Default)]
pub struct mountbody {
    /// Host name of the mounting client
    pub ml_hostname: name,
    /// Export path the client mounted
    pub ml_directory: dirpath,
}
DeserializeStruct!(mountbody, ml_hostname, ml_directory);
SerializeStruct!(mountbody, ml_hostname, ml_directory);

/// One element of the EXPORT reply list: an export path and the groups
/// (address or CIDR strings here) allowed to reach it.
#[derive(Clone, Debug, Default)]
pub struct exportnode {
    /// The exported directory
    pub ex_dir: dirpath,
    /// Allowed client groups; empty means unrestricted
    pub ex_groups: Vec<name>,
}

impl Serialize for exportnode {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.ex_dir.serialize(dest)?;
        // groups are a linked list on the wire
        for group in &self.ex_groups {
            true.serialize(dest)?;
            group.serialize(dest)?;
        }
        false.serialize(dest)
    }
}

impl Deserialize for exportnode {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.ex_dir.deserialize(src)?;
        self.ex_groups.clear();
        while deserialize::<bool>(src)? {
            self.ex_groups.push(deserialize(src)?);
        }
        Ok(())
    }
}

/// Procedure numbers for the MOUNT version 3 protocol.
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
pub enum MountProgram {
    /// Null procedure for service availability testing
    MOUNTPROC3_NULL = 0,
    /// Mount a file system
    MOUNTPROC3_MNT = 1,
    /// List all known mount records
    MOUNTPROC3_DUMP = 2,
    /// Unmount a file system
    MOUNTPROC3_UMNT = 3,
    /// Unmount all file systems mounted by the caller
    MOUNTPROC3_UMNTALL = 4,
    /// List exported file systems
    MOUNTPROC3_EXPORT = 5,
    /// Invalid procedure number
    INVALID,
}
