//! XDR data types and constants for NFS version 3 as defined in RFC 1813.
//!
//! The basic data types, status codes, and attribute structures shared by all
//! procedures live here; the per-operation argument and result structures are
//! split across the [`file`], [`dir`] and [`fs`] submodules.
//!
//! Deviation from the RFC worth knowing about: file names and paths are
//! length-bounded at decode time (255 and 4096 bytes respectively), and a
//! client-supplied length above the bound fails the decode before any payload
//! is read. The same applies to file handles, which are capped at the on-wire
//! maximum of 64 bytes here and narrowed to this server's 8-byte handle width
//! by the handle registry.

// The complete RFC type set is implemented, including messages only one side
// of the protocol ever produces.
#![allow(dead_code)]
// Preserve original RFC naming conventions for consistency with the specification
#![allow(non_camel_case_types)]

use std::fmt;
use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::cast::FromPrimitive;

use super::*;

pub mod dir;
pub mod file;
pub mod fs;

// Section 2.2 Constants
/// The RPC program number for the NFS version 3 service.
pub const PROGRAM: u32 = 100003;
/// The version number for the NFS version 3 protocol.
pub const VERSION: u32 = 3;

// Section 2.4 Sizes
/// Maximum on-wire size in bytes of an opaque file handle.
pub const NFS3_FHSIZE: u32 = 64;
/// Size in bytes of the cookie verifier passed by READDIR and READDIRPLUS.
pub const NFS3_COOKIEVERFSIZE: u32 = 8;
/// Size in bytes of the verifier used for exclusive CREATE.
pub const NFS3_CREATEVERFSIZE: u32 = 8;
/// Size in bytes of the verifier used for asynchronous WRITE.
pub const NFS3_WRITEVERFSIZE: u32 = 8;

/// Maximum length in bytes of a single path component.
pub const NFS3_MAXNAMLEN: u32 = 255;
/// Maximum length in bytes of a path or symlink target.
pub const NFS3_MAXPATHLEN: u32 = 4096;

/// A length-bounded NFS string: a vector of bytes whose decode refuses any
/// length prefix above `MAX` before allocating.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct nfsstring<const MAX: u32>(pub Vec<u8>);

impl<const MAX: u32> nfsstring<MAX> {
    /// Returns the length of the string in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the string is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const MAX: u32> From<Vec<u8>> for nfsstring<MAX> {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl<const MAX: u32> From<&[u8]> for nfsstring<MAX> {
    fn from(value: &[u8]) -> Self {
        Self(value.into())
    }
}

impl<const MAX: u32> From<&str> for nfsstring<MAX> {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().into())
    }
}

impl<const MAX: u32> AsRef<[u8]> for nfsstring<MAX> {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const MAX: u32> std::ops::Deref for nfsstring<MAX> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const MAX: u32> fmt::Debug for nfsstring<MAX> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl<const MAX: u32> fmt::Display for nfsstring<MAX> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl<const MAX: u32> Serialize for nfsstring<MAX> {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        write_opaque(dest, &self.0)
    }
}

impl<const MAX: u32> Deserialize for nfsstring<MAX> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.0 = read_opaque_max(src, MAX)?;
        Ok(())
    }
}

/// Procedure numbers for the NFS version 3 protocol.
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
pub enum NFSProgram {
    /// Do nothing - used primarily for performance measurement
    NFSPROC3_NULL = 0,
    /// Get file attributes
    NFSPROC3_GETATTR = 1,
    /// Set file attributes
    NFSPROC3_SETATTR = 2,
    /// Look up filename
    NFSPROC3_LOOKUP = 3,
    /// Check file access permission
    NFSPROC3_ACCESS = 4,
    /// Read from symbolic link
    NFSPROC3_READLINK = 5,
    /// Read from file
    NFSPROC3_READ = 6,
    /// Write to file
    NFSPROC3_WRITE = 7,
    /// Create file
    NFSPROC3_CREATE = 8,
    /// Create directory
    NFSPROC3_MKDIR = 9,
    /// Create symbolic link
    NFSPROC3_SYMLINK = 10,
    /// Create special device
    NFSPROC3_MKNOD = 11,
    /// Remove file
    NFSPROC3_REMOVE = 12,
    /// Remove directory
    NFSPROC3_RMDIR = 13,
    /// Rename file or directory
    NFSPROC3_RENAME = 14,
    /// Create hard link
    NFSPROC3_LINK = 15,
    /// Read directory
    NFSPROC3_READDIR = 16,
    /// Extended read directory
    NFSPROC3_READDIRPLUS = 17,
    /// Get file system statistics
    NFSPROC3_FSSTAT = 18,
    /// Get file system information
    NFSPROC3_FSINFO = 19,
    /// Get path configuration
    NFSPROC3_PATHCONF = 20,
    /// Commit cached data
    NFSPROC3_COMMIT = 21,
    /// Invalid procedure
    INVALID = 22,
}

/// String used for a component of a pathname, at most 255 bytes.
pub type filename3 = nfsstring<NFS3_MAXNAMLEN>;
/// String used for a pathname or symbolic link contents, at most 4096 bytes.
pub type nfspath3 = nfsstring<NFS3_MAXPATHLEN>;
/// A unique number identifying a file within a filesystem.
pub type fileid3 = u64;
/// Directory entry position cookie for READDIR and READDIRPLUS iteration.
pub type cookie3 = u64;
/// Cookie verifier used to detect that a directory changed mid-iteration.
pub type cookieverf3 = [u8; NFS3_COOKIEVERFSIZE as usize];
/// Verifier for exclusive CREATE idempotency.
pub type createverf3 = [u8; NFS3_CREATEVERFSIZE as usize];
/// Verifier used to detect server reboots between WRITE and COMMIT.
pub type writeverf3 = [u8; NFS3_WRITEVERFSIZE as usize];
/// User id of a file owner.
pub type uid3 = u32;
/// Group id of a file.
pub type gid3 = u32;
/// File size in bytes.
pub type size3 = u64;
/// Position within a file.
pub type offset3 = u64;
/// File mode bits.
pub type mode3 = u32;
/// Count of bytes or entries.
pub type count3 = u32;

/// Status codes returned by NFS version 3 operations.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum nfsstat3 {
    /// The call completed successfully.
    #[default]
    NFS3_OK = 0,
    /// Not owner: the caller is neither privileged nor the owner of the
    /// target of the operation.
    NFS3ERR_PERM = 1,
    /// The file or directory name specified does not exist.
    NFS3ERR_NOENT = 2,
    /// A hard error (for example, a disk error) occurred while processing
    /// the requested operation.
    NFS3ERR_IO = 5,
    /// No such device or address.
    NFS3ERR_NXIO = 6,
    /// Permission denied. Contrast with NFS3ERR_PERM, which restricts itself
    /// to owner or privileged-user permission failures.
    NFS3ERR_ACCES = 13,
    /// The file specified already exists.
    NFS3ERR_EXIST = 17,
    /// Attempt to do a cross-device hard link.
    NFS3ERR_XDEV = 18,
    /// No such device.
    NFS3ERR_NODEV = 19,
    /// The caller specified a non-directory in a directory operation.
    NFS3ERR_NOTDIR = 20,
    /// The caller specified a directory in a non-directory operation.
    NFS3ERR_ISDIR = 21,
    /// Invalid or unsupported argument for an operation.
    NFS3ERR_INVAL = 22,
    /// The operation would have caused a file to grow beyond the server's
    /// limit.
    NFS3ERR_FBIG = 27,
    /// No space left on device.
    NFS3ERR_NOSPC = 28,
    /// A modifying operation was attempted on a read-only file system.
    NFS3ERR_ROFS = 30,
    /// Too many hard links.
    NFS3ERR_MLINK = 31,
    /// The filename in an operation was too long.
    NFS3ERR_NAMETOOLONG = 63,
    /// An attempt was made to remove a directory that was not empty.
    NFS3ERR_NOTEMPTY = 66,
    /// Resource (quota) hard limit exceeded.
    NFS3ERR_DQUOT = 69,
    /// The file handle given in the arguments is no longer valid; the file it
    /// referred to no longer exists or access to it has been revoked.
    NFS3ERR_STALE = 70,
    /// The file handle referred to a file on a non-local file system.
    NFS3ERR_REMOTE = 71,
    /// The file handle failed internal consistency checks.
    NFS3ERR_BADHANDLE = 10001,
    /// Update synchronization mismatch detected during a SETATTR.
    NFS3ERR_NOT_SYNC = 10002,
    /// READDIR or READDIRPLUS cookie is stale.
    NFS3ERR_BAD_COOKIE = 10003,
    /// Operation is not supported.
    NFS3ERR_NOTSUPP = 10004,
    /// Buffer or request is too small.
    NFS3ERR_TOOSMALL = 10005,
    /// A server error that does not map to any protocol error value.
    NFS3ERR_SERVERFAULT = 10006,
    /// An attempt was made to create an object of an unsupported type.
    NFS3ERR_BADTYPE = 10007,
    /// The server started the request but could not complete it in time; the
    /// client should wait and retry. Also used by this server for rate-limit
    /// throttling and expired per-procedure deadlines.
    NFS3ERR_JUKEBOX = 10008,
}
SerializeEnum!(nfsstat3);
DeserializeEnum!(nfsstat3);

/// File type enumeration as defined in RFC 1813 section 2.3.5.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum ftype3 {
    /// Regular file
    #[default]
    NF3REG = 1,
    /// Directory
    NF3DIR = 2,
    /// Block special device
    NF3BLK = 3,
    /// Character special device
    NF3CHR = 4,
    /// Symbolic link
    NF3LNK = 5,
    /// Socket
    NF3SOCK = 6,
    /// Named pipe
    NF3FIFO = 7,
}
SerializeEnum!(ftype3);
DeserializeEnum!(ftype3);

/// Major and minor device numbers for character and block special devices.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct specdata3 {
    /// Major device number
    pub specdata1: u32,
    /// Minor device number
    pub specdata2: u32,
}
DeserializeStruct!(specdata3, specdata1, specdata2);
SerializeStruct!(specdata3, specdata1, specdata2);

/// The NFS version 3 file handle: opaque to the client, interpreted only by
/// the server. This server mints 8-byte handles (a big-endian registry id)
/// but accepts up to the protocol maximum of 64 bytes at decode time so that
/// a malformed handle surfaces as NFS3ERR_BADHANDLE rather than a decode
/// failure.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct nfs_fh3 {
    /// Raw file handle bytes
    pub data: Vec<u8>,
}

impl Serialize for nfs_fh3 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        write_opaque(dest, &self.data)
    }
}

impl Deserialize for nfs_fh3 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.data = read_opaque_max(src, NFS3_FHSIZE)?;
        Ok(())
    }
}

/// Timestamp with nanosecond resolution used for file times.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct nfstime3 {
    /// Seconds since the Unix epoch
    pub seconds: u32,
    /// Nanoseconds (0..1_000_000_000)
    pub nseconds: u32,
}
DeserializeStruct!(nfstime3, seconds, nseconds);
SerializeStruct!(nfstime3, seconds, nseconds);

impl From<nfstime3> for filetime::FileTime {
    fn from(time: nfstime3) -> Self {
        filetime::FileTime::from_unix_time(time.seconds as i64, time.nseconds)
    }
}

/// File attributes as defined in RFC 1813 section 2.3.5.
#[derive(Copy, Clone, Debug, Default)]
pub struct fattr3 {
    /// Type of the file
    pub ftype: ftype3,
    /// Access mode bits
    pub mode: mode3,
    /// Number of hard links
    pub nlink: u32,
    /// User id of the owner
    pub uid: uid3,
    /// Group id of the file
    pub gid: gid3,
    /// File size in bytes
    pub size: size3,
    /// Bytes actually allocated on the backing store
    pub used: size3,
    /// Device numbers for special files
    pub rdev: specdata3,
    /// File system identifier
    pub fsid: u64,
    /// File identifier, unique within the file system
    pub fileid: fileid3,
    /// Time of last data access
    pub atime: nfstime3,
    /// Time of last data modification
    pub mtime: nfstime3,
    /// Time of last attribute change
    pub ctime: nfstime3,
}
DeserializeStruct!(
    fattr3, ftype, mode, nlink, uid, gid, size, used, rdev, fsid, fileid, atime, mtime, ctime
);
SerializeStruct!(
    fattr3, ftype, mode, nlink, uid, gid, size, used, rdev, fsid, fileid, atime, mtime, ctime
);

/// The attribute subset used for weak cache consistency checking.
#[derive(Copy, Clone, Debug, Default)]
pub struct wcc_attr {
    /// File size in bytes
    pub size: size3,
    /// Last data modification time
    pub mtime: nfstime3,
    /// Last attribute change time
    pub ctime: nfstime3,
}
DeserializeStruct!(wcc_attr, size, mtime, ctime);
SerializeStruct!(wcc_attr, size, mtime, ctime);

/// Pre-operation attributes for weak cache consistency.
#[derive(Copy, Clone, Debug, Default)]
#[repr(u32)]
pub enum pre_op_attr {
    /// No attributes available
    #[default]
    Void,
    /// Attributes as they were before the operation
    attributes(wcc_attr),
}
DeserializeBoolUnion!(pre_op_attr, attributes, wcc_attr);
SerializeBoolUnion!(pre_op_attr, attributes, wcc_attr);

/// Post-operation attributes, returned by almost every procedure so clients
/// can maintain their attribute caches.
#[derive(Copy, Clone, Debug, Default)]
#[repr(u32)]
pub enum post_op_attr {
    /// No attributes available
    #[default]
    Void,
    /// Attributes after the operation
    attributes(fattr3),
}
DeserializeBoolUnion!(post_op_attr, attributes, fattr3);
SerializeBoolUnion!(post_op_attr, attributes, fattr3);

impl From<Option<fattr3>> for post_op_attr {
    fn from(attr: Option<fattr3>) -> Self {
        match attr {
            Some(attr) => post_op_attr::attributes(attr),
            None => post_op_attr::Void,
        }
    }
}

/// Weak cache consistency data: attributes before and after a mutating
/// operation.
#[derive(Copy, Clone, Debug, Default)]
pub struct wcc_data {
    /// Attributes before the operation
    pub before: pre_op_attr,
    /// Attributes after the operation
    pub after: post_op_attr,
}
DeserializeStruct!(wcc_data, before, after);
SerializeStruct!(wcc_data, before, after);

/// Optional file handle in responses.
#[derive(Clone, Debug, Default)]
#[repr(u32)]
pub enum post_op_fh3 {
    /// No file handle
    #[default]
    Void,
    /// File handle for the object
    handle(nfs_fh3),
}
DeserializeBoolUnion!(post_op_fh3, handle, nfs_fh3);
SerializeBoolUnion!(post_op_fh3, handle, nfs_fh3);

/// Optional file mode for SETATTR.
#[derive(Copy, Clone, Debug, Default)]
#[repr(u32)]
pub enum set_mode3 {
    /// Don't change the mode
    #[default]
    Void,
    /// Set the mode to this value
    mode(mode3),
}
DeserializeBoolUnion!(set_mode3, mode, mode3);
SerializeBoolUnion!(set_mode3, mode, mode3);

/// Optional owner uid for SETATTR.
#[derive(Copy, Clone, Debug, Default)]
#[repr(u32)]
pub enum set_uid3 {
    /// Don't change the uid
    #[default]
    Void,
    /// Set the uid to this value
    uid(uid3),
}
DeserializeBoolUnion!(set_uid3, uid, uid3);
SerializeBoolUnion!(set_uid3, uid, uid3);

/// Optional group gid for SETATTR.
#[derive(Copy, Clone, Debug, Default)]
#[repr(u32)]
pub enum set_gid3 {
    /// Don't change the gid
    #[default]
    Void,
    /// Set the gid to this value
    gid(gid3),
}
DeserializeBoolUnion!(set_gid3, gid, gid3);
SerializeBoolUnion!(set_gid3, gid, gid3);

/// Optional file size for SETATTR (truncate or extend).
#[derive(Copy, Clone, Debug, Default)]
#[repr(u32)]
pub enum set_size3 {
    /// Don't change the size
    #[default]
    Void,
    /// Set the size to this value
    size(size3),
}
DeserializeBoolUnion!(set_size3, size, size3);
SerializeBoolUnion!(set_size3, size, size3);

/// How to modify the access time during SETATTR.
#[derive(Copy, Clone, Debug, Default)]
#[repr(u32)]
pub enum set_atime {
    /// Leave the atime unchanged
    #[default]
    DONT_CHANGE,
    /// Set the atime to the server's current time
    SET_TO_SERVER_TIME,
    /// Set the atime to this client-provided time
    SET_TO_CLIENT_TIME(nfstime3),
}

impl Serialize for set_atime {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            set_atime::DONT_CHANGE => 0_u32.serialize(dest),
            set_atime::SET_TO_SERVER_TIME => 1_u32.serialize(dest),
            set_atime::SET_TO_CLIENT_TIME(v) => {
                2_u32.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for set_atime {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match deserialize::<u32>(src)? {
            0 => *self = set_atime::DONT_CHANGE,
            1 => *self = set_atime::SET_TO_SERVER_TIME,
            2 => *self = set_atime::SET_TO_CLIENT_TIME(deserialize(src)?),
            c => return Err(invalid_data(format!("invalid set_atime value: {c}"))),
        }
        Ok(())
    }
}

/// How to modify the modification time during SETATTR.
#[derive(Copy, Clone, Debug, Default)]
#[repr(u32)]
pub enum set_mtime {
    /// Leave the mtime unchanged
    #[default]
    DONT_CHANGE,
    /// Set the mtime to the server's current time
    SET_TO_SERVER_TIME,
    /// Set the mtime to this client-provided time
    SET_TO_CLIENT_TIME(nfstime3),
}

impl Serialize for set_mtime {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            set_mtime::DONT_CHANGE => 0_u32.serialize(dest),
            set_mtime::SET_TO_SERVER_TIME => 1_u32.serialize(dest),
            set_mtime::SET_TO_CLIENT_TIME(v) => {
                2_u32.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for set_mtime {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match deserialize::<u32>(src)? {
            0 => *self = set_mtime::DONT_CHANGE,
            1 => *self = set_mtime::SET_TO_SERVER_TIME,
            2 => *self = set_mtime::SET_TO_CLIENT_TIME(deserialize(src)?),
            c => return Err(invalid_data(format!("invalid set_mtime value: {c}"))),
        }
        Ok(())
    }
}

/// The set of attribute changes requested by SETATTR, CREATE, MKDIR and
/// SYMLINK.
#[derive(Copy, Clone, Debug, Default)]
pub struct sattr3 {
    /// File mode to set, if any
    pub mode: set_mode3,
    /// Owner uid to set, if any
    pub uid: set_uid3,
    /// Group gid to set, if any
    pub gid: set_gid3,
    /// File size to set, if any
    pub size: set_size3,
    /// Access time disposition
    pub atime: set_atime,
    /// Modification time disposition
    pub mtime: set_mtime,
}
DeserializeStruct!(sattr3, mode, uid, gid, size, atime, mtime);
SerializeStruct!(sattr3, mode, uid, gid, size, atime, mtime);

/// Guard for SETATTR: if present, the operation proceeds only when the
/// object's current ctime matches.
#[derive(Copy, Clone, Debug, Default)]
#[repr(u32)]
pub enum sattrguard3 {
    /// No guard, always apply
    #[default]
    Void,
    /// Apply only if the object ctime equals this value
    obj_ctime(nfstime3),
}
DeserializeBoolUnion!(sattrguard3, obj_ctime, nfstime3);
SerializeBoolUnion!(sattrguard3, obj_ctime, nfstime3);

/// Arguments for the SETATTR procedure.
#[derive(Debug, Default)]
pub struct SETATTR3args {
    /// Handle of the object to modify
    pub object: nfs_fh3,
    /// Attribute changes to apply
    pub new_attributes: sattr3,
    /// Optional ctime guard
    pub guard: sattrguard3,
}
DeserializeStruct!(SETATTR3args, object, new_attributes, guard);
SerializeStruct!(SETATTR3args, object, new_attributes, guard);

/// A (directory handle, name) pair identifying an object for directory
/// operations.
#[derive(Clone, Debug, Default)]
pub struct diropargs3 {
    /// Handle of the directory
    pub dir: nfs_fh3,
    /// Name within the directory
    pub name: filename3,
}
DeserializeStruct!(diropargs3, dir, name);
SerializeStruct!(diropargs3, dir, name);

/// Target path and initial attributes for a new symbolic link.
#[derive(Debug, Default)]
pub struct symlinkdata3 {
    /// Initial attributes for the link object
    pub symlink_attributes: sattr3,
    /// Path the link points to
    pub symlink_data: nfspath3,
}
DeserializeStruct!(symlinkdata3, symlink_attributes, symlink_data);
SerializeStruct!(symlinkdata3, symlink_attributes, symlink_data);

// ACCESS procedure permission bits (RFC 1813 section 3.3.4).
/// Read file data or read a directory.
pub const ACCESS3_READ: u32 = 0x0001;
/// Look up names in a directory.
pub const ACCESS3_LOOKUP: u32 = 0x0002;
/// Rewrite existing file data or modify existing directory entries.
pub const ACCESS3_MODIFY: u32 = 0x0004;
/// Grow a file or add directory entries.
pub const ACCESS3_EXTEND: u32 = 0x0008;
/// Delete a file or directory entry.
pub const ACCESS3_DELETE: u32 = 0x0010;
/// Execute a file or traverse a directory.
pub const ACCESS3_EXECUTE: u32 = 0x0020;
