//! XDR structures for the file-content procedures of NFS version 3:
//! READ (6), WRITE (7), CREATE (8), LINK (15) and COMMIT (21).

#![allow(dead_code)]
// Preserve original RFC naming conventions (READ3args, COMMIT3resok, ...)
#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::cast::FromPrimitive;

use crate::protocol::xdr::{deserialize, invalid_data, Deserialize, Serialize};
use crate::{DeserializeEnum, DeserializeStruct, SerializeEnum, SerializeStruct};

use super::*;

/// Arguments for the READ procedure (RFC 1813 section 3.3.6).
#[derive(Debug, Default)]
pub struct READ3args {
    /// Handle of the file to read
    pub file: nfs_fh3,
    /// Position to begin reading at
    pub offset: offset3,
    /// Number of bytes to read
    pub count: count3,
}
DeserializeStruct!(READ3args, file, offset, count);
SerializeStruct!(READ3args, file, offset, count);

/// Successful READ result.
#[derive(Debug, Default)]
pub struct READ3resok {
    /// File attributes after the read
    pub file_attributes: post_op_attr,
    /// Number of bytes actually read
    pub count: count3,
    /// True if the last byte returned is the last byte of the file
    pub eof: bool,
    /// The data read
    pub data: Vec<u8>,
}
DeserializeStruct!(READ3resok, file_attributes, count, eof, data);
SerializeStruct!(READ3resok, file_attributes, count, eof, data);

/// Write stability levels (RFC 1813 section 3.3.7).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum stable_how {
    /// Data may be buffered; durability is deferred to COMMIT
    #[default]
    UNSTABLE = 0,
    /// The data of this request must reach stable storage before replying
    DATA_SYNC = 1,
    /// Data and metadata of this request must reach stable storage before
    /// replying
    FILE_SYNC = 2,
}
SerializeEnum!(stable_how);
DeserializeEnum!(stable_how);

/// Arguments for the WRITE procedure (RFC 1813 section 3.3.7).
///
/// The data field is bounded by the XDR hard ceiling at decode time; the
/// negotiated transfer size is enforced by the procedure handler.
#[derive(Debug, Default)]
pub struct WRITE3args {
    /// Handle of the file to write
    pub file: nfs_fh3,
    /// Position to begin writing at
    pub offset: offset3,
    /// Number of bytes of data
    pub count: count3,
    /// Requested stability level
    pub stable: stable_how,
    /// The data to write
    pub data: Vec<u8>,
}
DeserializeStruct!(WRITE3args, file, offset, count, stable, data);
SerializeStruct!(WRITE3args, file, offset, count, stable, data);

/// Successful WRITE result.
#[derive(Debug, Default)]
pub struct WRITE3resok {
    /// Attributes before and after the write
    pub file_wcc: wcc_data,
    /// Number of bytes actually written
    pub count: count3,
    /// Stability level the data was actually written with
    pub committed: stable_how,
    /// Boot verifier for detecting server restarts between WRITE and COMMIT
    pub verf: writeverf3,
}
DeserializeStruct!(WRITE3resok, file_wcc, count, committed, verf);
SerializeStruct!(WRITE3resok, file_wcc, count, committed, verf);

/// File creation disposition (RFC 1813 section 3.3.8).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum createmode3 {
    /// Create, truncating any existing file
    #[default]
    UNCHECKED = 0,
    /// Fail with NFS3ERR_EXIST if the name already exists
    GUARDED = 1,
    /// Idempotent creation keyed by a client verifier
    EXCLUSIVE = 2,
}
SerializeEnum!(createmode3);
DeserializeEnum!(createmode3);

/// The mode-specific payload of a CREATE call: initial attributes for
/// UNCHECKED/GUARDED, a verifier for EXCLUSIVE.
#[derive(Copy, Clone, Debug)]
#[repr(u32)]
pub enum createhow3 {
    /// Create or truncate with these attributes
    UNCHECKED(sattr3),
    /// Create only if absent, with these attributes
    GUARDED(sattr3),
    /// Create exactly once, keyed by this verifier
    EXCLUSIVE(createverf3),
}

impl Default for createhow3 {
    fn default() -> createhow3 {
        createhow3::UNCHECKED(sattr3::default())
    }
}

impl Serialize for createhow3 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            createhow3::UNCHECKED(v) => {
                0_u32.serialize(dest)?;
                v.serialize(dest)
            }
            createhow3::GUARDED(v) => {
                1_u32.serialize(dest)?;
                v.serialize(dest)
            }
            createhow3::EXCLUSIVE(v) => {
                2_u32.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for createhow3 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match deserialize::<u32>(src)? {
            0 => *self = createhow3::UNCHECKED(deserialize(src)?),
            1 => *self = createhow3::GUARDED(deserialize(src)?),
            2 => *self = createhow3::EXCLUSIVE(deserialize(src)?),
            c => return Err(invalid_data(format!("invalid createhow3 discriminant: {c}"))),
        }
        Ok(())
    }
}

/// Arguments for the CREATE procedure.
#[derive(Debug, Default)]
pub struct CREATE3args {
    /// Target directory and file name
    pub dirops: diropargs3,
    /// Creation mode and its payload
    pub how: createhow3,
}
DeserializeStruct!(CREATE3args, dirops, how);
SerializeStruct!(CREATE3args, dirops, how);

/// Successful result shared by CREATE, MKDIR, SYMLINK and MKNOD.
#[derive(Debug, Default)]
pub struct CREATE3resok {
    /// Handle of the new object
    pub obj: post_op_fh3,
    /// Attributes of the new object
    pub obj_attributes: post_op_attr,
    /// Weak cache consistency data for the parent directory
    pub dir_wcc: wcc_data,
}
DeserializeStruct!(CREATE3resok, obj, obj_attributes, dir_wcc);
SerializeStruct!(CREATE3resok, obj, obj_attributes, dir_wcc);

/// Arguments for the LINK procedure (RFC 1813 section 3.3.15).
#[derive(Debug, Default)]
pub struct LINK3args {
    /// Handle of the existing file
    pub file: nfs_fh3,
    /// Directory and name for the new link
    pub link: diropargs3,
}
DeserializeStruct!(LINK3args, file, link);
SerializeStruct!(LINK3args, file, link);

/// Arguments for the COMMIT procedure (RFC 1813 section 3.3.21).
#[derive(Debug, Default)]
pub struct COMMIT3args {
    /// Handle of the file to commit
    pub file: nfs_fh3,
    /// Start of the byte range to commit
    pub offset: offset3,
    /// Length of the byte range to commit (0 means to end of file)
    pub count: count3,
}
DeserializeStruct!(COMMIT3args, file, offset, count);
SerializeStruct!(COMMIT3args, file, offset, count);

/// Successful COMMIT result.
#[derive(Debug, Default)]
pub struct COMMIT3resok {
    /// Attributes before and after the commit
    pub file_wcc: wcc_data,
    /// Boot verifier; changes only across server restarts
    pub verf: writeverf3,
}
DeserializeStruct!(COMMIT3resok, file_wcc, verf);
SerializeStruct!(COMMIT3resok, file_wcc, verf);
