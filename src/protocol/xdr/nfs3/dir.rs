//! XDR structures for the directory procedures of NFS version 3:
//! MKDIR (9), SYMLINK (10), MKNOD (11), READDIR (16) and READDIRPLUS (17).

#![allow(dead_code)]
// Preserve original RFC naming conventions (READDIR3args, MKDIR3resok, ...)
#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_traits::cast::FromPrimitive;

use crate::protocol::xdr::{deserialize, invalid_data, Deserialize, Serialize};
use crate::{DeserializeStruct, SerializeStruct};

use super::*;

/// Arguments for the MKDIR procedure (RFC 1813 section 3.3.9).
#[derive(Debug, Default)]
pub struct MKDIR3args {
    /// Parent directory and name for the new directory
    pub dirops: diropargs3,
    /// Initial attributes for the new directory
    pub attributes: sattr3,
}
DeserializeStruct!(MKDIR3args, dirops, attributes);
SerializeStruct!(MKDIR3args, dirops, attributes);

/// Arguments for the SYMLINK procedure (RFC 1813 section 3.3.10).
#[derive(Debug, Default)]
pub struct SYMLINK3args {
    /// Parent directory and name for the new link
    pub dirops: diropargs3,
    /// Target path and attributes for the link
    pub symlink: symlinkdata3,
}
DeserializeStruct!(SYMLINK3args, dirops, symlink);
SerializeStruct!(SYMLINK3args, dirops, symlink);

/// Device type and numbers for MKNOD.
#[derive(Debug, Default)]
pub struct devicedata3 {
    /// Initial attributes for the device node
    pub dev_attributes: sattr3,
    /// Major and minor device numbers
    pub spec: specdata3,
}
DeserializeStruct!(devicedata3, dev_attributes, spec);
SerializeStruct!(devicedata3, dev_attributes, spec);

/// The type-discriminated payload of a MKNOD call (RFC 1813 section 3.3.11):
/// block and character devices carry device data, sockets and FIFOs carry
/// only initial attributes, anything else is invalid.
#[derive(Debug)]
pub enum mknoddata3 {
    /// Character special device
    CHR(devicedata3),
    /// Block special device
    BLK(devicedata3),
    /// Socket
    SOCK(sattr3),
    /// Named pipe
    FIFO(sattr3),
}

impl Default for mknoddata3 {
    fn default() -> mknoddata3 {
        mknoddata3::FIFO(sattr3::default())
    }
}

impl mknoddata3 {
    /// The file type this payload creates.
    pub fn ftype(&self) -> ftype3 {
        match self {
            mknoddata3::CHR(_) => ftype3::NF3CHR,
            mknoddata3::BLK(_) => ftype3::NF3BLK,
            mknoddata3::SOCK(_) => ftype3::NF3SOCK,
            mknoddata3::FIFO(_) => ftype3::NF3FIFO,
        }
    }
}

impl Serialize for mknoddata3 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            mknoddata3::CHR(v) => {
                (ftype3::NF3CHR as u32).serialize(dest)?;
                v.serialize(dest)
            }
            mknoddata3::BLK(v) => {
                (ftype3::NF3BLK as u32).serialize(dest)?;
                v.serialize(dest)
            }
            mknoddata3::SOCK(v) => {
                (ftype3::NF3SOCK as u32).serialize(dest)?;
                v.serialize(dest)
            }
            mknoddata3::FIFO(v) => {
                (ftype3::NF3FIFO as u32).serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for mknoddata3 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let discriminant = deserialize::<u32>(src)?;
        match FromPrimitive::from_u32(discriminant) {
            Some(ftype3::NF3CHR) => *self = mknoddata3::CHR(deserialize(src)?),
            Some(ftype3::NF3BLK) => *self = mknoddata3::BLK(deserialize(src)?),
            Some(ftype3::NF3SOCK) => *self = mknoddata3::SOCK(deserialize(src)?),
            Some(ftype3::NF3FIFO) => *self = mknoddata3::FIFO(deserialize(src)?),
            _ => {
                return Err(invalid_data(format!(
                    "invalid mknoddata3 type discriminant: {discriminant}"
                )))
            }
        }
        Ok(())
    }
}

/// Arguments for the MKNOD procedure.
#[derive(Debug, Default)]
pub struct MKNOD3args {
    /// Parent directory and name for the special file
    pub where_dir: diropargs3,
    /// Type-discriminated creation payload
    pub what: mknoddata3,
}
DeserializeStruct!(MKNOD3args, where_dir, what);
SerializeStruct!(MKNOD3args, where_dir, what);

/// Arguments for the RENAME procedure (RFC 1813 section 3.3.14).
#[derive(Debug, Default)]
pub struct RENAME3args {
    /// Source directory and name
    pub from: diropargs3,
    /// Destination directory and name
    pub to: diropargs3,
}
DeserializeStruct!(RENAME3args, from, to);
SerializeStruct!(RENAME3args, from, to);

/// A single READDIR entry.
#[derive(Debug, Default)]
pub struct entry3 {
    /// File identifier
    pub fileid: fileid3,
    /// Entry name
    pub name: filename3,
    /// Cookie resuming iteration after this entry
    pub cookie: cookie3,
}
DeserializeStruct!(entry3, fileid, name, cookie);
SerializeStruct!(entry3, fileid, name, cookie);

/// Arguments for the READDIR procedure (RFC 1813 section 3.3.16).
#[derive(Debug, Default)]
pub struct READDIR3args {
    /// Handle of the directory to read
    pub dir: nfs_fh3,
    /// Position to resume at; zero starts iteration
    pub cookie: cookie3,
    /// Verifier from a previous reply, all zero on the first call
    pub cookieverf: cookieverf3,
    /// Maximum size in bytes of the reply
    pub count: count3,
}
DeserializeStruct!(READDIR3args, dir, cookie, cookieverf, count);
SerializeStruct!(READDIR3args, dir, cookie, cookieverf, count);

/// A single READDIRPLUS entry: like [`entry3`] plus attributes and handle.
#[derive(Debug, Default)]
pub struct entryplus3 {
    /// File identifier
    pub fileid: fileid3,
    /// Entry name
    pub name: filename3,
    /// Cookie resuming iteration after this entry
    pub cookie: cookie3,
    /// Attributes of the entry
    pub name_attributes: post_op_attr,
    /// File handle of the entry
    pub name_handle: post_op_fh3,
}
DeserializeStruct!(entryplus3, fileid, name, cookie, name_attributes, name_handle);
SerializeStruct!(entryplus3, fileid, name, cookie, name_attributes, name_handle);

/// Arguments for the READDIRPLUS procedure (RFC 1813 section 3.3.17).
#[derive(Debug, Default)]
pub struct READDIRPLUS3args {
    /// Handle of the directory to read
    pub dir: nfs_fh3,
    /// Position to resume at; zero starts iteration
    pub cookie: cookie3,
    /// Verifier from a previous reply, all zero on the first call
    pub cookieverf: cookieverf3,
    /// Maximum bytes of directory information (names, ids, cookies)
    pub dircount: count3,
    /// Maximum size in bytes of the complete reply
    pub maxcount: count3,
}
DeserializeStruct!(READDIRPLUS3args, dir, cookie, cookieverf, dircount, maxcount);
SerializeStruct!(READDIRPLUS3args, dir, cookie, cookieverf, dircount, maxcount);
