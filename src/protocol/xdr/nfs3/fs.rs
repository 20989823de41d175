//! XDR structures for the filesystem-information procedures of NFS version 3:
//! FSSTAT (18), FSINFO (19) and PATHCONF (20).

#![allow(dead_code)]
// Preserve original RFC naming conventions for consistency with the specification
#![allow(non_camel_case_types)]

use crate::{DeserializeStruct, SerializeStruct};

use super::*;

// FSINFO property bits (RFC 1813 section 3.3.19).

/// The file system supports hard links.
pub const FSF_LINK: u32 = 0x0001;
/// The file system supports symbolic links.
pub const FSF_SYMLINK: u32 = 0x0002;
/// PATHCONF information is identical for every object in the file system.
pub const FSF_HOMOGENEOUS: u32 = 0x0008;
/// The server will set file times via SETATTR as requested.
pub const FSF_CANSETTIME: u32 = 0x0010;

/// Static file system information returned by FSINFO.
#[derive(Debug, Default)]
pub struct fsinfo3 {
    /// Attributes of the object the call was made on
    pub obj_attributes: post_op_attr,
    /// Maximum READ request size supported
    pub rtmax: u32,
    /// Preferred READ request size
    pub rtpref: u32,
    /// Suggested READ request multiple
    pub rtmult: u32,
    /// Maximum WRITE request size supported
    pub wtmax: u32,
    /// Preferred WRITE request size
    pub wtpref: u32,
    /// Suggested WRITE request multiple
    pub wtmult: u32,
    /// Preferred READDIR request size
    pub dtpref: u32,
    /// Maximum file size supported
    pub maxfilesize: size3,
    /// Granularity of file time values
    pub time_delta: nfstime3,
    /// Bit mask of FSF_* properties
    pub properties: u32,
}
DeserializeStruct!(
    fsinfo3,
    obj_attributes,
    rtmax,
    rtpref,
    rtmult,
    wtmax,
    wtpref,
    wtmult,
    dtpref,
    maxfilesize,
    time_delta,
    properties
);
SerializeStruct!(
    fsinfo3,
    obj_attributes,
    rtmax,
    rtpref,
    rtmult,
    wtmax,
    wtpref,
    wtmult,
    dtpref,
    maxfilesize,
    time_delta,
    properties
);

/// Volatile file system statistics returned by FSSTAT.
#[derive(Debug, Default)]
pub struct FSSTAT3resok {
    /// Attributes of the object the call was made on
    pub obj_attributes: post_op_attr,
    /// Total size of the file system in bytes
    pub tbytes: size3,
    /// Free bytes
    pub fbytes: size3,
    /// Free bytes available to the caller
    pub abytes: size3,
    /// Total file slots
    pub tfiles: size3,
    /// Free file slots
    pub ffiles: size3,
    /// Free file slots available to the caller
    pub afiles: size3,
    /// Seconds for which this information is valid; zero means always
    pub invarsec: u32,
}
DeserializeStruct!(
    FSSTAT3resok,
    obj_attributes,
    tbytes,
    fbytes,
    abytes,
    tfiles,
    ffiles,
    afiles,
    invarsec
);
SerializeStruct!(
    FSSTAT3resok,
    obj_attributes,
    tbytes,
    fbytes,
    abytes,
    tfiles,
    ffiles,
    afiles,
    invarsec
);

/// POSIX pathconf information returned by PATHCONF.
#[derive(Debug, Default)]
pub struct PATHCONF3resok {
    /// Attributes of the object the call was made on
    pub obj_attributes: post_op_attr,
    /// Maximum number of hard links to an object
    pub linkmax: u32,
    /// Maximum length of a component of a filename
    pub name_max: u32,
    /// If true, over-long names fail with NFS3ERR_NAMETOOLONG instead of
    /// being silently truncated
    pub no_trunc: bool,
    /// If true, chown is restricted to privileged users
    pub chown_restricted: bool,
    /// If true, name comparisons ignore case
    pub case_insensitive: bool,
    /// If true, name case is preserved
    pub case_preserving: bool,
}
DeserializeStruct!(
    PATHCONF3resok,
    obj_attributes,
    linkmax,
    name_max,
    no_trunc,
    chown_restricted,
    case_insensitive,
    case_preserving
);
SerializeStruct!(
    PATHCONF3resok,
    obj_attributes,
    linkmax,
    name_max,
    no_trunc,
    chown_restricted,
    case_insensitive,
    case_preserving
);
