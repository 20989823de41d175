//! Helpers for translating between the VFS attribute vocabulary and the
//! NFSv3 wire attribute structures, shared by the façade and by backends.

use crate::protocol::xdr::nfs3;
use crate::vfs::{FileAttr, FileKind, FileTime};

impl From<FileTime> for nfs3::nfstime3 {
    fn from(time: FileTime) -> Self {
        // nfstime3 seconds are unsigned; clamp pre-epoch times to the epoch
        nfs3::nfstime3 { seconds: time.seconds.max(0) as u32, nseconds: time.nanos }
    }
}

impl From<nfs3::nfstime3> for FileTime {
    fn from(time: nfs3::nfstime3) -> Self {
        FileTime { seconds: i64::from(time.seconds), nanos: time.nseconds }
    }
}

impl From<FileKind> for nfs3::ftype3 {
    fn from(kind: FileKind) -> Self {
        match kind {
            FileKind::Regular => nfs3::ftype3::NF3REG,
            FileKind::Directory => nfs3::ftype3::NF3DIR,
            FileKind::Symlink => nfs3::ftype3::NF3LNK,
            FileKind::BlockDevice => nfs3::ftype3::NF3BLK,
            FileKind::CharDevice => nfs3::ftype3::NF3CHR,
            FileKind::Socket => nfs3::ftype3::NF3SOCK,
            FileKind::Fifo => nfs3::ftype3::NF3FIFO,
        }
    }
}

/// Converts backend attributes to the wire attribute structure, stamping in
/// the server-assigned file id.
pub fn attr_to_fattr3(fileid: nfs3::fileid3, attr: &FileAttr) -> nfs3::fattr3 {
    nfs3::fattr3 {
        ftype: attr.kind.into(),
        mode: attr.mode & 0o7777,
        nlink: attr.nlink.max(1),
        uid: attr.uid,
        gid: attr.gid,
        size: attr.size,
        used: if attr.used > 0 { attr.used } else { attr.size },
        rdev: nfs3::specdata3 { specdata1: attr.rdev.0, specdata2: attr.rdev.1 },
        fsid: 0,
        fileid,
        atime: attr.atime.into(),
        mtime: attr.mtime.into(),
        ctime: attr.ctime.into(),
    }
}

/// Extracts the weak-cache-consistency subset from wire attributes.
pub fn wcc_attr_of(attr: &nfs3::fattr3) -> nfs3::wcc_attr {
    nfs3::wcc_attr { size: attr.size, mtime: attr.mtime, ctime: attr.ctime }
}

/// Compares two attribute snapshots for changes a client would care about.
pub fn fattr3_differ(lhs: &nfs3::fattr3, rhs: &nfs3::fattr3) -> bool {
    lhs.fileid != rhs.fileid
        || lhs.mtime.seconds != rhs.mtime.seconds
        || lhs.mtime.nseconds != rhs.mtime.nseconds
        || lhs.size != rhs.size
        || lhs.ftype as u32 != rhs.ftype as u32
}

/// Packs a directory mtime into a READDIR cookie verifier.
pub fn cookieverf_from_mtime(mtime: nfs3::nfstime3) -> nfs3::cookieverf3 {
    let packed = (u64::from(mtime.seconds) << 32) | u64::from(mtime.nseconds);
    packed.to_be_bytes()
}
