//! The Virtual File System (VFS) capability interface between the NFS server
//! and the backing storage.
//!
//! A backend implements [`Filesystem`] to make any tree of objects reachable
//! over NFS. The interface is deliberately narrow and path-based: every
//! operation takes an absolute path rooted at `/` inside the export, and the
//! server performs all caching, handle management and invalidation above it.
//! Backends are expected to be dumb and honest; in particular they must not
//! cache attributes themselves, or the server's weak-cache-consistency data
//! will lie to clients.
//!
//! Open files are represented by [`VfsFile`] trait objects. Closing is
//! dropping: the server guarantees every handle it opens is dropped on every
//! exit path, and a backend that needs an explicit close hook implements
//! `Drop`.
//!
//! `symlink`/`readlink` are optional; the default implementations report
//! `Unsupported`, which the protocol layer translates to `NFS3ERR_NOTSUPP`.

use std::io;

use async_trait::async_trait;

/// A point in time with nanosecond resolution, as seconds since the Unix
/// epoch. Negative seconds are before the epoch.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FileTime {
    /// Seconds since the Unix epoch
    pub seconds: i64,
    /// Nanoseconds within the second (0..1_000_000_000)
    pub nanos: u32,
}

impl FileTime {
    /// The Unix epoch itself.
    pub const EPOCH: FileTime = FileTime { seconds: 0, nanos: 0 };

    /// The current wall-clock time.
    pub fn now() -> FileTime {
        match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
            Ok(d) => FileTime { seconds: d.as_secs() as i64, nanos: d.subsec_nanos() },
            Err(e) => {
                let d = e.duration();
                FileTime { seconds: -(d.as_secs() as i64), nanos: d.subsec_nanos() }
            }
        }
    }
}

impl From<FileTime> for filetime::FileTime {
    fn from(time: FileTime) -> Self {
        filetime::FileTime::from_unix_time(time.seconds, time.nanos)
    }
}

/// The type of a filesystem object.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum FileKind {
    /// Regular file
    #[default]
    Regular,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Block special device
    BlockDevice,
    /// Character special device
    CharDevice,
    /// Socket
    Socket,
    /// Named pipe
    Fifo,
}

/// Attributes of a filesystem object as reported by the backend. File ids
/// are assigned above this layer, so they do not appear here.
#[derive(Copy, Clone, Debug, Default)]
pub struct FileAttr {
    /// Object type
    pub kind: FileKind,
    /// Permission bits (low 12 bits meaningful)
    pub mode: u32,
    /// Number of hard links
    pub nlink: u32,
    /// Owner user id
    pub uid: u32,
    /// Owner group id
    pub gid: u32,
    /// Size in bytes
    pub size: u64,
    /// Bytes allocated on the backing store
    pub used: u64,
    /// Major and minor device numbers for special files
    pub rdev: (u32, u32),
    /// Time of last data access
    pub atime: FileTime,
    /// Time of last data modification
    pub mtime: FileTime,
    /// Time of last attribute change
    pub ctime: FileTime,
}

/// One entry of a directory listing.
#[derive(Clone, Debug)]
pub struct DirEntry {
    /// Entry name, without any path components
    pub name: String,
    /// Object type
    pub kind: FileKind,
    /// Size in bytes
    pub size: u64,
    /// Time of last data modification
    pub mtime: FileTime,
}

/// How a file should be opened.
#[derive(Copy, Clone, Debug, Default)]
pub struct OpenFlags {
    /// Open for writing as well as reading
    pub write: bool,
    /// Create the file if it does not exist
    pub create: bool,
    /// Truncate the file to zero length on open
    pub truncate: bool,
}

impl OpenFlags {
    /// Read-only open.
    pub const READ: OpenFlags = OpenFlags { write: false, create: false, truncate: false };
    /// Read-write open without creation.
    pub const WRITE: OpenFlags = OpenFlags { write: true, create: false, truncate: false };
}

/// An open file on the backing store. Positioned I/O only; the server never
/// relies on a shared cursor. Dropping the object closes it.
#[async_trait]
pub trait VfsFile: Send + Sync {
    /// Reads up to `count` bytes starting at `offset`. A short or empty
    /// return indicates end of file.
    async fn read_at(&self, offset: u64, count: u32) -> io::Result<Vec<u8>>;

    /// Writes `data` starting at `offset`, extending the file as needed.
    /// Returns the number of bytes written.
    async fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<u32>;

    /// Returns the file's current attributes.
    async fn stat(&self) -> io::Result<FileAttr>;

    /// Forces previously written data to stable storage. The default is a
    /// no-op for backends whose writes are already durable.
    async fn sync(&self) -> io::Result<()> {
        Ok(())
    }
}

/// The backing-filesystem capability interface.
///
/// All paths are absolute, canonical, and rooted at `/` (the export root);
/// the server validates and joins client-supplied names before any call
/// reaches a backend. Implementations must be safe for concurrent use.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Returns the attributes of the object at `path`, following a final
    /// symlink.
    async fn stat(&self, path: &str) -> io::Result<FileAttr>;

    /// Returns the attributes of the object at `path` without following a
    /// final symlink.
    async fn lstat(&self, path: &str) -> io::Result<FileAttr>;

    /// Opens the file at `path`. `mode` applies only when the open creates
    /// the file.
    async fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> io::Result<Box<dyn VfsFile>>;

    /// Creates a regular file at `path` and opens it for writing. Fails if
    /// an object already exists there.
    async fn create(&self, path: &str, mode: u32) -> io::Result<Box<dyn VfsFile>>;

    /// Creates a directory at `path`.
    async fn mkdir(&self, path: &str, mode: u32) -> io::Result<()>;

    /// Removes the file, symlink or empty directory at `path`. Removing a
    /// non-empty directory fails with `DirectoryNotEmpty`.
    async fn remove(&self, path: &str) -> io::Result<()>;

    /// Atomically renames `old` to `new`, to the extent the backing store
    /// can guarantee atomicity.
    async fn rename(&self, old: &str, new: &str) -> io::Result<()>;

    /// Truncates or extends the file at `path` to exactly `size` bytes.
    async fn truncate(&self, path: &str, size: u64) -> io::Result<()>;

    /// Changes the permission bits of the object at `path`.
    async fn chmod(&self, path: &str, mode: u32) -> io::Result<()>;

    /// Changes the ownership of the object at `path`.
    async fn chown(&self, path: &str, uid: u32, gid: u32) -> io::Result<()>;

    /// Sets the access and modification times of the object at `path`.
    async fn chtimes(&self, path: &str, atime: FileTime, mtime: FileTime) -> io::Result<()>;

    /// Lists the entries of the directory at `path`, excluding `.` and `..`,
    /// in a stable order.
    async fn readdir(&self, path: &str) -> io::Result<Vec<DirEntry>>;

    /// Creates a symbolic link at `path` pointing to `target`. Optional.
    async fn symlink(&self, _target: &str, _path: &str) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "symlink not supported"))
    }

    /// Reads the target of the symbolic link at `path`. Optional.
    async fn readlink(&self, _path: &str) -> io::Result<String> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "readlink not supported"))
    }
}
