//! The filesystem façade: the layer between the NFS procedure handlers and
//! the backing [`Filesystem`](crate::vfs::Filesystem).
//!
//! The façade owns everything the protocol layer should not have to think
//! about: the node table and handle registry, the attribute / directory /
//! read-ahead caches and their invalidation policy, client-name validation
//! and path joining, translation of backend `io::Error`s into `nfsstat3`,
//! weak-cache-consistency snapshots, and the open-file budget.
//!
//! Lock ordering through this module, outer to inner: handle registry →
//! cache → node file slot. Backend I/O is never performed while a registry
//! or cache lock is held; node file slots are async mutexes taken only for
//! slot exchange, not across backend calls.

mod handles;
mod node;

pub use handles::{HandleEntry, HandleRegistry};
pub use node::{fileid_for_path, Node, NodeFile, NodeTable, ROOT_FILEID};

use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, trace, warn};

use crate::cache::{AttrCache, CachedAttr, DirCache, DirCacheEntry, ReadAheadPool};
use crate::config::ServerConfig;
use crate::fs_util::{attr_to_fattr3, wcc_attr_of};
use crate::limit::RateLimiter;
use crate::protocol::xdr::nfs3;
use crate::protocol::xdr::nfs3::file::stable_how;
use crate::vfs::{FileTime, Filesystem, OpenFlags, VfsFile};

/// Maps a backend error family onto the NFS status vocabulary.
pub fn map_io_error(err: &io::Error) -> nfs3::nfsstat3 {
    use io::ErrorKind;
    match err.kind() {
        ErrorKind::NotFound => nfs3::nfsstat3::NFS3ERR_NOENT,
        ErrorKind::PermissionDenied => nfs3::nfsstat3::NFS3ERR_ACCES,
        ErrorKind::AlreadyExists => nfs3::nfsstat3::NFS3ERR_EXIST,
        ErrorKind::InvalidInput => nfs3::nfsstat3::NFS3ERR_INVAL,
        ErrorKind::TimedOut => nfs3::nfsstat3::NFS3ERR_JUKEBOX,
        ErrorKind::StorageFull => nfs3::nfsstat3::NFS3ERR_NOSPC,
        ErrorKind::FileTooLarge => nfs3::nfsstat3::NFS3ERR_FBIG,
        ErrorKind::DirectoryNotEmpty => nfs3::nfsstat3::NFS3ERR_NOTEMPTY,
        ErrorKind::IsADirectory => nfs3::nfsstat3::NFS3ERR_ISDIR,
        ErrorKind::NotADirectory => nfs3::nfsstat3::NFS3ERR_NOTDIR,
        ErrorKind::Unsupported => nfs3::nfsstat3::NFS3ERR_NOTSUPP,
        _ => nfs3::nfsstat3::NFS3ERR_IO,
    }
}

/// Checks one client-supplied path component. Empty names, dot names,
/// separator or NUL bytes are rejected with NFS3ERR_ACCES (they are either
/// meaningless or traversal attempts); non-UTF-8 names cannot be joined to a
/// backend path and are NFS3ERR_INVAL.
pub fn validate_component(name: &nfs3::filename3) -> Result<&str, nfs3::nfsstat3> {
    let bytes: &[u8] = name.as_ref();
    if bytes.is_empty() || bytes == b"." || bytes == b".." {
        return Err(nfs3::nfsstat3::NFS3ERR_ACCES);
    }
    if bytes.contains(&b'/') || bytes.contains(&b'\\') || bytes.contains(&0) {
        return Err(nfs3::nfsstat3::NFS3ERR_ACCES);
    }
    if bytes.len() > nfs3::NFS3_MAXNAMLEN as usize {
        return Err(nfs3::nfsstat3::NFS3ERR_INVAL);
    }
    std::str::from_utf8(bytes).map_err(|_| nfs3::nfsstat3::NFS3ERR_INVAL)
}

/// Lexically canonicalizes an absolute path, refusing anything that would
/// escape the export root. No filesystem access.
pub fn canonicalize_under_root(path: &str) -> Option<String> {
    if !path.starts_with('/') {
        return None;
    }
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                // popping past the root escapes the export
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        Some("/".to_string())
    } else {
        Some(format!("/{}", parts.join("/")))
    }
}

/// The result of a successful READ.
pub struct ReadResult {
    /// Bytes read
    pub data: Vec<u8>,
    /// True when the last byte returned is the last byte of the file
    pub eof: bool,
    /// File attributes after the read
    pub attr: nfs3::post_op_attr,
}

/// The result of a successful WRITE.
pub struct WriteResult {
    /// Attributes before and after the write
    pub wcc: nfs3::wcc_data,
    /// Bytes written
    pub count: nfs3::count3,
    /// Stability the data was actually written with
    pub committed: stable_how,
}

/// The result of a successful CREATE/MKDIR/SYMLINK.
pub struct CreateResult {
    /// Handle of the new object
    pub fh: nfs3::nfs_fh3,
    /// Attributes of the new object
    pub attr: nfs3::fattr3,
    /// Weak-cache-consistency data for the parent directory
    pub dir_wcc: nfs3::wcc_data,
}

/// The façade over one backing filesystem.
pub struct VfsFacade {
    backend: Arc<dyn Filesystem>,
    config: Arc<ServerConfig>,
    nodes: NodeTable,
    handles: HandleRegistry,
    attr_cache: Arc<AttrCache>,
    dir_cache: Arc<DirCache>,
    read_ahead: Option<Arc<ReadAheadPool>>,
    limiter: Option<Arc<RateLimiter>>,
    open_files: AtomicUsize,
    io_gate: Semaphore,
    boot_verifier: nfs3::writeverf3,
}

impl VfsFacade {
    /// Builds the façade and its caches from the server configuration.
    pub fn new(
        backend: Arc<dyn Filesystem>,
        config: Arc<ServerConfig>,
        limiter: Option<Arc<RateLimiter>>,
    ) -> Arc<VfsFacade> {
        let attr_cache = Arc::new(AttrCache::new(
            config.attr_cache.size,
            config.attr_cache.timeout,
            config.attr_cache.negative_timeout,
            config.attr_cache.cache_negative_lookups,
        ));
        let dir_cache = Arc::new(DirCache::new(
            config.dir_cache.size,
            config.dir_cache.max_dir_size,
            config.dir_cache.timeout,
        ));
        let read_ahead = config.read_ahead.enabled.then(|| {
            Arc::new(ReadAheadPool::new(
                config.read_ahead.size,
                config.read_ahead.max_files,
                config.read_ahead.max_memory,
            ))
        });
        let boot_nanos = match std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
        {
            Ok(d) => d.as_nanos() as u64,
            Err(_) => 1,
        };
        let workers = config.effective_max_workers();
        Arc::new(VfsFacade {
            backend,
            config,
            nodes: NodeTable::new(),
            handles: HandleRegistry::new(),
            attr_cache,
            dir_cache,
            read_ahead,
            limiter,
            open_files: AtomicUsize::new(0),
            io_gate: Semaphore::new(workers),
            boot_verifier: boot_nanos.to_be_bytes(),
        })
    }

    /// The server configuration this façade was built with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The attribute cache (exposed for the memory monitor and tests).
    pub fn attr_cache(&self) -> &Arc<AttrCache> {
        &self.attr_cache
    }

    /// The directory cache.
    pub fn dir_cache(&self) -> &Arc<DirCache> {
        &self.dir_cache
    }

    /// The read-ahead pool, when enabled.
    pub fn read_ahead(&self) -> Option<&Arc<ReadAheadPool>> {
        self.read_ahead.as_ref()
    }

    /// Number of live file handles.
    pub fn handle_count(&self) -> usize {
        self.handles.count()
    }

    /// The write verifier: constant for this server instance, different
    /// after a restart.
    pub fn write_verifier(&self) -> nfs3::writeverf3 {
        self.boot_verifier
    }

    // ------------------------------------------------------------------
    // handles

    /// Encodes a registry handle as an opaque wire file handle.
    pub fn fh_from_handle(handle: u64) -> nfs3::nfs_fh3 {
        nfs3::nfs_fh3 { data: handle.to_be_bytes().to_vec() }
    }

    /// Resolves a wire file handle to a node. Wrong width is a malformed
    /// handle; a well-formed handle the registry does not know is stale.
    pub fn resolve(&self, fh: &nfs3::nfs_fh3) -> Result<Arc<Node>, nfs3::nfsstat3> {
        if fh.data.len() != 8 {
            return Err(nfs3::nfsstat3::NFS3ERR_BADHANDLE);
        }
        let handle = u64::from_be_bytes(fh.data[..8].try_into().unwrap());
        if handle == 0 {
            return Err(nfs3::nfsstat3::NFS3ERR_STALE);
        }
        self.handles.get(handle).ok_or(nfs3::nfsstat3::NFS3ERR_STALE)
    }

    /// Returns the node's current wire handle, minting one if needed.
    /// Handle quotas are charged to `client`; exhaustion is transient
    /// (NFS3ERR_JUKEBOX).
    pub fn ensure_handle(
        &self,
        node: &Arc<Node>,
        client: Option<IpAddr>,
    ) -> Result<nfs3::nfs_fh3, nfs3::nfsstat3> {
        let current = node.handle();
        if current != 0 {
            if let Some(live) = self.handles.get(current) {
                if Arc::ptr_eq(&live, node) {
                    return Ok(Self::fh_from_handle(current));
                }
            }
        }
        let owner = match (&self.limiter, client) {
            (Some(limiter), Some(ip)) => {
                if !limiter.try_acquire_handle(ip) {
                    debug!("handle quota exhausted for {ip}");
                    return Err(nfs3::nfsstat3::NFS3ERR_JUKEBOX);
                }
                Some(ip)
            }
            _ => None,
        };
        let minted = self.handles.allocate(node.clone(), owner);
        let published = node.publish_handle(minted);
        if published != minted {
            // another task minted a handle concurrently; return ours
            if let Some(entry) = self.handles.release(minted) {
                if let (Some(limiter), Some(ip)) = (&self.limiter, entry.owner) {
                    limiter.release_handle(ip);
                }
            }
        }
        Ok(Self::fh_from_handle(published))
    }

    /// Releases one handle: removes the registry entry, clears the node's
    /// handle field, closes its cached backing file (outside the registry
    /// lock) and returns the quota slot.
    pub async fn release_handle(&self, handle: u64) {
        let Some(entry) = self.handles.release(handle) else { return };
        entry.node.clear_handle(handle);
        if let Some(file) = entry.node.take_file().await {
            self.uncount_file(&file);
        }
        if let (Some(limiter), Some(ip)) = (&self.limiter, entry.owner) {
            limiter.release_handle(ip);
        }
    }

    /// Releases every handle and drops all cached state. Used at shutdown.
    pub async fn shutdown(&self) {
        for (handle, entry) in self.handles.release_all() {
            entry.node.clear_handle(handle);
            if let Some(file) = entry.node.take_file().await {
                self.uncount_file(&file);
            }
            if let (Some(limiter), Some(ip)) = (&self.limiter, entry.owner) {
                limiter.release_handle(ip);
            }
        }
        self.attr_cache.clear();
        self.dir_cache.clear();
        if let Some(pool) = &self.read_ahead {
            pool.clear();
        }
    }

    /// The root node's handle, minted on behalf of `client`. Used by MNT.
    pub fn root_handle(&self, client: Option<IpAddr>) -> Result<nfs3::nfs_fh3, nfs3::nfsstat3> {
        let root = self.nodes.root();
        self.ensure_handle(&root, client)
    }

    // ------------------------------------------------------------------
    // attributes

    /// Attributes of a node, served from the cache when fresh.
    pub async fn getattr(&self, node: &Arc<Node>) -> Result<nfs3::fattr3, nfs3::nfsstat3> {
        if let Some(CachedAttr::Positive(attr)) = self.attr_cache.get(node.path()) {
            return Ok(attr);
        }
        self.getattr_fresh(node).await
    }

    /// Attributes straight from the backend, repopulating the cache.
    async fn getattr_fresh(&self, node: &Arc<Node>) -> Result<nfs3::fattr3, nfs3::nfsstat3> {
        let attr = self
            .backend
            .lstat(node.path())
            .await
            .map_err(|e| self.stat_error(node, &e))?;
        let fattr = attr_to_fattr3(node.fileid(), &attr);
        self.attr_cache.put(node.path(), fattr);
        Ok(fattr)
    }

    fn stat_error(&self, node: &Arc<Node>, err: &io::Error) -> nfs3::nfsstat3 {
        let stat = map_io_error(err);
        if stat == nfs3::nfsstat3::NFS3ERR_NOENT {
            // the object went away under a live handle
            self.attr_cache.invalidate(node.path());
            nfs3::nfsstat3::NFS3ERR_STALE
        } else {
            stat
        }
    }

    /// Post-op attributes, best effort.
    pub async fn post_op(&self, node: &Arc<Node>) -> nfs3::post_op_attr {
        match self.getattr(node).await {
            Ok(attr) => nfs3::post_op_attr::attributes(attr),
            Err(_) => nfs3::post_op_attr::Void,
        }
    }

    /// Pre-op attributes, best effort.
    pub async fn pre_op(&self, node: &Arc<Node>) -> nfs3::pre_op_attr {
        match self.getattr(node).await {
            Ok(attr) => nfs3::pre_op_attr::attributes(wcc_attr_of(&attr)),
            Err(_) => nfs3::pre_op_attr::Void,
        }
    }

    /// Applies a SETATTR. The optional guard compares against the current
    /// ctime; sub-changes are applied in mode → ownership → size → times
    /// order and roll forward past individual failures (partial SETATTR is
    /// allowed by the protocol).
    pub async fn setattr(
        &self,
        node: &Arc<Node>,
        sattr: &nfs3::sattr3,
        guard: &nfs3::sattrguard3,
    ) -> Result<nfs3::wcc_data, nfs3::nfsstat3> {
        self.ensure_writable()?;
        let _permit = self.io_permit().await?;
        let current = self.getattr_fresh(node).await?;
        if let nfs3::sattrguard3::obj_ctime(expected) = guard {
            if expected.seconds != current.ctime.seconds
                || expected.nseconds != current.ctime.nseconds
            {
                return Err(nfs3::nfsstat3::NFS3ERR_NOT_SYNC);
            }
        }
        let before = nfs3::pre_op_attr::attributes(wcc_attr_of(&current));
        let path = node.path();

        let mut attempted = 0_u32;
        let mut failed = 0_u32;
        let mut last_err = nfs3::nfsstat3::NFS3ERR_IO;

        if let nfs3::set_mode3::mode(mode) = sattr.mode {
            attempted += 1;
            if let Err(e) = self.backend.chmod(path, mode & 0o7777).await {
                failed += 1;
                last_err = map_io_error(&e);
            }
        }
        let new_uid = match sattr.uid {
            nfs3::set_uid3::uid(uid) => Some(uid),
            nfs3::set_uid3::Void => None,
        };
        let new_gid = match sattr.gid {
            nfs3::set_gid3::gid(gid) => Some(gid),
            nfs3::set_gid3::Void => None,
        };
        if new_uid.is_some() || new_gid.is_some() {
            attempted += 1;
            let uid = new_uid.unwrap_or(current.uid);
            let gid = new_gid.unwrap_or(current.gid);
            if let Err(e) = self.backend.chown(path, uid, gid).await {
                failed += 1;
                last_err = map_io_error(&e);
            }
        }
        if let nfs3::set_size3::size(size) = sattr.size {
            attempted += 1;
            match self.backend.truncate(path, size).await {
                Ok(()) => {
                    if let Some(pool) = &self.read_ahead {
                        pool.invalidate(path);
                    }
                }
                Err(e) => {
                    failed += 1;
                    last_err = map_io_error(&e);
                }
            }
        }
        let atime = match sattr.atime {
            nfs3::set_atime::DONT_CHANGE => None,
            nfs3::set_atime::SET_TO_SERVER_TIME => Some(FileTime::now()),
            nfs3::set_atime::SET_TO_CLIENT_TIME(t) => Some(t.into()),
        };
        let mtime = match sattr.mtime {
            nfs3::set_mtime::DONT_CHANGE => None,
            nfs3::set_mtime::SET_TO_SERVER_TIME => Some(FileTime::now()),
            nfs3::set_mtime::SET_TO_CLIENT_TIME(t) => Some(t.into()),
        };
        if atime.is_some() || mtime.is_some() {
            attempted += 1;
            let atime = atime.unwrap_or_else(|| current.atime.into());
            let mtime = mtime.unwrap_or_else(|| current.mtime.into());
            if let Err(e) = self.backend.chtimes(path, atime, mtime).await {
                failed += 1;
                last_err = map_io_error(&e);
            }
        }

        self.attr_cache.invalidate(path);
        if attempted > 0 && failed == attempted {
            return Err(last_err);
        }
        let after = self.post_op(node).await;
        Ok(nfs3::wcc_data { before, after })
    }

    // ------------------------------------------------------------------
    // lookup and the negative cache

    /// Joins a validated client name onto a directory node and verifies the
    /// result stays lexically under the export root.
    pub fn child_path(
        &self,
        dir: &Arc<Node>,
        name: &nfs3::filename3,
    ) -> Result<String, nfs3::nfsstat3> {
        let name = validate_component(name)?;
        let joined = if dir.path() == "/" {
            format!("/{name}")
        } else {
            format!("{}/{name}", dir.path())
        };
        let canonical =
            canonicalize_under_root(&joined).ok_or(nfs3::nfsstat3::NFS3ERR_ACCES)?;
        if !canonical.starts_with('/') {
            return Err(nfs3::nfsstat3::NFS3ERR_ACCES);
        }
        Ok(canonical)
    }

    /// Looks up `name` under `dir`: negative cache first, then attribute
    /// cache, then the backend. A backend miss populates the negative
    /// cache.
    pub async fn lookup(
        &self,
        dir: &Arc<Node>,
        name: &nfs3::filename3,
        client: Option<IpAddr>,
    ) -> Result<(nfs3::nfs_fh3, nfs3::fattr3), nfs3::nfsstat3> {
        let path = self.child_path(dir, name)?;
        match self.attr_cache.get(&path) {
            Some(CachedAttr::Negative) => {
                trace!("negative cache hit for {path}");
                return Err(nfs3::nfsstat3::NFS3ERR_NOENT);
            }
            Some(CachedAttr::Positive(attr)) => {
                let node = self.nodes.get_or_create(&path);
                let fh = self.ensure_handle(&node, client)?;
                return Ok((fh, attr));
            }
            None => {}
        }
        let _permit = self.io_permit().await?;
        match self.backend.lstat(&path).await {
            Ok(attr) => {
                let node = self.nodes.get_or_create(&path);
                let fattr = attr_to_fattr3(node.fileid(), &attr);
                self.attr_cache.put(&path, fattr);
                let fh = self.ensure_handle(&node, client)?;
                Ok((fh, fattr))
            }
            Err(e) => {
                let stat = map_io_error(&e);
                if stat == nfs3::nfsstat3::NFS3ERR_NOENT {
                    self.attr_cache.put_negative(&path);
                }
                Err(stat)
            }
        }
    }

    // ------------------------------------------------------------------
    // access

    /// Evaluates an ACCESS bitmask for the caller's credentials against the
    /// object's mode bits and the read-only flag, returning the granted
    /// subset.
    pub async fn access(
        &self,
        node: &Arc<Node>,
        requested: u32,
        uid: u32,
        gid: u32,
    ) -> Result<u32, nfs3::nfsstat3> {
        let attr = self.getattr(node).await?;
        let is_dir = attr.ftype == nfs3::ftype3::NF3DIR;
        let shift = if uid == 0 || uid == attr.uid {
            6
        } else if gid == attr.gid {
            3
        } else {
            0
        };
        let can_read = uid == 0 || attr.mode >> shift & 0o4 != 0;
        let can_write = !self.config.read_only && (uid == 0 || attr.mode >> shift & 0o2 != 0);
        let can_exec = attr.mode >> shift & 0o1 != 0 || (uid == 0 && attr.mode & 0o111 != 0);

        let mut granted = 0;
        if can_read {
            granted |= nfs3::ACCESS3_READ;
        }
        if is_dir && (can_exec || uid == 0) {
            granted |= nfs3::ACCESS3_LOOKUP;
        }
        if !is_dir && can_exec {
            granted |= nfs3::ACCESS3_EXECUTE;
        }
        if can_write {
            granted |= nfs3::ACCESS3_MODIFY | nfs3::ACCESS3_EXTEND | nfs3::ACCESS3_DELETE;
        }
        Ok(granted & requested)
    }

    // ------------------------------------------------------------------
    // symlinks

    /// Reads a symlink target.
    pub async fn readlink(&self, node: &Arc<Node>) -> Result<nfs3::nfspath3, nfs3::nfsstat3> {
        let attr = self.getattr(node).await?;
        if attr.ftype != nfs3::ftype3::NF3LNK {
            return Err(nfs3::nfsstat3::NFS3ERR_INVAL);
        }
        let _permit = self.io_permit().await?;
        let target = self.backend.readlink(node.path()).await.map_err(|e| map_io_error(&e))?;
        Ok(target.as_str().into())
    }

    // ------------------------------------------------------------------
    // read and the read-ahead pool

    /// Reads from a file, serving fully-contained ranges from the
    /// read-ahead pool and refilling it after full-count backend reads.
    pub async fn read(
        &self,
        node: &Arc<Node>,
        offset: u64,
        count: u32,
    ) -> Result<ReadResult, nfs3::nfsstat3> {
        offset.checked_add(u64::from(count)).ok_or(nfs3::nfsstat3::NFS3ERR_INVAL)?;
        if count > self.config.max_io_size() {
            return Err(nfs3::nfsstat3::NFS3ERR_INVAL);
        }
        if let Some(pool) = &self.read_ahead {
            if let Some(hit) = pool.get(node.path(), offset, count) {
                trace!("read-ahead hit for {} at {offset}+{count}", node.path());
                let attr = self.post_op(node).await;
                return Ok(ReadResult { data: hit.data, eof: hit.eof, attr });
            }
        }
        let _permit = self.io_permit().await?;
        let file = self.obtain_file(node, false).await?;
        let result = self.read_inner(node, &file, offset, count).await;
        self.stash_file(node, file).await;
        result
    }

    async fn read_inner(
        &self,
        node: &Arc<Node>,
        file: &NodeFile,
        offset: u64,
        count: u32,
    ) -> Result<ReadResult, nfs3::nfsstat3> {
        let data = file.file.read_at(offset, count).await.map_err(|e| map_io_error(&e))?;
        let attr = file.file.stat().await.map_err(|e| map_io_error(&e))?;
        let fattr = attr_to_fattr3(node.fileid(), &attr);
        self.attr_cache.put(node.path(), fattr);
        let served_end = offset + data.len() as u64;
        let eof = served_end >= attr.size;
        if let Some(pool) = &self.read_ahead {
            if !eof && data.len() == count as usize {
                let window = pool.window() as u32;
                if let Ok(follow) = file.file.read_at(served_end, window).await {
                    if !follow.is_empty() {
                        let short = follow.len() < window as usize;
                        pool.insert(node.path(), served_end, follow, short);
                    }
                }
            }
        }
        Ok(ReadResult { data, eof, attr: nfs3::post_op_attr::attributes(fattr) })
    }

    // ------------------------------------------------------------------
    // write / commit

    /// Writes to a file. FILE_SYNC and DATA_SYNC writes are synced before
    /// the reply; the read-ahead buffer and cached attributes for the path
    /// are dropped.
    pub async fn write(
        &self,
        node: &Arc<Node>,
        offset: u64,
        data: &[u8],
        stable: stable_how,
    ) -> Result<WriteResult, nfs3::nfsstat3> {
        self.ensure_writable()?;
        offset.checked_add(data.len() as u64).ok_or(nfs3::nfsstat3::NFS3ERR_INVAL)?;
        if data.len() > self.config.max_io_size() as usize {
            return Err(nfs3::nfsstat3::NFS3ERR_INVAL);
        }
        let _permit = self.io_permit().await?;
        let before = self.pre_op(node).await;
        let file = self.obtain_file(node, true).await?;
        let result = self.write_inner(node, &file, offset, data, stable, before).await;
        self.stash_file(node, file).await;
        result
    }

    async fn write_inner(
        &self,
        node: &Arc<Node>,
        file: &NodeFile,
        offset: u64,
        data: &[u8],
        stable: stable_how,
        before: nfs3::pre_op_attr,
    ) -> Result<WriteResult, nfs3::nfsstat3> {
        let written = file.file.write_at(offset, data).await.map_err(|e| map_io_error(&e))?;
        let committed = match stable {
            stable_how::UNSTABLE => stable_how::UNSTABLE,
            requested => {
                // acknowledged sync data must be durable before the reply
                file.file.sync().await.map_err(|e| map_io_error(&e))?;
                requested
            }
        };
        if let Some(pool) = &self.read_ahead {
            pool.invalidate(node.path());
        }
        self.attr_cache.invalidate(node.path());
        let attr = file.file.stat().await.map_err(|e| map_io_error(&e))?;
        let fattr = attr_to_fattr3(node.fileid(), &attr);
        self.attr_cache.put(node.path(), fattr);
        Ok(WriteResult {
            wcc: nfs3::wcc_data { before, after: nfs3::post_op_attr::attributes(fattr) },
            count: written,
            committed,
        })
    }

    /// Commits a byte range to stable storage and returns the boot
    /// verifier.
    pub async fn commit(
        &self,
        node: &Arc<Node>,
        _offset: u64,
        _count: u32,
    ) -> Result<(nfs3::wcc_data, nfs3::writeverf3), nfs3::nfsstat3> {
        let before = self.pre_op(node).await;
        // only a cached writable file can hold unstable data
        let slot = node.file_slot().lock().await;
        if let Some(node_file) = slot.as_ref() {
            if node_file.writable {
                node_file.file.sync().await.map_err(|e| map_io_error(&e))?;
            }
        }
        drop(slot);
        self.attr_cache.invalidate(node.path());
        let after = self.post_op(node).await;
        Ok((nfs3::wcc_data { before, after }, self.boot_verifier))
    }

    // ------------------------------------------------------------------
    // create / mkdir / symlink

    /// Creates a regular file according to the CREATE mode semantics.
    pub async fn create(
        &self,
        dir: &Arc<Node>,
        name: &nfs3::filename3,
        how: &nfs3::file::createhow3,
        client: Option<IpAddr>,
    ) -> Result<CreateResult, nfs3::nfsstat3> {
        self.ensure_writable()?;
        let path = self.child_path(dir, name)?;
        let _permit = self.io_permit().await?;
        let dir_before = self.pre_op(dir).await;

        match how {
            nfs3::file::createhow3::UNCHECKED(sattr) => {
                let mode = sattr_mode(sattr).unwrap_or(0o644);
                let file = self
                    .backend
                    .open(
                        &path,
                        OpenFlags { write: true, create: true, truncate: false },
                        mode,
                    )
                    .await
                    .map_err(|e| map_io_error(&e))?;
                drop(file);
                self.apply_create_sattr(&path, sattr).await;
            }
            nfs3::file::createhow3::GUARDED(sattr) => {
                if self.backend.lstat(&path).await.is_ok() {
                    return Err(nfs3::nfsstat3::NFS3ERR_EXIST);
                }
                let mode = sattr_mode(sattr).unwrap_or(0o644);
                let file =
                    self.backend.create(&path, mode).await.map_err(|e| map_io_error(&e))?;
                drop(file);
                self.apply_create_sattr(&path, sattr).await;
            }
            nfs3::file::createhow3::EXCLUSIVE(verf) => {
                self.create_exclusive(&path, verf).await?;
            }
        }

        self.finish_create(dir, &path, dir_before, client).await
    }

    /// EXCLUSIVE create: the verifier is persisted in the new file's
    /// atime/mtime seconds so a retransmitted call can be recognized and
    /// succeed idempotently.
    async fn create_exclusive(
        &self,
        path: &str,
        verf: &nfs3::createverf3,
    ) -> Result<(), nfs3::nfsstat3> {
        let atime_secs = u32::from_be_bytes(verf[0..4].try_into().unwrap());
        let mtime_secs = u32::from_be_bytes(verf[4..8].try_into().unwrap());
        let want_atime = FileTime { seconds: i64::from(atime_secs), nanos: 0 };
        let want_mtime = FileTime { seconds: i64::from(mtime_secs), nanos: 0 };
        match self.backend.lstat(path).await {
            Ok(attr) => {
                if attr.atime.seconds == want_atime.seconds
                    && attr.mtime.seconds == want_mtime.seconds
                {
                    // retransmission of the create we already performed
                    Ok(())
                } else {
                    Err(nfs3::nfsstat3::NFS3ERR_EXIST)
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let file =
                    self.backend.create(path, 0o644).await.map_err(|e| map_io_error(&e))?;
                drop(file);
                self.backend
                    .chtimes(path, want_atime, want_mtime)
                    .await
                    .map_err(|e| map_io_error(&e))?;
                Ok(())
            }
            Err(e) => Err(map_io_error(&e)),
        }
    }

    async fn apply_create_sattr(&self, path: &str, sattr: &nfs3::sattr3) {
        // best effort; CREATE succeeds even if attribute application is
        // partially refused by the backend
        if let nfs3::set_size3::size(size) = sattr.size {
            let _ = self.backend.truncate(path, size).await;
        }
        let uid = match sattr.uid {
            nfs3::set_uid3::uid(uid) => Some(uid),
            nfs3::set_uid3::Void => None,
        };
        let gid = match sattr.gid {
            nfs3::set_gid3::gid(gid) => Some(gid),
            nfs3::set_gid3::Void => None,
        };
        if uid.is_some() || gid.is_some() {
            let _ = self.backend.chown(path, uid.unwrap_or(0), gid.unwrap_or(0)).await;
        }
    }

    /// Creates a directory.
    pub async fn mkdir(
        &self,
        dir: &Arc<Node>,
        name: &nfs3::filename3,
        sattr: &nfs3::sattr3,
        client: Option<IpAddr>,
    ) -> Result<CreateResult, nfs3::nfsstat3> {
        self.ensure_writable()?;
        let path = self.child_path(dir, name)?;
        let _permit = self.io_permit().await?;
        let dir_before = self.pre_op(dir).await;
        let mode = sattr_mode(sattr).unwrap_or(0o755);
        self.backend.mkdir(&path, mode).await.map_err(|e| map_io_error(&e))?;
        self.finish_create(dir, &path, dir_before, client).await
    }

    /// Creates a symbolic link.
    pub async fn symlink(
        &self,
        dir: &Arc<Node>,
        name: &nfs3::filename3,
        target: &nfs3::nfspath3,
        _sattr: &nfs3::sattr3,
        client: Option<IpAddr>,
    ) -> Result<CreateResult, nfs3::nfsstat3> {
        self.ensure_writable()?;
        let path = self.child_path(dir, name)?;
        let target =
            std::str::from_utf8(target.as_ref()).map_err(|_| nfs3::nfsstat3::NFS3ERR_INVAL)?;
        let _permit = self.io_permit().await?;
        let dir_before = self.pre_op(dir).await;
        self.backend.symlink(target, &path).await.map_err(|e| map_io_error(&e))?;
        self.finish_create(dir, &path, dir_before, client).await
    }

    /// Shared tail of the create family: allocate node and handle, refresh
    /// caches, invalidate the parent's listing and its children's negative
    /// entries, and emit the parent WCC.
    async fn finish_create(
        &self,
        dir: &Arc<Node>,
        path: &str,
        dir_before: nfs3::pre_op_attr,
        client: Option<IpAddr>,
    ) -> Result<CreateResult, nfs3::nfsstat3> {
        self.attr_cache.invalidate(path);
        self.attr_cache.invalidate(dir.path());
        self.attr_cache.invalidate_negative_in_dir(dir.path());
        self.dir_cache.invalidate(dir.path());

        let node = self.nodes.get_or_create(path);
        let attr = self.getattr_fresh(&node).await?;
        let fh = self.ensure_handle(&node, client)?;
        let dir_after = self.post_op(dir).await;
        Ok(CreateResult {
            fh,
            attr,
            dir_wcc: nfs3::wcc_data { before: dir_before, after: dir_after },
        })
    }

    // ------------------------------------------------------------------
    // remove / rmdir / rename

    /// Removes a file or symlink.
    pub async fn remove(
        &self,
        dir: &Arc<Node>,
        name: &nfs3::filename3,
    ) -> Result<nfs3::wcc_data, nfs3::nfsstat3> {
        self.remove_inner(dir, name, false).await
    }

    /// Removes an empty directory.
    pub async fn rmdir(
        &self,
        dir: &Arc<Node>,
        name: &nfs3::filename3,
    ) -> Result<nfs3::wcc_data, nfs3::nfsstat3> {
        self.remove_inner(dir, name, true).await
    }

    async fn remove_inner(
        &self,
        dir: &Arc<Node>,
        name: &nfs3::filename3,
        want_dir: bool,
    ) -> Result<nfs3::wcc_data, nfs3::nfsstat3> {
        self.ensure_writable()?;
        let path = self.child_path(dir, name)?;
        let _permit = self.io_permit().await?;
        let dir_before = self.pre_op(dir).await;
        let attr = self.backend.lstat(&path).await.map_err(|e| map_io_error(&e))?;
        let is_dir = matches!(attr.kind, crate::vfs::FileKind::Directory);
        if want_dir && !is_dir {
            return Err(nfs3::nfsstat3::NFS3ERR_NOTDIR);
        }
        if !want_dir && is_dir {
            return Err(nfs3::nfsstat3::NFS3ERR_ISDIR);
        }
        self.backend.remove(&path).await.map_err(|e| map_io_error(&e))?;
        self.forget_path(&path).await;
        self.attr_cache.invalidate(dir.path());
        self.dir_cache.invalidate(dir.path());
        let dir_after = self.post_op(dir).await;
        Ok(nfs3::wcc_data { before: dir_before, after: dir_after })
    }

    /// Renames an object, invalidating both directories' caches and both
    /// paths' state.
    pub async fn rename(
        &self,
        from_dir: &Arc<Node>,
        from_name: &nfs3::filename3,
        to_dir: &Arc<Node>,
        to_name: &nfs3::filename3,
    ) -> Result<(nfs3::wcc_data, nfs3::wcc_data), nfs3::nfsstat3> {
        self.ensure_writable()?;
        let from_path = self.child_path(from_dir, from_name)?;
        let to_path = self.child_path(to_dir, to_name)?;
        let _permit = self.io_permit().await?;
        let from_before = self.pre_op(from_dir).await;
        let to_before = self.pre_op(to_dir).await;
        self.backend.rename(&from_path, &to_path).await.map_err(|e| map_io_error(&e))?;

        self.forget_path(&from_path).await;
        self.forget_path(&to_path).await;
        for dir in [from_dir, to_dir] {
            self.attr_cache.invalidate(dir.path());
            self.attr_cache.invalidate_negative_in_dir(dir.path());
            self.dir_cache.invalidate(dir.path());
        }
        let from_after = self.post_op(from_dir).await;
        let to_after = self.post_op(to_dir).await;
        Ok((
            nfs3::wcc_data { before: from_before, after: from_after },
            nfs3::wcc_data { before: to_before, after: to_after },
        ))
    }

    /// Drops all per-path server state: caches, read-ahead, the node-table
    /// entry, the node's handle and its open file.
    async fn forget_path(&self, path: &str) {
        self.attr_cache.invalidate(path);
        if let Some(pool) = &self.read_ahead {
            pool.invalidate(path);
        }
        if let Some(node) = self.nodes.get(path) {
            let handle = node.handle();
            if handle != 0 {
                self.release_handle(handle).await;
            } else if let Some(file) = node.take_file().await {
                self.uncount_file(&file);
            }
        }
        self.nodes.forget(path);
    }

    // ------------------------------------------------------------------
    // directories

    /// The complete listing of a directory, from the cache when fresh. Also
    /// returns the directory attributes used for cookie-verifier
    /// construction.
    pub async fn readdir(
        &self,
        dir: &Arc<Node>,
    ) -> Result<(Vec<DirCacheEntry>, nfs3::fattr3), nfs3::nfsstat3> {
        let dir_attr = self.getattr(dir).await?;
        if dir_attr.ftype != nfs3::ftype3::NF3DIR {
            return Err(nfs3::nfsstat3::NFS3ERR_NOTDIR);
        }
        if let Some(listing) = self.dir_cache.get(dir.path()) {
            return Ok((listing, dir_attr));
        }
        let _permit = self.io_permit().await?;
        let entries = self.backend.readdir(dir.path()).await.map_err(|e| map_io_error(&e))?;
        let listing: Vec<DirCacheEntry> = entries
            .into_iter()
            .map(|entry| {
                let child_path = if dir.path() == "/" {
                    format!("/{}", entry.name)
                } else {
                    format!("{}/{}", dir.path(), entry.name)
                };
                DirCacheEntry {
                    fileid: fileid_for_path(&child_path),
                    name: entry.name,
                    ftype: entry.kind.into(),
                    size: entry.size,
                    mtime: entry.mtime,
                }
            })
            .collect();
        self.dir_cache.put(dir.path(), listing.clone());
        Ok((listing, dir_attr))
    }

    /// The node for a server-produced child name of `dir` (from a
    /// directory listing). The canonical-form gate still applies.
    pub fn child_node(&self, dir: &Arc<Node>, name: &str) -> Result<Arc<Node>, nfs3::nfsstat3> {
        let joined = if dir.path() == "/" {
            format!("/{name}")
        } else {
            format!("{}/{name}", dir.path())
        };
        let canonical =
            canonicalize_under_root(&joined).ok_or(nfs3::nfsstat3::NFS3ERR_ACCES)?;
        Ok(self.nodes.get_or_create(&canonical))
    }

    /// Attributes for a READDIRPLUS entry: the attribute cache when fresh,
    /// otherwise synthesized from the listing fields.
    pub fn listing_attr(&self, node: &Arc<Node>, entry: &DirCacheEntry) -> nfs3::fattr3 {
        if let Some(CachedAttr::Positive(attr)) = self.attr_cache.get(node.path()) {
            attr
        } else {
            entry.to_fattr3(node.fileid())
        }
    }

    /// Resolves an already-sanitized slash-separated path (from MNT) to a
    /// handle, validating every component on the way.
    pub async fn resolve_export_path(
        &self,
        path: &str,
        client: Option<IpAddr>,
    ) -> Result<nfs3::nfs_fh3, nfs3::nfsstat3> {
        let canonical =
            canonicalize_under_root(path).ok_or(nfs3::nfsstat3::NFS3ERR_ACCES)?;
        if canonical == "/" {
            return self.root_handle(client);
        }
        let mut current = self.nodes.root();
        let components: Vec<String> = canonical
            .trim_start_matches('/')
            .split('/')
            .map(str::to_string)
            .collect();
        for component in components {
            let name: nfs3::filename3 = component.as_str().into();
            let (fh, _attr) = self.lookup(&current, &name, client).await?;
            current = self.resolve(&fh)?;
        }
        self.ensure_handle(&current, client)
    }

    // ------------------------------------------------------------------
    // helpers

    fn ensure_writable(&self) -> Result<(), nfs3::nfsstat3> {
        if self.config.read_only {
            Err(nfs3::nfsstat3::NFS3ERR_ROFS)
        } else {
            Ok(())
        }
    }

    async fn io_permit(&self) -> Result<tokio::sync::SemaphorePermit<'_>, nfs3::nfsstat3> {
        self.io_gate.acquire().await.map_err(|_| nfs3::nfsstat3::NFS3ERR_SERVERFAULT)
    }

    /// Takes the node's cached file if usable for this access, otherwise
    /// opens a fresh one. The open is charged against the open-file budget;
    /// at the cap the file is transient and closed after the operation.
    async fn obtain_file(&self, node: &Arc<Node>, write: bool) -> Result<NodeFile, nfs3::nfsstat3> {
        if let Some(existing) = node.take_file().await {
            if existing.writable || !write {
                return Ok(existing);
            }
            self.uncount_file(&existing);
        }
        let flags = if write { OpenFlags::WRITE } else { OpenFlags::READ };
        let file: Box<dyn VfsFile> = self
            .backend
            .open(node.path(), flags, 0o644)
            .await
            .map_err(|e| self.open_error(node, &e))?;
        let counted = self
            .open_files
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                (v < self.config.max_open_files).then_some(v + 1)
            })
            .is_ok();
        if !counted {
            warn!("open-file budget exhausted; using transient open for {}", node.path());
        }
        Ok(NodeFile { file, writable: write, counted })
    }

    fn open_error(&self, node: &Arc<Node>, err: &io::Error) -> nfs3::nfsstat3 {
        self.stat_error(node, err)
    }

    /// Returns a file to the node's slot, or closes it when transient or
    /// when another task stashed one first.
    async fn stash_file(&self, node: &Arc<Node>, file: NodeFile) {
        if !file.counted {
            return;
        }
        let mut slot = node.file_slot().lock().await;
        if slot.is_none() {
            *slot = Some(file);
        } else {
            drop(slot);
            self.uncount_file(&file);
        }
    }

    fn uncount_file(&self, file: &NodeFile) {
        if file.counted {
            self.open_files.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Open backing files currently charged to the budget.
    pub fn open_file_count(&self) -> usize {
        self.open_files.load(Ordering::Acquire)
    }
}

fn sattr_mode(sattr: &nfs3::sattr3) -> Option<u32> {
    match sattr.mode {
        nfs3::set_mode3::mode(mode) => Some(mode & 0o7777),
        nfs3::set_mode3::Void => None,
    }
}
