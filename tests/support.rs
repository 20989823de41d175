//! Shared test fixtures: an in-memory backing filesystem and helpers for
//! driving the RPC dispatcher directly.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{self, Cursor};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use nfs_tundra::config::ServerConfig;
use nfs_tundra::facade::VfsFacade;
use nfs_tundra::limit::RateLimiter;
use nfs_tundra::protocol::nfs::mount::MountTable;
use nfs_tundra::protocol::rpc::{self, CallDedup, Context, Credentials};
use nfs_tundra::stats::ServerStats;
use nfs_tundra::vfs::{DirEntry, FileAttr, FileKind, FileTime, Filesystem, OpenFlags, VfsFile};
use nfs_tundra::xdr::{self, deserialize, nfs3, Serialize};

fn not_found() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "no such entry")
}

#[derive(Clone, Debug)]
pub enum MemNode {
    File { data: Vec<u8>, mode: u32, uid: u32, gid: u32, atime: FileTime, mtime: FileTime },
    Dir { mode: u32, mtime: FileTime },
    Symlink { target: String },
}

impl MemNode {
    fn file(data: &[u8]) -> MemNode {
        MemNode::File {
            data: data.to_vec(),
            mode: 0o644,
            uid: 0,
            gid: 0,
            atime: FileTime::now(),
            mtime: FileTime::now(),
        }
    }

    fn attr(&self) -> FileAttr {
        match self {
            MemNode::File { data, mode, uid, gid, atime, mtime } => FileAttr {
                kind: FileKind::Regular,
                mode: *mode,
                nlink: 1,
                uid: *uid,
                gid: *gid,
                size: data.len() as u64,
                used: data.len() as u64,
                rdev: (0, 0),
                atime: *atime,
                mtime: *mtime,
                ctime: *mtime,
            },
            MemNode::Dir { mode, mtime } => FileAttr {
                kind: FileKind::Directory,
                mode: *mode,
                nlink: 2,
                uid: 0,
                gid: 0,
                size: 4096,
                used: 4096,
                rdev: (0, 0),
                atime: *mtime,
                mtime: *mtime,
                ctime: *mtime,
            },
            MemNode::Symlink { target } => FileAttr {
                kind: FileKind::Symlink,
                mode: 0o777,
                nlink: 1,
                uid: 0,
                gid: 0,
                size: target.len() as u64,
                used: target.len() as u64,
                rdev: (0, 0),
                atime: FileTime::EPOCH,
                mtime: FileTime::EPOCH,
                ctime: FileTime::EPOCH,
            },
        }
    }
}

struct MemState {
    nodes: BTreeMap<String, MemNode>,
    // every path handed to stat/lstat, for traversal assertions
    stat_log: Vec<String>,
}

/// A thread-safe in-memory filesystem rooted at "/".
pub struct MemFs {
    state: Arc<Mutex<MemState>>,
}

impl MemFs {
    pub fn new() -> MemFs {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            MemNode::Dir { mode: 0o755, mtime: FileTime::now() },
        );
        MemFs { state: Arc::new(Mutex::new(MemState { nodes, stat_log: Vec::new() })) }
    }

    pub fn add_dir(&self, path: &str) {
        self.state
            .lock()
            .unwrap()
            .nodes
            .insert(path.to_string(), MemNode::Dir { mode: 0o755, mtime: FileTime::now() });
    }

    pub fn add_file(&self, path: &str, data: &[u8]) {
        self.state.lock().unwrap().nodes.insert(path.to_string(), MemNode::file(data));
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state.lock().unwrap().nodes.contains_key(path)
    }

    pub fn file_data(&self, path: &str) -> Option<Vec<u8>> {
        match self.state.lock().unwrap().nodes.get(path) {
            Some(MemNode::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn stat_log(&self) -> Vec<String> {
        self.state.lock().unwrap().stat_log.clone()
    }

    pub fn touch_mtime(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        match state.nodes.get_mut(path) {
            Some(MemNode::File { mtime, .. }) | Some(MemNode::Dir { mtime, .. }) => {
                mtime.seconds += 1;
            }
            _ => {}
        }
    }

    fn parent_exists(state: &MemState, path: &str) -> bool {
        let parent = match path.rfind('/') {
            Some(0) => "/",
            Some(idx) => &path[..idx],
            None => "/",
        };
        matches!(state.nodes.get(parent), Some(MemNode::Dir { .. }))
    }

    fn bump_parent_mtime(state: &mut MemState, path: &str) {
        let parent = match path.rfind('/') {
            Some(0) => "/".to_string(),
            Some(idx) => path[..idx].to_string(),
            None => "/".to_string(),
        };
        if let Some(MemNode::Dir { mtime, .. }) = state.nodes.get_mut(&parent) {
            mtime.seconds += 1;
        }
    }
}

pub struct MemFile {
    state: Arc<Mutex<MemState>>,
    path: String,
    writable: bool,
}

#[async_trait]
impl VfsFile for MemFile {
    async fn read_at(&self, offset: u64, count: u32) -> io::Result<Vec<u8>> {
        let state = self.state.lock().unwrap();
        match state.nodes.get(&self.path) {
            Some(MemNode::File { data, .. }) => {
                let start = (offset as usize).min(data.len());
                let end = (start + count as usize).min(data.len());
                Ok(data[start..end].to_vec())
            }
            _ => Err(not_found()),
        }
    }

    async fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<u32> {
        if !self.writable {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only open"));
        }
        let mut state = self.state.lock().unwrap();
        match state.nodes.get_mut(&self.path) {
            Some(MemNode::File { data, mtime, .. }) => {
                let end = offset as usize + buf.len();
                if data.len() < end {
                    data.resize(end, 0);
                }
                data[offset as usize..end].copy_from_slice(buf);
                mtime.seconds += 1;
                Ok(buf.len() as u32)
            }
            _ => Err(not_found()),
        }
    }

    async fn stat(&self) -> io::Result<FileAttr> {
        let state = self.state.lock().unwrap();
        state.nodes.get(&self.path).map(MemNode::attr).ok_or_else(not_found)
    }
}

#[async_trait]
impl Filesystem for MemFs {
    async fn stat(&self, path: &str) -> io::Result<FileAttr> {
        self.lstat(path).await
    }

    async fn lstat(&self, path: &str) -> io::Result<FileAttr> {
        let mut state = self.state.lock().unwrap();
        state.stat_log.push(path.to_string());
        state.nodes.get(path).map(MemNode::attr).ok_or_else(not_found)
    }

    async fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> io::Result<Box<dyn VfsFile>> {
        {
            let mut state = self.state.lock().unwrap();
            match state.nodes.get_mut(path) {
                Some(MemNode::File { data, .. }) => {
                    if flags.truncate {
                        data.clear();
                    }
                }
                Some(_) => return Err(io::Error::new(io::ErrorKind::IsADirectory, "not a file")),
                None if flags.create => {
                    if !Self::parent_exists(&state, path) {
                        return Err(not_found());
                    }
                    let mut node = MemNode::file(&[]);
                    if let MemNode::File { mode: m, .. } = &mut node {
                        *m = mode;
                    }
                    state.nodes.insert(path.to_string(), node);
                    Self::bump_parent_mtime(&mut state, path);
                }
                None => return Err(not_found()),
            }
        }
        Ok(Box::new(MemFile {
            state: self.state.clone(),
            path: path.to_string(),
            writable: flags.write || flags.create,
        }))
    }

    async fn create(&self, path: &str, mode: u32) -> io::Result<Box<dyn VfsFile>> {
        {
            let mut state = self.state.lock().unwrap();
            if state.nodes.contains_key(path) {
                return Err(io::Error::new(io::ErrorKind::AlreadyExists, "exists"));
            }
            if !Self::parent_exists(&state, path) {
                return Err(not_found());
            }
            let mut node = MemNode::file(&[]);
            if let MemNode::File { mode: m, .. } = &mut node {
                *m = mode;
            }
            state.nodes.insert(path.to_string(), node);
            Self::bump_parent_mtime(&mut state, path);
        }
        Ok(Box::new(MemFile { state: self.state.clone(), path: path.to_string(), writable: true }))
    }

    async fn mkdir(&self, path: &str, mode: u32) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.nodes.contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "exists"));
        }
        if !Self::parent_exists(&state, path) {
            return Err(not_found());
        }
        state
            .nodes
            .insert(path.to_string(), MemNode::Dir { mode, mtime: FileTime::now() });
        Self::bump_parent_mtime(&mut state, path);
        Ok(())
    }

    async fn remove(&self, path: &str) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.nodes.get(path) {
            Some(MemNode::Dir { .. }) => {
                let child_prefix = format!("{}/", path.trim_end_matches('/'));
                if state.nodes.keys().any(|k| k.starts_with(&child_prefix)) {
                    return Err(io::Error::new(
                        io::ErrorKind::DirectoryNotEmpty,
                        "directory not empty",
                    ));
                }
            }
            Some(_) => {}
            None => return Err(not_found()),
        }
        state.nodes.remove(path);
        Self::bump_parent_mtime(&mut state, path);
        Ok(())
    }

    async fn rename(&self, old: &str, new: &str) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.nodes.contains_key(old) {
            return Err(not_found());
        }
        let moved: Vec<(String, MemNode)> = state
            .nodes
            .iter()
            .filter(|(k, _)| *k == old || k.starts_with(&format!("{old}/")))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, _) in &moved {
            state.nodes.remove(k);
        }
        for (k, v) in moved {
            let suffix = &k[old.len()..];
            state.nodes.insert(format!("{new}{suffix}"), v);
        }
        Self::bump_parent_mtime(&mut state, old);
        Self::bump_parent_mtime(&mut state, new);
        Ok(())
    }

    async fn truncate(&self, path: &str, size: u64) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.nodes.get_mut(path) {
            Some(MemNode::File { data, mtime, .. }) => {
                data.resize(size as usize, 0);
                mtime.seconds += 1;
                Ok(())
            }
            Some(_) => Err(io::Error::new(io::ErrorKind::IsADirectory, "not a file")),
            None => Err(not_found()),
        }
    }

    async fn chmod(&self, path: &str, new_mode: u32) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.nodes.get_mut(path) {
            Some(MemNode::File { mode, .. }) | Some(MemNode::Dir { mode, .. }) => {
                *mode = new_mode;
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(not_found()),
        }
    }

    async fn chown(&self, path: &str, new_uid: u32, new_gid: u32) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.nodes.get_mut(path) {
            Some(MemNode::File { uid, gid, .. }) => {
                *uid = new_uid;
                *gid = new_gid;
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(not_found()),
        }
    }

    async fn chtimes(&self, path: &str, new_atime: FileTime, new_mtime: FileTime) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.nodes.get_mut(path) {
            Some(MemNode::File { atime, mtime, .. }) => {
                *atime = new_atime;
                *mtime = new_mtime;
                Ok(())
            }
            Some(MemNode::Dir { mtime, .. }) => {
                *mtime = new_mtime;
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(not_found()),
        }
    }

    async fn readdir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let state = self.state.lock().unwrap();
        if !matches!(state.nodes.get(path), Some(MemNode::Dir { .. })) {
            return Err(io::Error::new(io::ErrorKind::NotADirectory, "not a directory"));
        }
        let prefix = if path == "/" { "/".to_string() } else { format!("{path}/") };
        let mut entries = Vec::new();
        for (k, v) in state.nodes.range(prefix.clone()..) {
            if !k.starts_with(&prefix) {
                break;
            }
            let rest = &k[prefix.len()..];
            if rest.is_empty() || rest.contains('/') {
                continue;
            }
            let attr = v.attr();
            entries.push(DirEntry {
                name: rest.to_string(),
                kind: attr.kind,
                size: attr.size,
                mtime: attr.mtime,
            });
        }
        Ok(entries)
    }

    async fn symlink(&self, target: &str, path: &str) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.nodes.contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "exists"));
        }
        state
            .nodes
            .insert(path.to_string(), MemNode::Symlink { target: target.to_string() });
        Self::bump_parent_mtime(&mut state, path);
        Ok(())
    }

    async fn readlink(&self, path: &str) -> io::Result<String> {
        let state = self.state.lock().unwrap();
        match state.nodes.get(path) {
            Some(MemNode::Symlink { target }) => Ok(target.clone()),
            Some(_) => Err(io::Error::new(io::ErrorKind::InvalidInput, "not a symlink")),
            None => Err(not_found()),
        }
    }
}

/// A fully wired test server: backend, façade, and a per-connection
/// context, without a TCP socket in the way.
pub struct TestServer {
    pub backend: Arc<MemFs>,
    pub facade: Arc<VfsFacade>,
    pub context: Context,
    xid: AtomicU32,
}

impl TestServer {
    pub fn new(config: ServerConfig) -> TestServer {
        Self::with_client(config, "127.0.0.1:40000")
    }

    pub fn with_client(config: ServerConfig, client: &str) -> TestServer {
        // tracing output for debugging test failures
        let _ = tracing_subscriber::fmt::try_init();
        let backend = Arc::new(MemFs::new());
        let config = Arc::new(config);
        let limiter = config.rate_limit.clone().map(|cfg| Arc::new(RateLimiter::new(cfg)));
        let facade = VfsFacade::new(backend.clone(), config.clone(), limiter.clone());
        let context = Context {
            conn_id: 1,
            client_addr: client.parse().unwrap(),
            auth: Credentials::default(),
            facade: facade.clone(),
            config,
            limiter,
            stats: Arc::new(ServerStats::new()),
            export_name: Arc::new("/".to_string()),
            mounts: Arc::new(MountTable::new()),
            dedup: Arc::new(CallDedup::new(Duration::from_secs(60))),
        };
        TestServer { backend, facade, context, xid: AtomicU32::new(100) }
    }

    pub fn next_xid(&self) -> u32 {
        self.xid.fetch_add(1, Ordering::Relaxed)
    }

    /// Serializes a call for the given program/procedure with AUTH_NONE.
    pub fn call_bytes(
        &self,
        xid: u32,
        prog: u32,
        vers: u32,
        proc: u32,
        args: &impl Serialize,
    ) -> Vec<u8> {
        let call = xdr::rpc::call_body {
            rpcvers: 2,
            prog,
            vers,
            proc,
            cred: xdr::rpc::opaque_auth::default(),
            verf: xdr::rpc::opaque_auth::default(),
        };
        let msg = xdr::rpc::rpc_msg { xid, body: xdr::rpc::rpc_body::CALL(call) };
        let mut buf = Vec::new();
        msg.serialize(&mut buf).expect("serialize call");
        args.serialize(&mut buf).expect("serialize args");
        buf
    }

    /// Runs one raw record through the dispatcher, returning the reply
    /// bytes (None when the record was dropped as a retransmission).
    pub async fn process(&self, record: &[u8]) -> Option<Vec<u8>> {
        let mut input = Cursor::new(record.to_vec());
        let mut reply: Vec<u8> = Vec::new();
        let mut output = Cursor::new(&mut reply);
        let replied = rpc::handle_rpc(&mut input, &mut output, self.context.clone())
            .await
            .expect("handle_rpc");
        replied.then_some(reply)
    }

    /// Runs one NFSv3 call, returning the reply bytes past the RPC header
    /// plus the decoded NFS status.
    pub async fn nfs_call(&self, proc: u32, args: &impl Serialize) -> (nfs3::nfsstat3, Cursor<Vec<u8>>) {
        let xid = self.next_xid();
        let record = self.call_bytes(xid, nfs3::PROGRAM, nfs3::VERSION, proc, args);
        let reply = self.process(&record).await.expect("expected a reply");
        let mut cursor = Cursor::new(reply);
        let header = deserialize::<xdr::rpc::rpc_msg>(&mut cursor).expect("reply header");
        assert_eq!(header.xid, xid);
        match header.body {
            xdr::rpc::rpc_body::REPLY(xdr::rpc::reply_body::MSG_ACCEPTED(accepted)) => {
                match accepted.reply_data {
                    xdr::rpc::accept_body::SUCCESS => {}
                    other => panic!("expected SUCCESS accept body, got {other:?}"),
                }
            }
            other => panic!("expected MSG_ACCEPTED, got {other:?}"),
        }
        let status = deserialize::<nfs3::nfsstat3>(&mut cursor).expect("nfs status");
        (status, cursor)
    }

    /// Mounts "/" and returns the root file handle.
    pub async fn mount_root(&self) -> nfs3::nfs_fh3 {
        use nfs_tundra::protocol::xdr::mount;
        let xid = self.next_xid();
        let path: mount::dirpath = "/".into();
        let record = self.call_bytes(xid, mount::PROGRAM, mount::VERSION, 1, &path);
        let reply = self.process(&record).await.expect("mount reply");
        let mut cursor = Cursor::new(reply);
        let _header = deserialize::<xdr::rpc::rpc_msg>(&mut cursor).expect("reply header");
        let status = deserialize::<mount::mountstat3>(&mut cursor).expect("mount status");
        assert_eq!(status, mount::mountstat3::MNT3_OK);
        let res = deserialize::<mount::mountres3_ok>(&mut cursor).expect("mount resok");
        nfs3::nfs_fh3 { data: res.fhandle }
    }
}
