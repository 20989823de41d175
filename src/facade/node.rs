//! Path nodes and the node table.
//!
//! A [`Node`] represents one filesystem object currently visible to NFS
//! clients: its canonical absolute path (rooted at `/`, the export root),
//! its server-assigned file id, the handle currently minted for it, and a
//! lazily opened backing file. Nodes hold no references to each other, in
//! either direction; parents and children are reached through the path
//! string, so reference cycles are impossible by construction.
//!
//! The [`NodeTable`] maps paths to live nodes through weak references: a
//! node stays alive exactly as long as something (the handle registry, an
//! in-flight operation) holds it, and the table opportunistically drops dead
//! entries. The root node is pinned for the table's lifetime.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use crate::protocol::xdr::nfs3;
use crate::vfs::VfsFile;

/// File id of the export root.
pub const ROOT_FILEID: nfs3::fileid3 = 1;

/// A backing file cached on a node, with the access mode it was opened in.
pub struct NodeFile {
    /// The open backing file
    pub file: Box<dyn VfsFile>,
    /// True when the file was opened for writing
    pub writable: bool,
    /// True when this open is counted against the open-file cap
    pub counted: bool,
}

/// One filesystem object visible to clients.
pub struct Node {
    path: String,
    fileid: nfs3::fileid3,
    // current handle minted for this node, 0 when none
    handle: AtomicU64,
    file: tokio::sync::Mutex<Option<NodeFile>>,
}

impl Node {
    fn new(path: String) -> Node {
        let fileid = fileid_for_path(&path);
        Node { path, fileid, handle: AtomicU64::new(0), file: tokio::sync::Mutex::new(None) }
    }

    /// The node's canonical absolute path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The server-assigned file id.
    pub fn fileid(&self) -> nfs3::fileid3 {
        self.fileid
    }

    /// The handle currently minted for this node, or zero.
    pub fn handle(&self) -> u64 {
        self.handle.load(Ordering::Acquire)
    }

    /// Publishes a freshly minted handle unless another thread won the race;
    /// returns the handle that ended up current.
    pub fn publish_handle(&self, handle: u64) -> u64 {
        match self.handle.compare_exchange(0, handle, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => handle,
            Err(current) => current,
        }
    }

    /// Clears the node's handle if it still equals `handle`.
    pub fn clear_handle(&self, handle: u64) {
        let _ = self.handle.compare_exchange(handle, 0, Ordering::AcqRel, Ordering::Acquire);
    }

    /// The node's cached backing file slot.
    pub fn file_slot(&self) -> &tokio::sync::Mutex<Option<NodeFile>> {
        &self.file
    }

    /// Takes the cached backing file out of the node, if any. The caller
    /// drops it outside any registry lock.
    pub async fn take_file(&self) -> Option<NodeFile> {
        self.file.lock().await.take()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("path", &self.path)
            .field("fileid", &self.fileid)
            .field("handle", &self.handle.load(Ordering::Relaxed))
            .finish()
    }
}

/// Derives a stable (within one server lifetime) 64-bit file id from a
/// canonical path. Zero and the root id are never produced for non-root
/// paths.
pub fn fileid_for_path(path: &str) -> nfs3::fileid3 {
    if path == "/" {
        return ROOT_FILEID;
    }
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    match hasher.finish() {
        0 | ROOT_FILEID => 0x5eed_f11e_0000_0001,
        id => id,
    }
}

/// Weak-reference table of live nodes keyed by path, with a pinned root.
pub struct NodeTable {
    nodes: RwLock<HashMap<String, Weak<Node>>>,
    root: Arc<Node>,
}

impl NodeTable {
    /// Builds a table whose root node is pinned for the table's lifetime.
    pub fn new() -> NodeTable {
        let root = Arc::new(Node::new("/".to_string()));
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Arc::downgrade(&root));
        NodeTable { nodes: RwLock::new(nodes), root }
    }

    /// The pinned root node.
    pub fn root(&self) -> Arc<Node> {
        self.root.clone()
    }

    /// Returns the live node for `path`, if one exists.
    pub fn get(&self, path: &str) -> Option<Arc<Node>> {
        self.nodes.read().unwrap().get(path).and_then(Weak::upgrade)
    }

    /// Returns the node for `path`, creating it on first use. Dead weak
    /// entries encountered on the way are swept out.
    pub fn get_or_create(&self, path: &str) -> Arc<Node> {
        if path == "/" {
            return self.root.clone();
        }
        if let Some(node) = self.get(path) {
            return node;
        }
        let mut nodes = self.nodes.write().unwrap();
        if let Some(node) = nodes.get(path).and_then(Weak::upgrade) {
            return node;
        }
        nodes.retain(|_, weak| weak.strong_count() > 0);
        let node = Arc::new(Node::new(path.to_string()));
        nodes.insert(path.to_string(), Arc::downgrade(&node));
        node
    }

    /// Drops the table entry for `path` (the node itself lives on while
    /// referenced). Called when the object is removed or renamed away.
    pub fn forget(&self, path: &str) {
        if path != "/" {
            self.nodes.write().unwrap().remove(path);
        }
    }

    /// Number of live entries, root included.
    pub fn len(&self) -> usize {
        self.nodes.read().unwrap().values().filter(|weak| weak.strong_count() > 0).count()
    }

    /// Always false; the root is pinned.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for NodeTable {
    fn default() -> Self {
        NodeTable::new()
    }
}
