//! # memfs
//!
//! An in-memory file tree that lives exactly as long as the host that owns it.
//!
//! ## Philosophy
//!
//! - **Owned Tree**: The root directory owns every node. Anything outside the
//!   tree (open descriptors, for instance) holds a [`WeakNode`] and must cope
//!   with the node disappearing.
//! - **Literal Paths**: Paths split on `/`. Every segment is taken literally:
//!   `.` and `..` are ordinary names, there are no symlinks, and names are
//!   case-sensitive. A single leading `/` is optional.
//! - **Append-Only Shape**: Files and directories can be created or replaced,
//!   never removed or renamed.
//!
//! ## Example
//!
//! ```rust
//! use memfs::VirtualFileSystem;
//!
//! let fs = VirtualFileSystem::new();
//! fs.add_file("/data/input.txt", b"hello".to_vec()).unwrap();
//! assert_eq!(fs.read_file("/data/input.txt").unwrap(), b"hello");
//! assert!(fs.lookup("/data").unwrap().is_dir());
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;


/// Filesystem errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The path is empty or contains an empty segment (`a//b`, `a/`).
    MalformedPath(String),
    /// A non-final segment names a file.
    NotADirectory(String),
    /// The final segment names a directory where a file was expected.
    IsADirectory(String),
    /// A parent directory does not exist.
    NotFound(String),
    /// The node already exists.
    AlreadyExists(String),
    /// A write or resize would grow the file past [`MAX_FILE_SIZE`].
    FileTooLarge(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedPath(p) => write!(f, "Malformed path: {:?}", p),
            Self::NotADirectory(p) => write!(f, "Not a directory: {}", p),
            Self::IsADirectory(p) => write!(f, "Is a directory: {}", p),
            Self::NotFound(p) => write!(f, "No such file or directory: {}", p),
            Self::AlreadyExists(p) => write!(f, "Already exists: {}", p),
            Self::FileTooLarge(p) => write!(f, "File too large: {}", p),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Largest size a file may grow to. Reads and writes past it never allocate.
pub const MAX_FILE_SIZE: u64 = 1 << 30;

/// Locks a node, ignoring poisoning.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Splits a path into its literal segments.
///
/// `"/"` yields no segments (the root). The empty string and any empty
/// segment are malformed.
pub fn segments(path: &str) -> Result<Vec<&str>> {
    if path.is_empty() {
        return Err(Error::MalformedPath(path.to_string()));
    }
    let rest = path.strip_prefix('/').unwrap_or(path);
    if rest.is_empty() {
        return Ok(Vec::new());
    }
    let segs: Vec<&str> = rest.split('/').collect();
    if segs.iter().any(|s| s.is_empty()) {
        return Err(Error::MalformedPath(path.to_string()));
    }
    Ok(segs)
}

/// The kind of a node, without its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// A regular file: a name and raw bytes. No timestamps, no permissions.
#[derive(Debug)]
pub struct FileNode {
    name: String,
    content: Mutex<Vec<u8>>,
}

impl FileNode {
    fn new(name: &str, content: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            content: Mutex::new(content),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> u64 {
        lock(&self.content).len() as u64
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.content).is_empty()
    }

    /// Returns a copy of the file contents.
    pub fn contents(&self) -> Vec<u8> {
        lock(&self.content).clone()
    }

    /// Copies bytes starting at `offset` into `buf`.
    ///
    /// Returns the number of bytes copied, which is zero at or past the end.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        let content = lock(&self.content);
        let Ok(start) = usize::try_from(offset) else {
            return 0;
        };
        if start >= content.len() {
            return 0;
        }
        let n = buf.len().min(content.len() - start);
        buf[..n].copy_from_slice(&content[start..start + n]);
        n
    }

    /// Writes `data` at `offset`, growing the file as needed.
    ///
    /// A gap between the old end and `offset` is zero-filled. Growing past
    /// [`MAX_FILE_SIZE`] is `FileTooLarge` and leaves the file untouched.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<usize> {
        let end = self.checked_end(offset, data.len())?;
        let start = end - data.len();
        let mut content = lock(&self.content);
        if content.len() < end {
            content.resize(end, 0);
        }
        content[start..end].copy_from_slice(data);
        Ok(data.len())
    }

    /// Appends `data` and returns the new length.
    pub fn append(&self, data: &[u8]) -> Result<u64> {
        let mut content = lock(&self.content);
        let end = self.checked_end(content.len() as u64, data.len())?;
        content.extend_from_slice(data);
        Ok(end as u64)
    }

    /// Truncates or zero-extends the file to `len` bytes.
    pub fn set_len(&self, len: u64) -> Result<()> {
        let len = self.checked_end(len, 0)?;
        lock(&self.content).resize(len, 0);
        Ok(())
    }

    fn checked_end(&self, offset: u64, len: usize) -> Result<usize> {
        let too_large = || Error::FileTooLarge(self.name.clone());
        let end = offset.checked_add(len as u64).ok_or_else(too_large)?;
        if end > MAX_FILE_SIZE {
            return Err(too_large());
        }
        usize::try_from(end).map_err(|_| too_large())
    }
}

/// A directory: a name and an ordered map of children.
#[derive(Debug)]
pub struct DirNode {
    name: String,
    children: Mutex<BTreeMap<String, Node>>,
}

impl DirNode {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            children: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the child called `name`, if any.
    pub fn get(&self, name: &str) -> Option<Node> {
        lock(&self.children).get(name).cloned()
    }

    /// Lists children in name order.
    pub fn entries(&self) -> Vec<(String, NodeKind)> {
        lock(&self.children)
            .iter()
            .map(|(name, node)| (name.clone(), node.kind()))
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.children).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.children).is_empty()
    }

    /// Returns the subdirectory `name`, creating it when missing.
    fn ensure_dir(&self, name: &str, full_path: &str) -> Result<Arc<DirNode>> {
        let mut children = lock(&self.children);
        match children.get(name) {
            Some(Node::Directory(dir)) => Ok(Arc::clone(dir)),
            Some(Node::File(_)) => Err(Error::NotADirectory(full_path.to_string())),
            None => {
                let dir = Arc::new(DirNode::new(name));
                children.insert(name.to_string(), Node::Directory(Arc::clone(&dir)));
                Ok(dir)
            }
        }
    }

    /// Inserts or replaces the file `name`. Refuses to replace a directory.
    fn put_file(&self, name: &str, content: Vec<u8>, full_path: &str) -> Result<Arc<FileNode>> {
        let mut children = lock(&self.children);
        if let Some(Node::Directory(_)) = children.get(name) {
            return Err(Error::IsADirectory(full_path.to_string()));
        }
        let file = Arc::new(FileNode::new(name, content));
        children.insert(name.to_string(), Node::File(Arc::clone(&file)));
        Ok(file)
    }

    /// Inserts `node` under `name` only when the name is free.
    fn insert_new(&self, name: &str, node: Node, full_path: &str) -> Result<Node> {
        let mut children = lock(&self.children);
        if children.contains_key(name) {
            return Err(Error::AlreadyExists(full_path.to_string()));
        }
        children.insert(name.to_string(), node.clone());
        Ok(node)
    }
}

/// A strong handle to a node in the tree.
#[derive(Debug, Clone)]
pub enum Node {
    File(Arc<FileNode>),
    Directory(Arc<DirNode>),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::File(_) => NodeKind::File,
            Node::Directory(_) => NodeKind::Directory,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::File(file) => file.name(),
            Node::Directory(dir) => dir.name(),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Node::File(_))
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    pub fn as_file(&self) -> Option<&Arc<FileNode>> {
        match self {
            Node::File(file) => Some(file),
            Node::Directory(_) => None,
        }
    }

    pub fn as_dir(&self) -> Option<&Arc<DirNode>> {
        match self {
            Node::Directory(dir) => Some(dir),
            Node::File(_) => None,
        }
    }

    /// Size in bytes for files, number of children for directories.
    pub fn size(&self) -> u64 {
        match self {
            Node::File(file) => file.len(),
            Node::Directory(dir) => dir.len() as u64,
        }
    }

    /// Downgrades to a handle that does not keep the node alive.
    pub fn downgrade(&self) -> WeakNode {
        match self {
            Node::File(file) => WeakNode::File(Arc::downgrade(file)),
            Node::Directory(dir) => WeakNode::Directory(Arc::downgrade(dir)),
        }
    }
}

/// A non-owning handle to a node.
#[derive(Debug, Clone)]
pub enum WeakNode {
    File(Weak<FileNode>),
    Directory(Weak<DirNode>),
}

impl WeakNode {
    /// Returns the node if the tree still holds it.
    pub fn upgrade(&self) -> Option<Node> {
        match self {
            WeakNode::File(file) => file.upgrade().map(Node::File),
            WeakNode::Directory(dir) => dir.upgrade().map(Node::Directory),
        }
    }
}

/// The filesystem: a root directory and path-based access to it.
///
/// Cloning yields another handle to the same tree, which is how a caller keeps
/// access to the outputs after handing the filesystem to a host.
#[derive(Debug, Clone)]
pub struct VirtualFileSystem {
    root: Arc<DirNode>,
}

impl VirtualFileSystem {
    pub fn new() -> Self {
        Self {
            root: Arc::new(DirNode::new("")),
        }
    }

    /// Builds a filesystem from `(path, bytes)` pairs.
    pub fn from_files<I, P>(files: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, Vec<u8>)>,
        P: AsRef<str>,
    {
        let fs = Self::new();
        for (path, content) in files {
            fs.add_file(path.as_ref(), content)?;
        }
        Ok(fs)
    }

    pub fn root(&self) -> Node {
        Node::Directory(Arc::clone(&self.root))
    }

    /// Creates or replaces the file at `path`, creating missing parents.
    pub fn add_file(&self, path: &str, content: Vec<u8>) -> Result<Node> {
        let segs = segments(path)?;
        let Some((name, parents)) = segs.split_last() else {
            return Err(Error::IsADirectory(path.to_string()));
        };
        let mut dir = Arc::clone(&self.root);
        for seg in parents {
            dir = dir.ensure_dir(seg, path)?;
        }
        dir.put_file(name, content, path).map(Node::File)
    }

    /// Creates the directory at `path` and any missing parents.
    pub fn create_dir_all(&self, path: &str) -> Result<Node> {
        let mut dir = Arc::clone(&self.root);
        for seg in segments(path)? {
            dir = dir.ensure_dir(seg, path)?;
        }
        Ok(Node::Directory(dir))
    }

    /// Creates a single directory. The parent must already exist.
    pub fn create_dir(&self, path: &str) -> Result<Node> {
        let (parent, name) = self.parent_of(path)?;
        parent.insert_new(name, Node::Directory(Arc::new(DirNode::new(name))), path)
    }

    /// Creates an empty file. The parent must already exist and the name must
    /// be free.
    pub fn create_file(&self, path: &str) -> Result<Node> {
        let (parent, name) = self.parent_of(path)?;
        parent.insert_new(name, Node::File(Arc::new(FileNode::new(name, Vec::new()))), path)
    }

    /// Resolves `path` without creating anything.
    pub fn lookup(&self, path: &str) -> Option<Node> {
        let segs = segments(path).ok()?;
        let mut node = self.root();
        for seg in segs {
            node = node.as_dir()?.get(seg)?;
        }
        Some(node)
    }

    /// Returns a copy of the file at `path`, if it is a file.
    pub fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        self.lookup(path)?.as_file().map(|file| file.contents())
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    fn parent_of<'p>(&self, path: &'p str) -> Result<(Arc<DirNode>, &'p str)> {
        let segs = segments(path)?;
        let Some((name, parents)) = segs.split_last() else {
            return Err(Error::AlreadyExists(path.to_string()));
        };
        let mut dir = Arc::clone(&self.root);
        for seg in parents {
            dir = match dir.get(seg) {
                Some(Node::Directory(next)) => next,
                Some(Node::File(_)) => return Err(Error::NotADirectory(path.to_string())),
                None => return Err(Error::NotFound(path.to_string())),
            };
        }
        Ok((dir, *name))
    }
}

impl Default for VirtualFileSystem {
    fn default() -> Self {
        Self::new()
    }
}
