//! # Descriptor table
//!
//! Maps the guest's integer handles to open files, directories and the three
//! standard streams. The table never owns filesystem nodes: file and directory
//! entries hold a [`WeakNode`], and the tree in [`VirtualFileSystem`] stays the
//! sole owner.
//!
//! Handles 0, 1 and 2 (stdio) and 3 (the preopened root `/`) are inserted at
//! construction. Everything else is allocated by [`DescriptorTable::open`] at the
//! lowest free handle and released by [`DescriptorTable::close`].

use std::collections::BTreeMap;

use memfs::FileNode;
use memfs::Node;
use memfs::NodeKind;
use memfs::VirtualFileSystem;
use memfs::WeakNode;
use tracing::debug;

use crate::abi::Errno;
use crate::abi::Fdstat;
use crate::abi::Filestat;
use crate::abi::Filetype;
use crate::abi::Rights;
use crate::abi::SysResult;
use crate::abi::Whence;
use crate::abi::fdflags;
use crate::abi::oflags;

pub const STDIN: u32 = 0;
pub const STDOUT: u32 = 1;
pub const STDERR: u32 = 2;
/// The preopened root directory.
pub const ROOT: u32 = 3;

/// Receives decoded standard-output or standard-error text.
pub type Sink = Box<dyn FnMut(&str) + Send>;

/// A sink that drops everything.
pub fn discard() -> Sink {
    Box::new(|_| {})
}

/// Line-aware writer behind descriptors 1 and 2.
///
/// Bytes are buffered until a `\n` arrives; each completed line (newline
/// included) is decoded and handed to the sink in the write call that completed
/// it. A trailing partial line waits for [`OutputStream::flush`]. The sink
/// therefore sees one line per call however the guest chunks its writes, and
/// the concatenation of everything it received equals what was written.
pub struct OutputStream {
    sink: Sink,
    pending: Vec<u8>,
    transcript: Option<String>,
}

impl OutputStream {
    pub fn new(sink: Sink) -> Self {
        Self {
            sink,
            pending: Vec::new(),
            transcript: None,
        }
    }

    /// Like [`OutputStream::new`], but also keeps a copy of every emitted line.
    pub fn capturing(sink: Sink) -> Self {
        Self {
            sink,
            pending: Vec::new(),
            transcript: Some(String::new()),
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.emit(&line);
        }
    }

    /// Emits a buffered partial line, if any.
    pub fn flush(&mut self) {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.emit(&rest);
        }
    }

    /// Everything emitted so far, when capturing.
    pub fn transcript(&self) -> &str {
        self.transcript.as_deref().unwrap_or("")
    }

    fn emit(&mut self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        if let Some(transcript) = &mut self.transcript {
            transcript.push_str(&text);
        }
        (self.sink)(&text);
    }
}

/// What a descriptor refers to.
#[derive(Debug, Clone)]
pub enum DescriptorKind {
    Stdin,
    Stdout,
    Stderr,
    Directory {
        path: String,
        node: WeakNode,
        preopen: bool,
    },
    File {
        path: String,
        node: WeakNode,
    },
}

/// An open handle: target, cursor, rights and flags.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub kind: DescriptorKind,
    pub cursor: u64,
    pub rights_base: Rights,
    pub rights_inheriting: Rights,
    pub flags: u16,
}

impl Descriptor {
    fn stream(kind: DescriptorKind, rights: Rights) -> Self {
        Self {
            kind,
            cursor: 0,
            rights_base: rights,
            rights_inheriting: Rights(0),
            flags: 0,
        }
    }

    fn filetype(&self) -> SysResult<Filetype> {
        match &self.kind {
            DescriptorKind::Stdin | DescriptorKind::Stdout | DescriptorKind::Stderr => {
                Ok(Filetype::CharacterDevice)
            }
            DescriptorKind::Directory { .. } => Ok(Filetype::Directory),
            DescriptorKind::File { .. } => Ok(Filetype::RegularFile),
        }
    }

    fn require(&self, right: Rights) -> SysResult<()> {
        if self.rights_base.contains(right) {
            Ok(())
        } else {
            Err(Errno::Notcapable)
        }
    }
}

/// Upgrades a weak node, treating a vanished node as a stale handle.
fn live(node: &WeakNode) -> SysResult<Node> {
    node.upgrade().ok_or(Errno::Badf)
}

/// Reads up to `len` bytes at `offset`, allocating no more than the file holds.
fn read_file(file: &FileNode, offset: u64, len: usize) -> Vec<u8> {
    let available = file.len().saturating_sub(offset);
    let mut buf = vec![0u8; len.min(usize::try_from(available).unwrap_or(usize::MAX))];
    let n = file.read_at(offset, &mut buf);
    buf.truncate(n);
    buf
}

fn join(base: &str, path: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// The per-host open-file table.
pub struct DescriptorTable {
    entries: BTreeMap<u32, Descriptor>,
    stdin: Vec<u8>,
    stdout: OutputStream,
    stderr: OutputStream,
}

impl DescriptorTable {
    /// Creates a table with stdio and the preopened root of `fs`.
    ///
    /// Standard error is always captured so failures can carry it.
    pub fn new(fs: &VirtualFileSystem, stdin: Vec<u8>, stdout: Sink, stderr: Sink) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(STDIN, Descriptor::stream(DescriptorKind::Stdin, Rights::FD_READ.union(Rights::POLL_FD_READWRITE)));
        entries.insert(STDOUT, Descriptor::stream(DescriptorKind::Stdout, Rights::FD_WRITE.union(Rights::POLL_FD_READWRITE)));
        entries.insert(STDERR, Descriptor::stream(DescriptorKind::Stderr, Rights::FD_WRITE.union(Rights::POLL_FD_READWRITE)));
        entries.insert(
            ROOT,
            Descriptor {
                kind: DescriptorKind::Directory {
                    path: "/".to_string(),
                    node: fs.root().downgrade(),
                    preopen: true,
                },
                cursor: 0,
                rights_base: Rights::ALL,
                rights_inheriting: Rights::ALL,
                flags: 0,
            },
        );
        Self {
            entries,
            stdin,
            stdout: OutputStream::new(stdout),
            stderr: OutputStream::capturing(stderr),
        }
    }

    pub fn get(&self, fd: u32) -> SysResult<&Descriptor> {
        self.entries.get(&fd).ok_or(Errno::Badf)
    }

    pub fn contains(&self, fd: u32) -> bool {
        self.entries.contains_key(&fd)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts at the lowest free handle above the reserved ones.
    fn insert(&mut self, desc: Descriptor) -> u32 {
        let mut fd = ROOT + 1;
        while self.entries.contains_key(&fd) {
            fd += 1;
        }
        self.entries.insert(fd, desc);
        fd
    }

    /// Joins `path` onto the directory behind `dirfd`.
    ///
    /// Absolute-style paths are used as given and a bare `.` names the
    /// directory itself. Segments are otherwise left for the filesystem to take
    /// literally.
    pub fn resolve(&self, dirfd: u32, path: &str) -> SysResult<String> {
        let base = match &self.get(dirfd)?.kind {
            DescriptorKind::Directory { path, .. } => path,
            _ => return Err(Errno::Notdir),
        };
        if path.is_empty() {
            return Err(Errno::Noent);
        }
        if path.starts_with('/') {
            return Ok(path.to_string());
        }
        if path == "." {
            return Ok(base.clone());
        }
        Ok(join(base, path))
    }

    /// `path_open`: resolves, optionally creates, and allocates a descriptor.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        &mut self,
        fs: &VirtualFileSystem,
        dirfd: u32,
        path: &str,
        open_flags: u16,
        rights_base: Rights,
        rights_inheriting: Rights,
        flags: u16,
    ) -> SysResult<u32> {
        let full = self.resolve(dirfd, path)?;
        let node = match fs.lookup(&full) {
            Some(_) if open_flags & oflags::CREAT != 0 && open_flags & oflags::EXCL != 0 => {
                return Err(Errno::Exist);
            }
            Some(node) => node,
            None if open_flags & oflags::CREAT != 0 => fs.create_file(&full)?,
            None => return Err(Errno::Noent),
        };

        let kind = match &node {
            Node::Directory(_) => {
                if open_flags & oflags::TRUNC != 0 {
                    return Err(Errno::Isdir);
                }
                DescriptorKind::Directory {
                    path: full.clone(),
                    node: node.downgrade(),
                    preopen: false,
                }
            }
            Node::File(file) => {
                if open_flags & oflags::DIRECTORY != 0 {
                    return Err(Errno::Notdir);
                }
                if open_flags & oflags::TRUNC != 0 {
                    file.set_len(0)?;
                }
                DescriptorKind::File {
                    path: full.clone(),
                    node: node.downgrade(),
                }
            }
        };

        let fd = self.insert(Descriptor {
            kind,
            cursor: 0,
            rights_base,
            rights_inheriting,
            flags,
        });
        debug!(fd, path = %full, "opened descriptor");
        Ok(fd)
    }

    /// `fd_close`. A handle that is not open (including a second close) is `Badf`.
    pub fn close(&mut self, fd: u32) -> SysResult<()> {
        self.entries.remove(&fd).ok_or(Errno::Badf)?;
        debug!(fd, "closed descriptor");
        Ok(())
    }

    /// `fd_read`: up to `len` bytes from the cursor, advancing it.
    ///
    /// At or past the end of a file this returns an empty buffer.
    pub fn read(&mut self, fd: u32, len: usize) -> SysResult<Vec<u8>> {
        let desc = self.entries.get_mut(&fd).ok_or(Errno::Badf)?;
        desc.require(Rights::FD_READ)?;
        let data = match &desc.kind {
            DescriptorKind::Stdin => {
                let start = (desc.cursor as usize).min(self.stdin.len());
                let end = start + len.min(self.stdin.len() - start);
                self.stdin[start..end].to_vec()
            }
            DescriptorKind::Stdout | DescriptorKind::Stderr => return Err(Errno::Badf),
            DescriptorKind::Directory { .. } => return Err(Errno::Isdir),
            DescriptorKind::File { node, .. } => {
                let node = live(node)?;
                let file = node.as_file().ok_or(Errno::Isdir)?;
                read_file(file, desc.cursor, len)
            }
        };
        desc.cursor += data.len() as u64;
        Ok(data)
    }

    /// `fd_pread`: like [`DescriptorTable::read`] at `offset`, cursor untouched.
    pub fn pread(&self, fd: u32, len: usize, offset: u64) -> SysResult<Vec<u8>> {
        let desc = self.get(fd)?;
        desc.require(Rights::FD_READ)?;
        match &desc.kind {
            DescriptorKind::File { node, .. } => {
                let node = live(node)?;
                let file = node.as_file().ok_or(Errno::Isdir)?;
                Ok(read_file(file, offset, len))
            }
            DescriptorKind::Directory { .. } => Err(Errno::Isdir),
            _ => Err(Errno::Spipe),
        }
    }

    /// `fd_write`: stdio goes to the line-aware streams, files are written at
    /// the cursor (or appended with `APPEND`).
    pub fn write(&mut self, fd: u32, data: &[u8]) -> SysResult<usize> {
        let desc = self.entries.get_mut(&fd).ok_or(Errno::Badf)?;
        desc.require(Rights::FD_WRITE)?;
        match &desc.kind {
            DescriptorKind::Stdout => self.stdout.write(data),
            DescriptorKind::Stderr => self.stderr.write(data),
            DescriptorKind::Stdin => return Err(Errno::Badf),
            DescriptorKind::Directory { .. } => return Err(Errno::Isdir),
            DescriptorKind::File { node, .. } => {
                let node = live(node)?;
                let file = node.as_file().ok_or(Errno::Isdir)?;
                if desc.flags & fdflags::APPEND != 0 {
                    desc.cursor = file.append(data)?;
                } else {
                    file.write_at(desc.cursor, data)?;
                    desc.cursor += data.len() as u64;
                }
            }
        }
        Ok(data.len())
    }

    /// `fd_pwrite`: writes at `offset` without moving the cursor.
    pub fn pwrite(&self, fd: u32, data: &[u8], offset: u64) -> SysResult<usize> {
        let desc = self.get(fd)?;
        desc.require(Rights::FD_WRITE)?;
        match &desc.kind {
            DescriptorKind::File { node, .. } => {
                let node = live(node)?;
                let file = node.as_file().ok_or(Errno::Isdir)?;
                Ok(file.write_at(offset, data)?)
            }
            DescriptorKind::Directory { .. } => Err(Errno::Isdir),
            _ => Err(Errno::Spipe),
        }
    }

    /// `fd_seek`. A resulting offset below zero is `Inval`; streams are `Spipe`.
    pub fn seek(&mut self, fd: u32, offset: i64, whence: Whence) -> SysResult<u64> {
        let desc = self.entries.get_mut(&fd).ok_or(Errno::Badf)?;
        let size = match &desc.kind {
            DescriptorKind::File { node, .. } => live(node)?.size(),
            DescriptorKind::Directory { .. } => return Err(Errno::Isdir),
            _ => return Err(Errno::Spipe),
        };
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => desc.cursor,
            Whence::End => size,
        };
        let target = i64::try_from(base)
            .ok()
            .and_then(|base| base.checked_add(offset))
            .ok_or(Errno::Inval)?;
        if target < 0 {
            return Err(Errno::Inval);
        }
        desc.cursor = target as u64;
        Ok(desc.cursor)
    }

    /// `fd_tell`.
    pub fn tell(&self, fd: u32) -> SysResult<u64> {
        let desc = self.get(fd)?;
        match &desc.kind {
            DescriptorKind::File { .. } => Ok(desc.cursor),
            DescriptorKind::Directory { .. } => Err(Errno::Isdir),
            _ => Err(Errno::Spipe),
        }
    }

    /// `fd_filestat_get`: kind and size.
    pub fn filestat(&self, fd: u32) -> SysResult<Filestat> {
        let desc = self.get(fd)?;
        let size = match &desc.kind {
            DescriptorKind::File { node, .. } | DescriptorKind::Directory { node, .. } => {
                live(node)?.size()
            }
            _ => 0,
        };
        Ok(Filestat {
            filetype: desc.filetype()?,
            size,
        })
    }

    /// `path_filestat_get`.
    pub fn path_filestat(&self, fs: &VirtualFileSystem, dirfd: u32, path: &str) -> SysResult<Filestat> {
        let full = self.resolve(dirfd, path)?;
        let node = fs.lookup(&full).ok_or(Errno::Noent)?;
        Ok(Filestat {
            filetype: node.kind().into(),
            size: node.size(),
        })
    }

    /// `fd_fdstat_get`.
    pub fn fdstat(&self, fd: u32) -> SysResult<Fdstat> {
        let desc = self.get(fd)?;
        Ok(Fdstat {
            filetype: desc.filetype()?,
            flags: desc.flags,
            rights_base: desc.rights_base,
            rights_inheriting: desc.rights_inheriting,
        })
    }

    /// `fd_fdstat_set_flags`.
    pub fn set_flags(&mut self, fd: u32, flags: u16) -> SysResult<()> {
        let desc = self.entries.get_mut(&fd).ok_or(Errno::Badf)?;
        desc.flags = flags;
        Ok(())
    }

    /// `fd_prestat_get`: the preopened directory's guest path.
    ///
    /// Any other handle answers `Badf`, which is how the guest's startup scan
    /// knows it has seen every preopen.
    pub fn prestat(&self, fd: u32) -> SysResult<&str> {
        match &self.get(fd)?.kind {
            DescriptorKind::Directory { path, preopen: true, .. } => Ok(path),
            _ => Err(Errno::Badf),
        }
    }

    /// `fd_readdir`: the children of a directory descriptor, in name order.
    pub fn readdir(&self, fd: u32) -> SysResult<Vec<(String, NodeKind)>> {
        match &self.get(fd)?.kind {
            DescriptorKind::Directory { node, .. } => {
                let node = live(node)?;
                let dir = node.as_dir().ok_or(Errno::Notdir)?;
                Ok(dir.entries())
            }
            _ => Err(Errno::Notdir),
        }
    }

    /// `path_create_directory`.
    pub fn create_directory(&self, fs: &VirtualFileSystem, dirfd: u32, path: &str) -> SysResult<()> {
        let full = self.resolve(dirfd, path)?;
        fs.create_dir(&full)?;
        Ok(())
    }

    /// Emits any partial stdout/stderr line.
    pub fn flush(&mut self) {
        self.stdout.flush();
        self.stderr.flush();
    }

    /// Standard-error text emitted so far.
    pub fn stderr_transcript(&self) -> &str {
        self.stderr.transcript()
    }
}
