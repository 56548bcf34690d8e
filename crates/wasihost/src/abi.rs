//! # WASI preview1 ABI
//!
//! Numeric codes, flag sets and the in-memory layouts that `wasi_snapshot_preview1`
//! calls read and write. Everything here is plain data: no wasmtime types, so the
//! layouts can be tested against a byte buffer.
//!
//! All multi-byte values are little-endian and guest pointers are `u32` offsets
//! into linear memory.

use std::ops::Range;

/// Import module name every syscall lives under.
pub const MODULE: &str = "wasi_snapshot_preview1";

/// WASI error numbers (the subset this host can produce).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Errno {
    Success = 0,
    /// Permission denied.
    Acces = 2,
    /// Bad file descriptor.
    Badf = 8,
    /// File exists.
    Exist = 20,
    /// Guest pointer outside linear memory.
    Fault = 21,
    /// File too large.
    Fbig = 22,
    /// Invalid argument.
    Inval = 28,
    Io = 29,
    /// Is a directory.
    Isdir = 31,
    /// No such file or directory.
    Noent = 44,
    /// Function not supported.
    Nosys = 52,
    /// Not a directory.
    Notdir = 54,
    /// Invalid seek on a stream.
    Spipe = 70,
    /// Descriptor lacks the right for this operation.
    Notcapable = 76,
}

impl Errno {
    /// The value returned to the guest.
    pub fn raw(self) -> i32 {
        self as i32
    }
}

impl std::fmt::Display for Errno {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Errno::Success => write!(f, "success"),
            Errno::Acces => write!(f, "permission denied"),
            Errno::Badf => write!(f, "bad file descriptor"),
            Errno::Exist => write!(f, "file exists"),
            Errno::Fault => write!(f, "bad address"),
            Errno::Fbig => write!(f, "file too large"),
            Errno::Inval => write!(f, "invalid argument"),
            Errno::Io => write!(f, "I/O error"),
            Errno::Isdir => write!(f, "is a directory"),
            Errno::Noent => write!(f, "no such file or directory"),
            Errno::Nosys => write!(f, "function not supported"),
            Errno::Notdir => write!(f, "not a directory"),
            Errno::Spipe => write!(f, "invalid seek"),
            Errno::Notcapable => write!(f, "capabilities insufficient"),
        }
    }
}

impl From<memfs::Error> for Errno {
    fn from(e: memfs::Error) -> Self {
        match e {
            memfs::Error::MalformedPath(_) => Errno::Inval,
            memfs::Error::NotADirectory(_) => Errno::Notdir,
            memfs::Error::IsADirectory(_) => Errno::Isdir,
            memfs::Error::NotFound(_) => Errno::Noent,
            memfs::Error::AlreadyExists(_) => Errno::Exist,
            memfs::Error::FileTooLarge(_) => Errno::Fbig,
        }
    }
}

/// Result of a syscall body. `Err` is reported to the guest, never to the host.
pub type SysResult<T> = std::result::Result<T, Errno>;

/// The type of a descriptor, as seen in `filestat` and `fdstat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Filetype {
    Unknown = 0,
    CharacterDevice = 2,
    Directory = 3,
    RegularFile = 4,
}

impl From<memfs::NodeKind> for Filetype {
    fn from(kind: memfs::NodeKind) -> Self {
        match kind {
            memfs::NodeKind::File => Filetype::RegularFile,
            memfs::NodeKind::Directory => Filetype::Directory,
        }
    }
}

/// Rights bitset attached to a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rights(pub u64);

impl Rights {
    pub const FD_DATASYNC: Rights = Rights(1 << 0);
    pub const FD_READ: Rights = Rights(1 << 1);
    pub const FD_SEEK: Rights = Rights(1 << 2);
    pub const FD_FDSTAT_SET_FLAGS: Rights = Rights(1 << 3);
    pub const FD_SYNC: Rights = Rights(1 << 4);
    pub const FD_TELL: Rights = Rights(1 << 5);
    pub const FD_WRITE: Rights = Rights(1 << 6);
    pub const PATH_CREATE_DIRECTORY: Rights = Rights(1 << 9);
    pub const PATH_CREATE_FILE: Rights = Rights(1 << 10);
    pub const PATH_OPEN: Rights = Rights(1 << 13);
    pub const FD_READDIR: Rights = Rights(1 << 14);
    pub const PATH_FILESTAT_GET: Rights = Rights(1 << 18);
    pub const FD_FILESTAT_GET: Rights = Rights(1 << 21);
    pub const POLL_FD_READWRITE: Rights = Rights(1 << 27);
    /// Every right defined by preview1.
    pub const ALL: Rights = Rights((1 << 29) - 1);

    pub fn contains(self, other: Rights) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn union(self, other: Rights) -> Rights {
        Rights(self.0 | other.0)
    }
}

/// `path_open` open flags.
pub mod oflags {
    pub const CREAT: u16 = 1 << 0;
    pub const DIRECTORY: u16 = 1 << 1;
    pub const EXCL: u16 = 1 << 2;
    pub const TRUNC: u16 = 1 << 3;
}

/// Descriptor flags.
pub mod fdflags {
    pub const APPEND: u16 = 1 << 0;
}

/// Base for `fd_seek`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

impl Whence {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Whence::Set),
            1 => Some(Whence::Cur),
            2 => Some(Whence::End),
            _ => None,
        }
    }
}

/// WASI clock identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockId {
    Realtime,
    Monotonic,
    ProcessCputime,
    ThreadCputime,
}

impl ClockId {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(ClockId::Realtime),
            1 => Some(ClockId::Monotonic),
            2 => Some(ClockId::ProcessCputime),
            3 => Some(ClockId::ThreadCputime),
            _ => None,
        }
    }
}

/// One `ciovec`/`iovec`: a guest buffer pointer and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoVec {
    pub buf: u32,
    pub len: u32,
}

/// File attributes. Only the kind and size are modeled; every other field is
/// written as zero (and `nlink` as one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filestat {
    pub filetype: Filetype,
    pub size: u64,
}

impl Filestat {
    pub const SIZE: u32 = 64;

    pub fn write(&self, mem: &mut GuestMemory<'_>, ptr: u32) -> SysResult<()> {
        mem.slice_mut(ptr, Self::SIZE)?.fill(0);
        mem.write_u8(ptr + 16, self.filetype as u8)?;
        mem.write_u64(ptr + 24, 1)?;
        mem.write_u64(ptr + 32, self.size)
    }
}

/// Descriptor attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fdstat {
    pub filetype: Filetype,
    pub flags: u16,
    pub rights_base: Rights,
    pub rights_inheriting: Rights,
}

impl Fdstat {
    pub const SIZE: u32 = 24;

    pub fn write(&self, mem: &mut GuestMemory<'_>, ptr: u32) -> SysResult<()> {
        mem.slice_mut(ptr, Self::SIZE)?.fill(0);
        mem.write_u8(ptr, self.filetype as u8)?;
        mem.write_u16(ptr + 2, self.flags)?;
        mem.write_u64(ptr + 8, self.rights_base.0)?;
        mem.write_u64(ptr + 16, self.rights_inheriting.0)
    }
}

/// `prestat` for a preopened directory (tag 0) with the length of its name.
pub fn write_prestat_dir(mem: &mut GuestMemory<'_>, ptr: u32, name_len: u32) -> SysResult<()> {
    mem.slice_mut(ptr, 8)?.fill(0);
    mem.write_u32(ptr + 4, name_len)
}

/// Size of a `dirent` header; the name follows it unterminated.
pub const DIRENT_SIZE: usize = 24;

/// Serializes one directory entry (header + name) into a byte vector.
pub fn dirent(next_cookie: u64, ino: u64, name: &str, filetype: Filetype) -> Vec<u8> {
    let mut out = Vec::with_capacity(DIRENT_SIZE + name.len());
    out.extend_from_slice(&next_cookie.to_le_bytes());
    out.extend_from_slice(&ino.to_le_bytes());
    out.extend_from_slice(&(name.len() as u32).to_le_bytes());
    out.push(filetype as u8);
    out.extend_from_slice(&[0, 0, 0]);
    out.extend_from_slice(name.as_bytes());
    out
}

/// A bounds-checked view over guest linear memory.
///
/// Every accessor returns [`Errno::Fault`] instead of panicking when the guest
/// hands over a pointer that runs past the end of memory.
pub struct GuestMemory<'a> {
    bytes: &'a mut [u8],
}

impl<'a> GuestMemory<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    fn range(&self, ptr: u32, len: u32) -> SysResult<Range<usize>> {
        let start = ptr as usize;
        let end = start.checked_add(len as usize).ok_or(Errno::Fault)?;
        if end > self.bytes.len() {
            return Err(Errno::Fault);
        }
        Ok(start..end)
    }

    pub fn slice(&self, ptr: u32, len: u32) -> SysResult<&[u8]> {
        let range = self.range(ptr, len)?;
        Ok(&self.bytes[range])
    }

    pub fn slice_mut(&mut self, ptr: u32, len: u32) -> SysResult<&mut [u8]> {
        let range = self.range(ptr, len)?;
        Ok(&mut self.bytes[range])
    }

    /// Reads a UTF-8 string (paths). Invalid UTF-8 is `Inval`.
    pub fn read_str(&self, ptr: u32, len: u32) -> SysResult<&str> {
        std::str::from_utf8(self.slice(ptr, len)?).map_err(|_| Errno::Inval)
    }

    pub fn read_u32(&self, ptr: u32) -> SysResult<u32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.slice(ptr, 4)?);
        Ok(u32::from_le_bytes(raw))
    }

    pub fn write_u8(&mut self, ptr: u32, value: u8) -> SysResult<()> {
        self.slice_mut(ptr, 1)?[0] = value;
        Ok(())
    }

    pub fn write_u16(&mut self, ptr: u32, value: u16) -> SysResult<()> {
        self.slice_mut(ptr, 2)?.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn write_u32(&mut self, ptr: u32, value: u32) -> SysResult<()> {
        self.slice_mut(ptr, 4)?.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn write_u64(&mut self, ptr: u32, value: u64) -> SysResult<()> {
        self.slice_mut(ptr, 8)?.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Decodes `count` iovecs starting at `ptr`.
    pub fn iovecs(&self, ptr: u32, count: u32) -> SysResult<Vec<IoVec>> {
        let table = self.slice(ptr, count.checked_mul(8).ok_or(Errno::Fault)?)?;
        Ok(table
            .chunks_exact(8)
            .map(|raw| IoVec {
                buf: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
                len: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
            })
            .collect())
    }

    /// Concatenates the bytes of every iovec, in order.
    pub fn gather(&self, iovs: &[IoVec]) -> SysResult<Vec<u8>> {
        let mut out = Vec::new();
        for iov in iovs {
            out.extend_from_slice(self.slice(iov.buf, iov.len)?);
        }
        Ok(out)
    }

    /// Fails with `Fault` unless every iovec lies inside linear memory.
    pub fn check_iovecs(&self, iovs: &[IoVec]) -> SysResult<()> {
        for iov in iovs {
            self.range(iov.buf, iov.len)?;
        }
        Ok(())
    }

    /// Spreads `data` across the iovecs, filling each before moving on.
    pub fn scatter(&mut self, iovs: &[IoVec], mut data: &[u8]) -> SysResult<()> {
        for iov in iovs {
            if data.is_empty() {
                break;
            }
            let n = data.len().min(iov.len as usize);
            self.slice_mut(iov.buf, n as u32)?.copy_from_slice(&data[..n]);
            data = &data[n..];
        }
        Ok(())
    }
}

/// Total capacity described by a set of iovecs.
pub fn iovecs_len(iovs: &[IoVec]) -> usize {
    iovs.iter().fold(0usize, |total, iov| total.saturating_add(iov.len as usize))
}

/// A precomputed NUL-terminated string vector for the two-phase
/// `*_sizes_get` / `*_get` calls.
///
/// Both phases read the same layout, so the sizes reported in the first call
/// always match the bytes written by the second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringTable {
    offsets: Vec<u32>,
    buf: Vec<u8>,
}

impl StringTable {
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut offsets = Vec::new();
        let mut buf = Vec::new();
        for item in items {
            offsets.push(buf.len() as u32);
            buf.extend_from_slice(item.as_ref().as_bytes());
            buf.push(0);
        }
        Self { offsets, buf }
    }

    pub fn count(&self) -> u32 {
        self.offsets.len() as u32
    }

    pub fn buf_size(&self) -> u32 {
        self.buf.len() as u32
    }

    /// Phase one: writes the entry count and total buffer size.
    pub fn write_sizes(&self, mem: &mut GuestMemory<'_>, count_ptr: u32, size_ptr: u32) -> SysResult<()> {
        mem.write_u32(count_ptr, self.count())?;
        mem.write_u32(size_ptr, self.buf_size())
    }

    /// Phase two: writes the pointer array at `ptrs` and the strings at `buf`.
    pub fn write(&self, mem: &mut GuestMemory<'_>, ptrs: u32, buf: u32) -> SysResult<()> {
        for (i, offset) in self.offsets.iter().enumerate() {
            let slot = ptrs.checked_add(4 * i as u32).ok_or(Errno::Fault)?;
            let target = buf.checked_add(*offset).ok_or(Errno::Fault)?;
            mem.write_u32(slot, target)?;
        }
        mem.slice_mut(buf, self.buf_size())?.copy_from_slice(&self.buf);
        Ok(())
    }
}
