//! # Store data
//!
//! `HostCtx` is the `T` in `Store<T>`: everything one guest instance can reach
//! through its imports. Nothing in here is shared between instances.

use memfs::VirtualFileSystem;

use crate::asyncify::AsyncifyCtx;
use crate::fdtable::DescriptorTable;

/// Per-instance host state.
pub struct HostCtx {
    fs: VirtualFileSystem,
    fds: DescriptorTable,
    pub(crate) asyncify: AsyncifyCtx,
}

impl HostCtx {
    pub fn new(fs: VirtualFileSystem, fds: DescriptorTable, asyncify: AsyncifyCtx) -> Self {
        Self { fs, fds, asyncify }
    }

    pub fn fs(&self) -> &VirtualFileSystem {
        &self.fs
    }

    pub fn fds(&self) -> &DescriptorTable {
        &self.fds
    }

    pub fn fds_mut(&mut self) -> &mut DescriptorTable {
        &mut self.fds
    }

    /// Splits the borrow so a syscall can pass the tree to the table.
    pub fn fs_and_fds(&mut self) -> (&VirtualFileSystem, &mut DescriptorTable) {
        (&self.fs, &mut self.fds)
    }

    pub fn asyncify(&self) -> &AsyncifyCtx {
        &self.asyncify
    }
}
