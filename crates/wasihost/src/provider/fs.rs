//! # Descriptors and files
//!
//! The `fd_*` and `path_*` syscalls. Bodies decode guest memory, delegate to
//! the [`DescriptorTable`](crate::fdtable::DescriptorTable) and encode the
//! answer back; every failure is an errno.

use wasmtime::ValType::I32;
use wasmtime::ValType::I64;

use crate::abi;
use crate::abi::Errno;
use crate::abi::Filetype;
use crate::abi::Rights;
use crate::abi::Whence;
use crate::provider::FeatureProvider;
use crate::provider::ImportDef;
use crate::provider::i64_arg;
use crate::provider::memory;
use crate::provider::syscall;
use crate::provider::u32_arg;
use crate::provider::u64_arg;

#[derive(Clone, Copy, Debug, Default)]
pub struct Filesystem;

impl FeatureProvider for Filesystem {
    fn name(&self) -> &str {
        "fs"
    }

    fn imports(&self) -> Vec<ImportDef> {
        vec![
            // (dirfd, dirflags, path, path_len, oflags, rights_base, rights_inheriting, fdflags, fd_out)
            syscall("path_open", &[I32, I32, I32, I32, I32, I64, I64, I32, I32], |caller, args| {
                let dirfd = u32_arg(args, 0)?;
                let open_flags = u32_arg(args, 4)? as u16;
                let rights_base = Rights(u64_arg(args, 5)?);
                let rights_inheriting = Rights(u64_arg(args, 6)?);
                let flags = u32_arg(args, 7)? as u16;
                let out = u32_arg(args, 8)?;
                let (mut mem, ctx) = memory(caller)?;
                let path = mem.read_str(u32_arg(args, 2)?, u32_arg(args, 3)?)?.to_string();
                let (fs, fds) = ctx.fs_and_fds();
                let fd = fds.open(fs, dirfd, &path, open_flags, rights_base, rights_inheriting, flags)?;
                mem.write_u32(out, fd)
            }),
            // (fd, iovs, iovs_len, nread)
            syscall("fd_read", &[I32, I32, I32, I32], |caller, args| {
                let fd = u32_arg(args, 0)?;
                let (mut mem, ctx) = memory(caller)?;
                let iovs = mem.iovecs(u32_arg(args, 1)?, u32_arg(args, 2)?)?;
                mem.check_iovecs(&iovs)?;
                let data = ctx.fds_mut().read(fd, abi::iovecs_len(&iovs))?;
                mem.scatter(&iovs, &data)?;
                mem.write_u32(u32_arg(args, 3)?, data.len() as u32)
            }),
            // (fd, iovs, iovs_len, offset, nread)
            syscall("fd_pread", &[I32, I32, I32, I64, I32], |caller, args| {
                let fd = u32_arg(args, 0)?;
                let offset = u64_arg(args, 3)?;
                let (mut mem, ctx) = memory(caller)?;
                let iovs = mem.iovecs(u32_arg(args, 1)?, u32_arg(args, 2)?)?;
                mem.check_iovecs(&iovs)?;
                let data = ctx.fds().pread(fd, abi::iovecs_len(&iovs), offset)?;
                mem.scatter(&iovs, &data)?;
                mem.write_u32(u32_arg(args, 4)?, data.len() as u32)
            }),
            // (fd, ciovs, ciovs_len, nwritten)
            syscall("fd_write", &[I32, I32, I32, I32], |caller, args| {
                let fd = u32_arg(args, 0)?;
                let (mut mem, ctx) = memory(caller)?;
                let iovs = mem.iovecs(u32_arg(args, 1)?, u32_arg(args, 2)?)?;
                let data = mem.gather(&iovs)?;
                let n = ctx.fds_mut().write(fd, &data)?;
                mem.write_u32(u32_arg(args, 3)?, n as u32)
            }),
            // (fd, ciovs, ciovs_len, offset, nwritten)
            syscall("fd_pwrite", &[I32, I32, I32, I64, I32], |caller, args| {
                let fd = u32_arg(args, 0)?;
                let offset = u64_arg(args, 3)?;
                let (mut mem, ctx) = memory(caller)?;
                let iovs = mem.iovecs(u32_arg(args, 1)?, u32_arg(args, 2)?)?;
                let data = mem.gather(&iovs)?;
                let n = ctx.fds().pwrite(fd, &data, offset)?;
                mem.write_u32(u32_arg(args, 4)?, n as u32)
            }),
            // (fd, offset, whence, newoffset)
            syscall("fd_seek", &[I32, I64, I32, I32], |caller, args| {
                let fd = u32_arg(args, 0)?;
                let offset = i64_arg(args, 1)?;
                let whence = Whence::from_raw(u32_arg(args, 2)? as u8).ok_or(Errno::Inval)?;
                let (mut mem, ctx) = memory(caller)?;
                let pos = ctx.fds_mut().seek(fd, offset, whence)?;
                mem.write_u64(u32_arg(args, 3)?, pos)
            }),
            syscall("fd_tell", &[I32, I32], |caller, args| {
                let fd = u32_arg(args, 0)?;
                let (mut mem, ctx) = memory(caller)?;
                let pos = ctx.fds().tell(fd)?;
                mem.write_u64(u32_arg(args, 1)?, pos)
            }),
            syscall("fd_close", &[I32], |caller, args| {
                let fd = u32_arg(args, 0)?;
                let (_, ctx) = memory(caller)?;
                ctx.fds_mut().close(fd)
            }),
            syscall("fd_filestat_get", &[I32, I32], |caller, args| {
                let fd = u32_arg(args, 0)?;
                let (mut mem, ctx) = memory(caller)?;
                let stat = ctx.fds().filestat(fd)?;
                stat.write(&mut mem, u32_arg(args, 1)?)
            }),
            // (dirfd, lookupflags, path, path_len, buf)
            syscall("path_filestat_get", &[I32, I32, I32, I32, I32], |caller, args| {
                let dirfd = u32_arg(args, 0)?;
                let (mut mem, ctx) = memory(caller)?;
                let path = mem.read_str(u32_arg(args, 2)?, u32_arg(args, 3)?)?.to_string();
                let stat = ctx.fds().path_filestat(ctx.fs(), dirfd, &path)?;
                stat.write(&mut mem, u32_arg(args, 4)?)
            }),
            syscall("fd_fdstat_get", &[I32, I32], |caller, args| {
                let fd = u32_arg(args, 0)?;
                let (mut mem, ctx) = memory(caller)?;
                let stat = ctx.fds().fdstat(fd)?;
                stat.write(&mut mem, u32_arg(args, 1)?)
            }),
            syscall("fd_fdstat_set_flags", &[I32, I32], |caller, args| {
                let fd = u32_arg(args, 0)?;
                let flags = u32_arg(args, 1)? as u16;
                let (_, ctx) = memory(caller)?;
                ctx.fds_mut().set_flags(fd, flags)
            }),
            syscall("fd_prestat_get", &[I32, I32], |caller, args| {
                let fd = u32_arg(args, 0)?;
                let (mut mem, ctx) = memory(caller)?;
                let len = ctx.fds().prestat(fd)?.len() as u32;
                abi::write_prestat_dir(&mut mem, u32_arg(args, 1)?, len)
            }),
            // (fd, path, path_len)
            syscall("fd_prestat_dir_name", &[I32, I32, I32], |caller, args| {
                let fd = u32_arg(args, 0)?;
                let (ptr, len) = (u32_arg(args, 1)?, u32_arg(args, 2)?);
                let (mut mem, ctx) = memory(caller)?;
                let name = ctx.fds().prestat(fd)?;
                if (len as usize) < name.len() {
                    return Err(Errno::Inval);
                }
                mem.slice_mut(ptr, name.len() as u32)?.copy_from_slice(name.as_bytes());
                Ok(())
            }),
            // (fd, buf, buf_len, cookie, bufused)
            syscall("fd_readdir", &[I32, I32, I32, I64, I32], |caller, args| {
                let fd = u32_arg(args, 0)?;
                let (buf, buf_len) = (u32_arg(args, 1)?, u32_arg(args, 2)?);
                let cookie = u64_arg(args, 3)?;
                let (mut mem, ctx) = memory(caller)?;
                let mut bytes = Vec::new();
                for (i, (name, kind)) in ctx.fds().readdir(fd)?.into_iter().enumerate() {
                    let index = i as u64;
                    if index < cookie {
                        continue;
                    }
                    bytes.extend(abi::dirent(index + 1, index + 1, &name, Filetype::from(kind)));
                    if bytes.len() >= buf_len as usize {
                        break;
                    }
                }
                // A full buffer tells the guest to retry with a larger one.
                bytes.truncate(buf_len as usize);
                mem.slice_mut(buf, bytes.len() as u32)?.copy_from_slice(&bytes);
                mem.write_u32(u32_arg(args, 4)?, bytes.len() as u32)
            }),
            // (dirfd, path, path_len)
            syscall("path_create_directory", &[I32, I32, I32], |caller, args| {
                let dirfd = u32_arg(args, 0)?;
                let (mem, ctx) = memory(caller)?;
                let path = mem.read_str(u32_arg(args, 1)?, u32_arg(args, 2)?)?.to_string();
                ctx.fds().create_directory(ctx.fs(), dirfd, &path)
            }),
        ]
    }
}
