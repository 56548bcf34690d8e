//! # Feature providers
//!
//! A feature provider contributes a fixed set of named host functions to the
//! guest's import namespace. Each WASI slice (arguments, environment, random,
//! clock, process control, descriptors) lives in its own module here; callers
//! can add their own through [`FeatureProvider`] or the custom-import helpers on
//! [`HostBuilder`](crate::HostBuilder).
//!
//! Implementations never touch the asyncify protocol. They return an
//! [`Outcome`]: either the results right away, or a future that the driver will
//! await while the guest is unwound.

pub mod args;
pub mod clock;
pub mod custom;
pub mod environ;
pub mod fs;
pub mod process;
pub mod random;

pub use args::Args;
pub use clock::Clock;
pub use custom::Custom;
pub use environ::Environ;
pub use fs::Filesystem;
pub use process::Process;
pub use random::Random;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::trace;
use wasmtime::Caller;
use wasmtime::Extern;
use wasmtime::Val;
use wasmtime::ValType;

use crate::abi;
use crate::abi::Errno;
use crate::abi::GuestMemory;
use crate::abi::SysResult;
use crate::context::HostCtx;

/// Fully qualified import name.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ImportId {
    pub module: String,
    pub name: String,
}

impl ImportId {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ImportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.module, self.name)
    }
}

/// Host work that finishes later. Its output becomes the import's results.
pub type ImportFuture = Pin<Box<dyn Future<Output = wasmtime::Result<Vec<Val>>> + Send>>;

/// What an import implementation produced.
pub enum Outcome {
    /// Results are available now.
    Ready(Vec<Val>),
    /// The guest must be suspended until the future settles.
    Pending(ImportFuture),
}

/// An import implementation.
///
/// An `Err` becomes a trap at the call site.
pub type HostFn =
    Arc<dyn Fn(&mut Caller<'_, HostCtx>, &[Val]) -> wasmtime::Result<Outcome> + Send + Sync>;

/// One host function: where it lives, its signature, and its body.
#[derive(Clone)]
pub struct ImportDef {
    pub module: String,
    pub name: String,
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
    pub func: HostFn,
}

impl ImportDef {
    pub fn new<F>(module: &str, name: &str, params: &[ValType], results: &[ValType], func: F) -> Self
    where
        F: Fn(&mut Caller<'_, HostCtx>, &[Val]) -> wasmtime::Result<Outcome> + Send + Sync + 'static,
    {
        Self {
            module: module.to_string(),
            name: name.to_string(),
            params: params.to_vec(),
            results: results.to_vec(),
            func: Arc::new(func),
        }
    }

    pub fn id(&self) -> ImportId {
        ImportId::new(&self.module, &self.name)
    }
}

impl std::fmt::Debug for ImportDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportDef")
            .field("module", &self.module)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("results", &self.results)
            .finish_non_exhaustive()
    }
}

/// A unit that contributes host functions to the import namespace.
pub trait FeatureProvider: Send + Sync {
    /// Short name used in configuration errors.
    fn name(&self) -> &str;

    /// The functions this provider exports to the guest.
    fn imports(&self) -> Vec<ImportDef>;
}

/// Builds a `wasi_snapshot_preview1` syscall returning an errno.
///
/// The body reports guest-visible failures as [`Errno`]; they are returned to
/// the guest as the function's single `i32` result and never trap.
pub(crate) fn syscall<F>(name: &'static str, params: &[ValType], body: F) -> ImportDef
where
    F: Fn(&mut Caller<'_, HostCtx>, &[Val]) -> SysResult<()> + Send + Sync + 'static,
{
    ImportDef::new(abi::MODULE, name, params, &[ValType::I32], move |caller, args| {
        let errno = match body(caller, args) {
            Ok(()) => Errno::Success,
            Err(errno) => errno,
        };
        trace!(syscall = name, ?args, %errno, "syscall");
        Ok(Outcome::Ready(vec![Val::I32(errno.raw())]))
    })
}

/// Borrows the guest's exported memory together with the store data.
pub(crate) fn memory<'a>(
    caller: &'a mut Caller<'_, HostCtx>,
) -> SysResult<(GuestMemory<'a>, &'a mut HostCtx)> {
    let Some(Extern::Memory(memory)) = caller.get_export("memory") else {
        return Err(Errno::Fault);
    };
    let (bytes, ctx) = memory.data_and_store_mut(caller);
    Ok((GuestMemory::new(bytes), ctx))
}

/// Reads parameter `i` as an unsigned 32-bit value (pointers, lengths, fds).
pub(crate) fn u32_arg(args: &[Val], i: usize) -> SysResult<u32> {
    args.get(i).and_then(Val::i32).map(|v| v as u32).ok_or(Errno::Inval)
}

pub(crate) fn i64_arg(args: &[Val], i: usize) -> SysResult<i64> {
    args.get(i).and_then(Val::i64).ok_or(Errno::Inval)
}

pub(crate) fn u64_arg(args: &[Val], i: usize) -> SysResult<u64> {
    i64_arg(args, i).map(|v| v as u64)
}

/// Whether a value type can cross the custom-import boundary.
pub(crate) fn is_numeric(ty: &ValType) -> bool {
    matches!(ty, ValType::I32 | ValType::I64 | ValType::F32 | ValType::F64)
}
