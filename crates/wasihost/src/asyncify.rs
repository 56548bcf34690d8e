//! # Asyncify driver
//!
//! Lets any host import suspend the guest while a future runs, on a module
//! compiled for a synchronous ABI and instrumented with Binaryen's asyncify
//! pass.
//!
//! ## Protocol
//!
//! - **Suspend**: an import returns [`Outcome::Pending`]. The wrapper stores the
//!   future, flips the state to `Unwinding` and calls the guest's
//!   `asyncify_start_unwind`. The guest then unwinds its own stack into the data
//!   buffer and returns from the export.
//! - **Await**: the driver sees `Unwinding`, stops the unwind, awaits the future
//!   and keeps its result.
//! - **Resume**: the driver flips to `Rewinding`, calls
//!   `asyncify_start_rewind` and re-invokes the export with the same
//!   arguments. The guest replays its stack up to the suspended call site, where
//!   the wrapper stops the rewind and hands back the stored result.
//!
//! At most one suspension is in flight per instance. The state register lives
//! in the store data, so separate instances never interfere.

use tracing::debug;
use tracing::warn;
use wasmtime::Caller;
use wasmtime::Extern;
use wasmtime::Func;
use wasmtime::Instance;
use wasmtime::Store;
use wasmtime::TypedFunc;
use wasmtime::Val;
use wasmtime::ValType;

use crate::context::HostCtx;
use crate::provider::ImportDef;
use crate::provider::ImportFuture;
use crate::provider::ImportId;
use crate::provider::Outcome;

#[derive(Debug)]
pub enum AsyncifyError {
    /// An import tried to suspend a module without the asyncify exports.
    NotInstrumented { import: ImportId },
    /// An import tried to suspend while another suspension was in flight.
    NestedSuspend { import: ImportId },
    /// The state register held something other than what the protocol requires.
    UnexpectedState { expected: State, found: State },
    /// The rewind reached a different import than the one that suspended.
    ImportMismatch { expected: ImportId, found: ImportId },
    /// Rewinding without a stored result, or unwinding without a future.
    MissingContinuation,
    /// An implementation returned the wrong number of results.
    ResultArity { import: ImportId, expected: usize, found: usize },
    /// The instrumented module exports no `memory`.
    MissingMemory,
    /// The data buffer does not fit in linear memory.
    DataBuffer { addr: u32 },
}

impl std::fmt::Display for AsyncifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInstrumented { import } => {
                write!(f, "Import {} suspended but the module is not asyncify-instrumented", import)
            }
            Self::NestedSuspend { import } => {
                write!(f, "Import {} suspended while another suspension is in flight", import)
            }
            Self::UnexpectedState { expected, found } => {
                write!(f, "Asyncify state is {}, expected {}", found, expected)
            }
            Self::ImportMismatch { expected, found } => {
                write!(f, "Rewind reached import {}, but {} suspended", found, expected)
            }
            Self::MissingContinuation => write!(f, "No pending continuation to resume"),
            Self::ResultArity { import, expected, found } => {
                write!(f, "Import {} produced {} results, expected {}", import, found, expected)
            }
            Self::MissingMemory => write!(f, "Asyncify module exports no memory"),
            Self::DataBuffer { addr } => {
                write!(f, "Asyncify data buffer at {} is outside linear memory", addr)
            }
        }
    }
}

impl std::error::Error for AsyncifyError {}

impl AsyncifyError {
    fn trap(self) -> wasmtime::Error {
        wasmtime::Error::new(self)
    }
}

/// Where the asyncify data buffer lives and the stack region it describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AsyncifyConfig {
    /// Address of the `[start, end]` pair handed to `asyncify_start_*`.
    pub data_addr: u32,
    pub stack_start: u32,
    pub stack_end: u32,
}

impl Default for AsyncifyConfig {
    fn default() -> Self {
        Self {
            data_addr: 16,
            stack_start: 24,
            stack_end: 1024,
        }
    }
}

/// The per-instance state register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Normal,
    Unwinding,
    Rewinding,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Normal => write!(f, "normal"),
            State::Unwinding => write!(f, "unwinding"),
            State::Rewinding => write!(f, "rewinding"),
        }
    }
}

/// A suspended import's in-flight work.
pub struct Pending {
    pub import: ImportId,
    pub future: ImportFuture,
}

/// The result of a pending future, waiting for the rewind to reach its call site.
struct Settled {
    import: ImportId,
    result: wasmtime::Result<Vec<Val>>,
}

/// The guest's asyncify control exports.
#[derive(Clone)]
pub struct AsyncifyExports {
    start_unwind: TypedFunc<i32, ()>,
    stop_unwind: TypedFunc<(), ()>,
    start_rewind: TypedFunc<i32, ()>,
    stop_rewind: TypedFunc<(), ()>,
    get_state: Option<TypedFunc<(), i32>>,
}

impl AsyncifyExports {
    /// Finds the control exports. `None` when the module is not instrumented.
    pub fn lookup(store: &mut Store<HostCtx>, instance: &Instance) -> Option<Self> {
        let start_unwind = instance.get_typed_func(&mut *store, "asyncify_start_unwind").ok();
        let stop_unwind = instance.get_typed_func(&mut *store, "asyncify_stop_unwind").ok();
        let start_rewind = instance.get_typed_func(&mut *store, "asyncify_start_rewind").ok();
        let stop_rewind = instance.get_typed_func(&mut *store, "asyncify_stop_rewind").ok();
        let get_state = instance.get_typed_func(&mut *store, "asyncify_get_state").ok();

        match (start_unwind, stop_unwind, start_rewind, stop_rewind) {
            (Some(start_unwind), Some(stop_unwind), Some(start_rewind), Some(stop_rewind)) => {
                Some(Self {
                    start_unwind,
                    stop_unwind,
                    start_rewind,
                    stop_rewind,
                    get_state,
                })
            }
            (None, None, None, None) => None,
            _ => {
                warn!("module exports only part of the asyncify interface; suspension disabled");
                None
            }
        }
    }

    /// Asks the guest for its own view of the state register, if it exports one.
    pub fn guest_state(&self, store: &mut Store<HostCtx>) -> wasmtime::Result<Option<i32>> {
        match &self.get_state {
            Some(func) => Ok(Some(func.call(store, ())?)),
            None => Ok(None),
        }
    }
}

/// Asyncify bookkeeping kept in the store data.
pub struct AsyncifyCtx {
    config: AsyncifyConfig,
    state: State,
    pending: Option<Pending>,
    settled: Option<Settled>,
    exports: Option<AsyncifyExports>,
}

impl AsyncifyCtx {
    pub fn new(config: AsyncifyConfig) -> Self {
        Self {
            config,
            state: State::Normal,
            pending: None,
            settled: None,
            exports: None,
        }
    }

    pub fn config(&self) -> AsyncifyConfig {
        self.config
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_instrumented(&self) -> bool {
        self.exports.is_some()
    }

    fn require(&self, expected: State) -> wasmtime::Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(AsyncifyError::UnexpectedState {
                expected,
                found: self.state,
            }
            .trap())
        }
    }
}

/// Enables suspension for a freshly instantiated module.
///
/// Looks up the control exports and writes the data buffer's stack bounds.
/// Modules without the exports are left as they are; their imports simply
/// cannot suspend.
pub fn install(store: &mut Store<HostCtx>, instance: &Instance) -> Result<bool, AsyncifyError> {
    let Some(exports) = AsyncifyExports::lookup(store, instance) else {
        return Ok(false);
    };
    let config = store.data().asyncify.config;
    let Some(Extern::Memory(memory)) = instance.get_export(&mut *store, "memory") else {
        return Err(AsyncifyError::MissingMemory);
    };
    let mut buffer = [0u8; 8];
    buffer[..4].copy_from_slice(&config.stack_start.to_le_bytes());
    buffer[4..].copy_from_slice(&config.stack_end.to_le_bytes());
    memory
        .write(&mut *store, config.data_addr as usize, &buffer)
        .map_err(|_| AsyncifyError::DataBuffer {
            addr: config.data_addr,
        })?;
    store.data_mut().asyncify.exports = Some(exports);
    debug!(data_addr = config.data_addr, "asyncify enabled");
    Ok(true)
}

fn zero(ty: &ValType) -> Val {
    match ty {
        ValType::I64 => Val::I64(0),
        ValType::F32 => Val::F32(0),
        ValType::F64 => Val::F64(0),
        // Only numeric types reach the linker.
        _ => Val::I32(0),
    }
}

/// Wraps an import implementation in the unwind/rewind protocol, producing a
/// closure for `Linker::func_new`.
pub fn wrap(
    def: &ImportDef,
) -> impl Fn(Caller<'_, HostCtx>, &[Val], &mut [Val]) -> wasmtime::Result<()> + Send + Sync + 'static {
    let id = def.id();
    let func = def.func.clone();
    let result_types = def.results.clone();

    move |mut caller, params, results| {
        let values = match caller.data().asyncify.state {
            State::Rewinding => {
                let exports = caller
                    .data()
                    .asyncify
                    .exports
                    .clone()
                    .ok_or(AsyncifyError::MissingContinuation)
                    .map_err(AsyncifyError::trap)?;
                exports.stop_rewind.call(&mut caller, ())?;

                let ctx = &mut caller.data_mut().asyncify;
                ctx.state = State::Normal;
                let settled = ctx
                    .settled
                    .take()
                    .ok_or_else(|| AsyncifyError::MissingContinuation.trap())?;
                if settled.import != id {
                    return Err(AsyncifyError::ImportMismatch {
                        expected: settled.import,
                        found: id.clone(),
                    }
                    .trap());
                }
                debug!(import = %id, "resumed at suspended call site");
                settled.result?
            }
            State::Unwinding => {
                return Err(AsyncifyError::NestedSuspend { import: id.clone() }.trap());
            }
            State::Normal => match func(&mut caller, params)? {
                Outcome::Ready(values) => values,
                Outcome::Pending(future) => {
                    let ctx = &mut caller.data_mut().asyncify;
                    let Some(exports) = ctx.exports.clone() else {
                        return Err(AsyncifyError::NotInstrumented { import: id.clone() }.trap());
                    };
                    if ctx.pending.is_some() {
                        return Err(AsyncifyError::NestedSuspend { import: id.clone() }.trap());
                    }
                    ctx.pending = Some(Pending {
                        import: id.clone(),
                        future,
                    });
                    ctx.state = State::Unwinding;
                    let data_addr = ctx.config.data_addr as i32;
                    debug!(import = %id, "suspending guest");
                    exports.start_unwind.call(&mut caller, data_addr)?;

                    // Ignored by the unwinding guest.
                    for (slot, ty) in results.iter_mut().zip(&result_types) {
                        *slot = zero(ty);
                    }
                    return Ok(());
                }
            },
        };

        if values.len() != results.len() {
            return Err(AsyncifyError::ResultArity {
                import: id.clone(),
                expected: results.len(),
                found: values.len(),
            }
            .trap());
        }
        for (slot, value) in results.iter_mut().zip(values) {
            *slot = value;
        }
        Ok(())
    }
}

/// Calls `func` and drives it through every suspension until it returns.
///
/// Each round stops the unwind, awaits the pending future, then rewinds and
/// calls `func` again with the same `params`.
pub async fn drive(store: &mut Store<HostCtx>, func: &Func, params: &[Val]) -> wasmtime::Result<Vec<Val>> {
    store.data().asyncify.require(State::Normal)?;
    let ty = func.ty(&*store);
    let mut results: Vec<Val> = ty.results().map(|ty| zero(&ty)).collect();

    func.call(&mut *store, params, &mut results)?;
    while store.data().asyncify.state == State::Unwinding {
        let exports = store
            .data()
            .asyncify
            .exports
            .clone()
            .ok_or_else(|| AsyncifyError::MissingContinuation.trap())?;
        exports.stop_unwind.call(&mut *store, ())?;

        let pending = store
            .data_mut()
            .asyncify
            .pending
            .take()
            .ok_or_else(|| AsyncifyError::MissingContinuation.trap())?;
        debug!(import = %pending.import, "awaiting suspended import");
        let result = pending.future.await;

        let ctx = &mut store.data_mut().asyncify;
        ctx.settled = Some(Settled {
            import: pending.import,
            result,
        });
        ctx.state = State::Rewinding;
        let data_addr = ctx.config.data_addr as i32;
        debug!("rewinding guest");
        exports.start_rewind.call(&mut *store, data_addr)?;
        func.call(&mut *store, params, &mut results)?;
    }

    store.data().asyncify.require(State::Normal)?;
    if let Some(exports) = store.data().asyncify.exports.clone() {
        if let Some(raw) = exports.guest_state(store)? {
            if raw != 0 {
                warn!(raw, "guest reports a non-normal asyncify state after return");
            }
        }
    }
    Ok(results)
}
