//! # Asyncify instance
//!
//! A linked, instantiated guest together with its store. Calls into the guest
//! go through the asyncify driver, so any import may suspend.

use memfs::VirtualFileSystem;
use wasmtime::Instance;
use wasmtime::Store;
use wasmtime::Val;
use wasmtime_wasi::I32Exit;

use crate::asyncify;
use crate::asyncify::AsyncifyError;
use crate::asyncify::State;
use crate::context::HostCtx;
use crate::host::ExitStatus;

/// Why a run did not produce an exit status.
#[derive(Debug)]
pub enum RunError {
    /// The module does not export the requested function.
    MissingExport(String),
    /// The guest trapped, or an import failed. `stderr` holds everything the
    /// guest wrote to standard error before that.
    Trap {
        error: wasmtime::Error,
        stderr: String,
    },
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingExport(name) => write!(f, "Module has no exported function `{}`", name),
            Self::Trap { error, stderr } if stderr.is_empty() => write!(f, "Guest trapped: {:#}", error),
            Self::Trap { error, stderr } => {
                write!(f, "Guest trapped: {:#}\n--- stderr ---\n{}", error, stderr)
            }
        }
    }
}

impl std::error::Error for RunError {}

impl RunError {
    /// The asyncify protocol violation behind a trap, if that is what it was.
    pub fn asyncify(&self) -> Option<&AsyncifyError> {
        match self {
            Self::Trap { error, .. } => error.downcast_ref::<AsyncifyError>(),
            Self::MissingExport(_) => None,
        }
    }

    pub fn stderr(&self) -> &str {
        match self {
            Self::Trap { stderr, .. } => stderr,
            Self::MissingExport(_) => "",
        }
    }
}

pub type Result<T> = std::result::Result<T, RunError>;

/// Maps the outcome of an entry call to an exit status.
///
/// A normal return is code 0 and a controlled exit carries its own code;
/// anything else is a failure.
pub fn exit_status(outcome: wasmtime::Result<()>, stderr: &str) -> Result<ExitStatus> {
    match outcome {
        Ok(()) => Ok(ExitStatus { code: 0 }),
        Err(error) => match error.downcast_ref::<I32Exit>() {
            Some(exit) => Ok(ExitStatus { code: exit.0 }),
            None => Err(RunError::Trap {
                error,
                stderr: stderr.to_string(),
            }),
        },
    }
}

/// A guest instance driven through asyncify.
pub struct AsyncifyInstance {
    store: Store<HostCtx>,
    instance: Instance,
    entry: String,
}

impl AsyncifyInstance {
    pub(crate) fn new(store: Store<HostCtx>, instance: Instance, entry: String) -> Self {
        Self {
            store,
            instance,
            entry,
        }
    }

    /// The instance's asyncify state register.
    pub fn state(&self) -> State {
        self.store.data().asyncify().state()
    }

    /// Whether the module exports the asyncify control functions.
    pub fn is_instrumented(&self) -> bool {
        self.store.data().asyncify().is_instrumented()
    }

    pub fn filesystem(&self) -> &VirtualFileSystem {
        self.store.data().fs()
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Calls an exported function, resuming it through every suspension.
    pub async fn call(&mut self, name: &str, params: &[Val]) -> Result<Vec<Val>> {
        let func = self
            .instance
            .get_func(&mut self.store, name)
            .ok_or_else(|| RunError::MissingExport(name.to_string()))?;
        let outcome = asyncify::drive(&mut self.store, &func, params).await;
        self.store.data_mut().fds_mut().flush();
        outcome.map_err(|error| RunError::Trap {
            error,
            stderr: self.store.data().fds().stderr_transcript().to_string(),
        })
    }

    /// Runs the entry export to completion. Single-shot.
    ///
    /// Partial lines on stdout and stderr are flushed whatever the outcome.
    pub async fn start(mut self) -> Result<ExitStatus> {
        let func = self
            .instance
            .get_func(&mut self.store, &self.entry)
            .ok_or_else(|| RunError::MissingExport(self.entry.clone()))?;
        let outcome = asyncify::drive(&mut self.store, &func, &[]).await;
        self.store.data_mut().fds_mut().flush();
        exit_status(outcome.map(|_| ()), self.store.data().fds().stderr_transcript())
    }
}
