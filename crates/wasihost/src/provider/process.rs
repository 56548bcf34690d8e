//! # Process control
//!
//! `proc_exit` ends the run with a code by trapping with
//! [`I32Exit`], which the host recognizes as a controlled exit rather than a
//! failure. `sched_yield` is a no-op.

use tracing::debug;
use wasmtime::Val;
use wasmtime::ValType::I32;
use wasmtime_wasi::I32Exit;

use crate::abi;
use crate::provider::FeatureProvider;
use crate::provider::ImportDef;
use crate::provider::syscall;

#[derive(Clone, Copy, Debug, Default)]
pub struct Process;

impl FeatureProvider for Process {
    fn name(&self) -> &str {
        "process"
    }

    fn imports(&self) -> Vec<ImportDef> {
        vec![
            ImportDef::new(abi::MODULE, "proc_exit", &[I32], &[], |_caller, args| {
                let code = args.first().and_then(Val::i32).unwrap_or(0);
                debug!(code, "guest requested exit");
                Err(wasmtime::Error::new(I32Exit(code)))
            }),
            syscall("sched_yield", &[], |_caller, _args| Ok(())),
        ]
    }
}
