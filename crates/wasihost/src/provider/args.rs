//! # Arguments
//!
//! `args_sizes_get` and `args_get` over one precomputed [`StringTable`].

use std::sync::Arc;

use wasmtime::ValType::I32;

use crate::abi::StringTable;
use crate::provider::FeatureProvider;
use crate::provider::ImportDef;
use crate::provider::memory;
use crate::provider::syscall;
use crate::provider::u32_arg;

/// The guest's `argv`, program name first.
#[derive(Clone, Debug)]
pub struct Args {
    table: Arc<StringTable>,
}

impl Args {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            table: Arc::new(StringTable::new(args)),
        }
    }

    pub fn table(&self) -> &StringTable {
        &self.table
    }
}

impl FeatureProvider for Args {
    fn name(&self) -> &str {
        "args"
    }

    fn imports(&self) -> Vec<ImportDef> {
        let sizes = Arc::clone(&self.table);
        let strings = Arc::clone(&self.table);
        vec![
            syscall("args_sizes_get", &[I32, I32], move |caller, args| {
                let (mut mem, _) = memory(caller)?;
                sizes.write_sizes(&mut mem, u32_arg(args, 0)?, u32_arg(args, 1)?)
            }),
            syscall("args_get", &[I32, I32], move |caller, args| {
                let (mut mem, _) = memory(caller)?;
                strings.write(&mut mem, u32_arg(args, 0)?, u32_arg(args, 1)?)
            }),
        ]
    }
}
