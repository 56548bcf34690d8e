//! # Environment
//!
//! `environ_sizes_get` and `environ_get`. Variables are rendered as
//! `KEY=VALUE` in key order.

use std::collections::BTreeMap;
use std::sync::Arc;

use wasmtime::ValType::I32;

use crate::abi::StringTable;
use crate::provider::FeatureProvider;
use crate::provider::ImportDef;
use crate::provider::memory;
use crate::provider::syscall;
use crate::provider::u32_arg;

#[derive(Clone, Debug)]
pub struct Environ {
    table: Arc<StringTable>,
}

impl Environ {
    pub fn new(vars: &BTreeMap<String, String>) -> Self {
        let entries = vars.iter().map(|(key, value)| format!("{}={}", key, value));
        Self {
            table: Arc::new(StringTable::new(entries)),
        }
    }

    pub fn table(&self) -> &StringTable {
        &self.table
    }
}

impl FeatureProvider for Environ {
    fn name(&self) -> &str {
        "environ"
    }

    fn imports(&self) -> Vec<ImportDef> {
        let sizes = Arc::clone(&self.table);
        let strings = Arc::clone(&self.table);
        vec![
            syscall("environ_sizes_get", &[I32, I32], move |caller, args| {
                let (mut mem, _) = memory(caller)?;
                sizes.write_sizes(&mut mem, u32_arg(args, 0)?, u32_arg(args, 1)?)
            }),
            syscall("environ_get", &[I32, I32], move |caller, args| {
                let (mut mem, _) = memory(caller)?;
                strings.write(&mut mem, u32_arg(args, 0)?, u32_arg(args, 1)?)
            }),
        ]
    }
}
