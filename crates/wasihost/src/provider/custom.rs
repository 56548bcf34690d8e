//! # Custom imports
//!
//! Caller-supplied host functions outside WASI. Signatures are limited to the
//! numeric value types; the asyncify driver needs to materialize placeholder
//! results for a suspended call, which is only well defined for numbers.

use std::future::Future;

use wasmtime::Val;
use wasmtime::ValType;

use crate::provider::FeatureProvider;
use crate::provider::ImportDef;
use crate::provider::Outcome;

/// A provider holding the custom imports registered on a builder.
#[derive(Clone, Debug, Default)]
pub struct Custom {
    defs: Vec<ImportDef>,
}

impl Custom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, def: ImportDef) {
        self.defs.push(def);
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

impl FeatureProvider for Custom {
    fn name(&self) -> &str {
        "custom"
    }

    fn imports(&self) -> Vec<ImportDef> {
        self.defs.clone()
    }
}

/// A host function that answers immediately.
pub fn sync_import<F>(module: &str, name: &str, params: &[ValType], results: &[ValType], f: F) -> ImportDef
where
    F: Fn(&[Val]) -> wasmtime::Result<Vec<Val>> + Send + Sync + 'static,
{
    ImportDef::new(module, name, params, results, move |_caller, args| {
        f(args).map(Outcome::Ready)
    })
}

/// A host function backed by a future. The guest is suspended while it runs.
pub fn async_import<F, Fut>(
    module: &str,
    name: &str,
    params: &[ValType],
    results: &[ValType],
    f: F,
) -> ImportDef
where
    F: Fn(Vec<Val>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = wasmtime::Result<Vec<Val>>> + Send + 'static,
{
    ImportDef::new(module, name, params, results, move |_caller, args| {
        Ok(Outcome::Pending(Box::pin(f(args.to_vec()))))
    })
}
