//! # Runtime
//!
//! Owns the engine and turns module bytes plus a [`WasiHost`] into an
//! [`AsyncifyInstance`]: compile, link every import through the asyncify
//! wrapper, instantiate, then enable suspension when the module supports it.
//!
//! The engine runs guests synchronously. Suspension is asyncify's job, so no
//! async support or fibers are configured.

use std::collections::BTreeSet;

use tracing::debug;
use tracing::warn;
use wasmtime::Engine;
use wasmtime::ExternType;
use wasmtime::FuncType;
use wasmtime::Linker;
use wasmtime::Module;
use wasmtime::Store;

use crate::asyncify;
use crate::asyncify::AsyncifyError;
use crate::context::HostCtx;
use crate::fetch::BytesFetch;
use crate::fetch::Fetch;
use crate::fetch::FetchError;
use crate::host::WasiHost;
use crate::instance::AsyncifyInstance;
use crate::provider::ImportId;

#[derive(Debug)]
pub enum InstantiateError {
    Engine(wasmtime::Error),
    Fetch(FetchError),
    Compile(wasmtime::Error),
    /// An import could not be linked, or is unknown with trapping disabled.
    Link(String),
    Instantiate(wasmtime::Error),
    Asyncify(AsyncifyError),
}

impl std::fmt::Display for InstantiateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Engine(e) => write!(f, "Engine error: {}", e),
            Self::Fetch(e) => write!(f, "Fetch error: {}", e),
            Self::Compile(e) => write!(f, "Compile error: {:#}", e),
            Self::Link(msg) => write!(f, "Linker error: {}", msg),
            Self::Instantiate(e) => write!(f, "Instantiation error: {:#}", e),
            Self::Asyncify(e) => write!(f, "Asyncify error: {}", e),
        }
    }
}

impl std::error::Error for InstantiateError {}

impl From<FetchError> for InstantiateError {
    fn from(e: FetchError) -> Self {
        Self::Fetch(e)
    }
}

impl From<AsyncifyError> for InstantiateError {
    fn from(e: AsyncifyError) -> Self {
        Self::Asyncify(e)
    }
}

pub type Result<T> = std::result::Result<T, InstantiateError>;

pub struct Runtime {
    engine: Engine,
}

impl Runtime {
    /// Creates a runtime with a synchronous core-module engine.
    pub fn new() -> Result<Self> {
        let config = wasmtime::Config::new();
        let engine = Engine::new(&config).map_err(InstantiateError::Engine)?;
        Ok(Self { engine })
    }

    /// Creates a runtime around a caller-configured engine.
    ///
    /// The engine must not enable async support; guests are called synchronously.
    pub fn with_engine(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Fetches, compiles and instantiates a module.
    ///
    /// Resolves only once the bytes have arrived and the module is linked.
    pub async fn instantiate_streaming(
        &self,
        fetch: &dyn Fetch,
        location: &str,
        host: WasiHost,
    ) -> Result<AsyncifyInstance> {
        let bytes = fetch.fetch(location).await?;
        debug!(location, len = bytes.len(), "fetched module");
        let module = Module::new(&self.engine, &bytes).map_err(InstantiateError::Compile)?;
        self.instantiate(&module, host)
    }

    /// Like [`Runtime::instantiate_streaming`] with bytes already in hand.
    pub async fn instantiate_bytes(&self, bytes: impl Into<Vec<u8>>, host: WasiHost) -> Result<AsyncifyInstance> {
        self.instantiate_streaming(&BytesFetch::new(bytes), "<memory>", host)
            .await
    }

    /// Links `host` into a compiled module and instantiates it.
    pub fn instantiate(&self, module: &Module, host: WasiHost) -> Result<AsyncifyInstance> {
        let parts = host.into_parts();
        let mut linker: Linker<HostCtx> = Linker::new(&self.engine);

        let mut provided = BTreeSet::new();
        for def in &parts.imports {
            let ty = FuncType::new(&self.engine, def.params.iter().cloned(), def.results.iter().cloned());
            linker
                .func_new(&def.module, &def.name, ty, asyncify::wrap(def))
                .map_err(|e| InstantiateError::Link(format!("{}: {}", def.id(), e)))?;
            provided.insert(def.id());
        }

        let unknown: Vec<ImportId> = module
            .imports()
            .filter(|import| matches!(import.ty(), ExternType::Func(_)))
            .map(|import| ImportId::new(import.module(), import.name()))
            .filter(|id| !provided.contains(id))
            .collect();
        if !unknown.is_empty() {
            if !parts.trap_unknown_imports {
                return Err(InstantiateError::Link(format!("unknown import {}", unknown[0])));
            }
            for id in &unknown {
                warn!(import = %id, "no provider for import; calling it will trap");
            }
            linker
                .define_unknown_imports_as_traps(module)
                .map_err(|e| InstantiateError::Link(e.to_string()))?;
        }

        let mut store = Store::new(&self.engine, parts.ctx);
        let instance = linker
            .instantiate(&mut store, module)
            .map_err(InstantiateError::Instantiate)?;
        let instrumented = asyncify::install(&mut store, &instance)?;
        debug!(entry = %parts.entry, instrumented, "instantiated module");

        Ok(AsyncifyInstance::new(store, instance, parts.entry))
    }
}
