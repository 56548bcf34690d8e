//! # WASI host
//!
//! Composes feature providers into one flat import namespace and carries the
//! per-run inputs (arguments, environment, filesystem, standard streams) to the
//! instance.
//!
//! ## Example
//!
//! ```rust
//! use memfs::VirtualFileSystem;
//! use wasihost::HostBuilder;
//!
//! let fs = VirtualFileSystem::new();
//! fs.add_file("/input.txt", b"hello".to_vec()).unwrap();
//!
//! let host = HostBuilder::new()
//!     .args(["perl", "/script.pl"])
//!     .env("HOME", "/")
//!     .fs(fs.clone())
//!     .stdout(|line| print!("{}", line))
//!     .build()
//!     .unwrap();
//! assert_eq!(host.entry(), "_start");
//! ```

use std::collections::BTreeMap;
use std::future::Future;

use memfs::VirtualFileSystem;
use wasmtime::Val;
use wasmtime::ValType;

use crate::asyncify::AsyncifyConfig;
use crate::asyncify::AsyncifyCtx;
use crate::context::HostCtx;
use crate::fdtable::DescriptorTable;
use crate::fdtable::Sink;
use crate::fdtable::discard;
use crate::provider::Args;
use crate::provider::Clock;
use crate::provider::Custom;
use crate::provider::Environ;
use crate::provider::FeatureProvider;
use crate::provider::Filesystem;
use crate::provider::ImportDef;
use crate::provider::ImportId;
use crate::provider::Process;
use crate::provider::Random;
use crate::provider::custom;
use crate::provider::is_numeric;

/// Host configuration errors, reported before any guest code runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// Two providers export the same `(module, name)`.
    DuplicateImport {
        import: ImportId,
        first: String,
        second: String,
    },
    /// A custom import uses a non-numeric value type.
    UnsupportedType { import: ImportId, ty: String },
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateImport {
                import,
                first,
                second,
            } => write!(
                f,
                "Duplicate import {}: provided by both `{}` and `{}`",
                import, first, second
            ),
            Self::UnsupportedType { import, ty } => {
                write!(f, "Import {} uses unsupported value type {}", import, ty)
            }
        }
    }
}

impl std::error::Error for HostError {}

pub type Result<T> = std::result::Result<T, HostError>;

/// How a run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: i32,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Builder for a [`WasiHost`].
pub struct HostBuilder {
    args: Vec<String>,
    env: BTreeMap<String, String>,
    fs: VirtualFileSystem,
    stdin: Vec<u8>,
    stdout: Sink,
    stderr: Sink,
    entry: String,
    providers: Vec<Box<dyn FeatureProvider>>,
    custom: Custom,
    trap_unknown_imports: bool,
    asyncify: AsyncifyConfig,
}

impl HostBuilder {
    pub fn new() -> Self {
        Self {
            args: Vec::new(),
            env: BTreeMap::new(),
            fs: VirtualFileSystem::new(),
            stdin: Vec::new(),
            stdout: discard(),
            stderr: discard(),
            entry: "_start".to_string(),
            providers: Vec::new(),
            custom: Custom::new(),
            trap_unknown_imports: true,
            asyncify: AsyncifyConfig::default(),
        }
    }

    /// Appends arguments. The first one is the program name.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// The filesystem the guest sees. Keep a clone to read results afterwards.
    pub fn fs(mut self, fs: VirtualFileSystem) -> Self {
        self.fs = fs;
        self
    }

    pub fn stdin(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin = bytes.into();
        self
    }

    /// Receives standard output, one line per call.
    pub fn stdout(mut self, sink: impl FnMut(&str) + Send + 'static) -> Self {
        self.stdout = Box::new(sink);
        self
    }

    /// Receives standard error, one line per call.
    pub fn stderr(mut self, sink: impl FnMut(&str) + Send + 'static) -> Self {
        self.stderr = Box::new(sink);
        self
    }

    /// Export invoked by `start`. Defaults to `_start`.
    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = name.into();
        self
    }

    pub fn provider(mut self, provider: impl FeatureProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Registers a synchronous custom import.
    pub fn import<F>(mut self, module: &str, name: &str, params: &[ValType], results: &[ValType], f: F) -> Self
    where
        F: Fn(&[Val]) -> wasmtime::Result<Vec<Val>> + Send + Sync + 'static,
    {
        self.custom.push(custom::sync_import(module, name, params, results, f));
        self
    }

    /// Registers a custom import backed by a future; calling it suspends the guest.
    pub fn import_async<F, Fut>(
        mut self,
        module: &str,
        name: &str,
        params: &[ValType],
        results: &[ValType],
        f: F,
    ) -> Self
    where
        F: Fn(Vec<Val>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = wasmtime::Result<Vec<Val>>> + Send + 'static,
    {
        self.custom.push(custom::async_import(module, name, params, results, f));
        self
    }

    /// Registers a prebuilt import definition as a custom import.
    pub fn import_def(mut self, def: ImportDef) -> Self {
        self.custom.push(def);
        self
    }

    /// Whether imports nobody provides become trapping stubs (the default) or
    /// make instantiation fail.
    pub fn trap_unknown_imports(mut self, enabled: bool) -> Self {
        self.trap_unknown_imports = enabled;
        self
    }

    pub fn asyncify(mut self, config: AsyncifyConfig) -> Self {
        self.asyncify = config;
        self
    }

    /// Composes every provider's imports into one namespace.
    pub fn build(self) -> Result<WasiHost> {
        let mut providers: Vec<Box<dyn FeatureProvider>> = vec![
            Box::new(Args::new(&self.args)),
            Box::new(Environ::new(&self.env)),
            Box::new(Random),
            Box::new(Clock::new()),
            Box::new(Process),
            Box::new(Filesystem),
        ];
        providers.extend(self.providers);
        if !self.custom.is_empty() {
            providers.push(Box::new(self.custom));
        }

        let imports = compose(&providers)?;
        Ok(WasiHost {
            fs: self.fs,
            stdin: self.stdin,
            stdout: self.stdout,
            stderr: self.stderr,
            entry: self.entry,
            imports,
            trap_unknown_imports: self.trap_unknown_imports,
            asyncify: self.asyncify,
        })
    }
}

impl Default for HostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Flattens provider imports, rejecting duplicates and non-numeric signatures.
fn compose(providers: &[Box<dyn FeatureProvider>]) -> Result<Vec<ImportDef>> {
    let mut owners: BTreeMap<ImportId, String> = BTreeMap::new();
    let mut imports = Vec::new();
    for provider in providers {
        for def in provider.imports() {
            let id = def.id();
            if let Some(first) = owners.get(&id) {
                return Err(HostError::DuplicateImport {
                    import: id,
                    first: first.clone(),
                    second: provider.name().to_string(),
                });
            }
            if let Some(ty) = def.params.iter().chain(&def.results).find(|ty| !is_numeric(ty)) {
                return Err(HostError::UnsupportedType {
                    import: id,
                    ty: format!("{:?}", ty),
                });
            }
            owners.insert(id, provider.name().to_string());
            imports.push(def);
        }
    }
    Ok(imports)
}

/// A composed host, ready to be instantiated with a module.
pub struct WasiHost {
    fs: VirtualFileSystem,
    stdin: Vec<u8>,
    stdout: Sink,
    stderr: Sink,
    entry: String,
    imports: Vec<ImportDef>,
    trap_unknown_imports: bool,
    asyncify: AsyncifyConfig,
}

/// What instantiation takes out of a [`WasiHost`].
pub(crate) struct HostParts {
    pub ctx: HostCtx,
    pub imports: Vec<ImportDef>,
    pub entry: String,
    pub trap_unknown_imports: bool,
}

impl WasiHost {
    pub fn builder() -> HostBuilder {
        HostBuilder::new()
    }

    pub fn filesystem(&self) -> &VirtualFileSystem {
        &self.fs
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn imports(&self) -> &[ImportDef] {
        &self.imports
    }

    pub(crate) fn into_parts(self) -> HostParts {
        let fds = DescriptorTable::new(&self.fs, self.stdin, self.stdout, self.stderr);
        HostParts {
            ctx: HostCtx::new(self.fs, fds, AsyncifyCtx::new(self.asyncify)),
            imports: self.imports,
            entry: self.entry,
            trap_unknown_imports: self.trap_unknown_imports,
        }
    }
}
