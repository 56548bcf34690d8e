//! # wasihost
//!
//! Runs one untrusted WebAssembly module against a small, in-memory operating
//! system: arguments, environment, randomness, clocks, process exit and a
//! filesystem that lives only in a [`memfs::VirtualFileSystem`].
//!
//! ## Philosophy
//!
//! - **Synchronous Guest, Async Host**: The guest is compiled for the
//!   synchronous `wasi_snapshot_preview1` ABI. Any host import can still hand
//!   back a future; the asyncify driver unwinds the guest, awaits, and rewinds
//!   it to the same call site.
//! - **Providers**: Each slice of the syscall surface is a
//!   [`FeatureProvider`]. The host composes them into one flat namespace and
//!   refuses duplicates.
//! - **Errno, Not Errors**: Guest-facing failures are [`abi::Errno`] values.
//!   Rust errors are reserved for configuration problems and for runs that end
//!   without an exit code.
//!
//! ## Example
//!
//! ```rust,no_run
//! use memfs::VirtualFileSystem;
//! use wasihost::FsFetch;
//! use wasihost::HostBuilder;
//! use wasihost::Runtime;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let fs = VirtualFileSystem::new();
//! fs.add_file("/input.txt", b"hello".to_vec())?;
//!
//! let host = HostBuilder::new()
//!     .args(["upcase", "/input.txt", "/output.txt"])
//!     .fs(fs.clone())
//!     .stdout(|line| print!("{}", line))
//!     .build()?;
//!
//! let runtime = Runtime::new()?;
//! let instance = runtime.instantiate_streaming(&FsFetch::new(), "upcase.wasm", host).await?;
//! let status = instance.start().await?;
//! assert_eq!(status.code, 0);
//! assert_eq!(fs.read_file("/output.txt").unwrap(), b"HELLO");
//! # Ok(())
//! # }
//! ```

pub mod abi;
pub mod asyncify;
pub mod context;
pub mod fdtable;
pub mod fetch;
pub mod host;
pub mod instance;
pub mod provider;
pub mod runtime;


pub use asyncify::AsyncifyConfig;
pub use asyncify::AsyncifyError;
pub use asyncify::State;
pub use context::HostCtx;
pub use fetch::BytesFetch;
pub use fetch::Fetch;
pub use fetch::FetchError;
pub use fetch::FsFetch;
pub use host::ExitStatus;
pub use host::HostBuilder;
pub use host::HostError;
pub use host::WasiHost;
pub use instance::AsyncifyInstance;
pub use instance::RunError;
pub use provider::FeatureProvider;
pub use provider::ImportDef;
pub use provider::ImportId;
pub use provider::Outcome;
pub use runtime::InstantiateError;
pub use runtime::Runtime;
