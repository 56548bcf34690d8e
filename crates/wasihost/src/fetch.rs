//! # Module sources
//!
//! Where module bytes come from. Fetching is the first suspension point of a
//! run: [`Runtime::instantiate_streaming`](crate::Runtime::instantiate_streaming)
//! awaits it before compiling anything.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Nothing exists at the location.
    NotFound(String),
    /// The source failed while reading.
    Io { location: String, message: String },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(location) => write!(f, "Module not found: {}", location),
            Self::Io { location, message } => write!(f, "Failed to fetch {}: {}", location, message),
        }
    }
}

impl std::error::Error for FetchError {}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Retrieves module bytes by location.
///
/// This trait is designed to be object-safe (`&dyn Fetch`).
#[async_trait::async_trait]
pub trait Fetch: Send + Sync {
    /// Returns the complete module (binary or WAT text) at `location`.
    async fn fetch(&self, location: &str) -> Result<Vec<u8>>;
}

/// Reads modules from the local filesystem, optionally below a base directory.
#[derive(Clone, Debug, Default)]
pub struct FsFetch {
    base: Option<PathBuf>,
}

impl FsFetch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves relative locations against `base`.
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    fn resolve(&self, location: &str) -> PathBuf {
        match &self.base {
            Some(base) => base.join(location),
            None => PathBuf::from(location),
        }
    }
}

#[async_trait::async_trait]
impl Fetch for FsFetch {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let path = self.resolve(location);
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound(path.display().to_string()),
            _ => FetchError::Io {
                location: path.display().to_string(),
                message: e.to_string(),
            },
        })
    }
}

/// Serves bytes that are already in memory, whatever the location.
#[derive(Clone, Debug)]
pub struct BytesFetch {
    bytes: Vec<u8>,
}

impl BytesFetch {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

#[async_trait::async_trait]
impl Fetch for BytesFetch {
    async fn fetch(&self, _location: &str) -> Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }
}
