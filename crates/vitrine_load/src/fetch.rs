//! Resource fetch primitive.
//!
//! Decoders never touch storage directly; they ask a `ResourceFetcher` for
//! the bytes at a path. `FsFetcher` reads from disk, `MemoryFetcher` serves
//! preloaded bytes with optional simulated latency.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while fetching a resource.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Resource not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Asynchronous byte source for asset resources.
pub trait ResourceFetcher: Send + Sync + 'static {
    /// Fetch the whole resource at `path`.
    fn fetch(&self, path: &Path) -> impl Future<Output = FetchResult<Vec<u8>>> + Send;
}

/// Reads resources from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsFetcher;

impl ResourceFetcher for FsFetcher {
    async fn fetch(&self, path: &Path) -> FetchResult<Vec<u8>> {
        tokio::fs::read(path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                FetchError::NotFound(path.to_path_buf())
            } else {
                FetchError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })
    }
}

#[derive(Debug, Clone)]
struct MemoryResource {
    bytes: Arc<[u8]>,
    latency: Duration,
}

/// Serves resources from memory.
///
/// Every request is recorded (in order) so callers can check which
/// resources were asked for.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    resources: HashMap<PathBuf, MemoryResource>,
    requests: Mutex<Vec<PathBuf>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource that is served immediately.
    pub fn insert(&mut self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        self.insert_delayed(path, bytes, Duration::ZERO);
    }

    /// Register a resource that is served after `latency`.
    pub fn insert_delayed(
        &mut self,
        path: impl Into<PathBuf>,
        bytes: impl Into<Vec<u8>>,
        latency: Duration,
    ) {
        let bytes: Vec<u8> = bytes.into();
        let resource = MemoryResource {
            bytes: Arc::from(bytes),
            latency,
        };
        self.resources.insert(path.into(), resource);
    }

    pub fn with(mut self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }

    pub fn with_delayed(
        mut self,
        path: impl Into<PathBuf>,
        bytes: impl Into<Vec<u8>>,
        latency: Duration,
    ) -> Self {
        self.insert_delayed(path, bytes, latency);
        self
    }

    /// Every path requested so far, in request order.
    pub fn requests(&self) -> Vec<PathBuf> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether `path` has been requested at least once.
    pub fn was_requested(&self, path: &Path) -> bool {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|p| p == path)
    }
}

impl ResourceFetcher for MemoryFetcher {
    async fn fetch(&self, path: &Path) -> FetchResult<Vec<u8>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_path_buf());

        let resource = self
            .resources
            .get(path)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(path.to_path_buf()))?;

        if !resource.latency.is_zero() {
            tokio::time::sleep(resource.latency).await;
        }
        Ok(resource.bytes.to_vec())
    }
}
