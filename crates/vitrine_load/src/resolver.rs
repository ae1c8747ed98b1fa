//! Fallback resolution across an asset's candidate formats.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use vitrine_core::SceneNode;

use crate::catalog::{AssetDescriptor, AssetLocation, FormatTag};
use crate::fetch::ResourceFetcher;
use crate::format::{self, DecodeError};

/// A successfully decoded asset and the format that produced it.
#[derive(Debug)]
pub struct Resolved {
    pub node: SceneNode,
    pub format: FormatTag,
}

/// Why one candidate format was rejected.
#[derive(Debug)]
pub struct CandidateFailure {
    pub format: FormatTag,
    pub error: DecodeError,
}

/// Every candidate of an asset failed.
#[derive(Debug)]
pub struct Exhausted {
    pub asset: String,
    pub failures: Vec<CandidateFailure>,
}

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failures.is_empty() {
            return write!(f, "Asset {} has no candidate formats", self.asset);
        }
        write!(f, "Asset {} failed in every format", self.asset)?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.format, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for Exhausted {}

/// Tries an asset's candidate formats in declared order and keeps the first
/// that decodes.
pub struct Resolver<F> {
    fetcher: Arc<F>,
    asset_root: PathBuf,
    candidate_timeout: Option<Duration>,
}

impl<F> Clone for Resolver<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            asset_root: self.asset_root.clone(),
            candidate_timeout: self.candidate_timeout,
        }
    }
}

impl<F: ResourceFetcher> Resolver<F> {
    pub fn new(fetcher: Arc<F>, asset_root: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            asset_root: asset_root.into(),
            candidate_timeout: None,
        }
    }

    /// Give up on a single candidate after `timeout` and move to the next.
    pub fn with_candidate_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.candidate_timeout = timeout;
        self
    }

    pub fn asset_root(&self) -> &Path {
        &self.asset_root
    }

    /// Resolve one asset. Later candidates are never touched once one
    /// succeeds.
    pub async fn resolve(&self, descriptor: &AssetDescriptor) -> Result<Resolved, Exhausted> {
        let location = AssetLocation::new(&self.asset_root, descriptor.name());
        let mut failures = Vec::new();

        for &format in descriptor.formats() {
            match self.try_candidate(format, &location).await {
                Ok(node) => return Ok(Resolved { node, format }),
                Err(error) => {
                    log::debug!("Asset {}: {} candidate failed: {}", descriptor.name(), format, error);
                    failures.push(CandidateFailure { format, error });
                }
            }
        }

        Err(Exhausted {
            asset: descriptor.name().to_string(),
            failures,
        })
    }

    async fn try_candidate(&self, format: FormatTag, location: &AssetLocation) -> Result<SceneNode, DecodeError> {
        let decode = format::decode(format, self.fetcher.as_ref(), location);
        match self.candidate_timeout {
            Some(limit) => tokio::time::timeout(limit, decode)
                .await
                .unwrap_or(Err(DecodeError::TimedOut(limit))),
            None => decode.await,
        }
    }
}
