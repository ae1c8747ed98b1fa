//! Asynchronous asset loading and scene lifecycle for Vitrine.
//!
//! A [`Catalog`] names the assets to show and, for each, the formats to try in
//! order. Every refresh cycle the [`RefreshScheduler`] advances the
//! [`SceneRegistry`] to a new [`Generation`] (clearing what was placed) and
//! has the [`LoadPipeline`] start one task per asset. Each task asks the
//! [`Resolver`] for the first candidate format that decodes, scatters the
//! result and commits it, unless the registry has moved on in the meantime.
//!
//! ```no_run
//! use std::sync::Arc;
//! use vitrine_core::Scene;
//! use vitrine_load::{FsFetcher, LoadPipeline, RefreshScheduler, SceneRegistry, ViewerConfig};
//!
//! # async fn run() -> Result<(), vitrine_load::ConfigError> {
//! let config = ViewerConfig::default();
//! let registry = Arc::new(SceneRegistry::new(Scene::shared("vitrine")));
//! let pipeline = LoadPipeline::new(
//!     Arc::new(config.catalog()?),
//!     Arc::new(FsFetcher),
//!     registry.clone(),
//!     config.load_settings(),
//! );
//! let scheduler = RefreshScheduler::new(pipeline, config.refresh_period()).spawn();
//! # scheduler.abort();
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod fetch;
pub mod format;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod scheduler;

pub use catalog::{
    AssetDescriptor, AssetLocation, Catalog, CatalogEntry, CatalogError, FormatKind, FormatTag,
};
pub use config::{ConfigError, ScatterConfig, ViewerConfig};
pub use fetch::{FetchError, FsFetcher, MemoryFetcher, ResourceFetcher};
pub use format::{DecodeError, FormatAdapter};
pub use pipeline::{LaunchHandle, LaunchReport, LoadOutcome, LoadPipeline, LoadSettings, Placement};
pub use registry::{Generation, PlacedNode, SceneRegistry};
pub use resolver::{CandidateFailure, Exhausted, Resolved, Resolver};
pub use scheduler::{RefreshScheduler, SchedulerState};
