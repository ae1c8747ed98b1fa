use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use vitrine_core::Scene;
use vitrine_load::{FsFetcher, LoadPipeline, RefreshScheduler, SceneRegistry, ViewerConfig};

/// How often the scene status is logged
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

fn load_config() -> Result<ViewerConfig> {
    match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => {
            log::info!("Loading config from {}", path.display());
            ViewerConfig::load(&path).with_context(|| format!("Failed to load {}", path.display()))
        }
        None => {
            log::info!("No config given, using defaults");
            Ok(ViewerConfig::default())
        }
    }
}

fn log_status(registry: &SceneRegistry) {
    let stats = registry
        .scene()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .stats();

    if stats.bounds.is_empty() {
        log::info!("Generation {}: scene empty", registry.generation());
        return;
    }
    log::info!(
        "Generation {}: {} nodes, {} meshes, {} triangles, bounds {} .. {}",
        registry.generation(),
        stats.nodes,
        stats.meshes,
        stats.triangles,
        stats.bounds.min,
        stats.bounds.max
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting Vitrine");

    let config = load_config()?;
    let catalog = config.catalog().context("Invalid model list")?;
    log::info!(
        "{} assets under {}, refreshing every {:?}",
        catalog.len(),
        config.asset_root.display(),
        config.refresh_period()
    );

    let registry = Arc::new(SceneRegistry::new(Scene::shared("vitrine")));
    let pipeline = LoadPipeline::new(
        Arc::new(catalog),
        Arc::new(FsFetcher),
        registry.clone(),
        config.load_settings(),
    );
    let scheduler = RefreshScheduler::new(pipeline, config.refresh_period()).spawn();

    let mut status = tokio::time::interval(STATUS_INTERVAL);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("Failed to listen for Ctrl-C")?;
                log::info!("Shutting down");
                break;
            }
            _ = status.tick() => log_status(&registry),
        }
    }

    scheduler.abort();
    Ok(())
}
