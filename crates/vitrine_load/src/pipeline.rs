//! Concurrent loading of every catalog asset into the registry.
//!
//! `launch` spawns one tokio task per descriptor and returns at once. Each
//! task resolves its asset, scatters it, and commits it under the generation
//! it was launched with; a commit for a generation the registry has already
//! left is dropped.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use vitrine_core::{NodeId, Vec3};

use crate::catalog::{Catalog, FormatTag};
use crate::fetch::ResourceFetcher;
use crate::registry::{Commit, Generation, PendingNode, SceneRegistry};
use crate::resolver::{Exhausted, Resolved, Resolver};

/// Where placed assets land: `x` and `z` uniform in `(-range/2, range/2)`,
/// `y` fixed.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Placement {
    pub range: f32,
    pub y: f32,
}

impl Default for Placement {
    fn default() -> Self {
        Self { range: 5.0, y: 0.0 }
    }
}

impl Placement {
    pub fn sample(&self, rng: &mut impl Rng) -> Vec3 {
        let x = (rng.gen::<f32>() - 0.5) * self.range;
        let z = (rng.gen::<f32>() - 0.5) * self.range;
        Vec3::new(x, self.y, z)
    }
}

/// Tunables for a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSettings {
    pub asset_root: PathBuf,
    pub placement: Placement,
    pub candidate_timeout: Option<Duration>,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("models"),
            placement: Placement::default(),
            candidate_timeout: None,
        }
    }
}

/// How one asset's load ended.
#[derive(Debug)]
pub enum LoadOutcome {
    Placed { format: FormatTag, id: NodeId },
    Exhausted(Exhausted),
    /// Decoded, but the registry had moved on.
    Stale { current: Generation },
    /// The load task panicked or was cancelled.
    Failed(String),
}

impl LoadOutcome {
    pub fn is_placed(&self) -> bool {
        matches!(self, LoadOutcome::Placed { .. })
    }
}

#[derive(Debug)]
pub struct AssetOutcome {
    pub asset: String,
    pub outcome: LoadOutcome,
}

/// Outcomes of every load of one launch, in catalog order.
#[derive(Debug)]
pub struct LaunchReport {
    pub generation: Generation,
    pub outcomes: Vec<AssetOutcome>,
}

impl LaunchReport {
    pub fn placed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_placed()).count()
    }

    pub fn get(&self, asset: &str) -> Option<&LoadOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.asset == asset)
            .map(|o| &o.outcome)
    }
}

/// The in-flight loads of one launch.
#[must_use = "join the launch or detach it explicitly"]
#[derive(Debug)]
pub struct LaunchHandle {
    generation: Generation,
    tasks: Vec<(String, JoinHandle<LoadOutcome>)>,
}

impl LaunchHandle {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every load and collect the outcomes.
    pub async fn join(self) -> LaunchReport {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        for (asset, task) in self.tasks {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("Load task for {} did not complete: {}", asset, e);
                    LoadOutcome::Failed(e.to_string())
                }
            };
            outcomes.push(AssetOutcome { asset, outcome });
        }
        LaunchReport {
            generation: self.generation,
            outcomes,
        }
    }

    /// Let the loads finish on their own.
    pub fn detach(self) {
        drop(self.tasks);
    }
}

/// Issues loads for every catalog asset.
pub struct LoadPipeline<F> {
    catalog: Arc<Catalog>,
    registry: Arc<SceneRegistry>,
    resolver: Resolver<F>,
    placement: Placement,
}

impl<F: ResourceFetcher> LoadPipeline<F> {
    pub fn new(
        catalog: Arc<Catalog>,
        fetcher: Arc<F>,
        registry: Arc<SceneRegistry>,
        settings: LoadSettings,
    ) -> Self {
        let resolver = Resolver::new(fetcher, settings.asset_root)
            .with_candidate_timeout(settings.candidate_timeout);
        Self {
            catalog,
            registry,
            resolver,
            placement: settings.placement,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn registry(&self) -> &Arc<SceneRegistry> {
        &self.registry
    }

    /// Start one independent load per catalog asset, tagged with
    /// `generation`. Must be called from within a tokio runtime.
    pub fn launch(&self, generation: Generation) -> LaunchHandle {
        let tasks = self
            .catalog
            .iter()
            .map(|descriptor| {
                let asset = descriptor.name().to_string();
                let descriptor = descriptor.clone();
                let resolver = self.resolver.clone();
                let registry = self.registry.clone();
                let placement = self.placement;

                let task = tokio::spawn(async move {
                    let Resolved { mut node, format } = match resolver.resolve(&descriptor).await {
                        Ok(resolved) => resolved,
                        Err(exhausted) => {
                            log::warn!("{}", exhausted);
                            return LoadOutcome::Exhausted(exhausted);
                        }
                    };

                    let position = placement.sample(&mut rand::thread_rng());
                    node.transform.translation = position;

                    let pending = PendingNode {
                        asset: descriptor.name().to_string(),
                        format,
                        position,
                        generation,
                        node,
                    };
                    match registry.add(pending) {
                        Commit::Placed(id) => {
                            log::debug!("Placed {} ({}) at {}", descriptor.name(), format, position);
                            LoadOutcome::Placed { format, id }
                        }
                        Commit::Stale { current } => LoadOutcome::Stale { current },
                    }
                });
                (asset, task)
            })
            .collect();

        LaunchHandle { generation, tasks }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::path::Path;

    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use vitrine_core::Scene;

    use super::*;
    use crate::catalog::{AssetDescriptor, AssetLocation};
    use crate::fetch::{FetchResult, MemoryFetcher};
    use crate::format::fixtures::{add_asset, TRIANGLE_PLY};

    fn catalog(assets: Vec<(&str, Vec<FormatTag>)>) -> Arc<Catalog> {
        let descriptors = assets
            .into_iter()
            .map(|(name, formats)| AssetDescriptor::new(name, formats))
            .collect();
        Arc::new(Catalog::new(descriptors).unwrap())
    }

    fn pipeline<F: ResourceFetcher>(catalog: Arc<Catalog>, fetcher: F) -> LoadPipeline<F> {
        let registry = Arc::new(SceneRegistry::new(Scene::shared("test")));
        LoadPipeline::new(catalog, Arc::new(fetcher), registry, LoadSettings::default())
    }

    fn placed_assets(registry: &SceneRegistry) -> BTreeSet<String> {
        registry.placed().into_iter().map(|p| p.asset).collect()
    }

    #[tokio::test]
    async fn test_each_resolvable_asset_placed_once() {
        let root = Path::new("models");
        let mut fetcher = MemoryFetcher::new();
        add_asset(&mut fetcher, root, "a", FormatTag::Obj);
        add_asset(&mut fetcher, root, "b", FormatTag::Glb);
        add_asset(&mut fetcher, root, "c", FormatTag::Ply);

        let pipeline = pipeline(
            catalog(vec![
                ("a", vec![FormatTag::Obj]),
                ("b", vec![FormatTag::Glb, FormatTag::Obj]),
                ("c", vec![FormatTag::Obj, FormatTag::Ply]),
                ("ghost", vec![FormatTag::Obj, FormatTag::Ply]),
            ]),
            fetcher,
        );

        let generation = pipeline.registry().begin_generation();
        let report = pipeline.launch(generation).join().await;

        assert_eq!(report.placed(), 3);
        assert!(matches!(report.get("ghost"), Some(LoadOutcome::Exhausted(_))));
        assert!(matches!(
            report.get("c"),
            Some(LoadOutcome::Placed { format: FormatTag::Ply, .. })
        ));
        assert_eq!(pipeline.registry().len(), 3);
        assert_eq!(pipeline.registry().scene().read().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_nothing_resolvable_places_nothing() {
        let pipeline = pipeline(
            catalog(vec![
                ("a", vec![FormatTag::Glb]),
                ("b", vec![]),
                ("c", vec![FormatTag::Ply]),
            ]),
            MemoryFetcher::new().with("models/c/c.ply", "garbage"),
        );

        let generation = pipeline.registry().begin_generation();
        let report = pipeline.launch(generation).join().await;

        assert_eq!(report.placed(), 0);
        assert_eq!(report.outcomes.len(), 3);
        assert!(report
            .outcomes
            .iter()
            .all(|o| matches!(o.outcome, LoadOutcome::Exhausted(_))));
        assert!(pipeline.registry().is_empty());
    }

    #[tokio::test]
    async fn test_placement_within_scatter_bounds() {
        let root = Path::new("models");
        let mut fetcher = MemoryFetcher::new();
        let names: Vec<String> = (0..10).map(|i| format!("m{}", i)).collect();
        for name in &names {
            add_asset(&mut fetcher, root, name, FormatTag::Ply);
        }
        let entries = names.iter().map(|n| (n.as_str(), vec![FormatTag::Ply])).collect();

        let registry = Arc::new(SceneRegistry::new(Scene::shared("test")));
        let settings = LoadSettings {
            placement: Placement { range: 4.0, y: 1.5 },
            ..LoadSettings::default()
        };
        let pipeline = LoadPipeline::new(catalog(entries), Arc::new(fetcher), registry.clone(), settings);

        let generation = registry.begin_generation();
        pipeline.launch(generation).join().await;

        let placed = registry.placed();
        assert_eq!(placed.len(), 10);
        for p in placed {
            assert!(p.position.x.abs() <= 2.0 && p.position.z.abs() <= 2.0);
            assert_eq!(p.position.y, 1.5);
            assert_eq!(p.node.transform.translation, p.position);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_after_refresh_is_discarded() {
        let mut fetcher = MemoryFetcher::new();
        let location = AssetLocation::new(Path::new("models"), "slow");
        fetcher.insert_delayed(location.primary(FormatTag::Ply), TRIANGLE_PLY, Duration::from_secs(10));

        let pipeline = pipeline(catalog(vec![("slow", vec![FormatTag::Ply])]), fetcher);
        let registry = pipeline.registry().clone();

        let first = registry.begin_generation();
        let old_launch = pipeline.launch(first);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let second = registry.begin_generation();
        let new_launch = pipeline.launch(second);

        let old_report = old_launch.join().await;
        assert!(matches!(
            old_report.get("slow"),
            Some(LoadOutcome::Stale { current }) if *current == second
        ));
        assert!(registry.is_empty());

        let new_report = new_launch.join().await;
        assert_eq!(new_report.placed(), 1);
        let placed = registry.placed();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].generation, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_while_loading_leaves_only_later_completions() {
        let root = Path::new("models");
        let mut fetcher = MemoryFetcher::new();
        add_asset(&mut fetcher, root, "fast", FormatTag::Ply);
        fetcher.insert_delayed("models/slow/slow.ply", TRIANGLE_PLY, Duration::from_secs(5));

        let pipeline = pipeline(
            catalog(vec![("fast", vec![FormatTag::Ply]), ("slow", vec![FormatTag::Ply])]),
            fetcher,
        );
        let registry = pipeline.registry().clone();

        let generation = registry.begin_generation();
        let launch = pipeline.launch(generation);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(placed_assets(&registry), BTreeSet::from(["fast".to_string()]));
        registry.clear();
        assert!(registry.is_empty());

        // Same generation, so the slow load still lands after the clear
        launch.join().await;
        assert_eq!(placed_assets(&registry), BTreeSet::from(["slow".to_string()]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shuffled_completion_order_gives_same_result() {
        let names: Vec<String> = (0..6).map(|i| format!("asset{}", i)).collect();
        let expected: BTreeSet<String> = names.iter().cloned().collect();

        for seed in 0..5 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut fetcher = MemoryFetcher::new();
            for name in &names {
                let latency = Duration::from_millis(rng.gen_range(0..500));
                let location = AssetLocation::new(Path::new("models"), name);
                fetcher.insert_delayed(location.primary(FormatTag::Ply), TRIANGLE_PLY, latency);
            }

            let entries = names
                .iter()
                .map(|n| (n.as_str(), vec![FormatTag::Glb, FormatTag::Ply]))
                .collect();
            let pipeline = pipeline(catalog(entries), fetcher);
            let generation = pipeline.registry().begin_generation();
            let report = pipeline.launch(generation).join().await;

            assert_eq!(report.placed(), names.len(), "seed {}", seed);
            assert_eq!(placed_assets(pipeline.registry()), expected, "seed {}", seed);
        }
    }

    struct PanickingFetcher;

    impl ResourceFetcher for PanickingFetcher {
        async fn fetch(&self, path: &Path) -> FetchResult<Vec<u8>> {
            panic!("fetch of {} exploded", path.display());
        }
    }

    #[tokio::test]
    async fn test_panicking_load_is_contained() {
        let pipeline = pipeline(catalog(vec![("a", vec![FormatTag::Ply])]), PanickingFetcher);

        let generation = pipeline.registry().begin_generation();
        let report = pipeline.launch(generation).join().await;

        assert!(matches!(report.get("a"), Some(LoadOutcome::Failed(_))));
        assert!(pipeline.registry().is_empty());
    }

    #[test]
    fn test_zero_range_places_on_axis() {
        let mut rng = StdRng::seed_from_u64(7);
        let position = Placement { range: 0.0, y: 2.0 }.sample(&mut rng);
        assert_eq!(position, Vec3::new(0.0, 2.0, 0.0));
    }
}
