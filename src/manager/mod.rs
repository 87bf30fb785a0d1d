//! Batch orchestration.
//!
//! [`ModuleManager`] is the entry point a host uses to bring a set of modules up: it owns
//! the [`ModuleGraph`], the [`ResolutionService`] every image is registered with, and the
//! collected [`Diagnostics`]. A call to [`ModuleManager::instantiate_modules`] runs one
//! batch through these phases:
//!
//! 1. **Update** - every requested archive is attached to its node; a changed version or
//!    content hash marks the node, and transitively its dependents, for reload
//! 2. **Rebuild** - dependency edges are recomputed for the batch; a module whose
//!    references close a cycle is failed when its turn to load comes
//! 3. **Direct attach** - with live-edit attach enabled, eligible modules switch to their
//!    unmodified identity
//! 4. **Sandboxing** - nodes are loaded in dependency order
//! 5. **Instantiating** - the single entry type of every module is located and activated,
//!    in parallel
//!
//! The [`CancellationToken`] is checked before every module of both loading phases, right
//! after the module is reported to [`LoadProgress`]. Nodes that finished before
//! cancellation keep their state; the rest stay marked and are picked up by the next batch.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use modscope::{
//!     archive::{MemoryArchive, ModuleArchive},
//!     image::{ModuleImage, ModuleVersion, TypeScope},
//!     CancellationToken, ModuleManager,
//! };
//!
//! let mut image = ModuleImage::new("ModA", ModuleVersion::new(1, 0, 0, 0));
//! let host = image.add_reference("Host", ModuleVersion::new(1, 4, 0, 0));
//! image.add_type("ModA.ModA", Some((TypeScope::Reference(host), "Mod")));
//!
//! let archive: Arc<dyn ModuleArchive> = Arc::new(
//!     MemoryArchive::new("ModA", ModuleVersion::new(1, 0, 0, 0))
//!         .with_file("ModA.All.dll", image.to_bytes()),
//! );
//!
//! let mut manager = ModuleManager::default();
//! let entries = manager.instantiate_modules(&[archive], &CancellationToken::new())?;
//! assert_eq!(entries[0].image.identity(), "ModA#1");
//! # Ok::<(), modscope::Error>(())
//! ```

mod entry;

pub use entry::{EntryActivator, ModuleEntry, NullActivator};

use std::sync::{Arc, OnceLock};

use rayon::prelude::*;
use tracing::{debug, info, info_span, warn};

use crate::{
    archive::ModuleArchive,
    config::LoaderConfig,
    diagnostics::{DiagnosticCategory, Diagnostics},
    graph::{ModuleGraph, NodeId},
    image::ModuleImage,
    loader::{ImageId, LoadedImageRc, ModuleLoader},
    progress::{CancellationToken, LoadProgress, NoProgress, STAGE_INSTANTIATING, STAGE_SANDBOXING},
    resolution::{HostResolver, ResolutionService},
    Error, Result,
};

use entry::EntryTypeFinder;

/// Drives batches of modules through loading and instantiation.
pub struct ModuleManager {
    config: LoaderConfig,
    graph: ModuleGraph,
    resolution: Arc<ResolutionService>,
    diagnostics: Arc<Diagnostics>,
    activator: Arc<dyn EntryActivator>,
    progress: Arc<dyn LoadProgress>,
    resolver: OnceLock<HostResolver>,
}

impl Default for ModuleManager {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

impl std::fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleManager")
            .field("config", &self.config)
            .field("graph", &self.graph)
            .field("loaded", &self.resolution.loaded_count())
            .field("diagnostics", &self.diagnostics.count())
            .finish_non_exhaustive()
    }
}

impl ModuleManager {
    /// Create a manager with a fresh graph and registry.
    #[must_use]
    pub fn new(config: LoaderConfig) -> Self {
        let diagnostics = Arc::new(Diagnostics::new());
        Self {
            config,
            graph: ModuleGraph::new(),
            resolution: Arc::new(ResolutionService::new(Arc::clone(&diagnostics))),
            diagnostics,
            activator: Arc::new(NullActivator),
            progress: Arc::new(NoProgress),
            resolver: OnceLock::new(),
        }
    }

    /// Use `activator` to construct entry objects.
    #[must_use]
    pub fn with_activator(mut self, activator: impl EntryActivator + 'static) -> Self {
        self.activator = Arc::new(activator);
        self
    }

    /// Report progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: impl LoadProgress + 'static) -> Self {
        self.progress = Arc::new(progress);
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// The dependency graph of every module requested so far.
    #[must_use]
    pub fn graph(&self) -> &ModuleGraph {
        &self.graph
    }

    /// The registry of loaded images and definitions.
    #[must_use]
    pub fn resolution(&self) -> &Arc<ResolutionService> {
        &self.resolution
    }

    /// Diagnostics collected across all batches.
    #[must_use]
    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// The host resolution hook. Created on first use, every later call returns the same
    /// instance.
    pub fn install_resolver(&self) -> &HostResolver {
        self.resolver.get_or_init(|| {
            info!(core = %self.config.core_identity, "resolution hook installed");
            HostResolver::new(
                self.config.core_identity.clone(),
                Arc::clone(&self.resolution),
            )
        })
    }

    /// Load and instantiate a batch of modules.
    ///
    /// # Errors
    /// - [`Error::Cancelled`] if `token` fired before every module was handled
    /// - [`Error::DependencyCycle`] if a module's references close a cycle; modules
    ///   ordered before it are loaded
    /// - [`Error::ReloadFailure`] naming the first module whose images failed to load
    /// - [`Error::Instantiation`] listing every module whose entry object could not be
    ///   created, along with the entries of the modules that were instantiated
    pub fn instantiate_modules(
        &mut self,
        archives: &[Arc<dyn ModuleArchive>],
        token: &CancellationToken,
    ) -> Result<Vec<ModuleEntry>> {
        self.install_resolver();
        let batch = self.load_modules(archives, token)?;
        self.instantiate(&batch, token)
    }

    /// Run the loading phases of a batch without instantiating anything.
    ///
    /// Returns the batch nodes in load order.
    ///
    /// # Errors
    /// See [`ModuleManager::instantiate_modules`].
    pub fn load_modules(
        &mut self,
        archives: &[Arc<dyn ModuleArchive>],
        token: &CancellationToken,
    ) -> Result<Vec<NodeId>> {
        let batch = self.update_nodes(archives);
        self.graph.rebuild(&batch, &self.diagnostics);

        if self.config.live_edit_attach {
            for &id in &batch {
                if self.graph.node(id).has_eac()
                    && self.graph.can_direct_attach(id, &self.resolution)
                {
                    self.graph.enable_direct_attach(id);
                }
            }
        }

        let order = self.graph.load_order(&batch);
        self.progress
            .set_load_stage(STAGE_SANDBOXING, Some(order.len()));

        let loader = ModuleLoader::new(&self.resolution, &self.config);
        for (index, &id) in order.iter().enumerate() {
            self.progress
                .set_current_module(index, self.graph.node(id).name());
            token.check()?;

            if let Err(error) = loader.ensure_loaded(&mut self.graph, id) {
                let name = self.graph.node(id).name();
                warn!(module = %name, %error, "module failed to load");
                self.diagnostics
                    .error(DiagnosticCategory::Load, name, error.to_string());
                return Err(error);
            }
        }

        Ok(order)
    }

    /// Attach archives to their nodes, marking changed modules for reload.
    fn update_nodes(&mut self, archives: &[Arc<dyn ModuleArchive>]) -> Vec<NodeId> {
        let mut batch = Vec::with_capacity(archives.len());

        for archive in archives {
            let id = self.graph.find_or_create(archive.name());
            if batch.contains(&id) {
                warn!(module = %archive.name(), "module requested twice in one batch");
                continue;
            }
            batch.push(id);

            let node = self.graph.node_mut(id);
            let changed = node.archive.is_none()
                || node.version != archive.version()
                || node.hash != archive.hash();

            node.version = archive.version();
            node.hash = archive.hash();
            node.archive = Some(Arc::clone(archive));

            // images of a failed load belong to the old content
            if changed && node.needs_reload && node.image_generation == Some(node.generation) {
                node.generation += 1;
                debug!(
                    module = %node.name(),
                    generation = node.generation,
                    "content changed after a partial load"
                );
            }

            if changed {
                self.graph.mark_needs_reload(id);
            }
        }

        batch
    }

    fn instantiate(&self, batch: &[NodeId], token: &CancellationToken) -> Result<Vec<ModuleEntry>> {
        self.progress.set_load_stage(STAGE_INSTANTIATING, None);

        let results: Vec<Result<ModuleEntry>> = batch
            .par_iter()
            .map(|&id| {
                token.check()?;
                let node = self.graph.node(id);
                let result = self.instantiate_node(id);
                self.progress
                    .module_bytes_loaded(node.name(), node.bytes_loaded());
                result
            })
            .collect();

        let mut entries = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (&id, result) in batch.iter().zip(results) {
            match result {
                Ok(entry) => entries.push(entry),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(error) => {
                    let name = self.graph.node(id).name().to_string();
                    warn!(module = %name, %error, "module failed to instantiate");
                    self.diagnostics.error(
                        DiagnosticCategory::Instantiation,
                        &name,
                        error.to_string(),
                    );
                    failures.push((name, error));
                }
            }
        }

        if failures.is_empty() {
            Ok(entries)
        } else {
            Err(Error::Instantiation { failures, entries })
        }
    }

    fn instantiate_node(&self, id: NodeId) -> Result<ModuleEntry> {
        let node = self.graph.node(id);
        let name = node.name();

        let (Some(archive), Some(image)) = (node.archive(), node.main_image()) else {
            return Err(Error::ArchiveRead {
                archive: name.to_string(),
                path: String::new(),
                message: "module has no loaded main image".to_string(),
            });
        };

        let finder = EntryTypeFinder {
            resolution: &self.resolution,
            core_identity: &self.config.core_identity,
            base_type: &self.config.entry_base_type,
            max_depth: self.config.max_type_depth,
        };
        let entry_type = finder.find(name, image.image())?;
        let instance = self.activator.activate(image, entry_type)?;

        let properties = archive.properties();
        Ok(ModuleEntry {
            name: name.to_string(),
            version: node.version(),
            archive: Arc::clone(archive),
            image: LoadedImageRc::clone(image),
            entry_type: entry_type.name.clone(),
            instance,
            logger: info_span!("module", name = %name),
            side: properties.side,
            display_name: properties.display_name.clone(),
            host_version: properties.host_version,
        })
    }

    /// Every image loaded on behalf of `name`, across all generations.
    #[must_use]
    pub fn module_images(&self, name: &str) -> Vec<LoadedImageRc> {
        self.graph
            .get(name)
            .map(|node| node.images().to_vec())
            .unwrap_or_default()
    }

    /// Names of the modules `name` currently depends on.
    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.graph
            .get(name)
            .map(|node| {
                node.dependencies()
                    .iter()
                    .map(|&dep| self.graph.node(dep).name().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The parsed definition of the image loaded under `identity`.
    ///
    /// # Errors
    /// [`Error::Unresolved`] if no definition is known.
    pub fn main_definition(&self, identity: &str) -> Result<Arc<ModuleImage>> {
        self.resolution.resolve(identity)
    }

    /// Module that loaded `image`.
    #[must_use]
    pub fn owner_of(&self, image: ImageId) -> Option<String> {
        self.resolution.owner_of(image)
    }

    /// First module attributed to any image of a call trace, innermost first.
    #[must_use]
    pub fn first_module_in_trace(&self, trace: impl IntoIterator<Item = ImageId>) -> Option<String> {
        self.resolution.first_module_in_trace(trace)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        image::ModuleVersion,
        test::factories::{ArchiveBuilder, ImageBuilder},
    };

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl LoadProgress for Arc<RecordingProgress> {
        fn set_load_stage(&self, stage: &str, total: Option<usize>) {
            lock!(self.events).push(format!("stage {stage} {total:?}"));
        }

        fn set_current_module(&self, index: usize, name: &str) {
            lock!(self.events).push(format!("module {index} {name}"));
        }
    }

    #[test]
    fn first_batch_loads_generation_one() {
        let mut manager = ModuleManager::default();
        let batch = vec![
            ArchiveBuilder::new("ModB").depends_on("ModA").build(),
            ArchiveBuilder::new("ModA").build(),
        ];

        let entries = manager
            .instantiate_modules(&batch, &CancellationToken::new())
            .unwrap();

        // entries follow load order
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "ModA");
        assert_eq!(entries[1].image.identity(), "ModB#1");
        assert_eq!(entries[1].entry_type, "ModB.ModB");
        assert!(entries[1].image.image().references_name("ModA#1"));
        assert_eq!(manager.dependencies_of("ModB"), vec!["ModA".to_string()]);
        assert!(manager.install_resolver().resolve("ModA#1, Version=1.0.0.0").is_some());
    }

    #[test]
    fn unchanged_batch_is_not_reloaded() {
        let mut manager = ModuleManager::default();
        let batch = vec![ArchiveBuilder::new("ModA").build()];
        let token = CancellationToken::new();

        manager.instantiate_modules(&batch, &token).unwrap();
        let entries = manager.instantiate_modules(&batch, &token).unwrap();

        assert_eq!(entries[0].image.identity(), "ModA#1");
        assert_eq!(manager.resolution().loaded_count(), 1);
        assert_eq!(manager.module_images("ModA").len(), 1);
    }

    #[test]
    fn changed_version_reloads_dependents() {
        let mut manager = ModuleManager::default();
        let token = CancellationToken::new();

        manager
            .instantiate_modules(
                &[
                    ArchiveBuilder::new("ModA").build(),
                    ArchiveBuilder::new("ModB").depends_on("ModA").build(),
                ],
                &token,
            )
            .unwrap();

        let entries = manager
            .instantiate_modules(
                &[
                    ArchiveBuilder::new("ModA")
                        .version(ModuleVersion::new(1, 1, 0, 0))
                        .build(),
                    ArchiveBuilder::new("ModB").depends_on("ModA").build(),
                ],
                &token,
            )
            .unwrap();

        assert_eq!(entries[0].image.identity(), "ModA#2");
        assert_eq!(entries[1].image.identity(), "ModB#2");
        assert!(entries[1].image.image().references_name("ModA#2"));
        assert_eq!(manager.module_images("ModB").len(), 2);
    }

    #[test]
    fn changed_content_reloads_without_version_bump() {
        let mut manager = ModuleManager::default();
        let token = CancellationToken::new();

        manager
            .instantiate_modules(&[ArchiveBuilder::new("ModA").build()], &token)
            .unwrap();
        let entries = manager
            .instantiate_modules(
                &[ArchiveBuilder::new("ModA").file("Localization/en-US.hjson", b"v2").build()],
                &token,
            )
            .unwrap();

        assert_eq!(entries[0].image.identity(), "ModA#2");
        assert_eq!(manager.graph().get("ModA").unwrap().generation(), 2);
    }

    #[test]
    fn changed_content_after_partial_load_moves_to_next_generation() {
        let mut manager = ModuleManager::default();
        let token = CancellationToken::new();
        let json = |payload: &[u8]| ImageBuilder::new("Json").payload(payload).build().to_bytes();

        // the library loads, then the missing main binary fails the module
        let error = manager
            .instantiate_modules(
                &[ArchiveBuilder::new("ModA")
                    .library("Json")
                    .file("lib/Json.dll", &json(b"OLD"))
                    .without_main()
                    .build()],
                &token,
            )
            .unwrap_err();
        assert_eq!(error.module(), Some("ModA"));
        assert_eq!(manager.module_images("ModA")[0].identity(), "ModA#Json#1");

        let entries = manager
            .instantiate_modules(
                &[ArchiveBuilder::new("ModA")
                    .version(ModuleVersion::new(1, 1, 0, 0))
                    .library("Json")
                    .file("lib/Json.dll", &json(b"NEW"))
                    .build()],
                &token,
            )
            .unwrap();

        let main = &entries[0].image;
        assert_eq!(main.identity(), "ModA#2");
        assert!(main.image().references_name("ModA#Json#2"));
        assert!(!main.image().references_name("ModA#Json#1"));

        let library = manager
            .module_images("ModA")
            .into_iter()
            .find(|image| image.identity() == "ModA#Json#2")
            .unwrap();
        assert_eq!(library.image().payload, b"NEW");
        assert_eq!(manager.graph().get("ModA").unwrap().generation(), 2);
    }

    #[test]
    fn retry_with_same_content_keeps_generation() {
        let mut manager = ModuleManager::default();
        let token = CancellationToken::new();
        let broken = ArchiveBuilder::new("ModA").library("Json").without_main().build();

        manager.instantiate_modules(&[Arc::clone(&broken)], &token).unwrap_err();
        manager.instantiate_modules(&[broken], &token).unwrap_err();

        let node = manager.graph().get("ModA").unwrap();
        assert_eq!(node.generation(), 1);
        assert_eq!(node.images().len(), 1);
    }

    #[test]
    fn cycle_fails_only_the_closing_module() {
        let mut manager = ModuleManager::default();
        let result = manager.instantiate_modules(
            &[
                ArchiveBuilder::new("Solo").build(),
                ArchiveBuilder::new("ModA").depends_on("ModB").build(),
                ArchiveBuilder::new("ModB").depends_on("ModA").build(),
            ],
            &CancellationToken::new(),
        );

        let error = result.unwrap_err();
        assert!(matches!(error, Error::DependencyCycle { ref module, .. } if module == "ModB"));

        let solo = manager.graph().get("Solo").unwrap();
        assert!(!solo.needs_reload());
        assert_eq!(solo.main_image().unwrap().identity(), "Solo#1");
        assert!(manager.graph().get("ModB").unwrap().needs_reload());
        assert!(manager.graph().get("ModA").unwrap().needs_reload());
        assert_eq!(manager.diagnostics().for_module("ModB").len(), 2);
    }

    #[test]
    fn entry_type_failures_are_aggregated() {
        let mut manager = ModuleManager::default();
        let batch = vec![
            ArchiveBuilder::new("Good").build(),
            ArchiveBuilder::new("Twice")
                .main(
                    ImageBuilder::new("Twice")
                        .entry_type("Twice.First")
                        .entry_type("Twice.Second"),
                )
                .build(),
            ArchiveBuilder::new("None")
                .main(ImageBuilder::new("None").plain_type("None.Helper"))
                .build(),
        ];

        let error = manager
            .instantiate_modules(&batch, &CancellationToken::new())
            .unwrap_err();

        let Error::Instantiation { failures, entries } = &error else {
            panic!("unexpected error {error:?}");
        };
        assert_eq!(error.modules(), vec!["Twice", "None"]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Good");
        assert_eq!(entries[0].image.identity(), "Good#1");
        assert!(matches!(failures[0].1, Error::EntryType { found: 2, .. }));
        assert!(matches!(failures[1].1, Error::EntryType { found: 0, .. }));
        assert!(manager.graph().get("Good").unwrap().main_image().is_some());
        assert_eq!(manager.diagnostics().for_module("Twice").len(), 1);
    }

    #[test]
    fn progress_stages_are_reported() {
        let progress = Arc::new(RecordingProgress::default());
        let mut manager = ModuleManager::default().with_progress(Arc::clone(&progress));

        manager
            .instantiate_modules(
                &[
                    ArchiveBuilder::new("ModB").depends_on("ModA").build(),
                    ArchiveBuilder::new("ModA").build(),
                ],
                &CancellationToken::new(),
            )
            .unwrap();

        let events = lock!(progress.events).clone();
        assert_eq!(
            events,
            vec![
                "stage Sandboxing Some(2)".to_string(),
                "module 0 ModA".to_string(),
                "module 1 ModB".to_string(),
                "stage Instantiating None".to_string(),
            ]
        );
    }

    #[test]
    fn cancelled_before_loading() {
        let mut manager = ModuleManager::default();
        let token = CancellationToken::new();
        token.cancel();

        let result = manager.instantiate_modules(&[ArchiveBuilder::new("ModA").build()], &token);

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(manager.graph().get("ModA").unwrap().needs_reload());
        assert_eq!(manager.resolution().loaded_count(), 0);
    }

    #[test]
    fn load_failure_is_recorded() {
        let mut manager = ModuleManager::default();
        let result = manager.instantiate_modules(
            &[ArchiveBuilder::new("ModA").without_main().build()],
            &CancellationToken::new(),
        );

        let error = result.unwrap_err();
        assert_eq!(error.module(), Some("ModA"));
        assert!(manager.diagnostics().has_errors());
        assert!(manager.graph().get("ModA").unwrap().needs_reload());
    }
}
