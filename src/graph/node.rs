//! Per-module tracking record.

use std::{collections::BTreeSet, fmt, sync::Arc};

use crate::{
    archive::{ContentHash, ModuleArchive},
    image::{generational_name, library_name, placeholder_name, ModuleVersion},
    loader::LoadedImage,
};

/// Index of a [`ModuleNode`] within its [`crate::graph::ModuleGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in the graph's arena.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Tracking record for one module across its whole load history.
///
/// A node is created the first time a module is requested and lives as long as the
/// graph that owns it. Images loaded for a node are never released, so neither is the
/// node.
///
/// Edges are stored as [`NodeId`]s. `dependents` is the inverse index of `dependencies`
/// and is maintained exclusively by [`crate::graph::ModuleGraph::add_dependency`] and
/// [`crate::graph::ModuleGraph::clear_edges`].
pub struct ModuleNode {
    pub(crate) name: String,
    pub(crate) archive: Option<Arc<dyn ModuleArchive>>,
    pub(crate) version: ModuleVersion,
    pub(crate) hash: ContentHash,

    pub(crate) generation: u32,
    pub(crate) direct_attach: bool,
    pub(crate) needs_reload: bool,

    pub(crate) dependencies: Vec<NodeId>,
    pub(crate) dependents: Vec<NodeId>,
    pub(crate) weak_dependencies: BTreeSet<String>,
    pub(crate) cycle: Option<Vec<String>>,

    pub(crate) images: Vec<Arc<LoadedImage>>,
    pub(crate) main_image: Option<Arc<LoadedImage>>,
    pub(crate) bytes_loaded: u64,
    /// Generation the most recent image was loaded for
    pub(crate) image_generation: Option<u32>,
}

impl ModuleNode {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        ModuleNode {
            name: name.into(),
            archive: None,
            version: ModuleVersion::default(),
            hash: ContentHash::default(),
            generation: 0,
            direct_attach: false,
            needs_reload: false,
            dependencies: Vec::new(),
            dependents: Vec::new(),
            weak_dependencies: BTreeSet::new(),
            cycle: None,
            images: Vec::new(),
            main_image: None,
            bytes_loaded: 0,
            image_generation: None,
        }
    }

    /// Module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Archive the node's content was last taken from.
    #[must_use]
    pub fn archive(&self) -> Option<&Arc<dyn ModuleArchive>> {
        self.archive.as_ref()
    }

    /// Version of the current content.
    #[must_use]
    pub fn version(&self) -> ModuleVersion {
        self.version
    }

    /// Hash of the current content.
    #[must_use]
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    /// Number of identity changes so far.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Whether the module is loaded under its unmodified identity.
    #[must_use]
    pub fn direct_attach(&self) -> bool {
        self.direct_attach
    }

    /// Whether the module's images must be (re)loaded before use.
    #[must_use]
    pub fn needs_reload(&self) -> bool {
        self.needs_reload
    }

    /// Hard dependencies present in the current batch.
    #[must_use]
    pub fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }

    /// Nodes that hold a hard dependency on this node.
    #[must_use]
    pub fn dependents(&self) -> &[NodeId] {
        &self.dependents
    }

    /// Referenced module names that are not part of the current batch.
    #[must_use]
    pub fn weak_dependencies(&self) -> &BTreeSet<String> {
        &self.weak_dependencies
    }

    /// The dependency cycle closed by one of this module's references, starting and
    /// ending with this module.
    #[must_use]
    pub fn cycle(&self) -> Option<&[String]> {
        self.cycle.as_deref()
    }

    /// Every image loaded for this module, in load order.
    #[must_use]
    pub fn images(&self) -> &[Arc<LoadedImage>] {
        &self.images
    }

    /// The most recently loaded main image.
    #[must_use]
    pub fn main_image(&self) -> Option<&Arc<LoadedImage>> {
        self.main_image.as_ref()
    }

    /// Bytes of images and symbols loaded for this module so far.
    #[must_use]
    pub fn bytes_loaded(&self) -> u64 {
        self.bytes_loaded
    }

    /// Identity the module's main image is loaded under.
    #[must_use]
    pub fn identity(&self) -> String {
        if self.direct_attach {
            self.name.clone()
        } else {
            generational_name(&self.name, self.generation)
        }
    }

    /// Identity a private library of this module is loaded under.
    #[must_use]
    pub fn library_identity(&self, lib: &str) -> String {
        if self.direct_attach {
            lib.to_string()
        } else {
            library_name(&self.name, lib, self.generation)
        }
    }

    /// Identity references to the absent module `dependency` are pinned to.
    #[must_use]
    pub fn weak_identity(&self, dependency: &str) -> String {
        if self.direct_attach {
            dependency.to_string()
        } else {
            placeholder_name(dependency)
        }
    }

    /// Returns `true` if `lib` is declared as a private library.
    #[must_use]
    pub fn declares_library(&self, lib: &str) -> bool {
        self.archive.as_ref().is_some_and(|archive| {
            archive
                .properties()
                .lib_references
                .iter()
                .any(|declared| declared == lib)
        })
    }

    /// Returns `true` if a live-edit symbol file is available.
    #[must_use]
    pub fn has_eac(&self) -> bool {
        self.archive
            .as_ref()
            .is_some_and(|archive| archive.properties().has_eac())
    }

    pub(crate) fn set_needs_reload(&mut self) {
        if !self.needs_reload {
            self.generation += 1;
        }
        self.needs_reload = true;
    }
}

impl fmt::Debug for ModuleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleNode")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("hash", &self.hash)
            .field("generation", &self.generation)
            .field("direct_attach", &self.direct_attach)
            .field("needs_reload", &self.needs_reload)
            .field("dependencies", &self.dependencies)
            .field("dependents", &self.dependents)
            .field("weak_dependencies", &self.weak_dependencies)
            .field("cycle", &self.cycle)
            .field("images", &self.images.len())
            .field("bytes_loaded", &self.bytes_loaded)
            .finish_non_exhaustive()
    }
}
