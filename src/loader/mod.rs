//! Loading of a single module's images.
//!
//! [`ModuleLoader::ensure_loaded`] brings one node up to date: it reads the module's
//! private libraries and main binary from its archive, rewrites each to the node's
//! current identities, and loads the result through the [`ResolutionService`]. A node is
//! only considered loaded once every image succeeded; a failure leaves it marked for
//! reload so the next batch retries it.
//!
//! # Direct Attach
//!
//! A direct-attach node with a live-edit symbol file available loads its main binary
//! byte for byte, paired with that symbol file, so a debugger can match it to the binary it
//! built. Otherwise the module's own symbols are loaded from the archive, and an external
//! debug header next to the main binary is spliced in during the rewrite.

mod image;

pub use image::{ImageId, LoadedImage, LoadedImageRc};

use tracing::debug;

use crate::{
    archive::{
        debug_header_path, library_path, main_binary_path, read_optional, read_required,
        symbol_path, OpenArchive,
    },
    config::LoaderConfig,
    file::Physical,
    graph::{ModuleGraph, NodeId},
    resolution::ResolutionService,
    rewrite::{DebugSymbolSplicer, IdentityRewriter},
    Error, Result,
};

/// Loads the images of graph nodes.
#[derive(Debug, Clone, Copy)]
pub struct ModuleLoader<'a> {
    resolution: &'a ResolutionService,
    config: &'a LoaderConfig,
}

impl<'a> ModuleLoader<'a> {
    /// Create a loader registering images with `resolution`.
    #[must_use]
    pub fn new(resolution: &'a ResolutionService, config: &'a LoaderConfig) -> Self {
        Self { resolution, config }
    }

    /// Load the images of `id` if it needs a reload.
    ///
    /// # Errors
    /// - [`crate::Error::DependencyCycle`] if a reference of the module closes a cycle;
    ///   nothing is loaded
    /// - Any other failure is returned as [`crate::Error::ReloadFailure`] naming the
    ///   module; the node stays marked for reload. Images loaded before the failure stay
    ///   resident and are reused by a retry of the same generation.
    pub fn ensure_loaded(&self, graph: &mut ModuleGraph, id: NodeId) -> Result<()> {
        let node = graph.node(id);
        if let Some(cycle) = &node.cycle {
            return Err(Error::DependencyCycle {
                module: node.name.clone(),
                cycle: cycle.clone(),
            });
        }
        if !node.needs_reload {
            return Ok(());
        }

        let name = node.name.clone();
        self.load_images(graph, id).map_err(|error| error.in_module(&name))?;

        graph.node_mut(id).needs_reload = false;
        debug!(module = %name, identity = %graph.node(id).identity(), "module loaded");
        Ok(())
    }

    fn load_images(&self, graph: &mut ModuleGraph, id: NodeId) -> Result<()> {
        let node = graph.node(id);
        let Some(archive) = node.archive.clone() else {
            return Err(Error::ArchiveRead {
                archive: node.name.clone(),
                path: String::new(),
                message: "no archive assigned".to_string(),
            });
        };

        let open = OpenArchive::new(archive.as_ref())?;
        let rewriter = IdentityRewriter::new(self.resolution)
            .randomize_mvid(self.config.randomize_mvid);

        for lib in &archive.properties().lib_references {
            let node = graph.node(id);
            let identity = node.library_identity(lib);
            if node.images.iter().any(|image| image.identity() == identity) {
                continue;
            }

            let code = read_required(&*open, &library_path(lib))?;
            let code = rewriter.rewrite(&code, &graph.scheme(id), None)?;
            let loaded = self.resolution.load(&node.name, code, None)?;
            record(graph, id, loaded, false);
        }

        let main_path = main_binary_path(&*open, &self.config.platform_variant)?;
        let code = read_required(&*open, &main_path)?;
        let node = graph.node(id);

        let loaded = match archive.properties().eac_path.as_ref() {
            Some(eac_path) if node.direct_attach && node.has_eac() => {
                let symbols = Physical::new(eac_path)?.data().to_vec();
                self.resolution.load(&node.name, code, Some(symbols))?
            }
            _ => {
                let splicer = read_optional(&*open, &debug_header_path(&main_path))?
                    .map(|header| DebugSymbolSplicer::from_bytes(&header))
                    .transpose()?;
                let symbols = read_optional(&*open, &symbol_path(&main_path))?;

                let code = rewriter.rewrite(&code, &graph.scheme(id), splicer.as_ref())?;
                self.resolution.load(&node.name, code, symbols)?
            }
        };

        record(graph, id, loaded, true);
        Ok(())
    }
}

fn record(graph: &mut ModuleGraph, id: NodeId, loaded: LoadedImageRc, main: bool) {
    let node = graph.node_mut(id);
    node.bytes_loaded += loaded.size();
    node.image_generation = Some(node.generation);
    if main {
        node.main_image = Some(LoadedImageRc::clone(&loaded));
    }
    node.images.push(loaded);
}
