//! Process-wide identity resolution.
//!
//! The [`ResolutionService`] owns every registry that outlives a single batch: loaded
//! images by identity, the raw bytes they were loaded from, which module owns each image,
//! and the parsed definitions produced while images are rewritten. It answers two kinds of
//! questions:
//!
//! - *Which definition does this identity refer to?* ([`ResolutionService::resolve`]),
//!   asked by the rewriter and by entry type detection
//! - *Which loaded image does this identity refer to?* ([`HostResolver::resolve`]), asked by
//!   the host's module resolution hook
//!
//! # Resolution Order
//!
//! 1. An image loaded under the exact identity, or a definition already registered for it
//! 2. A bundled resource shipped with the host whose name ends with `{identity}.dll`
//! 3. The raw bytes recorded for the identity when it was loaded
//! 4. [`crate::Error::Unresolved`]
//!
//! Steps 2 and 3 parse an image, which may be slow; they run under a lock so each
//! fallback definition is produced once, and the result is registered as a definition.
//!
//! # Thread Safety
//!
//! All registries are concurrent maps. Resolution can run from any thread at any time,
//! including while another batch is loading.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use crossbeam_skiplist::SkipMap;
use dashmap::{mapref::entry::Entry, DashMap};
use tracing::{debug, info};

use crate::{
    diagnostics::{DiagnosticCategory, Diagnostics},
    image::{base_name, ModuleImage},
    loader::{ImageId, LoadedImage, LoadedImageRc},
    Error, Result,
};

/// Map from loaded image to the name of the module that owns it.
pub type OwnerMap = SkipMap<ImageId, String>;

/// An image shipped with the host, used when an identity cannot be resolved otherwise.
#[derive(Debug, Clone)]
pub struct BundledResource {
    /// Resource name, e.g. `Host.Libraries.Json.dll`
    pub name: String,
    /// Serialized image
    pub data: Arc<[u8]>,
}

/// Registries and fallback resolution shared by every batch of a manager.
#[derive(Debug)]
pub struct ResolutionService {
    definitions: DashMap<String, Arc<ModuleImage>>,
    loaded: DashMap<String, LoadedImageRc>,
    binaries: DashMap<String, Arc<[u8]>>,
    owners: OwnerMap,
    bundled: boxcar::Vec<BundledResource>,
    fallback: Mutex<()>,
    next_image: AtomicU64,
    diagnostics: Arc<Diagnostics>,
}

impl Default for ResolutionService {
    fn default() -> Self {
        Self::new(Arc::new(Diagnostics::new()))
    }
}

impl ResolutionService {
    /// Create an empty service reporting fallback resolutions to `diagnostics`.
    #[must_use]
    pub fn new(diagnostics: Arc<Diagnostics>) -> Self {
        ResolutionService {
            definitions: DashMap::new(),
            loaded: DashMap::new(),
            binaries: DashMap::new(),
            owners: SkipMap::new(),
            bundled: boxcar::Vec::new(),
            fallback: Mutex::new(()),
            next_image: AtomicU64::new(1),
            diagnostics,
        }
    }

    /// Make a host-bundled image available to fallback resolution.
    pub fn add_bundled(&self, name: impl Into<String>, data: impl Into<Arc<[u8]>>) {
        self.bundled.push(BundledResource {
            name: name.into(),
            data: data.into(),
        });
    }

    /// Register a parsed definition under its own name. Replaces an earlier definition of
    /// the same identity.
    pub fn register_definition(&self, image: Arc<ModuleImage>) {
        self.definitions.insert(image.name.clone(), image);
    }

    /// Record the raw bytes an identity is loaded from.
    pub fn register_binary(&self, identity: impl Into<String>, code: Arc<[u8]>) {
        self.binaries.insert(identity.into(), code);
    }

    /// Load an image on behalf of `owner` and register it.
    ///
    /// The image's identity is the name in its header. Its bytes are recorded before the
    /// image is registered as loaded.
    ///
    /// # Errors
    /// - [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] if `code` is not a
    ///   valid image
    /// - [`crate::Error::IdentityCollision`] if an image is already loaded under the identity
    pub fn load(
        &self,
        owner: &str,
        code: Vec<u8>,
        symbols: Option<Vec<u8>>,
    ) -> Result<LoadedImageRc> {
        let image = Arc::new(ModuleImage::parse(&code)?);
        let identity = image.name.clone();

        if self.loaded.contains_key(&identity) {
            return Err(Error::IdentityCollision { identity });
        }

        let code: Arc<[u8]> = code.into();
        self.register_binary(identity.clone(), Arc::clone(&code));

        let id = ImageId(self.next_image.fetch_add(1, Ordering::Relaxed));
        let loaded = Arc::new(LoadedImage {
            id,
            owner: owner.to_string(),
            image,
            code,
            symbols: symbols.map(Into::into),
        });

        match self.loaded.entry(identity.clone()) {
            Entry::Occupied(_) => return Err(Error::IdentityCollision { identity }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&loaded));
            }
        }
        self.owners.insert(id, owner.to_string());

        info!(
            module = owner,
            identity = %identity,
            bytes = loaded.size(),
            "loaded image"
        );
        Ok(loaded)
    }

    /// Resolve `identity` to a definition, see the module documentation for the order.
    ///
    /// # Errors
    /// Returns [`crate::Error::Unresolved`] carrying `identity` if no step succeeds, and
    /// [`crate::Error::LockError`] if the fallback lock is poisoned.
    pub fn resolve(&self, identity: &str) -> Result<Arc<ModuleImage>> {
        if let Some(loaded) = self.loaded.get(identity) {
            return Ok(Arc::clone(&loaded.image));
        }

        if let Some(definition) = self.definitions.get(identity) {
            return Ok(Arc::clone(definition.value()));
        }

        let _guard = try_lock!(self.fallback)?;

        // another thread may have produced it while we waited
        if let Some(definition) = self.definitions.get(identity) {
            return Ok(Arc::clone(definition.value()));
        }

        let resource_name = format!("{identity}.dll");
        let source = if let Some(resource) = self
            .bundled
            .iter()
            .map(|(_, resource)| resource)
            .find(|resource| resource.name.ends_with(&resource_name))
        {
            Some(("bundled resource", Arc::clone(&resource.data)))
        } else {
            self.binaries
                .get(identity)
                .map(|code| ("raw bytes", Arc::clone(code.value())))
        };

        let Some((origin, data)) = source else {
            return Err(Error::Unresolved {
                identity: identity.to_string(),
            });
        };

        debug!(identity, origin, "generating definition");
        let image = ModuleImage::parse(&data).map_err(|_| Error::Unresolved {
            identity: identity.to_string(),
        })?;

        self.diagnostics.info(
            DiagnosticCategory::Resolution,
            base_name(identity),
            format!("Resolved '{identity}' from {origin}"),
        );

        let image = Arc::new(image);
        self.definitions
            .insert(identity.to_string(), Arc::clone(&image));
        Ok(image)
    }

    /// The image loaded under exactly `identity`.
    #[must_use]
    pub fn loaded_image(&self, identity: &str) -> Option<LoadedImageRc> {
        self.loaded.get(identity).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns `true` if an image is loaded under exactly `identity`.
    #[must_use]
    pub fn is_loaded(&self, identity: &str) -> bool {
        self.loaded.contains_key(identity)
    }

    /// Number of images loaded through this service.
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    /// Name of the module that loaded `image`.
    #[must_use]
    pub fn owner_of(&self, image: ImageId) -> Option<String> {
        self.owners.get(&image).map(|entry| entry.value().clone())
    }

    /// The owner of the first image in `frames` that belongs to a module.
    ///
    /// `frames` lists the image of each frame of a call stack, innermost first; frames of
    /// images that do not belong to a module are skipped.
    #[must_use]
    pub fn first_module_in_trace(
        &self,
        frames: impl IntoIterator<Item = ImageId>,
    ) -> Option<String> {
        frames.into_iter().find_map(|frame| self.owner_of(frame))
    }
}

/// What the host's module resolution hook should return for a requested identity.
#[derive(Debug, Clone)]
pub enum Resolved {
    /// The host's own core image
    Host,
    /// A loaded module image
    Module(LoadedImageRc),
}

/// The host's module resolution hook.
///
/// Requests may carry a display name with trailing attributes
/// (`ModA#2, Version=1.0.0.0`); only the identity before the first comma is used.
#[derive(Debug, Clone)]
pub struct HostResolver {
    core_identity: String,
    resolution: Arc<ResolutionService>,
}

impl HostResolver {
    /// Create a hook answering for `core_identity` itself and delegating everything else.
    #[must_use]
    pub fn new(core_identity: impl Into<String>, resolution: Arc<ResolutionService>) -> Self {
        Self {
            core_identity: core_identity.into(),
            resolution,
        }
    }

    /// Resolve a requested identity. `None` lets the host continue with its own lookup.
    #[must_use]
    pub fn resolve(&self, requested: &str) -> Option<Resolved> {
        let identity = requested.split(',').next().unwrap_or(requested).trim();

        if identity == self.core_identity {
            return Some(Resolved::Host);
        }

        self.resolution.loaded_image(identity).map(Resolved::Module)
    }
}
