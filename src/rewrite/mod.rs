//! Identity rewriting.
//!
//! A module reloaded within one process gets a new identity on every load (see
//! [`crate::image`] for the naming scheme). Before an image of a module is loaded, its own
//! name and every name in its reference table are rewritten to the identities they have
//! for the module's current generation. Base types refer to other images only through the
//! reference table, so rewriting the table retargets the whole image.
//!
//! # Key Components
//!
//! - [`IdentityRewriter`] - rewrites and re-serializes an image in one pass
//! - [`DebugSymbolSplicer`] - swaps in an externally produced debug header during that pass
//! - [`NameScheme`] - decides what each name maps to; implemented for graph nodes by
//!   [`crate::graph::NodeScheme`]
//!
//! # Resolution
//!
//! References that map to another module's image must point at an image that already
//! exists, otherwise the rewritten image could never be linked. The rewriter resolves each
//! of them through the [`ResolutionService`] and fails with [`crate::Error::Rewrite`] if
//! one cannot be found. Every rewritten image is registered with the service before the
//! rewriter returns, so modules rewritten later can resolve against it.

mod splice;

pub use splice::DebugSymbolSplicer;

use std::sync::Arc;

use tracing::debug;

use crate::{
    image::{ImageFlags, ModuleImage},
    resolution::ResolutionService,
    Error, Result,
};

/// How a referenced name was mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappingKind {
    /// The image's own module
    Own,
    /// A private library of the image's module
    Library,
    /// A referenced module that is not part of the current batch
    Weak,
    /// A module, or a module's library, in the dependency closure
    Dependency,
}

/// Result of mapping a name through a [`NameScheme`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MappedName {
    /// The identity the name maps to
    pub identity: String,
    /// Why it maps there
    pub kind: MappingKind,
}

/// Maps names referenced by an image to the identities they must be rewritten to.
pub trait NameScheme {
    /// Name of the module whose images are rewritten.
    fn owner(&self) -> &str;

    /// Map `name`. `None` leaves the name unchanged.
    fn map_name(&self, name: &str) -> Option<MappedName>;

    /// Whether the owner is loaded under its unmodified identity.
    fn direct_attach(&self) -> bool {
        false
    }
}

/// Rewrites image identities and references.
#[derive(Debug, Clone, Copy)]
pub struct IdentityRewriter<'a> {
    resolution: &'a ResolutionService,
    randomize_mvid: bool,
}

impl<'a> IdentityRewriter<'a> {
    /// Create a rewriter that resolves references through `resolution`.
    #[must_use]
    pub fn new(resolution: &'a ResolutionService) -> Self {
        Self {
            resolution,
            randomize_mvid: true,
        }
    }

    /// Whether rewritten images get a fresh module version id. Enabled by default.
    #[must_use]
    pub fn randomize_mvid(mut self, randomize: bool) -> Self {
        self.randomize_mvid = randomize;
        self
    }

    /// Rewrite the image in `code` according to `scheme`.
    ///
    /// If the owner is direct-attach and nothing has to be spliced, `code` is returned
    /// unmodified. Otherwise the image is parsed, renamed, optionally spliced, and
    /// serialized again.
    ///
    /// # Arguments
    /// * `code` - Serialized image
    /// * `scheme` - Name mapping of the owning module
    /// * `splicer` - External debug header to install, if any
    ///
    /// # Errors
    /// Returns [`crate::Error::Rewrite`] if the image cannot be parsed or a reference to
    /// another module's image cannot be resolved.
    pub fn rewrite(
        &self,
        code: &[u8],
        scheme: &dyn NameScheme,
        splicer: Option<&DebugSymbolSplicer>,
    ) -> Result<Vec<u8>> {
        if scheme.direct_attach() && splicer.is_none() {
            return Ok(code.to_vec());
        }

        let mut image = ModuleImage::parse(code).map_err(|error| Error::Rewrite {
            identity: scheme.owner().to_string(),
            message: error.to_string(),
        })?;

        if let Some(mapped) = scheme.map_name(&image.name) {
            if mapped.kind == MappingKind::Library {
                image.flags |= ImageFlags::LIBRARY;
            }
            image.name = mapped.identity;
        }

        if self.randomize_mvid {
            image.mvid = random_mvid();
        }

        for reference in &mut image.references {
            let Some(mapped) = scheme.map_name(&reference.name) else {
                continue;
            };

            if mapped.kind == MappingKind::Dependency
                && self.resolution.resolve(&mapped.identity).is_err()
            {
                return Err(Error::Rewrite {
                    identity: image.name.clone(),
                    message: format!(
                        "reference '{}' maps to '{}', which cannot be resolved",
                        reference.name, mapped.identity
                    ),
                });
            }

            reference.name = mapped.identity;
        }

        if let Some(splicer) = splicer {
            splicer.splice(&mut image);
        }

        if scheme.direct_attach() {
            image.flags |= ImageFlags::DIRECT_ATTACH;
        }

        debug!(
            module = scheme.owner(),
            identity = %image.name,
            references = image.references.len(),
            spliced = splicer.is_some(),
            "rewrote image"
        );

        let bytes = image.to_bytes();
        self.resolution.register_definition(Arc::new(image));
        Ok(bytes)
    }
}

/// A random RFC 4122 version 4 GUID.
fn random_mvid() -> uguid::Guid {
    let mut bytes: [u8; 16] = rand::random();
    bytes[7] = (bytes[7] & 0x0F) | 0x40;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;
    uguid::Guid::from_bytes(bytes)
}
