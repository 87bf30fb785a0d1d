//! Entry objects and their activation.

use std::{any::Any, fmt, sync::Arc};

use crate::{
    archive::{ExecutionSide, ModuleArchive},
    image::{ModuleImage, ModuleVersion, TypeDef, TypeScope},
    loader::{LoadedImage, LoadedImageRc},
    resolution::ResolutionService,
    Error, Result,
};

/// Constructs the host object for a module's entry type.
///
/// Implemented by the host; the loader only decides which type to construct.
pub trait EntryActivator: Send + Sync {
    /// Construct an instance of `entry_type`, defined in `image`.
    ///
    /// # Errors
    /// Any error is attributed to the module and aggregated with the failures of the other
    /// modules of the batch.
    fn activate(&self, image: &LoadedImage, entry_type: &TypeDef)
        -> Result<Box<dyn Any + Send + Sync>>;
}

/// An [`EntryActivator`] that constructs `()` for every module.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullActivator;

impl EntryActivator for NullActivator {
    fn activate(
        &self,
        _image: &LoadedImage,
        _entry_type: &TypeDef,
    ) -> Result<Box<dyn Any + Send + Sync>> {
        Ok(Box::new(()))
    }
}

/// The instantiated entry object of a module, with the metadata the host needs.
pub struct ModuleEntry {
    /// Module name
    pub name: String,
    /// Module version
    pub version: ModuleVersion,
    /// Archive the module was loaded from
    pub archive: Arc<dyn ModuleArchive>,
    /// The loaded main image
    pub image: LoadedImageRc,
    /// Fully qualified name of the entry type
    pub entry_type: String,
    /// Object constructed by the [`EntryActivator`]
    pub instance: Box<dyn Any + Send + Sync>,
    /// Span all logging on behalf of the module should be recorded under
    pub logger: tracing::Span,
    /// Execution side
    pub side: ExecutionSide,
    /// Name shown to users
    pub display_name: String,
    /// Host version the module was built against
    pub host_version: ModuleVersion,
}

impl fmt::Debug for ModuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleEntry")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("identity", &self.image.identity())
            .field("entry_type", &self.entry_type)
            .field("side", &self.side)
            .field("display_name", &self.display_name)
            .field("host_version", &self.host_version)
            .finish_non_exhaustive()
    }
}

/// Finds types deriving from the host's entry base type.
pub(crate) struct EntryTypeFinder<'a> {
    pub(crate) resolution: &'a ResolutionService,
    pub(crate) core_identity: &'a str,
    pub(crate) base_type: &'a str,
    pub(crate) max_depth: usize,
}

impl EntryTypeFinder<'_> {
    /// The single entry type of `module`'s main image.
    pub(crate) fn find<'i>(&self, module: &str, image: &'i Arc<ModuleImage>) -> Result<&'i TypeDef> {
        let mut found = Vec::new();
        for typedef in &image.types {
            if self.derives_from_entry_base(image, typedef)? {
                found.push(typedef);
            }
        }

        match found.as_slice() {
            [single] => Ok(*single),
            _ => Err(Error::EntryType {
                module: module.to_string(),
                base: format!("{}::{}", self.core_identity, self.base_type),
                found: found.len(),
            }),
        }
    }

    /// Walk the base type chain of `typedef` across images.
    fn derives_from_entry_base(&self, image: &Arc<ModuleImage>, typedef: &TypeDef) -> Result<bool> {
        let mut scope_image = Arc::clone(image);
        let mut base = typedef.extends.clone();

        for _ in 0..self.max_depth {
            let Some(current) = base else {
                return Ok(false);
            };

            if let TypeScope::Reference(_) = current.scope {
                let Some(scope_name) = scope_image.scope_name(current.scope) else {
                    return Ok(false);
                };

                if scope_name == self.core_identity {
                    return Ok(current.name == self.base_type);
                }

                scope_image = self.resolution.resolve(scope_name)?;
            }

            base = match scope_image.find_type(&current.name) {
                Some(definition) => definition.extends.clone(),
                None => return Ok(false),
            };
        }

        Err(Error::RecursionLimit(self.max_depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::factories::ImageBuilder;

    fn finder(resolution: &ResolutionService) -> EntryTypeFinder<'_> {
        EntryTypeFinder {
            resolution,
            core_identity: "Host",
            base_type: "Mod",
            max_depth: 8,
        }
    }

    #[test]
    fn direct_entry_type() {
        let resolution = ResolutionService::default();
        let image = Arc::new(ImageBuilder::new("ModA").entry_type("ModA.ModA").build());

        let found = finder(&resolution).find("ModA", &image).unwrap();
        assert_eq!(found.name, "ModA.ModA");
    }

    #[test]
    fn transitive_entry_types() {
        let resolution = ResolutionService::default();

        // ModA#1 defines an abstract base deriving from Host::Mod
        let library = ImageBuilder::new("ModA#1").entry_type("ModA.BaseMod").build();
        resolution.register_definition(Arc::new(library));

        let mut image = ImageBuilder::new("ModB#1").build();
        let lib = image.add_reference("ModA#1", ModuleVersion::default());
        image.add_type("ModB.Intermediate", Some((TypeScope::Reference(lib), "ModA.BaseMod")));
        image.add_type("ModB.ModB", Some((TypeScope::Local, "ModB.Intermediate")));
        image.add_type("ModB.Helper", None);
        let image = Arc::new(image);

        // both the intermediate and the leaf qualify
        let error = finder(&resolution).find("ModB", &image).unwrap_err();
        assert!(matches!(error, Error::EntryType { found: 2, .. }));
    }

    #[test]
    fn missing_and_duplicate_entry_types() {
        let resolution = ResolutionService::default();

        let none = Arc::new(ImageBuilder::new("ModA").build());
        assert!(matches!(
            finder(&resolution).find("ModA", &none),
            Err(Error::EntryType { found: 0, ref module, .. }) if module == "ModA"
        ));

        let two = Arc::new(
            ImageBuilder::new("ModB")
                .entry_type("ModB.First")
                .entry_type("ModB.Second")
                .build(),
        );
        assert!(matches!(
            finder(&resolution).find("ModB", &two),
            Err(Error::EntryType { found: 2, .. })
        ));
    }

    #[test]
    fn unresolved_base_scope() {
        let resolution = ResolutionService::default();
        let mut image = ImageBuilder::new("ModB").build();
        let missing = image.add_reference("Gone#3", ModuleVersion::default());
        image.add_type("ModB.ModB", Some((TypeScope::Reference(missing), "Gone.Base")));

        assert!(matches!(
            finder(&resolution).find("ModB", &Arc::new(image)),
            Err(Error::Unresolved { .. })
        ));
    }

    #[test]
    fn local_cycles_hit_the_depth_limit() {
        let resolution = ResolutionService::default();
        let mut image = ImageBuilder::new("ModA").build();
        image.add_type("A", Some((TypeScope::Local, "B")));
        image.add_type("B", Some((TypeScope::Local, "A")));

        assert!(matches!(
            finder(&resolution).find("ModA", &Arc::new(image)),
            Err(Error::RecursionLimit(8))
        ));
    }
}
