use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{
    archive::{BuildProperties, ContentHash, ModuleArchive},
    image::ModuleVersion,
    Error, Result,
};

/// An archive held entirely in memory.
///
/// The content hash covers every file and is recomputed whenever a file is added.
///
/// # Examples
///
/// ```rust
/// use modscope::archive::{MemoryArchive, ModuleArchive, ModuleReference, OpenArchive};
/// use modscope::image::ModuleVersion;
///
/// let archive = MemoryArchive::new("ModB", ModuleVersion::new(1, 0, 0, 0))
///     .with_reference(ModuleReference::hard("ModA"))
///     .with_file("ModB.All.dll", vec![0x4D, 0x4F, 0x44, 0x49]);
///
/// let open = OpenArchive::new(&archive)?;
/// assert_eq!(open.get_bytes("ModB.All.dll")?.len(), 4);
/// # Ok::<(), modscope::Error>(())
/// ```
#[derive(Debug)]
pub struct MemoryArchive {
    name: String,
    version: ModuleVersion,
    properties: BuildProperties,
    files: BTreeMap<String, Vec<u8>>,
    hash: ContentHash,
    open_depth: AtomicUsize,
}

impl MemoryArchive {
    /// Create an empty archive.
    #[must_use]
    pub fn new(name: impl Into<String>, version: ModuleVersion) -> Self {
        let name = name.into();
        let mut archive = MemoryArchive {
            properties: BuildProperties {
                display_name: name.clone(),
                ..BuildProperties::default()
            },
            name,
            version,
            files: BTreeMap::new(),
            hash: ContentHash::default(),
            open_depth: AtomicUsize::new(0),
        };
        archive.rehash();
        archive
    }

    /// Add or replace a file.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, data: Vec<u8>) -> Self {
        self.files.insert(path.into(), data);
        self.rehash();
        self
    }

    /// Replace the build properties.
    #[must_use]
    pub fn with_properties(mut self, properties: BuildProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Declare a reference to another module.
    #[must_use]
    pub fn with_reference(mut self, reference: super::ModuleReference) -> Self {
        self.properties.module_references.push(reference);
        self
    }

    /// Declare a private library. The library binary itself is added with
    /// [`MemoryArchive::with_file`].
    #[must_use]
    pub fn with_library(mut self, lib: impl Into<String>) -> Self {
        self.properties.lib_references.push(lib.into());
        self
    }

    /// Returns `true` while at least one [`ModuleArchive::open`] is outstanding.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open_depth.load(Ordering::Acquire) > 0
    }

    fn rehash(&mut self) {
        self.hash = ContentHash::of_entries(
            self.files
                .iter()
                .map(|(path, data)| (path.as_str(), data.as_slice())),
        );
    }
}

impl ModuleArchive for MemoryArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> ModuleVersion {
        self.version
    }

    fn hash(&self) -> ContentHash {
        self.hash
    }

    fn properties(&self) -> &BuildProperties {
        &self.properties
    }

    fn open(&self) -> Result<()> {
        self.open_depth.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn close(&self) {
        let _ = self
            .open_depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| {
                depth.checked_sub(1)
            });
    }

    fn has_file(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn get_bytes(&self, path: &str) -> Result<Vec<u8>> {
        if !self.is_open() {
            return Err(Error::ArchiveRead {
                archive: self.name.clone(),
                path: path.to_string(),
                message: "archive is not open".to_string(),
            });
        }

        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::ArchiveRead {
                archive: self.name.clone(),
                path: path.to_string(),
                message: "file not found".to_string(),
            })
    }
}
