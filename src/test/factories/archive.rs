use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    archive::{MemoryArchive, ModuleArchive, ModuleReference},
    image::ModuleVersion,
    test::factories::ImageBuilder,
};

/// Fluent construction of a [`MemoryArchive`] holding a loadable module.
///
/// Unless replaced with [`ArchiveBuilder::main`], the main binary `{name}.All.dll`
/// references every declared module and library and defines `{name}.{name}` as its
/// entry type.
pub(crate) struct ArchiveBuilder {
    name: String,
    version: ModuleVersion,
    references: Vec<ModuleReference>,
    libraries: Vec<String>,
    main: Option<ImageBuilder>,
    include_main: bool,
    symbols: Option<Vec<u8>>,
    debug_header: Option<Vec<u8>>,
    eac_path: Option<PathBuf>,
    extra: Vec<(String, Vec<u8>)>,
}

impl ArchiveBuilder {
    pub(crate) fn new(name: &str) -> Self {
        ArchiveBuilder {
            name: name.to_string(),
            version: ModuleVersion::new(1, 0, 0, 0),
            references: Vec::new(),
            libraries: Vec::new(),
            main: None,
            include_main: true,
            symbols: None,
            debug_header: None,
            eac_path: None,
            extra: Vec::new(),
        }
    }

    pub(crate) fn version(mut self, version: ModuleVersion) -> Self {
        self.version = version;
        self
    }

    pub(crate) fn depends_on(mut self, name: &str) -> Self {
        self.references.push(ModuleReference::hard(name));
        self
    }

    pub(crate) fn weak(mut self, name: &str) -> Self {
        self.references.push(ModuleReference::weak(name));
        self
    }

    pub(crate) fn library(mut self, lib: &str) -> Self {
        self.libraries.push(lib.to_string());
        self
    }

    pub(crate) fn main(mut self, image: ImageBuilder) -> Self {
        self.main = Some(image);
        self
    }

    pub(crate) fn without_main(mut self) -> Self {
        self.include_main = false;
        self
    }

    pub(crate) fn symbols(mut self, symbols: Vec<u8>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    pub(crate) fn debug_header_file(mut self, header: Vec<u8>) -> Self {
        self.debug_header = Some(header);
        self
    }

    pub(crate) fn eac_path(mut self, path: &Path) -> Self {
        self.eac_path = Some(path.to_path_buf());
        self
    }

    /// Add an unrelated file, changing the content hash.
    pub(crate) fn file(mut self, path: &str, data: &[u8]) -> Self {
        self.extra.push((path.to_string(), data.to_vec()));
        self
    }

    pub(crate) fn build(self) -> Arc<dyn ModuleArchive> {
        let main_path = format!("{}.All.dll", self.name);
        let mut archive = MemoryArchive::new(&self.name, self.version);

        for reference in &self.references {
            archive = archive.with_reference(reference.clone());
        }

        for lib in &self.libraries {
            archive = archive
                .with_library(lib)
                .with_file(
                    crate::archive::library_path(lib),
                    ImageBuilder::new(lib).build().to_bytes(),
                );
        }

        if self.include_main {
            let main = self.main.unwrap_or_else(|| {
                let mut builder = ImageBuilder::new(&self.name);
                for reference in &self.references {
                    builder = builder.reference(&reference.name);
                }
                for lib in &self.libraries {
                    builder = builder.reference(lib);
                }
                builder.entry_type(&format!("{0}.{0}", self.name))
            });
            archive = archive.with_file(&main_path, main.build().to_bytes());
        }

        if let Some(symbols) = self.symbols {
            archive = archive.with_file(crate::archive::symbol_path(&main_path), symbols);
        }
        if let Some(header) = self.debug_header {
            archive = archive.with_file(crate::archive::debug_header_path(&main_path), header);
        }
        for (path, data) in self.extra {
            archive = archive.with_file(path, data);
        }

        if let Some(eac_path) = self.eac_path {
            let mut properties = archive.properties().clone();
            properties.eac_path = Some(eac_path);
            archive = archive.with_properties(properties);
        }

        Arc::new(archive)
    }
}
