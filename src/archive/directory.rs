use std::{
    fs,
    path::{Component, Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{
    archive::{BuildProperties, ContentHash, ModuleArchive},
    file::Physical,
    image::ModuleVersion,
    Error, Result,
};

/// An unpacked module archive in a directory.
///
/// Archive paths use `/` as separator and are resolved relative to the root directory.
/// Files are memory-mapped on access. The content hash is computed once, when the
/// archive is created, over every file below the root.
#[derive(Debug)]
pub struct DirectoryArchive {
    root: PathBuf,
    name: String,
    version: ModuleVersion,
    properties: BuildProperties,
    hash: ContentHash,
    open_depth: AtomicUsize,
}

impl DirectoryArchive {
    /// Create an archive over `root`.
    ///
    /// # Arguments
    /// * `root` - Directory holding the archive files
    /// * `name` - Module name
    /// * `version` - Declared module version
    /// * `properties` - Declared build properties
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the directory cannot be walked or a file in
    /// it cannot be read.
    pub fn new(
        root: impl Into<PathBuf>,
        name: impl Into<String>,
        version: ModuleVersion,
        properties: BuildProperties,
    ) -> Result<Self> {
        let root = root.into();

        let mut files = Vec::new();
        collect_files(&root, &root, &mut files)?;
        files.sort();

        let mut contents = Vec::with_capacity(files.len());
        for relative in &files {
            contents.push(Physical::new(root.join(relative))?);
        }

        let hash = ContentHash::of_entries(
            files
                .iter()
                .zip(&contents)
                .map(|(path, physical)| (path.as_str(), physical.data())),
        );

        Ok(DirectoryArchive {
            root,
            name: name.into(),
            version,
            properties,
            hash,
            open_depth: AtomicUsize::new(0),
        })
    }

    /// Root directory of the archive.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }

        Some(self.root.join(relative))
    }

    fn read_error(&self, path: &str, message: impl Into<String>) -> Error {
        Error::ArchiveRead {
            archive: self.name.clone(),
            path: path.to_string(),
            message: message.into(),
        }
    }
}

fn collect_files(root: &Path, dir: &Path, files: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, files)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push(relative);
        }
    }

    Ok(())
}

impl ModuleArchive for DirectoryArchive {
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
        if !self.root.is_dir() {
            return Err(self.read_error("", format!("'{}' is not a directory", self.root.display())));
        }

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
        self.resolve(path).is_some_and(|full| full.is_file())
    }

    fn get_bytes(&self, path: &str) -> Result<Vec<u8>> {
        if self.open_depth.load(Ordering::Acquire) == 0 {
            return Err(self.read_error(path, "archive is not open"));
        }

        let Some(full) = self.resolve(path) else {
            return Err(self.read_error(path, "path escapes the archive root"));
        };

        let physical = Physical::new(&full).map_err(|e| self.read_error(path, e.to_string()))?;
        Ok(physical.data().to_vec())
    }
}
