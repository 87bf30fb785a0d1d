//! Module archives.
//!
//! A module reaches the loader as an archive: a named, versioned collection of files
//! holding the module's compiled main binary, the private libraries it carries, symbol
//! files, and the build properties that declare its references. The loader only needs
//! scoped read access to those files, expressed by the [`ModuleArchive`] trait.
//!
//! Two implementations are provided:
//! - [`MemoryArchive`] - an in-memory file table, used by hosts that unpack archives
//!   themselves and throughout the tests
//! - [`DirectoryArchive`] - an unpacked archive in a directory on disk, read through
//!   memory-mapped files
//!
//! # File Layout
//!
//! | Entry                      | Path                                               |
//! |----------------------------|----------------------------------------------------|
//! | Main binary                | `{name}.All.dll`, `{name}.{variant}.dll`, `All.dll` |
//! | Private library `lib`      | `lib/{lib}.dll`                                    |
//! | Symbols of an image        | the image path with a `.pdb` extension             |
//! | External debug header      | the main binary path followed by `.debugheader`    |
//!
//! The main binary is looked up in the listed order; see [`main_binary_path`].

mod directory;
mod memory;

pub use directory::DirectoryArchive;
pub use memory::MemoryArchive;

use std::{fmt, ops::Deref, path::PathBuf};

use sha1::{Digest, Sha1};
use strum::{Display, EnumString};

use crate::{image::ModuleVersion, Error, Result};

/// Directory private libraries are stored in.
pub const LIBRARY_DIRECTORY: &str = "lib";

/// Suffix of an externally produced debug header next to the main binary.
pub const DEBUG_HEADER_SUFFIX: &str = ".debugheader";

/// Which side of a networked host a module runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum ExecutionSide {
    /// Loaded on clients and servers, content synchronized
    #[default]
    Both,
    /// Client only
    Client,
    /// Server only
    Server,
    /// Loaded on both sides without synchronization
    NoSync,
}

/// A reference to another module declared in the build properties.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleReference {
    /// Name of the referenced module
    pub name: String,
    /// Weak references are optional; the module loads without the referenced module present
    pub weak: bool,
}

impl ModuleReference {
    /// A reference that must be satisfied.
    #[must_use]
    pub fn hard(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weak: false,
        }
    }

    /// An optional reference.
    #[must_use]
    pub fn weak(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weak: true,
        }
    }
}

/// Properties declared by a module at build time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildProperties {
    /// Execution side
    pub side: ExecutionSide,
    /// Name shown to users
    pub display_name: String,
    /// Host version the module was built against
    pub host_version: ModuleVersion,
    /// Private libraries stored under [`LIBRARY_DIRECTORY`]
    pub lib_references: Vec<String>,
    /// References to other modules
    pub module_references: Vec<ModuleReference>,
    /// Symbol file for live-edit attach, written by the module's local build
    pub eac_path: Option<PathBuf>,
}

impl BuildProperties {
    /// Names of every referenced module, optionally including weak references.
    pub fn reference_names(&self, include_weak: bool) -> impl Iterator<Item = &str> {
        self.module_references
            .iter()
            .filter(move |reference| include_weak || !reference.weak)
            .map(|reference| reference.name.as_str())
    }

    /// Returns `true` if the live-edit symbol file exists.
    #[must_use]
    pub fn has_eac(&self) -> bool {
        self.eac_path.as_ref().is_some_and(|path| path.is_file())
    }
}

/// SHA-1 digest over an archive's contents.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContentHash(pub [u8; 20]);

impl ContentHash {
    /// Hash a sequence of `(path, contents)` entries.
    ///
    /// Entries must be supplied in a stable order for the digest to be reproducible.
    pub fn of_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Self {
        let mut hasher = Sha1::new();
        for (path, data) in entries {
            hasher.update((path.len() as u64).to_le_bytes());
            hasher.update(path.as_bytes());
            hasher.update((data.len() as u64).to_le_bytes());
            hasher.update(data);
        }

        let mut digest = [0u8; 20];
        digest.copy_from_slice(&hasher.finalize());
        ContentHash(digest)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({self})")
    }
}

/// Read access to a module's packaged files.
///
/// File access is only valid between [`ModuleArchive::open`] and
/// [`ModuleArchive::close`]; use [`OpenArchive`] to scope it.
pub trait ModuleArchive: Send + Sync + fmt::Debug {
    /// Module name; unique within a host.
    fn name(&self) -> &str;

    /// Declared module version.
    fn version(&self) -> ModuleVersion;

    /// Digest of the archive contents.
    fn hash(&self) -> ContentHash;

    /// Declared build properties.
    fn properties(&self) -> &BuildProperties;

    /// Make files readable. Calls nest; each must be paired with [`ModuleArchive::close`].
    ///
    /// # Errors
    /// Returns [`crate::Error::ArchiveRead`] if the backing storage is unavailable.
    fn open(&self) -> Result<()>;

    /// Release one level of [`ModuleArchive::open`].
    fn close(&self);

    /// Returns `true` if `path` exists in the archive.
    fn has_file(&self, path: &str) -> bool;

    /// Read the file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ArchiveRead`] if the archive is not open or the file is
    /// missing or unreadable.
    fn get_bytes(&self, path: &str) -> Result<Vec<u8>>;
}

/// Scope guard that keeps an archive open for its lifetime.
pub struct OpenArchive<'a> {
    archive: &'a dyn ModuleArchive,
}

impl<'a> OpenArchive<'a> {
    /// Open `archive` until the guard is dropped.
    ///
    /// # Errors
    /// Propagates the error of [`ModuleArchive::open`].
    pub fn new(archive: &'a dyn ModuleArchive) -> Result<Self> {
        archive.open()?;
        Ok(Self { archive })
    }
}

impl<'a> Deref for OpenArchive<'a> {
    type Target = dyn ModuleArchive + 'a;

    fn deref(&self) -> &Self::Target {
        self.archive
    }
}

impl Drop for OpenArchive<'_> {
    fn drop(&mut self) {
        self.archive.close();
    }
}

/// Path of the main binary within `archive`.
///
/// # Errors
/// Returns [`crate::Error::ArchiveRead`] if none of the candidate paths exist.
pub fn main_binary_path(archive: &dyn ModuleArchive, variant: &str) -> Result<String> {
    let name = archive.name();
    let candidates = [
        format!("{name}.All.dll"),
        format!("{name}.{variant}.dll"),
        "All.dll".to_string(),
    ];

    candidates
        .into_iter()
        .find(|path| archive.has_file(path))
        .ok_or_else(|| Error::ArchiveRead {
            archive: name.to_string(),
            path: format!("{name}.{variant}.dll"),
            message: "archive contains no main binary".to_string(),
        })
}

/// Path of a private library within an archive.
#[must_use]
pub fn library_path(lib: &str) -> String {
    format!("{LIBRARY_DIRECTORY}/{lib}.dll")
}

/// Path of the symbol file belonging to the image at `path`.
#[must_use]
pub fn symbol_path(path: &str) -> String {
    match path.strip_suffix(".dll") {
        Some(stem) => format!("{stem}.pdb"),
        None => format!("{path}.pdb"),
    }
}

/// Path of the external debug header belonging to the main binary at `path`.
#[must_use]
pub fn debug_header_path(path: &str) -> String {
    format!("{path}{DEBUG_HEADER_SUFFIX}")
}

/// Read a file, mapping a missing entry to [`crate::Error::ArchiveRead`].
pub(crate) fn read_required(archive: &dyn ModuleArchive, path: &str) -> Result<Vec<u8>> {
    if !archive.has_file(path) {
        return Err(Error::ArchiveRead {
            archive: archive.name().to_string(),
            path: path.to_string(),
            message: "file not found".to_string(),
        });
    }

    archive.get_bytes(path)
}

/// Read a file if it exists.
pub(crate) fn read_optional(archive: &dyn ModuleArchive, path: &str) -> Result<Option<Vec<u8>>> {
    if archive.has_file(path) {
        archive.get_bytes(path).map(Some)
    } else {
        Ok(None)
    }
}
