use thiserror::Error;

use crate::manager::ModuleEntry;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into three groups: low-level image parsing failures, failures raised
/// while a batch of modules is rewritten and loaded, and failures raised while the entry
/// objects of a loaded batch are instantiated. Load-phase failures are always wrapped in
/// [`Error::ReloadFailure`] carrying the name of the module whose load failed, so a host can
/// attribute the failure without inspecting the inner error.
///
/// # Error Categories
///
/// ## Image Parsing Errors
/// - [`Error::Malformed`] - Corrupted or invalid module image structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of an image
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// ## Load Phase Errors
/// - [`Error::ArchiveRead`] - A required archive entry is missing or unreadable
/// - [`Error::Rewrite`] - An identity rewrite could not be completed
/// - [`Error::Unresolved`] - No resolution step produced an image for an identity
/// - [`Error::IdentityCollision`] - An identity is already resident in the process
/// - [`Error::DependencyCycle`] - Declared module references form a cycle
/// - [`Error::ReloadFailure`] - Wraps any of the above with the failing module
///
/// ## Instantiation Errors
/// - [`Error::EntryType`] - Zero or several entry types in a module's main image
/// - [`Error::Instantiation`] - Aggregated per-module instantiation failures
///
/// ## Control Flow
/// - [`Error::Cancelled`] - The caller requested cancellation
///
/// # Examples
///
/// ```rust,no_run
/// use modscope::{Error, ModuleManager, CancellationToken};
///
/// # fn batch() -> Vec<std::sync::Arc<dyn modscope::ModuleArchive>> { Vec::new() }
/// let mut manager = ModuleManager::default();
/// match manager.instantiate_modules(&batch(), &CancellationToken::new()) {
///     Ok(entries) => println!("Loaded {} modules", entries.len()),
///     Err(Error::Cancelled) => println!("Loading was cancelled"),
///     Err(Error::ReloadFailure { module, source }) => {
///         eprintln!("{module} failed to load: {source}");
///     }
///     Err(e) => eprintln!("Other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The image is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing an image.
    #[error("Out of Bound read would have occurred! - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// A module archive entry is missing or could not be read.
    ///
    /// Raised for missing main binaries, missing private libraries declared by a
    /// module, and archives whose backing storage can no longer be opened.
    #[error("Failed to read '{path}' from archive '{archive}': {message}")]
    ArchiveRead {
        /// Name of the archive the entry was requested from
        archive: String,
        /// Path of the entry inside the archive
        path: String,
        /// What went wrong
        message: String,
    },

    /// Rewriting or re-serializing an image failed.
    ///
    /// Includes references that had to be resolved during the rewrite but could not be.
    #[error("Failed to rewrite '{identity}': {message}")]
    Rewrite {
        /// Identity of the image that was being rewritten
        identity: String,
        /// What went wrong
        message: String,
    },

    /// A module failed to load after its binaries were requested.
    ///
    /// The module stays marked as needing a reload, so invoking the batch again retries it.
    #[error("Module '{module}' failed to load: {source}")]
    ReloadFailure {
        /// The module whose load failed
        module: String,
        /// The underlying failure
        source: Box<Error>,
    },

    /// A module's main image does not contain exactly one entry type.
    #[error("Module '{module}' must define exactly one type extending '{base}', found {found}")]
    EntryType {
        /// The offending module
        module: String,
        /// Fully qualified name of the required base type
        base: String,
        /// How many qualifying types were found
        found: usize,
    },

    /// One or more modules failed during instantiation.
    ///
    /// Each failure pairs a module name with the error raised while instantiating it. The
    /// modules of the batch that did instantiate are delivered in `entries`.
    #[error("Failed to instantiate {}", .failures.iter().map(|(m, e)| format!("'{m}' ({e})")).collect::<Vec<_>>().join(", "))]
    Instantiation {
        /// Per-module failures, in batch order
        failures: Vec<(String, Error)>,
        /// Entries of the modules that instantiated, in batch order
        entries: Vec<ModuleEntry>,
    },

    /// No resolution step could produce an image for the requested identity.
    #[error("Could not resolve module identity '{identity}'")]
    Unresolved {
        /// The identity that was requested
        identity: String,
    },

    /// An image with the same identity is already resident in this process.
    #[error("An image with identity '{identity}' is already loaded")]
    IdentityCollision {
        /// The colliding identity
        identity: String,
    },

    /// The declared module references contain a cycle.
    ///
    /// The reference that would have closed the cycle is not added to the graph.
    #[error("Module '{module}' is part of a dependency cycle: {}", .cycle.join(" -> "))]
    DependencyCycle {
        /// The module whose reference closes the cycle
        module: String,
        /// The cycle, starting and ending with the same module
        cycle: Vec<String>,
    },

    /// The caller requested cancellation of the running batch.
    #[error("Loading was cancelled")]
    Cancelled,

    /// Recursion limit reached.
    ///
    /// Base-type chains are walked with an explicit depth bound. The associated value
    /// shows the limit that was reached.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// Failed to lock target.
    #[error("Failed to lock target")]
    LockError,
}

impl Error {
    /// Returns the module this error is attributed to, if any.
    ///
    /// Only load-phase and entry-type failures carry a single module; aggregated
    /// instantiation failures are attributed per entry.
    #[must_use]
    pub fn module(&self) -> Option<&str> {
        match self {
            Error::ReloadFailure { module, .. }
            | Error::EntryType { module, .. }
            | Error::DependencyCycle { module, .. } => Some(module),
            _ => None,
        }
    }

    /// Returns every module named by this error.
    #[must_use]
    pub fn modules(&self) -> Vec<&str> {
        match self {
            Error::Instantiation { failures, .. } => {
                failures.iter().map(|(module, _)| module.as_str()).collect()
            }
            other => other.module().into_iter().collect(),
        }
    }

    /// Tags a load-phase error with the module it occurred in.
    ///
    /// Errors that are already attributed, and cancellation, are returned unchanged.
    pub(crate) fn in_module(self, module: &str) -> Error {
        match self {
            Error::ReloadFailure { .. } | Error::Cancelled => self,
            other => Error::ReloadFailure {
                module: module.to_string(),
                source: Box::new(other),
            },
        }
    }
}
