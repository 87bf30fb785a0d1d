//! # modscope Prelude
//!
//! The most commonly used types of the crate, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all modscope operations
pub use crate::Error;

/// The result type used throughout modscope
pub use crate::Result;

/// Loader configuration
pub use crate::LoaderConfig;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Batch orchestration and its results
pub use crate::manager::{EntryActivator, ModuleEntry, ModuleManager, NullActivator};

/// Cancellation and progress reporting
pub use crate::{CancellationToken, LoadProgress, NoProgress};

/// Diagnostics
pub use crate::{Diagnostic, DiagnosticCategory, DiagnosticSeverity, Diagnostics};

// ================================================================================================
// Archives
// ================================================================================================

/// Module containers
pub use crate::archive::{
    BuildProperties, ContentHash, DirectoryArchive, ExecutionSide, MemoryArchive, ModuleArchive,
    ModuleReference, OpenArchive,
};

// ================================================================================================
// Images and Identities
// ================================================================================================

/// The image format
pub use crate::image::{
    DebugHeader, ImageFlags, ImageReference, ModuleImage, ModuleVersion, SymbolFormat, TypeDef,
    TypeScope,
};

/// Generational naming
pub use crate::image::{base_name, generational_name, library_name, placeholder_name};

// ================================================================================================
// Loading and Resolution
// ================================================================================================

/// Rewriting
pub use crate::rewrite::{DebugSymbolSplicer, IdentityRewriter, MappedName, MappingKind, NameScheme};

/// Dependency graph
pub use crate::graph::{ModuleGraph, ModuleNode, NodeId};

/// Loaded images and resolution
pub use crate::loader::{ImageId, LoadedImage, LoadedImageRc, ModuleLoader};
pub use crate::resolution::{HostResolver, ResolutionService, Resolved};
