// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # modscope
//!
//! Generational loading of runtime-reloadable binary modules.
//!
//! A host that loads plugin modules into a long-running process cannot unload them again,
//! yet users expect edited modules to reload without a restart. `modscope` solves this by
//! giving every load of a module a fresh, unique identity: images are rewritten so that
//! their own name, the names of their private libraries and the names of the modules they
//! depend on all carry a generation suffix (`ModA#3`). Stale generations stay resident
//! and are simply never referenced again.
//!
//! ## Features
//!
//! - **Identity rewriting** - module images and their references are renamed per generation
//! - **Dependency tracking** - a graph of declared references decides which modules must
//!   reload together, and in which order
//! - **Weak references** - optional dependencies bind late and upgrade cleanly
//! - **Direct attach** - modules can keep their build-time identity for live-edit debugging
//! - **Resolution service** - loaded images, definitions and bundled libraries are found by
//!   identity, concurrently
//! - **Parallel instantiation** - entry objects are created in parallel with aggregated
//!   per-module failures
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use modscope::prelude::*;
//!
//! let mut image = ModuleImage::new("ModA", ModuleVersion::new(1, 0, 0, 0));
//! let host = image.add_reference("Host", ModuleVersion::new(1, 4, 0, 0));
//! image.add_type("ModA.ModA", Some((TypeScope::Reference(host), "Mod")));
//!
//! let archive: Arc<dyn ModuleArchive> = Arc::new(
//!     MemoryArchive::new("ModA", ModuleVersion::new(1, 0, 0, 0))
//!         .with_file("ModA.All.dll", image.to_bytes()),
//! );
//!
//! let mut manager = ModuleManager::new(LoaderConfig::default());
//! let entries = manager.instantiate_modules(&[archive], &CancellationToken::new())?;
//! println!("{} loaded as {}", entries[0].name, entries[0].image.identity());
//! # Ok::<(), modscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`archive`] - module containers and their build properties
//! - [`image`] - the module image format and generational naming
//! - [`rewrite`] - identity rewriting and debug header splicing
//! - [`graph`] - dependency graph, reload and direct-attach propagation
//! - [`resolution`] - registry of loaded images and definitions
//! - [`loader`] - loading of a single module's images
//! - [`manager`] - batch orchestration and entry instantiation
//! - [`Error`] and [`Result`] - error handling
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`Result<T>`](Result). Errors raised while a module
//! is processed name that module:
//!
//! ```rust,no_run
//! use modscope::{Error, ModuleManager, CancellationToken};
//!
//! let mut manager = ModuleManager::default();
//! match manager.instantiate_modules(&[], &CancellationToken::new()) {
//!     Ok(entries) => println!("{} modules", entries.len()),
//!     Err(Error::Cancelled) => println!("cancelled"),
//!     Err(error) => println!("failed in {:?}: {error}", error.modules()),
//! }
//! ```
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use modscope::prelude::*;
///
/// let manager = ModuleManager::new(LoaderConfig::development());
/// assert!(manager.config().live_edit_attach);
/// ```
pub mod prelude;

/// Module archives.
///
/// An archive is the container a module is distributed in. It carries the module's name,
/// version and [`archive::BuildProperties`] and exposes its files by relative path.
///
/// # Key Components
///
/// - [`archive::ModuleArchive`] - the archive abstraction the loader reads from
/// - [`archive::MemoryArchive`] - archive held in memory
/// - [`archive::DirectoryArchive`] - archive backed by an unpacked directory
/// - [`archive::OpenArchive`] - scope guard keeping an archive open
pub mod archive;

/// Byte-level parsing and writing primitives.
pub mod file;

/// The module image format and generational naming.
pub mod image;

/// Identity rewriting of module images.
pub mod rewrite;

/// The module dependency graph.
pub mod graph;

/// Registry of loaded images and their definitions.
pub mod resolution;

/// Loading of a single module's images.
pub mod loader;

/// Batch orchestration.
pub mod manager;

mod config;
mod diagnostics;
mod progress;

/// `modscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `modscope` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

/// Loader configuration.
pub use config::LoaderConfig;

/// Diagnostics collected while batches are processed.
pub use diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticSeverity, Diagnostics};

/// Cancellation and progress reporting for running batches.
pub use progress::{
    CancellationToken, LoadProgress, NoProgress, STAGE_INSTANTIATING, STAGE_SANDBOXING,
};

/// Main entry point for loading modules.
///
/// See [`manager::ModuleManager`].
pub use manager::{EntryActivator, ModuleEntry, ModuleManager, NullActivator};

/// The archive abstraction modules are loaded from.
pub use archive::ModuleArchive;

/// Low-level parsing and writing utilities
pub use file::{parser::Parser, writer::Writer};
