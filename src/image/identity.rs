//! Module versions and the generational naming scheme.
//!
//! A module that is reloaded inside one process cannot reuse its previous identity: the
//! previous image stays resident for the remaining lifetime of the process. Every load
//! of a module's binary is therefore given an identity derived from the module name and
//! its current generation:
//!
//! | What                    | Direct-attach | Otherwise                 |
//! |-------------------------|---------------|---------------------------|
//! | Module                  | `name`        | `name#generation`         |
//! | Private library `lib`   | `lib`         | `name#lib#generation`     |
//! | Weak reference to `dep` | `dep`         | `dep#0`                   |
//!
//! Direct-attach loads keep the unmodified name so that live-edit debuggers can match the
//! loaded image with the binary they built.
//!
//! # Examples
//!
//! ```rust
//! use modscope::image::{generational_name, library_name, base_name};
//!
//! assert_eq!(generational_name("ExampleMod", 3), "ExampleMod#3");
//! assert_eq!(library_name("ExampleMod", "Json", 3), "ExampleMod#Json#3");
//! assert_eq!(base_name("ExampleMod#Json#3"), "ExampleMod");
//! ```

use std::{fmt, str::FromStr};

use crate::{Error, Result};

/// Separator between the components of a generational identity.
pub const GENERATION_SEPARATOR: char = '#';

/// Generation every weak reference is pinned to until the referenced module joins the set.
pub const PLACEHOLDER_GENERATION: u32 = 0;

/// Identity of a module at a given generation: `name#generation`.
#[must_use]
pub fn generational_name(name: &str, generation: u32) -> String {
    format!("{name}{GENERATION_SEPARATOR}{generation}")
}

/// Identity of a library privately carried by `owner`: `owner#lib#generation`.
#[must_use]
pub fn library_name(owner: &str, lib: &str, generation: u32) -> String {
    format!("{owner}{GENERATION_SEPARATOR}{lib}{GENERATION_SEPARATOR}{generation}")
}

/// Placeholder identity for a weak reference: `dep#0`.
#[must_use]
pub fn placeholder_name(dependency: &str) -> String {
    generational_name(dependency, PLACEHOLDER_GENERATION)
}

/// Strip every generational component from an identity.
#[must_use]
pub fn base_name(identity: &str) -> &str {
    identity
        .split(GENERATION_SEPARATOR)
        .next()
        .unwrap_or(identity)
}

/// Four-part module version number (major.minor.build.revision).
///
/// Ordering compares the components from most to least significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ModuleVersion {
    /// Major version - incompatible changes
    pub major: u16,
    /// Minor version - compatible additions
    pub minor: u16,
    /// Build number
    pub build: u16,
    /// Revision number
    pub revision: u16,
}

impl ModuleVersion {
    /// Create a new version from its four components.
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Parse a dotted version string.
    ///
    /// Between one and four components are accepted; missing components are zero.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for empty input, more than four components or
    /// components that are not 16-bit unsigned integers.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use modscope::image::ModuleVersion;
    ///
    /// let version = ModuleVersion::parse("1.4")?;
    /// assert_eq!(version, ModuleVersion::new(1, 4, 0, 0));
    /// # Ok::<(), modscope::Error>(())
    /// ```
    pub fn parse(version: &str) -> Result<Self> {
        let parts: Vec<&str> = version.trim().split('.').collect();
        if parts.is_empty() || parts.len() > 4 || parts.iter().any(|p| p.is_empty()) {
            return Err(malformed_error!("Invalid module version '{}'", version));
        }

        let mut components = [0u16; 4];
        for (slot, part) in components.iter_mut().zip(&parts) {
            *slot = part
                .parse::<u16>()
                .map_err(|_| malformed_error!("Invalid version component '{}' in '{}'", part, version))?;
        }

        Ok(Self::new(
            components[0],
            components[1],
            components[2],
            components[3],
        ))
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl FromStr for ModuleVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
