//! Loader configuration.
//!
//! [`LoaderConfig`] gathers the handful of host-specific settings the loader needs: which
//! identity belongs to the host itself, which base type marks a module's entry type, which
//! platform variant of a module's main binary to prefer, and whether live-edit attach
//! debugging is active.

/// Configuration for a [`crate::ModuleManager`].
///
/// # Examples
///
/// ```rust
/// use modscope::LoaderConfig;
///
/// let config = LoaderConfig {
///     platform_variant: "XNA".to_string(),
///     ..LoaderConfig::development()
/// };
/// assert!(config.live_edit_attach);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Identity of the host's own core image; resolution of this identity never reaches
    /// the module registries.
    pub core_identity: String,

    /// Name of the base type (defined by the core image) every entry type must extend.
    pub entry_base_type: String,

    /// Variant suffix used to pick a module's main binary when no `{name}.All.dll` exists.
    pub platform_variant: String,

    /// Load eligible modules under their unmodified identity so a live-edit debugger
    /// can attach to them.
    pub live_edit_attach: bool,

    /// Maximum length of a base type chain walked while looking for entry types.
    pub max_type_depth: usize,

    /// Stamp a fresh module version id onto every rewritten image.
    pub randomize_mvid: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            core_identity: "Host".to_string(),
            entry_base_type: "Mod".to_string(),
            platform_variant: "FNA".to_string(),
            live_edit_attach: false,
            max_type_depth: 64,
            randomize_mvid: true,
        }
    }
}

impl LoaderConfig {
    /// Settings for a host running under a debugger with live-edit support.
    #[must_use]
    pub fn development() -> Self {
        Self {
            live_edit_attach: true,
            ..Self::default()
        }
    }

    /// Settings for release hosts. Identical to [`Default`].
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }
}
