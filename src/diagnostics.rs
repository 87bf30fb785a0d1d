//! Diagnostics collected while batches of modules are loaded.
//!
//! Not every notable event during a load is an error. A hard-declared module reference
//! that is absent from the batch is recorded as a weak dependency, a reference that would
//! close a cycle is dropped from the graph, and some identities can only be satisfied by a
//! fallback resolution step. These events are recorded here so a host can surface them
//! next to the modules they concern.
//!
//! The [`Diagnostics`] container uses `boxcar::Vec`, so entries can be appended from the
//! parallel instantiation phase without locking.
//!
//! # Examples
//!
//! ```rust
//! use modscope::{Diagnostics, DiagnosticCategory};
//!
//! let diagnostics = Diagnostics::new();
//! diagnostics.warning(DiagnosticCategory::Graph, "ModB", "Reference 'ModC' is not loaded");
//!
//! assert!(diagnostics.has_warnings());
//! for entry in diagnostics.for_module("ModB") {
//!     println!("{entry}");
//! }
//! ```

use std::fmt::{self, Write};

/// Severity of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticSeverity {
    /// Informational, nothing to act on
    Info,
    /// Loading continued but the result may not be what the module author expects
    Warning,
    /// A module failed
    Error,
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticSeverity::Info => write!(f, "INFO"),
            DiagnosticSeverity::Warning => write!(f, "WARN"),
            DiagnosticSeverity::Error => write!(f, "ERROR"),
        }
    }
}

/// The loading stage a diagnostic was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCategory {
    /// Dependency graph construction
    Graph,
    /// Identity resolution
    Resolution,
    /// Identity rewriting and symbol splicing
    Rewrite,
    /// Loading of rewritten images
    Load,
    /// Entry object instantiation
    Instantiation,
}

impl fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticCategory::Graph => write!(f, "Graph"),
            DiagnosticCategory::Resolution => write!(f, "Resolution"),
            DiagnosticCategory::Rewrite => write!(f, "Rewrite"),
            DiagnosticCategory::Load => write!(f, "Load"),
            DiagnosticCategory::Instantiation => write!(f, "Instantiation"),
        }
    }
}

/// A single diagnostic entry.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity
    pub severity: DiagnosticSeverity,
    /// Stage that raised it
    pub category: DiagnosticCategory,
    /// Module the entry is attributed to
    pub module: String,
    /// Human readable description
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}): {}",
            self.severity, self.category, self.module, self.message
        )
    }
}

/// Thread-safe, append-only collection of [`Diagnostic`] entries.
#[derive(Debug)]
pub struct Diagnostics {
    entries: boxcar::Vec<Diagnostic>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: boxcar::Vec::new(),
        }
    }

    /// Record an informational entry.
    pub fn info(&self, category: DiagnosticCategory, module: &str, message: impl Into<String>) {
        self.push(DiagnosticSeverity::Info, category, module, message);
    }

    /// Record a warning.
    pub fn warning(&self, category: DiagnosticCategory, module: &str, message: impl Into<String>) {
        self.push(DiagnosticSeverity::Warning, category, module, message);
    }

    /// Record an error.
    pub fn error(&self, category: DiagnosticCategory, module: &str, message: impl Into<String>) {
        self.push(DiagnosticSeverity::Error, category, module, message);
    }

    fn push(
        &self,
        severity: DiagnosticSeverity,
        category: DiagnosticCategory,
        module: &str,
        message: impl Into<String>,
    ) {
        self.entries.push(Diagnostic {
            severity,
            category,
            module: module.to_string(),
            message: message.into(),
        });
    }

    /// Number of recorded entries.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.count()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Returns `true` if at least one error was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.iter().any(|d| d.severity == DiagnosticSeverity::Error)
    }

    /// Returns `true` if at least one warning was recorded.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.iter().any(|d| d.severity == DiagnosticSeverity::Warning)
    }

    /// Iterate over all entries in the order they were recorded.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().map(|(_, d)| d)
    }

    /// All entries attributed to `module`.
    #[must_use]
    pub fn for_module(&self, module: &str) -> Vec<&Diagnostic> {
        self.iter().filter(|d| d.module == module).collect()
    }

    /// All entries of a category.
    #[must_use]
    pub fn by_category(&self, category: DiagnosticCategory) -> Vec<&Diagnostic> {
        self.iter().filter(|d| d.category == category).collect()
    }

    /// Multi-line summary of every warning and error.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Diagnostics: {} entries", self.count());

        for diag in self
            .iter()
            .filter(|d| d.severity != DiagnosticSeverity::Info)
        {
            let _ = writeln!(output, "  {diag}");
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
