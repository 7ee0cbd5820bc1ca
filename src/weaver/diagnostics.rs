//! Diagnostics collected while weaving a module.
//!
//! Every entry is a severity plus a message; this pair is the whole contract with the host.
//! Entries also carry the module, type and member they concern, which is used for the structured
//! fields of the `tracing` event that is emitted for each entry.
//!
//! The [`Diagnostics`] container uses `boxcar::Vec` for append-only storage, so it can be shared
//! by reference through the whole pipeline. Entries below the minimum level are still recorded
//! and traced but are not returned by [`Diagnostics::reported`].
//!
//! # Examples
//!
//! ```rust
//! use dotweave::weaver::{Diagnostics, DiagnosticSeverity};
//!
//! let diagnostics = Diagnostics::new(DiagnosticSeverity::Info);
//! diagnostics.debug("building type tree");
//! diagnostics.warning("member Holder.Value has no getter");
//!
//! assert_eq!(diagnostics.count(), 2);
//! assert_eq!(diagnostics.reported().len(), 1);
//! ```

use std::{
    fmt::{self, Write},
    sync::atomic::{AtomicU8, Ordering},
};

/// Severity level of a diagnostic entry, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    /// Progress details useful while debugging a build
    Debug,
    /// Notable steps, e.g. which module is processed
    Info,
    /// A member or descendant was skipped
    Warning,
    /// Something failed; the affected part produced no output
    Error,
}

impl DiagnosticSeverity {
    /// Map the `LogLevel` value of the logger attribute
    #[must_use]
    pub fn from_log_level(value: i64) -> Option<Self> {
        match value {
            0 => Some(DiagnosticSeverity::Debug),
            1 => Some(DiagnosticSeverity::Info),
            2 => Some(DiagnosticSeverity::Warning),
            3 => Some(DiagnosticSeverity::Error),
            _ => None,
        }
    }

    fn from_u8(value: u8) -> Self {
        Self::from_log_level(i64::from(value)).unwrap_or(DiagnosticSeverity::Error)
    }
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticSeverity::Debug => write!(f, "DEBUG"),
            DiagnosticSeverity::Info => write!(f, "INFO"),
            DiagnosticSeverity::Warning => write!(f, "WARN"),
            DiagnosticSeverity::Error => write!(f, "ERROR"),
        }
    }
}

/// A single diagnostic entry with context information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity level of this diagnostic.
    pub severity: DiagnosticSeverity,

    /// Human-readable description.
    pub message: String,

    /// Module being processed, if known.
    pub module: Option<String>,

    /// Full name of the type involved, if any.
    pub type_name: Option<String>,

    /// Name of the member involved, if any.
    pub member: Option<String>,
}

impl Diagnostic {
    /// Creates a new diagnostic entry.
    ///
    /// # Arguments
    ///
    /// * `severity` - Severity level of the diagnostic
    /// * `message` - Human-readable description
    pub fn new(severity: DiagnosticSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            module: None,
            type_name: None,
            member: None,
        }
    }

    /// Adds the processed module.
    #[must_use]
    pub fn with_module(mut self, module: &str) -> Self {
        self.module = Some(module.to_string());
        self
    }

    /// Adds the type involved.
    #[must_use]
    pub fn with_type(mut self, type_name: &str) -> Self {
        self.type_name = Some(type_name.to_string());
        self
    }

    /// Adds the member involved.
    #[must_use]
    pub fn with_member(mut self, member: &str) -> Self {
        self.member = Some(member.to_string());
        self
    }

    fn trace(&self) {
        let module = self.module.as_deref().unwrap_or_default();
        let type_name = self.type_name.as_deref().unwrap_or_default();
        let member = self.member.as_deref().unwrap_or_default();
        match self.severity {
            DiagnosticSeverity::Debug => {
                tracing::debug!(module, type_name, member, "{}", self.message);
            }
            DiagnosticSeverity::Info => {
                tracing::info!(module, type_name, member, "{}", self.message);
            }
            DiagnosticSeverity::Warning => {
                tracing::warn!(module, type_name, member, "{}", self.message);
            }
            DiagnosticSeverity::Error => {
                tracing::error!(module, type_name, member, "{}", self.message);
            }
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)?;
        if let Some(module) = &self.module {
            write!(f, " (module: {module})")?;
        }
        if let Some(type_name) = &self.type_name {
            write!(f, " (type: {type_name})")?;
        }
        if let Some(member) = &self.member {
            write!(f, " (member: {member})")?;
        }
        Ok(())
    }
}

/// Append-only container for the diagnostics of one weaving run.
#[derive(Debug)]
pub struct Diagnostics {
    entries: boxcar::Vec<Diagnostic>,
    min_level: AtomicU8,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(DiagnosticSeverity::Info)
    }
}

impl Diagnostics {
    /// Creates an empty container reporting entries at or above `min_level`.
    #[must_use]
    pub fn new(min_level: DiagnosticSeverity) -> Self {
        Self {
            entries: boxcar::Vec::new(),
            min_level: AtomicU8::new(min_level as u8),
        }
    }

    /// The current minimum level
    #[must_use]
    pub fn min_level(&self) -> DiagnosticSeverity {
        DiagnosticSeverity::from_u8(self.min_level.load(Ordering::Relaxed))
    }

    /// Change the minimum level; applies to entries already collected too
    pub fn set_min_level(&self, level: DiagnosticSeverity) {
        self.min_level.store(level as u8, Ordering::Relaxed);
    }

    /// Adds a debug diagnostic.
    pub fn debug(&self, message: impl Into<String>) {
        self.push(Diagnostic::new(DiagnosticSeverity::Debug, message));
    }

    /// Adds an informational diagnostic.
    pub fn info(&self, message: impl Into<String>) {
        self.push(Diagnostic::new(DiagnosticSeverity::Info, message));
    }

    /// Adds a warning diagnostic.
    pub fn warning(&self, message: impl Into<String>) {
        self.push(Diagnostic::new(DiagnosticSeverity::Warning, message));
    }

    /// Adds an error diagnostic.
    pub fn error(&self, message: impl Into<String>) {
        self.push(Diagnostic::new(DiagnosticSeverity::Error, message));
    }

    /// Adds a diagnostic entry directly and emits its `tracing` event.
    ///
    /// Use this for diagnostics that carry module, type or member context.
    pub fn push(&self, diagnostic: Diagnostic) {
        diagnostic.trace();
        self.entries.push(diagnostic);
    }

    /// Total number of entries, including those below the minimum level.
    pub fn count(&self) -> usize {
        self.entries.count()
    }

    /// Returns true if any error-level diagnostics have been collected.
    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, d)| d.severity == DiagnosticSeverity::Error)
    }

    /// Number of entries with the given severity.
    pub fn count_of(&self, severity: DiagnosticSeverity) -> usize {
        self.entries
            .iter()
            .filter(|(_, d)| d.severity == severity)
            .count()
    }

    /// Returns an iterator over all entries.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().map(|(_, d)| d)
    }

    /// Entries at or above the minimum level, in the order they were added.
    pub fn reported(&self) -> Vec<Diagnostic> {
        let min_level = self.min_level();
        self.iter()
            .filter(|d| d.severity >= min_level)
            .cloned()
            .collect()
    }

    /// Formats a summary of all reported diagnostics.
    pub fn summary(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(
            output,
            "Diagnostics: {} error(s), {} warning(s)",
            self.count_of(DiagnosticSeverity::Error),
            self.count_of(DiagnosticSeverity::Warning)
        );
        for diag in self.reported() {
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
