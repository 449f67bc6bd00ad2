use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const DIAG_MISSING_INCLUDE: &str = "BOX-W001";
pub const DIAG_INVALID_CONFIG: &str = "BOX-W002";
pub const DIAG_HANDLER_SHAPE: &str = "BOX-W003";
pub const DIAG_UNRESOLVED_INCLUDE: &str = "BOX-W004";
pub const DIAG_INCLUDE_RECURSION: &str = "BOX-W005";
pub const DIAG_BASENAME_COLLISION: &str = "BOX-W006";
pub const DIAG_READ_FAILED: &str = "BOX-W007";
pub const DIAG_CONFIG_VALUE: &str = "BOX-W008";
pub const DIAG_DUPLICATE_ROUTE: &str = "BOX-W009";
pub const DIAG_SKIPPED_EDGE: &str = "BOX-I001";

// Lint codes
pub const LINT_MISSING_TEMPLATE: &str = "BOX-L001";
pub const LINT_MISSING_STYLE: &str = "BOX-L002";
pub const LINT_MISSING_SCRIPT: &str = "BOX-L003";
pub const LINT_MISMATCHED_SECTION: &str = "BOX-L004";
pub const LINT_INVALID_INCLUDE: &str = "BOX-L005";
pub const LINT_EMPTY_BIND: &str = "BOX-L006";
pub const LINT_DUPLICATE_ID: &str = "BOX-L007";
pub const LINT_MISSING_CONFIG: &str = "BOX-L008";
pub const LINT_INVALID_CONFIG: &str = "BOX-L009";
pub const LINT_INVALID_METHOD: &str = "BOX-L010";
pub const LINT_MISSING_EXPORT: &str = "BOX-L011";
pub const LINT_SHORT_SIGNATURE: &str = "BOX-L012";
pub const LINT_NO_RETURN: &str = "BOX-L013";

// ═══════════════════════════════════════════════════════════════════════════════
// FALLBACKS
// ═══════════════════════════════════════════════════════════════════════════════

/// The degraded behavior the build falls back to for a recoverable code.
fn get_fallback(code: &str) -> &'static str {
    match code {
        DIAG_MISSING_INCLUDE => "The include target is skipped and the build continues.",
        DIAG_INVALID_CONFIG => {
            "The inline configuration is ignored; method and path come from the filename."
        }
        DIAG_HANDLER_SHAPE => {
            "Only the export wrapper is stripped from the handler; the rest is used as-is."
        }
        DIAG_UNRESOLVED_INCLUDE => "A visible missing-include marker is rendered in its place.",
        DIAG_INCLUDE_RECURSION => "The recursive include is rendered as a missing-include marker.",
        DIAG_BASENAME_COLLISION => {
            "Both components are kept, but they share one scope id and may share styles."
        }
        DIAG_READ_FAILED => "The unreadable file is skipped.",
        DIAG_CONFIG_VALUE => "The default value is used.",
        DIAG_DUPLICATE_ROUTE => "The first endpoint in walk order serves the route; later ones are ignored.",
        DIAG_SKIPPED_EDGE => "Each component is compiled once; repeated edges reuse it.",
        _ => "",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// A recoverable problem found while compiling or linting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    pub message: String,
    pub fallback: String,
    pub file: String,
    pub context: Option<String>,
    pub hints: Vec<String>,
}

impl Diagnostic {
    pub fn new(code: &str, severity: Severity, message: &str, file: &str) -> Self {
        Diagnostic {
            code: code.to_string(),
            severity,
            message: message.to_string(),
            fallback: get_fallback(code).to_string(),
            file: file.to_string(),
            context: None,
            hints: vec![],
        }
    }

    pub fn error(code: &str, message: &str, file: &str) -> Self {
        Self::new(code, Severity::Error, message, file)
    }

    pub fn warning(code: &str, message: &str, file: &str) -> Self {
        Self::new(code, Severity::Warning, message, file)
    }

    pub fn info(code: &str, message: &str, file: &str) -> Self {
        Self::new(code, Severity::Info, message, file)
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    /// Log through `tracing` at the level matching the severity.
    pub fn emit(self) -> Self {
        match self.severity {
            Severity::Error => tracing::error!(code = %self.code, file = %self.file, "{}", self.message),
            Severity::Warning => tracing::warn!(code = %self.code, file = %self.file, "{}", self.message),
            Severity::Info => tracing::debug!(code = %self.code, file = %self.file, "{}", self.message),
        }
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}: {}", self.severity, self.code, self.file, self.message)?;
        if let Some(ctx) = &self.context {
            write!(f, " ({})", ctx)?;
        }
        Ok(())
    }
}

/// Count diagnostics of one severity.
pub fn count_severity(diagnostics: &[Diagnostic], severity: Severity) -> usize {
    diagnostics.iter().filter(|d| d.severity == severity).count()
}
