//! Diagnostics and error types for the compile, load and render stages

use std::fmt;

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// How serious a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    /// A warning promoted to an error by `warnings_as_errors`
    WarningAsError,
    Error,
}

impl Severity {
    /// Whether a diagnostic of this severity fails the compilation
    pub fn is_error(self) -> bool {
        matches!(self, Severity::Error | Severity::WarningAsError)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::WarningAsError => "warning (as error)",
            Severity::Error => "error",
        })
    }
}

/// Which text a diagnostic's span points into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// The directive-injected template text
    Template,
    /// The generated program text
    Program,
}

/// A single compiler message
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub origin: Origin,
    /// Human-readable descriptions of what the parser expected instead
    pub expected: Vec<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, origin: Origin, span: Span, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            span,
            origin,
            expected: Vec::new(),
        }
    }

    pub fn error(origin: Origin, span: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, origin, span, message)
    }

    pub fn warning(origin: Origin, span: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, origin, span, message)
    }

    pub fn info(origin: Origin, span: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, origin, span, message)
    }

    pub fn with_expected(mut self, expected: Vec<String>) -> Self {
        self.expected = expected;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity.is_error()
    }

    /// One-based line and column of the span start within `source`
    pub fn line_col(&self, source: &str) -> (usize, usize) {
        let offset = self.span.start.min(source.len());
        let before = &source[..offset];
        let line = before.matches('\n').count() + 1;
        let col = before.rfind('\n').map_or(offset, |nl| offset - nl - 1) + 1;
        (line, col)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = match self.origin {
            Origin::Template => "template",
            Origin::Program => "program",
        };
        write!(
            f,
            "{} at {} {:?}: {}",
            self.severity, origin, self.span, self.message
        )?;
        if !self.expected.is_empty() {
            write!(f, " (expected {})", self.expected.join(", "))?;
        }
        Ok(())
    }
}

/// Compilation failed with at least one error-level diagnostic.
///
/// Carries every diagnostic (including warnings and infos) together with the
/// generated program text, since diagnostic spans of [`Origin::Program`]
/// point into that text rather than into the template.
#[derive(Debug, Error)]
#[error("unable to compile template:\n{}", format_errors(.diagnostics))]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
    pub generated_code: String,
    pub template: String,
}

fn format_errors(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl CompileError {
    /// Diagnostics that caused the failure
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    /// Format every diagnostic with source context using ariadne
    pub fn report(&self, filename: &str) -> String {
        let program_name = format!("{filename} (generated)");
        self.diagnostics
            .iter()
            .map(|d| match d.origin {
                Origin::Template => format_diagnostic(d, &self.template, filename),
                Origin::Program => format_diagnostic(d, &self.generated_code, &program_name),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn format_diagnostic(diagnostic: &Diagnostic, source: &str, filename: &str) -> String {
    let (kind, color) = match diagnostic.severity {
        Severity::Info => (ReportKind::Advice, Color::Blue),
        Severity::Warning => (ReportKind::Warning, Color::Yellow),
        Severity::WarningAsError | Severity::Error => (ReportKind::Error, Color::Red),
    };

    let expected_str = if diagnostic.expected.is_empty() {
        String::new()
    } else {
        format!("\nExpected: {}", diagnostic.expected.join(", "))
    };

    let span = diagnostic.span.start.min(source.len())..diagnostic.span.end.min(source.len());
    let mut buf = Vec::new();
    let written = Report::build(kind, filename, span.start)
        .with_message(&diagnostic.message)
        .with_label(
            Label::new((filename, span))
                .with_message(format!("{}{}", diagnostic.message, expected_str))
                .with_color(color),
        )
        .finish()
        .write((filename, Source::from(source)), &mut buf);

    match written {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        Err(_) => diagnostic.to_string(),
    }
}

/// Errors raised while turning an artifact payload back into a runnable type
#[derive(Debug, Error)]
pub enum LoadError {
    /// The payload does not define the requested type
    #[error("type '{type_name}' was not found in artifact '{module}'")]
    TypeNotFound { type_name: String, module: String },

    /// The payload is not a stencil artifact or is corrupt
    #[error("invalid artifact: {reason}")]
    InvalidArtifact { reason: String },

    /// The payload needs a module the reference set does not provide
    #[error("artifact requires '{name}', which is not in the reference set")]
    MissingReference { name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoadError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArtifact {
            reason: reason.into(),
        }
    }
}

/// Errors raised while instantiating or executing a template
#[derive(Debug, Error)]
pub enum RenderError {
    /// The attribute sub-protocol or instance lifecycle was driven out of order
    #[error("contract violation: {operation} called while {state}")]
    ContractViolation {
        operation: &'static str,
        state: &'static str,
    },

    /// The entry type cannot be instantiated
    #[error("failed to allocate type '{type_name}': {reason}")]
    Allocation { type_name: String, reason: String },

    #[error("'{type_name}' does not contain a definition for '{member}'")]
    MemberNotFound { type_name: String, member: String },

    #[error("cannot access '{member}' on a null value")]
    NullReference { member: String },

    #[error("the given key '{key}' was not present in the map")]
    KeyNotFound { key: String },

    #[error("index {index} is out of range for a sequence of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("type mismatch in {operation}: {message}")]
    TypeMismatch { operation: String, message: String },

    /// A native function reported a failure
    #[error("{function}: {message}")]
    Native { function: String, message: String },

    /// The render task did not run to completion
    #[error("render aborted: {0}")]
    Aborted(String),
}

impl RenderError {
    pub fn contract(operation: &'static str, state: &'static str) -> Self {
        Self::ContractViolation { operation, state }
    }

    pub fn mismatch(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn native(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Native {
            function: function.into(),
            message: message.into(),
        }
    }

    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::ContractViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering_and_failure() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Error.is_error());
        assert!(Severity::WarningAsError.is_error());
        assert!(!Severity::Warning.is_error());
        assert!(!Severity::Info.is_error());
    }

    #[test]
    fn test_line_col() {
        let source = "first\nsecond line\nthird";
        let diag = Diagnostic::error(Origin::Program, 13..17, "boom");
        assert_eq!(diag.line_col(source), (2, 8));

        let diag = Diagnostic::error(Origin::Program, 0..1, "boom");
        assert_eq!(diag.line_col(source), (1, 1));
    }

    #[test]
    fn test_compile_error_message_lists_only_errors() {
        let err = CompileError {
            diagnostics: vec![
                Diagnostic::warning(Origin::Program, 0..1, "harmless"),
                Diagnostic::error(Origin::Program, 2..3, "fatal"),
            ],
            generated_code: "abc".to_string(),
            template: String::new(),
        };
        let message = err.to_string();
        assert!(message.starts_with("unable to compile template:"));
        assert!(message.contains("fatal"));
        assert!(!message.contains("harmless"));
        assert_eq!(err.errors().count(), 1);
    }

    #[test]
    fn test_report_mentions_generated_source() {
        let err = CompileError {
            diagnostics: vec![Diagnostic::error(Origin::Program, 4..7, "unknown name")],
            generated_code: "let foo = 1;".to_string(),
            template: String::new(),
        };
        let report = err.report("page.html");
        assert!(report.contains("unknown name"));
        assert!(report.contains("page.html (generated)"));
    }
}
