//! Diagnostic types for error reporting.
//!
//! All positions are 1-based; the editor front-end converts to 0-based
//! at the LSP boundary.

use serde::Serialize;
use std::fmt;

/// Severity level of a diagnostic.
///
/// The numeric values follow the LSP convention (1 is most severe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Error = 1,
    Warning = 2,
    Info = 3,
    Log = 4,
}

/// An exact source range, inclusive of the start and exclusive of the
/// end column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpanRange {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl SpanRange {
    pub fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// A range covering `len` columns on a single line.
    pub fn on_line(line: u32, column: u32, len: u32) -> Self {
        Self::new(line, column, line, column + len)
    }
}

/// A single diagnostic record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub message: String,
    pub line: u32,
    pub column: u32,
    pub span: Option<SpanRange>,
    pub severity: Severity,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Log => "log",
        };
        write!(f, "{}:{}: {}: {}", self.line, self.column, severity, self.message)
    }
}

/// Collects diagnostics in report order and counts them by severity.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    errors: usize,
    warnings: usize,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one diagnostic. Order of `report` calls is preserved.
    pub fn report(&mut self, diag: Diagnostic) {
        match diag.severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            _ => {}
        }
        self.diagnostics.push(diag);
    }

    pub fn error(&mut self, message: impl Into<String>, line: u32, column: u32) {
        self.report(Diagnostic {
            message: message.into(),
            line,
            column,
            span: None,
            severity: Severity::Error,
        });
    }

    pub fn error_spanned(&mut self, message: impl Into<String>, span: SpanRange) {
        self.report(Diagnostic {
            message: message.into(),
            line: span.start_line,
            column: span.start_column,
            span: Some(span),
            severity: Severity::Error,
        });
    }

    pub fn warning(&mut self, message: impl Into<String>, line: u32, column: u32) {
        self.report(Diagnostic {
            message: message.into(),
            line,
            column,
            span: None,
            severity: Severity::Warning,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Consume the sink, returning the diagnostics in report order.
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Render all diagnostics, one per line, prefixed with `name`.
    pub fn render(&self, name: &str) -> String {
        self.diagnostics
            .iter()
            .map(|d| format!("{}:{}", name, d))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
