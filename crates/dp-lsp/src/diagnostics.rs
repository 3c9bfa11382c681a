//! Conversion from compiler diagnostics to LSP diagnostics.
//!
//! The compiler reports 1-based lines and columns; LSP wants 0-based.

use dp_core::{Diagnostic as DpDiagnostic, Severity};
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};

/// Convert one compiler diagnostic.
pub fn convert_diagnostic(diag: &DpDiagnostic) -> Diagnostic {
    let range = match diag.span {
        Some(span) => Range::new(
            Position::new(span.start_line.saturating_sub(1), span.start_column.saturating_sub(1)),
            Position::new(span.end_line.saturating_sub(1), span.end_column.saturating_sub(1)),
        ),
        None => {
            let line = diag.line.saturating_sub(1);
            let character = diag.column.saturating_sub(1);
            Range::new(Position::new(line, character), Position::new(line, character + 1))
        }
    };

    Diagnostic {
        range,
        severity: Some(convert_severity(diag.severity)),
        source: Some("dp".to_string()),
        message: diag.message.clone(),
        ..Default::default()
    }
}

fn convert_severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Info => DiagnosticSeverity::INFORMATION,
        Severity::Log => DiagnosticSeverity::HINT,
    }
}
