//! DP Compiler Core
//!
//! This crate implements the compiler for the DP dialogue scripting
//! language with:
//! - A mode-stacked, indentation-tracking lexer
//! - A recursive-descent parser with per-statement error recovery
//! - Lowering to a statement IR with evaluable expression trees
//! - Per-file symbol tables with one-hop cross-file lookups
//! - A compilation session that walks the import graph and runs the
//!   semantic checks
//!
//! # Architecture
//!
//! ```text
//!                ┌──────────────────────────────────────────────┐
//!                │              CompilationSession              │
//!                │  resolver · result cache · symbol tables     │
//!                └──────────────────────────────────────────────┘
//!                        │ per file, depth-first over imports
//!                        ▼
//!   ┌─────────┐    ┌─────────┐    ┌──────────┐    ┌────────────────┐
//!   │  Lexer  │ →  │ Parser  │ →  │ IrBuilder│ →  │ semantic check │
//!   │ (tokens)│    │  (AST)  │    │ (SIR+tab)│    │  (root table)  │
//!   └─────────┘    └─────────┘    └──────────┘    └────────────────┘
//! ```
//!
//! Sources are addressed by canonical `file://` URIs; the host feeds
//! text through an async [`ContentResolver`]. Diagnostics collect in a
//! [`DiagnosticSink`] and are the entire failure contract: `compile`
//! only returns `Err` for an unreadable root or cancellation.

pub mod diagnostic;
pub mod expr;
pub mod lexer;
pub mod lower;
pub mod resolver;
pub mod session;
pub mod sir;
pub mod source;
pub mod symbols;
pub mod syntax;
pub mod token;

// Re-exports
pub use diagnostic::{Diagnostic, DiagnosticSink, Severity, SpanRange};
pub use expr::{BinaryOp, Environment, EvalError, ExprNode, UnaryOp, Value, ValueType};
pub use lexer::lex;
pub use lower::IrBuilder;
pub use resolver::{ContentResolver, FsResolver, MemoryResolver, ResolveError};
pub use session::{CancelToken, CompilationSession, CompileResult, SessionError};
pub use sir::{LabelSet, SirLabel, SirStatement, ENTRANCE_LABEL};
pub use source::{canonical_source_id, resolve_import, SourceError};
pub use symbols::{FileSymbolTable, SymbolPosition, SymbolTables};
pub use syntax::parse;
pub use token::{Token, TokenKind};
