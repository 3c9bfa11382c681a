//! Compilation session: the top orchestrator.
//!
//! `compile` canonicalizes the source ID, pulls text through the
//! resolver, then recurses depth-first over the import graph. Each
//! file lexes, parses and lowers into its own label set and symbol
//! table; after the recursion returns to the root, the semantic pass
//! checks duplicate imports, label resolution and variable resolution
//! over the root table and its one-hop references.
//!
//! Only the root file's diagnostics surface directly. Imported files
//! collect into per-file sinks and appear at the import site as one
//! roll-up warning with the error count.

use crate::diagnostic::{Diagnostic, DiagnosticSink};
use crate::lexer::lex;
use crate::lower::IrBuilder;
use crate::resolver::{ContentResolver, ResolveError};
use crate::sir::{LabelSet, ENTRANCE_LABEL};
use crate::source::{canonical_source_id, resolve_import, SourceError};
use crate::symbols::{FileSymbolTable, SymbolPosition, SymbolTables};
use crate::syntax::ast::Pos;
use crate::syntax::parser::parse;

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use url::Url;

/// The immutable outcome of one `compile` call.
#[derive(Debug, Clone)]
pub struct CompileResult {
    /// True when the error count is zero; warnings do not fail a
    /// compile.
    pub success: bool,
    /// Root-file diagnostics in report order.
    pub diagnostics: Vec<Diagnostic>,
    /// Every label across the import closure, first-wins on collision.
    pub labels: LabelSet,
    pub source_id: Url,
    pub timestamp: SystemTime,
}

/// Cooperative cancellation flag, checked at every resolver call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("compilation cancelled")]
    Cancelled,
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("failed to read root source '{uri}'")]
    RootResolve {
        uri: Url,
        #[source]
        source: ResolveError,
    },
}

/// Owns the result cache and the symbol tables of past compiles.
///
/// All compute is single-threaded within one `compile` call; the only
/// shared mutation is the final cache insert, guarded by a mutex.
/// Concurrent `compile` calls for the same URI are the host's job to
/// serialize.
pub struct CompilationSession {
    resolver: Arc<dyn ContentResolver>,
    cache: Mutex<HashMap<Url, Arc<CompileResult>>>,
    tables: Mutex<SymbolTables>,
}

impl CompilationSession {
    pub fn new(resolver: Arc<dyn ContentResolver>) -> Self {
        Self {
            resolver,
            cache: Mutex::new(HashMap::new()),
            tables: Mutex::new(SymbolTables::new()),
        }
    }

    /// Compile `source_id` and everything it imports.
    ///
    /// Returns an error only for an unreadable root source or
    /// cancellation; every other problem is a diagnostic on the
    /// result. A cancelled compile commits nothing to the cache.
    pub async fn compile(
        &self,
        source_id: &str,
        cancel: &CancelToken,
    ) -> Result<Arc<CompileResult>, SessionError> {
        let root = canonical_source_id(source_id)?;
        tracing::debug!(%root, "compile started");

        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        let text = self
            .resolver
            .get_text(&root)
            .await
            .map_err(|source| SessionError::RootResolve {
                uri: root.clone(),
                source,
            })?;

        let mut sink = DiagnosticSink::new();
        let mut run = CompileRun {
            resolver: self.resolver.as_ref(),
            cancel,
            root: root.clone(),
            imported: IndexMap::new(),
            tables: SymbolTables::new(),
        };
        run.compile_file(root.clone(), text, &mut sink).await?;
        run.semantic_check(&mut sink);

        let mut labels = LabelSet::new();
        for set in run.imported.values() {
            labels.extend_first_wins(set);
        }

        let result = Arc::new(CompileResult {
            success: sink.error_count() == 0,
            diagnostics: sink.into_diagnostics(),
            labels,
            source_id: root.clone(),
            timestamp: SystemTime::now(),
        });
        tracing::debug!(
            %root,
            success = result.success,
            diagnostics = result.diagnostics.len(),
            labels = result.labels.len(),
            "compile finished"
        );

        self.tables.lock().merge_from(run.tables);
        self.cache.lock().insert(root, result.clone());
        Ok(result)
    }

    /// The last result compiled for this source ID, if any.
    pub fn cached_compile_result(&self, source_id: &str) -> Option<Arc<CompileResult>> {
        let root = canonical_source_id(source_id).ok()?;
        self.cache.lock().get(&root).cloned()
    }

    /// Label definitions visible from `source_id` (itself plus its
    /// one-hop references).
    pub fn find_label_definition(
        &self,
        source_id: &str,
        name: &str,
    ) -> Result<Vec<SymbolPosition>, SessionError> {
        let root = canonical_source_id(source_id)?;
        Ok(self.tables.lock().find_label_definition(&root, name))
    }

    /// Variable definitions visible from `source_id`.
    pub fn find_variable_definition(
        &self,
        source_id: &str,
        name: &str,
    ) -> Result<Vec<SymbolPosition>, SessionError> {
        let root = canonical_source_id(source_id)?;
        Ok(self.tables.lock().find_variable_definition(&root, name))
    }
}

/// Per-compile state; dropped wholesale on cancellation.
struct CompileRun<'r> {
    resolver: &'r dyn ContentResolver,
    cancel: &'r CancelToken,
    root: Url,
    /// Files already compiled this run, in discovery order (root
    /// first). Doubles as the cycle guard.
    imported: IndexMap<Url, LabelSet>,
    tables: SymbolTables,
}

impl CompileRun<'_> {
    /// Lex, parse, import-recurse and lower one file. Boxed because
    /// the import recursion makes the future self-referential.
    fn compile_file<'a>(
        &'a mut self,
        uri: Url,
        text: String,
        sink: &'a mut DiagnosticSink,
    ) -> Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + 'a>> {
        Box::pin(async move {
            if self.imported.contains_key(&uri) {
                return Ok(());
            }
            // Reserve the slot before recursing so cycles terminate.
            self.imported.insert(uri.clone(), LabelSet::new());

            let tokens = lex(&text, sink);
            let program = parse(tokens, sink);
            tracing::trace!(
                %uri,
                imports = program.imports.len(),
                labels = program.labels.len(),
                "parsed"
            );

            let mut symbols = FileSymbolTable::new(uri.clone());
            for import in &program.imports {
                let token = &import.path;
                let target = match resolve_import(&uri, &token.lexeme) {
                    Ok(target) => target,
                    Err(_) => {
                        sink.error(
                            format!("Invalid import path '{}'", token.lexeme),
                            token.line,
                            token.column,
                        );
                        continue;
                    }
                };
                if self.cancel.is_cancelled() {
                    return Err(SessionError::Cancelled);
                }
                if !self.resolver.exists(&target).await {
                    sink.error(
                        format!("Imported file not found: '{}'", token.lexeme),
                        token.line,
                        token.column,
                    );
                    continue;
                }
                let imported_text = match self.resolver.get_text(&target).await {
                    Ok(text) => text,
                    Err(err) => {
                        sink.error(
                            format!("Failed to read import '{}': {}", token.lexeme, err),
                            token.line,
                            token.column,
                        );
                        continue;
                    }
                };
                symbols.add_reference(
                    target.clone(),
                    SymbolPosition::new(uri.clone(), None, Pos::of(token)),
                );
                if !self.imported.contains_key(&target) {
                    // Imported files keep their diagnostics to
                    // themselves; only the error count surfaces here.
                    let mut child_sink = DiagnosticSink::new();
                    self.compile_file(target.clone(), imported_text, &mut child_sink)
                        .await?;
                    if child_sink.error_count() > 0 {
                        sink.warning(
                            format!(
                                "Imported file '{}' has {} error(s)",
                                token.lexeme,
                                child_sink.error_count()
                            ),
                            token.line,
                            token.column,
                        );
                    }
                }
            }

            let mut builder = IrBuilder::from_symbols(symbols, sink);
            let mut label_set = LabelSet::new();
            if uri == self.root {
                if !program.top_stmts.is_empty() {
                    label_set.merge(builder.lower_as_label(ENTRANCE_LABEL, &program.top_stmts));
                }
            } else if !program.top_stmts.is_empty() {
                // Still walked so definitions land in the symbol
                // table, but imported top-level code produces no IR.
                builder.lower_for_symbols(&program.top_stmts);
            }
            for block in &program.labels {
                let label = builder.lower_label(block);
                label_set.merge(label);
            }
            let symbols = builder.finish();

            for (name, label) in label_set.iter() {
                if label.statements.is_empty() && name != ENTRANCE_LABEL {
                    if let Some(def) = symbols.label_defs.get(name).and_then(|defs| defs.first()) {
                        let (line, column) = (def.line, def.column);
                        sink.warning(format!("Label '{}' is empty", name), line, column);
                    }
                }
            }

            self.tables.insert(symbols);
            if let Some(slot) = self.imported.get_mut(&uri) {
                *slot = label_set;
            }
            Ok(())
        })
    }

    /// Fixed order: duplicate imports, then label usages, then
    /// variable usages, each in insertion order.
    fn semantic_check(&self, sink: &mut DiagnosticSink) {
        let Some(root_table) = self.tables.get(&self.root) else {
            return;
        };

        for (target, positions) in &root_table.references {
            if positions.len() > 1 {
                let first = &positions[0];
                sink.warning(
                    format!("Duplicate import of '{}'", target),
                    first.line,
                    first.column,
                );
            }
        }

        for (name, usages) in &root_table.label_usages {
            let defs = self.tables.find_label_definition(&self.root, name);
            if defs.is_empty() {
                for usage in usages {
                    sink.error(
                        format!("Undefined label '{}'", name),
                        usage.line,
                        usage.column,
                    );
                }
            } else if defs.len() > 1 {
                for def in &defs {
                    // Local duplicates point at themselves; imported
                    // ones point at the import that brought them in.
                    let anchor = if def.source_id == self.root {
                        Some((def.line, def.column))
                    } else {
                        root_table
                            .references
                            .get(&def.source_id)
                            .and_then(|positions| positions.first())
                            .map(|p| (p.line, p.column))
                    };
                    if let Some((line, column)) = anchor {
                        sink.error(
                            format!("Duplicate label definition '{}'", name),
                            line,
                            column,
                        );
                    }
                }
            }
        }

        for (name, usages) in &root_table.variable_usages {
            if self
                .tables
                .find_variable_definition(&self.root, name)
                .is_empty()
            {
                for usage in usages {
                    sink.error(
                        format!("Undefined variable '{}'", name),
                        usage.line,
                        usage.column,
                    );
                }
            }
        }
    }
}
