//! Per-file symbol tables and cross-file lookups.
//!
//! Each compiled file gets a [`FileSymbolTable`] recording where
//! labels and variables are defined and used, plus the one-hop import
//! edges (`references`). The [`SymbolTables`] manager resolves
//! definitions across a file and the files it references, never
//! transitively, which is what lets import cycles stay harmless.

use crate::syntax::ast::Pos;
use indexmap::IndexMap;
use serde::Serialize;
use url::Url;

/// Where a symbol was defined or used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolPosition {
    pub source_id: Url,
    /// The label whose body contained the occurrence, when any.
    pub label: Option<String>,
    pub line: u32,
    pub column: u32,
}

impl SymbolPosition {
    pub fn new(source_id: Url, label: Option<String>, pos: Pos) -> Self {
        Self {
            source_id,
            label,
            line: pos.line,
            column: pos.column,
        }
    }
}

/// Symbol occurrences for one source file, in insertion order.
#[derive(Debug, Clone)]
pub struct FileSymbolTable {
    pub source_id: Url,
    pub label_defs: IndexMap<String, Vec<SymbolPosition>>,
    pub variable_defs: IndexMap<String, Vec<SymbolPosition>>,
    pub label_usages: IndexMap<String, Vec<SymbolPosition>>,
    pub variable_usages: IndexMap<String, Vec<SymbolPosition>>,
    /// Import edges: target URI to the positions of the import tokens
    /// in this file. More than one position means a duplicate import.
    pub references: IndexMap<Url, Vec<SymbolPosition>>,
}

impl FileSymbolTable {
    pub fn new(source_id: Url) -> Self {
        Self {
            source_id,
            label_defs: IndexMap::new(),
            variable_defs: IndexMap::new(),
            label_usages: IndexMap::new(),
            variable_usages: IndexMap::new(),
            references: IndexMap::new(),
        }
    }

    pub fn add_label_def(&mut self, name: &str, position: SymbolPosition) {
        self.label_defs.entry(name.to_string()).or_default().push(position);
    }

    pub fn add_variable_def(&mut self, name: &str, position: SymbolPosition) {
        self.variable_defs.entry(name.to_string()).or_default().push(position);
    }

    pub fn add_label_usage(&mut self, name: &str, position: SymbolPosition) {
        self.label_usages.entry(name.to_string()).or_default().push(position);
    }

    pub fn add_variable_usage(&mut self, name: &str, position: SymbolPosition) {
        self.variable_usages.entry(name.to_string()).or_default().push(position);
    }

    pub fn add_reference(&mut self, target: Url, position: SymbolPosition) {
        self.references.entry(target).or_default().push(position);
    }
}

/// All known file tables, keyed by canonical source URI.
#[derive(Debug, Default)]
pub struct SymbolTables {
    tables: IndexMap<Url, FileSymbolTable>,
}

impl SymbolTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the table for a file.
    pub fn insert(&mut self, table: FileSymbolTable) {
        self.tables.insert(table.source_id.clone(), table);
    }

    pub fn get(&self, source_id: &Url) -> Option<&FileSymbolTable> {
        self.tables.get(source_id)
    }

    /// Absorb another manager's tables, replacing per-URI entries.
    pub fn merge_from(&mut self, other: SymbolTables) {
        for (uri, table) in other.tables {
            self.tables.insert(uri, table);
        }
    }

    /// Definitions of `name` visible from `root`: the root file plus
    /// every file it references, one hop only.
    pub fn find_label_definition(&self, root: &Url, name: &str) -> Vec<SymbolPosition> {
        self.collect(root, |table| table.label_defs.get(name))
    }

    /// Same one-hop rule as [`find_label_definition`](Self::find_label_definition).
    pub fn find_variable_definition(&self, root: &Url, name: &str) -> Vec<SymbolPosition> {
        self.collect(root, |table| table.variable_defs.get(name))
    }

    fn collect<'a>(
        &'a self,
        root: &Url,
        select: impl Fn(&'a FileSymbolTable) -> Option<&'a Vec<SymbolPosition>>,
    ) -> Vec<SymbolPosition> {
        let mut out = Vec::new();
        let Some(root_table) = self.tables.get(root) else {
            return out;
        };
        if let Some(found) = select(root_table) {
            out.extend(found.iter().cloned());
        }
        for target in root_table.references.keys() {
            if target == root {
                continue;
            }
            if let Some(table) = self.tables.get(target) {
                if let Some(found) = select(table) {
                    out.extend(found.iter().cloned());
                }
            }
        }
        out
    }
}
