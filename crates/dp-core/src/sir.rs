//! Statement intermediate representation.
//!
//! The post-lowering form handed to the runtime executor: statement
//! shapes mirror the AST but carry evaluable expression trees, and
//! every label knows which source it came from.

use crate::expr::ExprNode;
use indexmap::IndexMap;
use url::Url;

/// The reserved entrance label. Top-level statements of the root file
/// become its body; user scripts cannot spell this name.
pub const ENTRANCE_LABEL: &str = "@system/__main__";

/// One lowered statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SirStatement {
    Dialogue {
        speaker: Option<String>,
        /// Always an [`ExprNode::FString`].
        text: ExprNode,
    },
    Menu {
        items: Vec<MenuArm>,
    },
    Jump {
        target: String,
    },
    Tour {
        target: String,
    },
    Call {
        fname: String,
        args: Vec<ExprNode>,
    },
    Assign {
        name: String,
        value: ExprNode,
    },
    If {
        cond: ExprNode,
        then_body: Vec<SirStatement>,
        else_body: Vec<SirStatement>,
    },
    /// Scope-cleanup marker consumed by the runtime when it unwinds a
    /// `tour` frame.
    Pop,
}

/// One menu arm: display text plus its body.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuArm {
    pub text: ExprNode,
    pub body: Vec<SirStatement>,
}

/// A lowered label: the unit of entry for `jump` and `tour`.
#[derive(Debug, Clone, PartialEq)]
pub struct SirLabel {
    pub name: String,
    pub source_id: Url,
    pub statements: Vec<SirStatement>,
}

/// The compiled artifact: labels by name plus a designated entrance.
#[derive(Debug, Clone)]
pub struct LabelSet {
    labels: IndexMap<String, SirLabel>,
    pub entrance: String,
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelSet {
    pub fn new() -> Self {
        Self {
            labels: IndexMap::new(),
            entrance: ENTRANCE_LABEL.to_string(),
        }
    }

    /// Insert a label; a label with the same name merges by appending
    /// its statements to the existing body.
    pub fn merge(&mut self, label: SirLabel) {
        match self.labels.get_mut(&label.name) {
            Some(existing) => existing.statements.extend(label.statements),
            None => {
                self.labels.insert(label.name.clone(), label);
            }
        }
    }

    /// Absorb another set with first-wins semantics on name collision.
    pub fn extend_first_wins(&mut self, other: &LabelSet) {
        for (name, label) in &other.labels {
            if !self.labels.contains_key(name) {
                self.labels.insert(name.clone(), label.clone());
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&SirLabel> {
        self.labels.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.labels.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SirLabel)> {
        self.labels.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.labels.keys()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
