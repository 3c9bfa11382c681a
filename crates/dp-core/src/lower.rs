//! Parse tree to SIR lowering.
//!
//! The [`IrBuilder`] walks the parse tree by node kind, producing
//! statement IR with evaluable expression trees inside, and filling
//! the file's symbol table as it goes: label definitions and usages,
//! variable definitions and usages, each tagged with the label whose
//! body contained it.

use crate::diagnostic::DiagnosticSink;
use crate::expr::{BinaryOp, ExprNode, UnaryOp, Value, EMBED_PLACEHOLDER};
use crate::sir::{MenuArm, SirLabel, SirStatement};
use crate::symbols::{FileSymbolTable, SymbolPosition};
use crate::syntax::ast::{Expr, FStringLit, LabelBlock, Pos, Stmt};
use crate::token::{Token, TokenKind};
use url::Url;

/// Lowers one file's parse tree; owns that file's symbol table until
/// [`finish`](IrBuilder::finish).
pub struct IrBuilder<'s> {
    source_id: Url,
    symbols: FileSymbolTable,
    sink: &'s mut DiagnosticSink,
    current_label: Option<String>,
}

impl<'s> IrBuilder<'s> {
    pub fn new(source_id: Url, sink: &'s mut DiagnosticSink) -> Self {
        Self {
            symbols: FileSymbolTable::new(source_id.clone()),
            source_id,
            sink,
            current_label: None,
        }
    }

    /// Continue lowering into an existing table (the session records
    /// import references before lowering starts).
    pub fn from_symbols(symbols: FileSymbolTable, sink: &'s mut DiagnosticSink) -> Self {
        Self {
            source_id: symbols.source_id.clone(),
            symbols,
            sink,
            current_label: None,
        }
    }

    pub fn finish(self) -> FileSymbolTable {
        self.symbols
    }

    /// Lower a label block, recording its definition.
    pub fn lower_label(&mut self, block: &LabelBlock) -> SirLabel {
        let name = block.name.lexeme.clone();
        self.symbols.add_label_def(
            &name,
            SymbolPosition::new(self.source_id.clone(), None, Pos::of(&block.name)),
        );
        self.current_label = Some(name.clone());
        let statements = self.lower_statements(&block.statements);
        self.current_label = None;
        SirLabel {
            name,
            source_id: self.source_id.clone(),
            statements,
        }
    }

    /// Lower statements as the body of `label_name` (used for the
    /// synthesized entrance label of the root file).
    pub fn lower_as_label(&mut self, label_name: &str, statements: &[Stmt]) -> SirLabel {
        self.current_label = Some(label_name.to_string());
        let lowered = self.lower_statements(statements);
        self.current_label = None;
        SirLabel {
            name: label_name.to_string(),
            source_id: self.source_id.clone(),
            statements: lowered,
        }
    }

    /// Lower statements only for their symbol-table effects (top-level
    /// statements of imported files never become IR).
    pub fn lower_for_symbols(&mut self, statements: &[Stmt]) {
        let _ = self.lower_statements(statements);
    }

    pub fn lower_statements(&mut self, statements: &[Stmt]) -> Vec<SirStatement> {
        statements.iter().map(|s| self.lower_stmt(s)).collect()
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> SirStatement {
        match stmt {
            Stmt::Dialogue { speaker, text, .. } => SirStatement::Dialogue {
                speaker: speaker.as_ref().map(|t| t.lexeme.clone()),
                text: self.lower_fstring(text),
            },
            Stmt::Menu { items, .. } => SirStatement::Menu {
                items: items
                    .iter()
                    .map(|item| MenuArm {
                        text: self.lower_fstring(&item.text),
                        body: self.lower_statements(&item.body),
                    })
                    .collect(),
            },
            Stmt::Jump { target, .. } => {
                self.record_label_usage(target);
                SirStatement::Jump {
                    target: target.lexeme.clone(),
                }
            }
            Stmt::Tour { target, .. } => {
                self.record_label_usage(target);
                SirStatement::Tour {
                    target: target.lexeme.clone(),
                }
            }
            Stmt::Call { fname, args, .. } => SirStatement::Call {
                fname: fname.lexeme.clone(),
                args: args.iter().map(|a| self.lower_expr(a)).collect(),
            },
            Stmt::Assign { var, op, value, .. } => self.lower_assign(var, op, value),
            Stmt::If {
                cond,
                then_body,
                else_body,
                ..
            } => SirStatement::If {
                cond: self.lower_expr(cond),
                then_body: self.lower_statements(then_body),
                else_body: self.lower_statements(else_body),
            },
        }
    }

    /// `$var op= value` defines `var` at the variable token and uses it
    /// at the value; compound operators desugar to `var op value`.
    fn lower_assign(&mut self, var: &Token, op: &Token, value: &Expr) -> SirStatement {
        let name = strip_variable_name(&var.lexeme);
        self.symbols.add_variable_def(
            &name,
            SymbolPosition::new(
                self.source_id.clone(),
                self.current_label.clone(),
                Pos::of(var),
            ),
        );
        self.symbols.add_variable_usage(
            &name,
            SymbolPosition::new(self.source_id.clone(), self.current_label.clone(), value.pos()),
        );
        let value_tree = self.lower_expr(value);
        let value_tree = match assign_binary_op(op.kind) {
            Some(binop) => ExprNode::Binary {
                op: binop,
                left: Box::new(ExprNode::Variable(name.clone())),
                right: Box::new(value_tree),
            },
            None => value_tree,
        };
        SirStatement::Assign {
            name,
            value: value_tree,
        }
    }

    fn lower_expr(&mut self, expr: &Expr) -> ExprNode {
        match expr {
            Expr::Literal(token) => ExprNode::Constant(self.lower_literal(token)),
            Expr::Variable(token) => {
                let name = strip_variable_name(&token.lexeme);
                self.symbols.add_variable_usage(
                    &name,
                    SymbolPosition::new(
                        self.source_id.clone(),
                        self.current_label.clone(),
                        Pos::of(token),
                    ),
                );
                ExprNode::Variable(name)
            }
            Expr::FString(fstring) => self.lower_fstring(fstring),
            Expr::EmbedCall { fname, args, .. } => ExprNode::EmbedCall {
                fname: fname.lexeme.clone(),
                args: args.iter().map(|a| self.lower_expr(a)).collect(),
            },
            Expr::Unary { op, operand, .. } => ExprNode::Unary {
                op: match op.kind {
                    TokenKind::Minus => UnaryOp::Neg,
                    TokenKind::Plus => UnaryOp::Pos,
                    _ => UnaryOp::Not,
                },
                operand: Box::new(self.lower_expr(operand)),
            },
            Expr::Binary { op, left, right, .. } => ExprNode::Binary {
                op: binary_op(op.kind),
                left: Box::new(self.lower_expr(left)),
                right: Box::new(self.lower_expr(right)),
            },
        }
    }

    /// Numbers lex as floats (invariant culture); booleans are the two
    /// keywords.
    fn lower_literal(&mut self, token: &Token) -> Value {
        match token.kind {
            TokenKind::Number => match token.lexeme.parse::<f64>() {
                Ok(v) => Value::Float(v),
                Err(_) => {
                    self.sink.error(
                        format!("Invalid number literal '{}'", token.lexeme),
                        token.line,
                        token.column,
                    );
                    Value::Float(0.0)
                }
            },
            _ => Value::Bool(token.lexeme == "true"),
        }
    }

    /// Fragment tokens become plain strings: content verbatim, escapes
    /// resolved, placeholders as the embed sentinel.
    fn lower_fstring(&mut self, fstring: &FStringLit) -> ExprNode {
        let fragments: Vec<String> = fstring
            .fragments
            .iter()
            .map(|token| match token.kind {
                TokenKind::FstringContent => token.lexeme.clone(),
                TokenKind::FstringEscape => resolve_escape(&token.lexeme).to_string(),
                _ => EMBED_PLACEHOLDER.to_string(),
            })
            .collect();
        let embeds: Vec<ExprNode> = fstring.embeds.iter().map(|e| self.lower_expr(e)).collect();
        debug_assert_eq!(
            fragments.iter().filter(|f| *f == EMBED_PLACEHOLDER).count(),
            embeds.len(),
            "one placeholder per embed"
        );
        ExprNode::FString { fragments, embeds }
    }

    fn record_label_usage(&mut self, target: &Token) {
        self.symbols.add_label_usage(
            &target.lexeme,
            SymbolPosition::new(
                self.source_id.clone(),
                self.current_label.clone(),
                Pos::of(target),
            ),
        );
    }
}

/// `$name` or `$global.name` without the `$`; the `global.` prefix
/// stays in the stored name (scoping is the runtime's concern).
fn strip_variable_name(lexeme: &str) -> String {
    lexeme.strip_prefix('$').unwrap_or(lexeme).to_string()
}

fn assign_binary_op(kind: TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::PlusAssign => Some(BinaryOp::Add),
        TokenKind::MinusAssign => Some(BinaryOp::Sub),
        TokenKind::MultiplyAssign => Some(BinaryOp::Mul),
        TokenKind::DivideAssign => Some(BinaryOp::Div),
        TokenKind::ModuloAssign => Some(BinaryOp::Mod),
        TokenKind::PowerAssign => Some(BinaryOp::Pow),
        _ => None,
    }
}

fn binary_op(kind: TokenKind) -> BinaryOp {
    match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Multiply => BinaryOp::Mul,
        TokenKind::Divide => BinaryOp::Div,
        TokenKind::Modulo => BinaryOp::Mod,
        TokenKind::Power => BinaryOp::Pow,
        TokenKind::Equal => BinaryOp::Eq,
        TokenKind::NotEqual => BinaryOp::Ne,
        TokenKind::Less => BinaryOp::Lt,
        TokenKind::LessEqual => BinaryOp::Le,
        TokenKind::Greater => BinaryOp::Gt,
        TokenKind::GreaterEqual => BinaryOp::Ge,
        TokenKind::And => BinaryOp::And,
        _ => BinaryOp::Or,
    }
}

fn resolve_escape(lexeme: &str) -> &'static str {
    match lexeme {
        "\\n" => "\n",
        "\\r" => "\r",
        "\\t" => "\t",
        "\\\"" => "\"",
        "\\\\" => "\\",
        "{{" => "{",
        "}}" => "}",
        _ => "",
    }
}
