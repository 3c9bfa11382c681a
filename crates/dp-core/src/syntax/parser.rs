//! Recursive-descent parser.
//!
//! Works over the materialized token vector with one token of
//! lookahead, plus a single unbounded scan ("is there a colon before
//! the next linebreak") that tells a menu item apart from a dialogue
//! that merely starts with an f-string.
//!
//! The parser is total: it always returns a [`Program`]. The recovery
//! unit is one statement: a failed statement reports one diagnostic
//! and skips past the next linebreak, then the enclosing block loop
//! re-enters. Recovery never unwinds past a block boundary.

use crate::diagnostic::DiagnosticSink;
use crate::expr::EMBED_PLACEHOLDER;
use crate::syntax::ast::{Expr, FStringLit, Import, LabelBlock, MenuItem, Pos, Program, Stmt};
use crate::token::{Token, TokenKind};

/// Abandons the current statement; the diagnostic is already reported.
struct ParseAbort;

type Fallible<T> = Result<T, ParseAbort>;

/// Parse a token vector into a program, reporting errors to `sink`.
pub fn parse(tokens: Vec<Token>, sink: &mut DiagnosticSink) -> Program {
    Parser::new(tokens, sink).parse_program()
}

struct Parser<'s> {
    tokens: Vec<Token>,
    pos: usize,
    sink: &'s mut DiagnosticSink,
}

impl<'s> Parser<'s> {
    fn new(tokens: Vec<Token>, sink: &'s mut DiagnosticSink) -> Self {
        debug_assert!(matches!(tokens.last(), Some(t) if t.kind == TokenKind::Eof));
        Self { tokens, pos: 0, sink }
    }

    // ------------------------------------------------------------------
    // Token cursor
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> Fallible<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            self.error_here(format!(
                "Expected {} {}, found {}",
                kind.describe(),
                context,
                self.peek_kind().describe()
            ));
            Err(ParseAbort)
        }
    }

    fn error_here(&mut self, message: String) {
        let token = self.peek();
        let (line, column) = (token.line, token.column);
        self.sink.error(message, line, column);
    }

    /// Per-statement recovery: skip to the next linebreak and consume it.
    fn recover_to_linebreak(&mut self) {
        while !matches!(self.peek_kind(), TokenKind::Linebreak | TokenKind::Eof) {
            self.advance();
        }
        self.eat(TokenKind::Linebreak);
    }

    /// The menu lookahead: scans to the next linebreak for a colon.
    fn colon_before_linebreak(&self) -> bool {
        for token in &self.tokens[self.pos..] {
            match token.kind {
                TokenKind::Colon => return true,
                TokenKind::Linebreak | TokenKind::Eof => return false,
                _ => {}
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Program structure
    // ------------------------------------------------------------------

    fn parse_program(mut self) -> Program {
        let mut program = Program::default();
        loop {
            match self.peek_kind() {
                TokenKind::Eof => break,
                TokenKind::Linebreak => {
                    self.advance();
                }
                TokenKind::Import => match self.parse_import() {
                    Ok(import) => program.imports.push(import),
                    Err(ParseAbort) => self.recover_to_linebreak(),
                },
                TokenKind::Label => match self.parse_label_block() {
                    Ok(label) => program.labels.push(label),
                    Err(ParseAbort) => self.recover_to_linebreak(),
                },
                TokenKind::Indent | TokenKind::Dedent => {
                    self.error_here("Unexpected indentation at top level".to_string());
                    self.advance();
                }
                // Already reported by the lexer.
                TokenKind::Error => {
                    self.advance();
                }
                _ => match self.parse_stmt() {
                    Ok(stmt) => program.top_stmts.push(stmt),
                    Err(ParseAbort) => self.recover_to_linebreak(),
                },
            }
        }
        program
    }

    fn parse_import(&mut self) -> Fallible<Import> {
        self.expect(TokenKind::Import, "to start an import")?;
        let path = self.expect(TokenKind::Path, "after 'import'")?;
        self.expect(TokenKind::Linebreak, "after the import path")?;
        Ok(Import { path })
    }

    fn parse_label_block(&mut self) -> Fallible<LabelBlock> {
        let keyword = self.expect(TokenKind::Label, "to start a label")?;
        let name = self.expect(TokenKind::Identifier, "as the label name")?;
        self.expect(TokenKind::Colon, "after the label name")?;
        self.expect(TokenKind::Linebreak, "after the label header")?;
        let statements = self.parse_block()?;
        Ok(LabelBlock {
            name,
            statements,
            pos: Pos::of(&keyword),
        })
    }

    /// An indented statement block. Statement errors recover inside
    /// the loop; only a missing `Indent` aborts the caller.
    fn parse_block(&mut self) -> Fallible<Vec<Stmt>> {
        self.expect(TokenKind::Indent, "to open the block")?;
        let mut statements = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::Dedent => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => break,
                TokenKind::Linebreak | TokenKind::Error => {
                    self.advance();
                }
                _ => match self.parse_stmt() {
                    Ok(stmt) => statements.push(stmt),
                    Err(ParseAbort) => self.recover_to_linebreak(),
                },
            }
        }
        Ok(statements)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_stmt(&mut self) -> Fallible<Stmt> {
        match self.peek_kind() {
            TokenKind::Jump => {
                let keyword = self.advance();
                let target = self.expect(TokenKind::Identifier, "as the jump target")?;
                self.expect(TokenKind::Linebreak, "after the jump target")?;
                Ok(Stmt::Jump {
                    target,
                    pos: Pos::of(&keyword),
                })
            }
            TokenKind::Tour => {
                let keyword = self.advance();
                let target = self.expect(TokenKind::Identifier, "as the tour target")?;
                self.expect(TokenKind::Linebreak, "after the tour target")?;
                Ok(Stmt::Tour {
                    target,
                    pos: Pos::of(&keyword),
                })
            }
            TokenKind::Call => {
                let keyword = self.advance();
                let (fname, args) = self.parse_call_signature()?;
                self.expect(TokenKind::Linebreak, "after the call")?;
                Ok(Stmt::Call {
                    fname,
                    args,
                    pos: Pos::of(&keyword),
                })
            }
            TokenKind::If => self.parse_if(),
            TokenKind::Variable => {
                let var = self.advance();
                if !self.peek_kind().is_assign_op() {
                    self.error_here(format!(
                        "Expected an assignment operator after '{}', found {}",
                        var.lexeme,
                        self.peek_kind().describe()
                    ));
                    return Err(ParseAbort);
                }
                let op = self.advance();
                let value = self.parse_expression()?;
                self.expect(TokenKind::Linebreak, "after the assignment")?;
                Ok(Stmt::Assign {
                    pos: Pos::of(&var),
                    var,
                    op,
                    value,
                })
            }
            TokenKind::Identifier => {
                let speaker = self.advance();
                let text = self.parse_fstring()?;
                self.expect(TokenKind::Linebreak, "after the dialogue")?;
                Ok(Stmt::Dialogue {
                    pos: Pos::of(&speaker),
                    speaker: Some(speaker),
                    text,
                })
            }
            TokenKind::FstringQuote => {
                if self.colon_before_linebreak() {
                    self.parse_menu()
                } else {
                    let text = self.parse_fstring()?;
                    self.expect(TokenKind::Linebreak, "after the dialogue")?;
                    Ok(Stmt::Dialogue {
                        pos: text.pos,
                        speaker: None,
                        text,
                    })
                }
            }
            other => {
                self.error_here(format!("Unexpected {}", other.describe()));
                Err(ParseAbort)
            }
        }
    }

    fn parse_if(&mut self) -> Fallible<Stmt> {
        let keyword = self.advance();
        debug_assert!(matches!(keyword.kind, TokenKind::If | TokenKind::Elif));
        let cond = self.parse_expression()?;
        self.expect(TokenKind::Colon, "after the condition")?;
        self.expect(TokenKind::Linebreak, "after the condition")?;
        let then_body = self.parse_block()?;
        let else_body = self.parse_else_tail()?;
        Ok(Stmt::If {
            cond,
            then_body,
            else_body,
            pos: Pos::of(&keyword),
        })
    }

    /// `elif` folds into a nested `If` carried in the else branch.
    fn parse_else_tail(&mut self) -> Fallible<Vec<Stmt>> {
        match self.peek_kind() {
            TokenKind::Elif => Ok(vec![self.parse_if()?]),
            TokenKind::Else => {
                self.advance();
                self.expect(TokenKind::Colon, "after 'else'")?;
                self.expect(TokenKind::Linebreak, "after 'else:'")?;
                self.parse_block()
            }
            _ => Ok(Vec::new()),
        }
    }

    fn parse_menu(&mut self) -> Fallible<Stmt> {
        let pos = Pos::of(self.peek());
        let mut items = Vec::new();
        loop {
            let text = self.parse_fstring()?;
            self.expect(TokenKind::Colon, "after the menu item text")?;
            self.expect(TokenKind::Linebreak, "after the menu item header")?;
            let body = self.parse_block()?;
            items.push(MenuItem { text, body });

            if !(self.check(TokenKind::FstringQuote) && self.colon_before_linebreak()) {
                break;
            }
        }
        Ok(Stmt::Menu { items, pos })
    }

    /// `name(arg, ...)`, shared by call statements and embedded calls.
    fn parse_call_signature(&mut self) -> Fallible<(Token, Vec<Expr>)> {
        let fname = self.expect(TokenKind::Identifier, "as the function name")?;
        self.expect(TokenKind::LeftParen, "after the function name")?;
        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                args.push(self.parse_expression()?);
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen, "to close the argument list")?;
        Ok((fname, args))
    }

    // ------------------------------------------------------------------
    // F-strings
    // ------------------------------------------------------------------

    fn parse_fstring(&mut self) -> Fallible<FStringLit> {
        let open = self.expect(TokenKind::FstringQuote, "to open the string")?;
        let pos = Pos::of(&open);
        let mut fragments = Vec::new();
        let mut embeds = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::FstringContent | TokenKind::FstringEscape => {
                    fragments.push(self.advance());
                }
                TokenKind::LeftBrace => {
                    let brace = self.advance();
                    let embed = if self.check(TokenKind::Call) {
                        self.parse_embed_call()?
                    } else {
                        self.parse_expression()?
                    };
                    self.expect(TokenKind::RightBrace, "to close the embedded expression")?;
                    fragments.push(Token::new(
                        TokenKind::PlaceHolder,
                        EMBED_PLACEHOLDER,
                        brace.line,
                        brace.column,
                    ));
                    embeds.push(embed);
                }
                TokenKind::FstringQuote => {
                    self.advance();
                    break;
                }
                _ => {
                    self.error_here("Unterminated string literal".to_string());
                    return Err(ParseAbort);
                }
            }
        }
        Ok(FStringLit {
            fragments,
            embeds,
            pos,
        })
    }

    fn parse_embed_call(&mut self) -> Fallible<Expr> {
        let keyword = self.expect(TokenKind::Call, "to start the embedded call")?;
        let (fname, args) = self.parse_call_signature()?;
        Ok(Expr::EmbedCall {
            fname,
            args,
            pos: Pos::of(&keyword),
        })
    }

    // ------------------------------------------------------------------
    // Expressions, lowest precedence first
    // ------------------------------------------------------------------

    fn parse_expression(&mut self) -> Fallible<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Fallible<Expr> {
        let mut left = self.parse_and()?;
        while self.check(TokenKind::Or) {
            let op = self.advance();
            let right = self.parse_and()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Fallible<Expr> {
        let mut left = self.parse_equality()?;
        while self.check(TokenKind::And) {
            let op = self.advance();
            let right = self.parse_equality()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Fallible<Expr> {
        let mut left = self.parse_comparison()?;
        while matches!(self.peek_kind(), TokenKind::Equal | TokenKind::NotEqual) {
            let op = self.advance();
            let right = self.parse_comparison()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Fallible<Expr> {
        let mut left = self.parse_additive()?;
        while matches!(
            self.peek_kind(),
            TokenKind::Less | TokenKind::LessEqual | TokenKind::Greater | TokenKind::GreaterEqual
        ) {
            let op = self.advance();
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Fallible<Expr> {
        let mut left = self.parse_multiplicative()?;
        while matches!(self.peek_kind(), TokenKind::Plus | TokenKind::Minus) {
            let op = self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Fallible<Expr> {
        let mut left = self.parse_power()?;
        while matches!(
            self.peek_kind(),
            TokenKind::Multiply | TokenKind::Divide | TokenKind::Modulo
        ) {
            let op = self.advance();
            let right = self.parse_power()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    /// Right-associative: `2 ** 3 ** 2` is `2 ** (3 ** 2)`.
    fn parse_power(&mut self) -> Fallible<Expr> {
        let base = self.parse_unary()?;
        if self.check(TokenKind::Power) {
            let op = self.advance();
            let exponent = self.parse_power()?;
            return Ok(binary(op, base, exponent));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Fallible<Expr> {
        if matches!(
            self.peek_kind(),
            TokenKind::Minus | TokenKind::Plus | TokenKind::Not
        ) {
            let op = self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                pos: Pos::of(&op),
                op,
                operand: Box::new(operand),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Fallible<Expr> {
        match self.peek_kind() {
            TokenKind::Number | TokenKind::Boolean => Ok(Expr::Literal(self.advance())),
            TokenKind::Variable => Ok(Expr::Variable(self.advance())),
            TokenKind::FstringQuote => Ok(Expr::FString(self.parse_fstring()?)),
            TokenKind::LeftBrace => {
                self.advance();
                let inner = if self.check(TokenKind::Call) {
                    self.parse_embed_call()?
                } else {
                    self.parse_expression()?
                };
                self.expect(TokenKind::RightBrace, "to close the embedded expression")?;
                Ok(inner)
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RightParen, "to close the group")?;
                Ok(inner)
            }
            other => {
                self.error_here(format!("Expected an expression, found {}", other.describe()));
                Err(ParseAbort)
            }
        }
    }
}

fn binary(op: Token, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        pos: left.pos(),
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_source(source: &str) -> (Program, DiagnosticSink) {
        let mut sink = DiagnosticSink::new();
        let tokens = lex(source, &mut sink);
        let program = parse(tokens, &mut sink);
        (program, sink)
    }

    fn parse_ok(source: &str) -> Program {
        let (program, sink) = parse_source(source);
        assert!(!sink.has_errors(), "unexpected diagnostics:\n{}", sink.render("<test>"));
        program
    }

    #[test]
    fn labels_and_jumps() {
        let program = parse_ok(
            "label start:\n    Alice \"hello\"\n    jump other\nlabel other:\n    Bob \"world\"\n",
        );
        assert_eq!(program.labels.len(), 2);
        assert_eq!(program.labels[0].name.lexeme, "start");
        assert_eq!(program.labels[0].statements.len(), 2);
        assert!(matches!(program.labels[0].statements[1], Stmt::Jump { .. }));
        assert!(program.top_stmts.is_empty());
    }

    #[test]
    fn dialogue_without_speaker() {
        let program = parse_ok("label a:\n    \"just text\"\n");
        match &program.labels[0].statements[0] {
            Stmt::Dialogue { speaker, text, .. } => {
                assert!(speaker.is_none());
                assert_eq!(text.fragments.len(), 1);
            }
            other => panic!("expected dialogue, got {:?}", other),
        }
    }

    #[test]
    fn menu_vs_dialogue_disambiguation() {
        let program = parse_ok(
            "label a:\n    \"choose:\"\n    \"yes\":\n        jump a\n    \"no\":\n        jump a\n",
        );
        let stmts = &program.labels[0].statements;
        assert_eq!(stmts.len(), 2, "a dialogue then one menu");
        match &stmts[0] {
            Stmt::Dialogue { text, .. } => {
                assert_eq!(text.fragments[0].lexeme, "choose:");
            }
            other => panic!("expected dialogue, got {:?}", other),
        }
        match &stmts[1] {
            Stmt::Menu { items, .. } => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[0].text.fragments[0].lexeme, "yes");
                assert_eq!(items[1].text.fragments[0].lexeme, "no");
                assert_eq!(items[0].body.len(), 1);
            }
            other => panic!("expected menu, got {:?}", other),
        }
    }

    #[test]
    fn if_else_blocks() {
        let program = parse_ok(
            "label a:\n    if $x == 1:\n        Alice \"one\"\n    else:\n        Alice \"other\"\n",
        );
        match &program.labels[0].statements[0] {
            Stmt::If {
                cond,
                then_body,
                else_body,
                ..
            } => {
                assert!(matches!(cond, Expr::Binary { .. }));
                assert_eq!(then_body.len(), 1);
                assert_eq!(else_body.len(), 1);
                assert!(matches!(then_body[0], Stmt::Dialogue { .. }));
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn elif_folds_into_nested_if() {
        let program = parse_ok(
            "label a:\n    if $x == 1:\n        Alice \"one\"\n    elif $x == 2:\n        Alice \"two\"\n    else:\n        Alice \"many\"\n",
        );
        match &program.labels[0].statements[0] {
            Stmt::If { else_body, .. } => {
                assert_eq!(else_body.len(), 1);
                match &else_body[0] {
                    Stmt::If {
                        then_body,
                        else_body,
                        ..
                    } => {
                        assert_eq!(then_body.len(), 1);
                        assert_eq!(else_body.len(), 1);
                    }
                    other => panic!("expected nested if, got {:?}", other),
                }
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn assignment_operators() {
        let program = parse_ok("$x = 1\n$y += 2\n$global.z **= 3\n");
        assert_eq!(program.top_stmts.len(), 3);
        match &program.top_stmts[2] {
            Stmt::Assign { var, op, .. } => {
                assert_eq!(var.lexeme, "$global.z");
                assert_eq!(op.kind, TokenKind::PowerAssign);
            }
            other => panic!("expected assign, got {:?}", other),
        }
    }

    #[test]
    fn call_statement_with_args() {
        let program = parse_ok("call greet($name, 1 + 2, \"hi\")\n");
        match &program.top_stmts[0] {
            Stmt::Call { fname, args, .. } => {
                assert_eq!(fname.lexeme, "greet");
                assert_eq!(args.len(), 3);
                assert!(matches!(args[1], Expr::Binary { .. }));
                assert!(matches!(args[2], Expr::FString(_)));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn fstring_embed_placeholders() {
        let program = parse_ok("Alice \"score: {call add($x, 1)}\"\n");
        match &program.top_stmts[0] {
            Stmt::Dialogue { text, .. } => {
                assert_eq!(text.fragments.len(), 2);
                assert_eq!(text.fragments[0].kind, TokenKind::FstringContent);
                assert_eq!(text.fragments[1].kind, TokenKind::PlaceHolder);
                assert_eq!(text.embeds.len(), 1);
                match &text.embeds[0] {
                    Expr::EmbedCall { fname, args, .. } => {
                        assert_eq!(fname.lexeme, "add");
                        assert_eq!(args.len(), 2);
                    }
                    other => panic!("expected embed call, got {:?}", other),
                }
            }
            other => panic!("expected dialogue, got {:?}", other),
        }
    }

    #[test]
    fn placeholder_count_matches_embeds() {
        let program = parse_ok("\"{$a} and {$b} and {$c}\"\n");
        match &program.top_stmts[0] {
            Stmt::Dialogue { text, .. } => {
                let placeholders = text
                    .fragments
                    .iter()
                    .filter(|t| t.kind == TokenKind::PlaceHolder)
                    .count();
                assert_eq!(placeholders, text.embeds.len());
                assert_eq!(placeholders, 3);
            }
            other => panic!("expected dialogue, got {:?}", other),
        }
    }

    #[test]
    fn precedence_and_associativity() {
        let program = parse_ok("$r = 1 + 2 * 3 ** 2 ** 2 == 163 and not false\n");
        // Shape only: and(==(+(1, *(2, **(3, **(2, 2)))), 163), not(false))
        match &program.top_stmts[0] {
            Stmt::Assign { value, .. } => match value {
                Expr::Binary { op, left, .. } => {
                    assert_eq!(op.kind, TokenKind::And);
                    match left.as_ref() {
                        Expr::Binary { op, .. } => assert_eq!(op.kind, TokenKind::Equal),
                        other => panic!("expected ==, got {:?}", other),
                    }
                }
                other => panic!("expected binary, got {:?}", other),
            },
            other => panic!("expected assign, got {:?}", other),
        }
    }

    #[test]
    fn imports_collected() {
        let program = parse_ok("import common.dp\nimport sub/more.dp\nlabel a:\n    jump b\n");
        assert_eq!(program.imports.len(), 2);
        assert_eq!(program.imports[0].path.lexeme, "common.dp");
        assert_eq!(program.imports[1].path.lexeme, "sub/more.dp");
    }

    #[test]
    fn statement_error_recovers_to_next_line() {
        let (program, sink) = parse_source(
            "label a:\n    jump\n    jump 5\n    Alice \"still here\"\n",
        );
        assert_eq!(sink.error_count(), 2, "{}", sink.render("<test>"));
        // The block survived and kept the good statement.
        assert_eq!(program.labels.len(), 1);
        assert_eq!(program.labels[0].statements.len(), 1);
        assert!(matches!(
            program.labels[0].statements[0],
            Stmt::Dialogue { .. }
        ));
    }

    #[test]
    fn parser_is_total_on_garbage() {
        let (_, sink) = parse_source("label\n)))\n    :\njump jump\n");
        assert!(sink.has_errors());
        // No panic and a program came back: totality.
    }

    #[test]
    fn error_position_points_at_offending_token() {
        let (_, sink) = parse_source("label a:\n    jump 5\n");
        let diag = sink.iter().next().unwrap();
        assert_eq!((diag.line, diag.column), (2, 10));
    }
}
