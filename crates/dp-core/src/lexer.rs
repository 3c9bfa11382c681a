//! Mode-stacked, indentation-tracking lexer.
//!
//! Lexing is line-oriented: each line's leading whitespace is measured
//! before its body is tokenized, so `Indent`/`Dedent` tokens are in
//! place before the parser ever looks at the line. Within a line the
//! active lexical mode decides which matchers apply:
//!
//! - `Default`: the full statement grammar. `"` opens an f-string,
//!   `import` switches the rest of the line to path lexing.
//! - `Fstring`: inside a quoted literal; content runs, escapes, `{`
//!   opening an embed, `"` closing the literal.
//! - `Embed`: the expression sub-grammar inside `{...}`; no assignment
//!   operators, no keywords except `call`.
//! - `Path`: the remainder of an `import` line as one trimmed token.
//!
//! A linebreak unwinds the mode stack back to `Default`: one pop from
//! `Fstring` or `Path`, a pop-pair from `Embed` (the embed plus the
//! f-string that pushed it). The bottom `Default` is never popped.

use crate::diagnostic::{DiagnosticSink, SpanRange};
use crate::token::{Token, TokenKind};

/// Lexical modes; the stack starts as `[Default]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Default,
    Fstring,
    Path,
    Embed,
}

/// Lex a whole source into a token vector ending in exactly one `Eof`.
///
/// The lexer never fails: unrecognized input becomes `Error` tokens
/// with diagnostics, and an inconsistent dedent reports a fatal
/// diagnostic and stops lexing the rest of the file.
pub fn lex(source: &str, sink: &mut DiagnosticSink) -> Vec<Token> {
    Lexer::new(sink).run(source)
}

struct Lexer<'s> {
    sink: &'s mut DiagnosticSink,
    modes: Vec<Mode>,
    /// Open indentation levels; the bottom 0 stays forever.
    indents: Vec<u32>,
    tokens: Vec<Token>,
    fatal: bool,
    // Current run of unrecognized characters, flushed as one Error
    // token on the next successful match or at line end.
    err_buf: String,
    err_line: u32,
    err_col: u32,
}

impl<'s> Lexer<'s> {
    fn new(sink: &'s mut DiagnosticSink) -> Self {
        Self {
            sink,
            modes: vec![Mode::Default],
            indents: vec![0],
            tokens: Vec::new(),
            fatal: false,
            err_buf: String::new(),
            err_line: 0,
            err_col: 0,
        }
    }

    fn run(mut self, source: &str) -> Vec<Token> {
        let mut line_count = 0u32;
        let mut last_width = 0u32;
        for (idx, line) in source.lines().enumerate() {
            if self.fatal {
                break;
            }
            line_count = idx as u32 + 1;
            last_width = line.chars().count() as u32;
            self.lex_line(line_count, line);
        }

        let eof_line = line_count.max(1);
        while *self.indents.last().expect("indent stack is never empty") > 0 {
            self.indents.pop();
            self.push(TokenKind::Dedent, "", eof_line, 1);
        }
        let eof_col = if self.fatal { 1 } else { last_width + 1 };
        self.push(TokenKind::Eof, "", eof_line, eof_col);
        self.tokens
    }

    fn mode(&self) -> Mode {
        *self.modes.last().expect("mode stack is never empty")
    }

    fn push_mode(&mut self, mode: Mode) {
        self.modes.push(mode);
    }

    fn pop_mode(&mut self) {
        if self.modes.len() > 1 {
            self.modes.pop();
        }
    }

    fn push(&mut self, kind: TokenKind, lexeme: impl Into<String>, line: u32, column: u32) {
        self.tokens.push(Token::new(kind, lexeme, line, column));
    }

    // ------------------------------------------------------------------
    // Line handling
    // ------------------------------------------------------------------

    fn lex_line(&mut self, line_no: u32, line: &str) {
        debug_assert_eq!(self.mode(), Mode::Default, "every line starts in Default");

        let chars: Vec<char> = line.chars().collect();
        let (width, lead) = measure_indent(&chars);

        // Blank and comment-only lines carry no tokens and do not
        // participate in indentation.
        if lead == chars.len() || chars[lead] == '#' {
            return;
        }

        if !self.apply_indent(line_no, width, lead as u32) {
            return;
        }

        let mut i = lead;
        while i < chars.len() {
            i = match self.mode() {
                Mode::Default => self.lex_default(line_no, &chars, i),
                Mode::Fstring => self.lex_fstring(line_no, &chars, i),
                Mode::Embed => self.lex_embed(line_no, &chars, i),
                Mode::Path => self.lex_path(line_no, &chars, i),
            };
        }
        self.flush_error_run();

        // Linebreak unwinds to Default: Fstring and Path close
        // implicitly with one pop, an open embed takes its f-string
        // down with it.
        loop {
            match self.mode() {
                Mode::Default => break,
                Mode::Fstring | Mode::Path => self.pop_mode(),
                Mode::Embed => {
                    self.pop_mode();
                    self.pop_mode();
                }
            }
        }
        self.push(TokenKind::Linebreak, "\n", line_no, chars.len() as u32 + 1);
    }

    /// Compare this line's indent level against the stack. Returns
    /// false when indentation is inconsistent (fatal for the file).
    fn apply_indent(&mut self, line_no: u32, width: u32, lead_chars: u32) -> bool {
        let level = width / 4;
        let top = *self.indents.last().expect("indent stack is never empty");
        if level > top {
            self.indents.push(level);
            self.push(TokenKind::Indent, "", line_no, 1);
        } else if level < top {
            while *self.indents.last().unwrap() > level {
                self.indents.pop();
                self.push(TokenKind::Dedent, "", line_no, 1);
            }
            if *self.indents.last().unwrap() != level {
                self.sink.error_spanned(
                    "Inconsistent indentation",
                    SpanRange::on_line(line_no, 1, lead_chars.max(1)),
                );
                self.fatal = true;
                return false;
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Default mode
    // ------------------------------------------------------------------

    fn lex_default(&mut self, line: u32, chars: &[char], i: usize) -> usize {
        let c = chars[i];
        let col = i as u32 + 1;

        if c == ' ' || c == '\t' {
            self.flush_error_run();
            return i + 1;
        }
        if c == '"' {
            self.flush_error_run();
            self.push(TokenKind::FstringQuote, "\"", line, col);
            self.push_mode(Mode::Fstring);
            return i + 1;
        }
        if let Some((kind, len)) = match_operator(chars, i, true) {
            self.flush_error_run();
            let lexeme: String = chars[i..i + len].iter().collect();
            self.push(kind, lexeme, line, col);
            return i + len;
        }
        if is_ident_start(c) {
            self.flush_error_run();
            let end = scan_ident(chars, i);
            let word: String = chars[i..end].iter().collect();
            let kind = match word.as_str() {
                "label" => TokenKind::Label,
                "jump" => TokenKind::Jump,
                "tour" => TokenKind::Tour,
                "call" => TokenKind::Call,
                "import" => TokenKind::Import,
                "if" => TokenKind::If,
                "elif" => TokenKind::Elif,
                "else" => TokenKind::Else,
                "and" => TokenKind::And,
                "or" => TokenKind::Or,
                "not" => TokenKind::Not,
                "true" | "false" => TokenKind::Boolean,
                _ => TokenKind::Identifier,
            };
            self.push(kind, word, line, col);
            if kind == TokenKind::Import {
                self.push_mode(Mode::Path);
            }
            return end;
        }
        if c == '$' {
            if let Some(end) = scan_variable(chars, i) {
                self.flush_error_run();
                let lexeme: String = chars[i..end].iter().collect();
                self.push(TokenKind::Variable, lexeme, line, col);
                return end;
            }
            return self.error_char(line, chars, i);
        }
        if c.is_ascii_digit() {
            self.flush_error_run();
            let end = scan_number(chars, i);
            let lexeme: String = chars[i..end].iter().collect();
            self.push(TokenKind::Number, lexeme, line, col);
            return end;
        }
        self.error_char(line, chars, i)
    }

    // ------------------------------------------------------------------
    // F-string mode
    // ------------------------------------------------------------------

    fn lex_fstring(&mut self, line: u32, chars: &[char], i: usize) -> usize {
        let c = chars[i];
        let col = i as u32 + 1;

        if c == '\\' {
            if let Some(&next) = chars.get(i + 1) {
                if matches!(next, 'n' | 'r' | 't' | '"' | '\\') {
                    self.flush_error_run();
                    let lexeme: String = chars[i..i + 2].iter().collect();
                    self.push(TokenKind::FstringEscape, lexeme, line, col);
                    return i + 2;
                }
            }
            return self.error_char(line, chars, i);
        }
        if c == '{' || c == '}' {
            if chars.get(i + 1) == Some(&c) {
                // `{{` and `}}` are literal braces.
                self.flush_error_run();
                let lexeme: String = chars[i..i + 2].iter().collect();
                self.push(TokenKind::FstringEscape, lexeme, line, col);
                return i + 2;
            }
            if c == '{' {
                self.flush_error_run();
                self.push(TokenKind::LeftBrace, "{", line, col);
                self.push_mode(Mode::Embed);
                return i + 1;
            }
            return self.error_char(line, chars, i);
        }
        if c == '"' {
            self.flush_error_run();
            self.push(TokenKind::FstringQuote, "\"", line, col);
            self.pop_mode();
            return i + 1;
        }

        // Content: the longest run free of special characters.
        let mut end = i;
        while end < chars.len() && !matches!(chars[end], '"' | '{' | '}' | '\\') {
            end += 1;
        }
        self.flush_error_run();
        let lexeme: String = chars[i..end].iter().collect();
        self.push(TokenKind::FstringContent, lexeme, line, col);
        end
    }

    // ------------------------------------------------------------------
    // Embed mode
    // ------------------------------------------------------------------

    fn lex_embed(&mut self, line: u32, chars: &[char], i: usize) -> usize {
        let c = chars[i];
        let col = i as u32 + 1;

        if c == ' ' || c == '\t' {
            self.flush_error_run();
            return i + 1;
        }
        if c == '}' {
            self.flush_error_run();
            self.push(TokenKind::RightBrace, "}", line, col);
            self.pop_mode();
            return i + 1;
        }
        if c == '{' {
            self.flush_error_run();
            self.push(TokenKind::LeftBrace, "{", line, col);
            self.push_mode(Mode::Embed);
            return i + 1;
        }
        if c == '"' {
            self.flush_error_run();
            self.push(TokenKind::FstringQuote, "\"", line, col);
            self.push_mode(Mode::Fstring);
            return i + 1;
        }
        if let Some((kind, len)) = match_operator(chars, i, false) {
            self.flush_error_run();
            let lexeme: String = chars[i..i + len].iter().collect();
            self.push(kind, lexeme, line, col);
            return i + len;
        }
        if is_ident_start(c) {
            self.flush_error_run();
            let end = scan_ident(chars, i);
            let word: String = chars[i..end].iter().collect();
            let kind = match word.as_str() {
                "call" => TokenKind::Call,
                "and" => TokenKind::And,
                "or" => TokenKind::Or,
                "not" => TokenKind::Not,
                "true" | "false" => TokenKind::Boolean,
                _ => TokenKind::Identifier,
            };
            self.push(kind, word, line, col);
            return end;
        }
        if c == '$' {
            if let Some(end) = scan_variable(chars, i) {
                self.flush_error_run();
                let lexeme: String = chars[i..end].iter().collect();
                self.push(TokenKind::Variable, lexeme, line, col);
                return end;
            }
            return self.error_char(line, chars, i);
        }
        if c.is_ascii_digit() {
            self.flush_error_run();
            let end = scan_number(chars, i);
            let lexeme: String = chars[i..end].iter().collect();
            self.push(TokenKind::Number, lexeme, line, col);
            return end;
        }
        self.error_char(line, chars, i)
    }

    // ------------------------------------------------------------------
    // Path mode
    // ------------------------------------------------------------------

    fn lex_path(&mut self, line: u32, chars: &[char], i: usize) -> usize {
        let mut start = i;
        while start < chars.len() && (chars[start] == ' ' || chars[start] == '\t') {
            start += 1;
        }
        let mut end = chars.len();
        while end > start && (chars[end - 1] == ' ' || chars[end - 1] == '\t') {
            end -= 1;
        }
        if start < end {
            let lexeme: String = chars[start..end].iter().collect();
            self.push(TokenKind::Path, lexeme, line, start as u32 + 1);
        }
        chars.len()
    }

    // ------------------------------------------------------------------
    // Error runs
    // ------------------------------------------------------------------

    fn error_char(&mut self, line: u32, chars: &[char], i: usize) -> usize {
        if self.err_buf.is_empty() {
            self.err_line = line;
            self.err_col = i as u32 + 1;
        }
        self.err_buf.push(chars[i]);
        i + 1
    }

    fn flush_error_run(&mut self) {
        if self.err_buf.is_empty() {
            return;
        }
        let lexeme = std::mem::take(&mut self.err_buf);
        let len = lexeme.chars().count() as u32;
        self.sink.error_spanned(
            format!("Unrecognized characters '{}'", lexeme),
            SpanRange::on_line(self.err_line, self.err_col, len),
        );
        self.tokens
            .push(Token::new(TokenKind::Error, lexeme, self.err_line, self.err_col));
    }
}

// ----------------------------------------------------------------------
// Character-level scanners
// ----------------------------------------------------------------------

fn measure_indent(chars: &[char]) -> (u32, usize) {
    let mut width = 0u32;
    let mut lead = 0usize;
    for &c in chars {
        match c {
            ' ' => width += 1,
            '\t' => width += 4,
            _ => break,
        }
        lead += 1;
    }
    (width, lead)
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

fn scan_ident(chars: &[char], i: usize) -> usize {
    let mut end = i + 1;
    while end < chars.len() && is_ident_continue(chars[end]) {
        end += 1;
    }
    end
}

/// `$name` or `$global.name`; None when `$` has no identifier after it.
fn scan_variable(chars: &[char], i: usize) -> Option<usize> {
    let mut end = i + 1;
    if end >= chars.len() || !is_ident_start(chars[end]) {
        return None;
    }
    end = scan_ident(chars, end);
    let first: String = chars[i + 1..end].iter().collect();
    if first == "global"
        && chars.get(end) == Some(&'.')
        && chars.get(end + 1).is_some_and(|&c| is_ident_start(c))
    {
        end = scan_ident(chars, end + 1);
    }
    Some(end)
}

fn scan_number(chars: &[char], i: usize) -> usize {
    let mut end = i;
    while end < chars.len() && chars[end].is_ascii_digit() {
        end += 1;
    }
    if chars.get(end) == Some(&'.') && chars.get(end + 1).is_some_and(|c| c.is_ascii_digit()) {
        end += 1;
        while end < chars.len() && chars[end].is_ascii_digit() {
            end += 1;
        }
    }
    end
}

/// Greedy operator match; order puts `**=` before `**` before `*=`
/// before `*`, and the two-character comparisons before their prefixes.
fn match_operator(chars: &[char], i: usize, allow_assign: bool) -> Option<(TokenKind, usize)> {
    let at = |k: usize| chars.get(i + k).copied();
    let c0 = at(0)?;
    let c1 = at(1);
    let c2 = at(2);

    if allow_assign && c0 == '*' && c1 == Some('*') && c2 == Some('=') {
        return Some((TokenKind::PowerAssign, 3));
    }
    if let Some(c1) = c1 {
        let two = match (c0, c1) {
            ('*', '*') => Some(TokenKind::Power),
            ('=', '=') => Some(TokenKind::Equal),
            ('!', '=') => Some(TokenKind::NotEqual),
            ('<', '=') => Some(TokenKind::LessEqual),
            ('>', '=') => Some(TokenKind::GreaterEqual),
            ('+', '=') if allow_assign => Some(TokenKind::PlusAssign),
            ('-', '=') if allow_assign => Some(TokenKind::MinusAssign),
            ('*', '=') if allow_assign => Some(TokenKind::MultiplyAssign),
            ('/', '=') if allow_assign => Some(TokenKind::DivideAssign),
            ('%', '=') if allow_assign => Some(TokenKind::ModuloAssign),
            _ => None,
        };
        if let Some(kind) = two {
            return Some((kind, 2));
        }
    }
    let one = match c0 {
        '+' => TokenKind::Plus,
        '-' => TokenKind::Minus,
        '*' => TokenKind::Multiply,
        '/' => TokenKind::Divide,
        '%' => TokenKind::Modulo,
        '<' => TokenKind::Less,
        '>' => TokenKind::Greater,
        '=' if allow_assign => TokenKind::Assign,
        '(' => TokenKind::LeftParen,
        ')' => TokenKind::RightParen,
        '{' if allow_assign => TokenKind::LeftBrace,
        '}' if allow_assign => TokenKind::RightBrace,
        ',' => TokenKind::Comma,
        ':' if allow_assign => TokenKind::Colon,
        _ => return None,
    };
    Some((one, 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut sink = DiagnosticSink::new();
        lex(source, &mut sink).into_iter().map(|t| t.kind).collect()
    }

    fn lex_ok(source: &str) -> Vec<Token> {
        let mut sink = DiagnosticSink::new();
        let tokens = lex(source, &mut sink);
        assert!(!sink.has_errors(), "unexpected diagnostics: {}", sink.render("<test>"));
        tokens
    }

    use TokenKind::*;

    #[test]
    fn single_dialogue_line() {
        let tokens = lex_ok("Alice \"hello\"\n");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![Identifier, FstringQuote, FstringContent, FstringQuote, Linebreak, Eof]
        );
        assert_eq!(tokens[0].lexeme, "Alice");
        assert_eq!(tokens[2].lexeme, "hello");
    }

    #[test]
    fn label_block_indentation() {
        let kinds = kinds("label start:\n    jump other\n");
        assert_eq!(
            kinds,
            vec![
                Label, Identifier, Colon, Linebreak, Indent, Jump, Identifier, Linebreak, Dedent,
                Eof
            ]
        );
    }

    #[test]
    fn dedents_flushed_at_eof() {
        let kinds = kinds("label a:\n    if true:\n        Alice \"x\"\n");
        let dedents = kinds.iter().filter(|k| **k == Dedent).count();
        let indents = kinds.iter().filter(|k| **k == Indent).count();
        assert_eq!(indents, 2);
        assert_eq!(dedents, 2);
        assert_eq!(*kinds.last().unwrap(), Eof);
        assert_eq!(kinds.iter().filter(|k| **k == Eof).count(), 1);
    }

    #[test]
    fn dedent_emitted_per_level() {
        let kinds = kinds("label a:\n    if true:\n        Alice \"x\"\n    Bob \"y\"\n");
        // Dropping from level 2 to level 1 is exactly one dedent.
        let pos = kinds
            .iter()
            .position(|k| *k == Dedent)
            .expect("one dedent inside the block");
        assert_ne!(kinds[pos + 1], Dedent);
    }

    #[test]
    fn inconsistent_indentation_is_fatal() {
        let mut sink = DiagnosticSink::new();
        let tokens = lex("label a:\n        Alice \"x\"\n    Bob \"y\"\n", &mut sink);
        assert!(sink.has_errors());
        assert!(sink.iter().any(|d| d.message.contains("Inconsistent indentation")));
        // The stream still terminates cleanly.
        assert_eq!(tokens.last().unwrap().kind, Eof);
    }

    #[test]
    fn blank_and_comment_lines_are_silent() {
        let kinds = kinds("label a:\n\n# a comment\n    jump b\n");
        assert_eq!(
            kinds,
            vec![Label, Identifier, Colon, Linebreak, Indent, Jump, Identifier, Linebreak, Dedent, Eof]
        );
    }

    #[test]
    fn hash_is_only_a_comment_at_line_start() {
        let mut sink = DiagnosticSink::new();
        let tokens = lex("jump a # trailing\n", &mut sink);
        // The `#` run is not a comment here; it lexes as an error run.
        assert!(tokens.iter().any(|t| t.kind == Error));
        assert!(sink.has_errors());
    }

    #[test]
    fn hash_inside_fstring_is_content() {
        let tokens = lex_ok("\"#1 fan\"\n");
        assert_eq!(tokens[1].kind, FstringContent);
        assert_eq!(tokens[1].lexeme, "#1 fan");
    }

    #[test]
    fn operator_longest_match() {
        let tokens = lex_ok("$x **= 2 ** 3\n");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![Variable, PowerAssign, Number, Power, Number, Linebreak, Eof]);
    }

    #[test]
    fn comparison_operators_before_prefixes() {
        let tokens = lex_ok("$a = 1 <= 2 >= 3 == 4 != 5 < 6 > 7\n");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                Variable, Assign, Number, LessEqual, Number, GreaterEqual, Number, Equal, Number,
                NotEqual, Number, Less, Number, Greater, Number, Linebreak, Eof
            ]
        );
    }

    #[test]
    fn variable_with_global_prefix() {
        let tokens = lex_ok("$global.score += 1\n");
        assert_eq!(tokens[0].kind, Variable);
        assert_eq!(tokens[0].lexeme, "$global.score");
        assert_eq!(tokens[1].kind, PlusAssign);
    }

    #[test]
    fn import_takes_rest_of_line_as_path() {
        let tokens = lex_ok("import  scripts/common.dp  \n");
        assert_eq!(tokens[0].kind, Import);
        assert_eq!(tokens[1].kind, Path);
        assert_eq!(tokens[1].lexeme, "scripts/common.dp");
        assert_eq!(tokens[2].kind, Linebreak);
    }

    #[test]
    fn fstring_with_embed() {
        let tokens = lex_ok("\"score: {$x + 1}\"\n");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FstringQuote, FstringContent, LeftBrace, Variable, Plus, Number, RightBrace,
                FstringQuote, Linebreak, Eof
            ]
        );
    }

    #[test]
    fn fstring_escapes() {
        let tokens = lex_ok(r#""a\nb{{c}}d\"e""#);
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FstringQuote, FstringContent, FstringEscape, FstringContent, FstringEscape,
                FstringContent, FstringEscape, FstringContent, FstringEscape, FstringContent,
                FstringQuote, Linebreak, Eof
            ]
        );
        assert_eq!(tokens[2].lexeme, "\\n");
        assert_eq!(tokens[4].lexeme, "{{");
        assert_eq!(tokens[6].lexeme, "}}");
        assert_eq!(tokens[8].lexeme, "\\\"");
    }

    #[test]
    fn embed_rejects_assignment() {
        let mut sink = DiagnosticSink::new();
        let tokens = lex("\"{$x = 1}\"\n", &mut sink);
        assert!(tokens.iter().any(|t| t.kind == Error && t.lexeme == "="));
        assert!(sink.has_errors());
    }

    #[test]
    fn embed_call_with_nested_string() {
        let tokens = lex_ok("\"{call greet(\"bob\")}\"\n");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FstringQuote, LeftBrace, Call, Identifier, LeftParen, FstringQuote,
                FstringContent, FstringQuote, RightParen, RightBrace, FstringQuote, Linebreak, Eof
            ]
        );
    }

    #[test]
    fn unterminated_fstring_closes_at_linebreak() {
        let tokens = lex_ok("\"dangling\njump a\n");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        // The second line lexes in Default mode again.
        assert_eq!(
            kinds,
            vec![FstringQuote, FstringContent, Linebreak, Jump, Identifier, Linebreak, Eof]
        );
    }

    #[test]
    fn unterminated_embed_unwinds_to_default() {
        let tokens = lex_ok("\"text {$x\njump a\n");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FstringQuote, FstringContent, LeftBrace, Variable, Linebreak, Jump, Identifier,
                Linebreak, Eof
            ]
        );
    }

    #[test]
    fn error_run_flushed_as_single_token() {
        let mut sink = DiagnosticSink::new();
        let tokens = lex("jump ;;& a\n", &mut sink);
        let errors: Vec<_> = tokens.iter().filter(|t| t.kind == Error).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].lexeme, ";;&");
        assert_eq!(errors[0].column, 6);
        assert_eq!(sink.error_count(), 1);
        let diag = sink.iter().next().unwrap();
        let span = diag.span.unwrap();
        assert_eq!((span.start_column, span.end_column), (6, 9));
    }

    #[test]
    fn tabs_count_as_four() {
        let kinds = kinds("label a:\n\tjump b\n");
        assert_eq!(
            kinds,
            vec![Label, Identifier, Colon, Linebreak, Indent, Jump, Identifier, Linebreak, Dedent, Eof]
        );
    }

    #[test]
    fn empty_source_is_just_eof() {
        let tokens = lex_ok("");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, Eof);
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
    }

    #[test]
    fn roundtrip_lexemes_reproduce_source() {
        let source = "label a:\n    Alice \"hi {$x}\"\n    jump b\n";
        let tokens = lex_ok(source);
        let rebuilt: String = tokens
            .iter()
            .map(|t| match t.kind {
                Indent | Dedent | Eof => String::new(),
                _ => t.lexeme.clone(),
            })
            .collect();
        // Modulo whitespace runs: collapse them in both.
        let squash = |s: &str| s.replace([' ', '\t'], "");
        assert_eq!(squash(&rebuilt), squash(source));
    }
}
