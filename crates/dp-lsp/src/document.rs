//! Document state management.

use ropey::Rope;
use tower_lsp::lsp_types::*;

/// An open document in the editor.
pub struct Document {
    /// The document content as a rope for efficient editing.
    pub rope: Rope,
    /// Document version for sync.
    pub version: i32,
}

impl Document {
    /// Create a new document from content.
    pub fn new(content: String, version: i32) -> Self {
        Self {
            rope: Rope::from_str(&content),
            version,
        }
    }

    /// Apply a content change from the editor.
    pub fn apply_change(&mut self, change: TextDocumentContentChangeEvent, version: i32) {
        self.version = version;

        // Full document sync (range is None)
        if change.range.is_none() {
            self.rope = Rope::from_str(&change.text);
            return;
        }

        // Incremental sync
        if let Some(range) = change.range {
            let start = self.position_to_offset(range.start);
            let end = self.position_to_offset(range.end);

            if start < end && end <= self.rope.len_chars() {
                self.rope.remove(start..end);
            }
            if start <= self.rope.len_chars() {
                self.rope.insert(start, &change.text);
            }
        }
    }

    /// Get the document content as a string.
    pub fn content(&self) -> String {
        self.rope.to_string()
    }

    /// Convert an LSP position to a character offset.
    pub fn position_to_offset(&self, pos: Position) -> usize {
        let line = pos.line as usize;
        if line >= self.rope.len_lines() {
            return self.rope.len_chars();
        }

        let line_start = self.rope.line_to_char(line);
        let line_len = self
            .rope
            .line(line)
            .len_chars()
            .saturating_sub(1); // Don't count newline

        let col = (pos.character as usize).min(line_len);
        line_start + col
    }

    /// Get the symbol-ish word at the given position.
    ///
    /// Includes `$` and `.` so `$global.name` comes back whole, which
    /// is what the definition query wants.
    pub fn word_at_position(&self, pos: Position) -> Option<String> {
        let offset = self.position_to_offset(pos);
        let content = self.content();
        let bytes = content.as_bytes();

        fn is_word_char(c: u8) -> bool {
            c.is_ascii_alphanumeric() || c == b'_' || c == b'.' || c == b'$'
        }

        let mut start = offset;
        let mut end = offset;

        if offset >= bytes.len() || !is_word_char(bytes[offset]) {
            if offset > 0 && is_word_char(bytes[offset - 1]) {
                start = offset - 1;
                end = offset;
            } else {
                return None;
            }
        }

        while start > 0 && is_word_char(bytes[start - 1]) {
            start -= 1;
        }
        while end < bytes.len() && is_word_char(bytes[end]) {
            end += 1;
        }

        if start < end {
            Some(content[start..end].to_string())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_at_position_includes_variable_prefix() {
        let doc = Document::new("    $global.score += 1\n".to_string(), 1);
        let word = doc.word_at_position(Position::new(0, 7)).unwrap();
        assert_eq!(word, "$global.score");
    }

    #[test]
    fn word_at_position_plain_identifier() {
        let doc = Document::new("    jump ending\n".to_string(), 1);
        let word = doc.word_at_position(Position::new(0, 10)).unwrap();
        assert_eq!(word, "ending");
    }

    #[test]
    fn full_sync_replaces_content() {
        let mut doc = Document::new("old".to_string(), 1);
        doc.apply_change(
            TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text: "new content".to_string(),
            },
            2,
        );
        assert_eq!(doc.content(), "new content");
        assert_eq!(doc.version, 2);
    }
}
