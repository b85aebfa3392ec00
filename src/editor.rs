//! Per-block source text and cursor editing.
//!
//! The session owns one buffer and decides *when* edits are allowed; the
//! buffer itself only knows how to apply them.

/// Editing position. `col` is a character offset into the line.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Cursor {
    pub block: usize,
    pub line: usize,
    pub col: usize,
}

/// Source text of every block. Each block always holds at least one line,
/// which may be empty.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SourceBuffer {
    blocks: Vec<Vec<String>>,
}

impl SourceBuffer {
    pub fn new(block_count: usize) -> Self {
        SourceBuffer {
            blocks: vec![vec![String::new()]; block_count.max(1)],
        }
    }

    /// Replace all source text. Empty blocks are normalized to one empty
    /// line so the cursor always has somewhere to sit.
    pub fn load(&mut self, blocks: Vec<Vec<String>>) {
        self.blocks = blocks
            .into_iter()
            .map(|lines| if lines.is_empty() { vec![String::new()] } else { lines })
            .collect();
        if self.blocks.is_empty() {
            self.blocks.push(vec![String::new()]);
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn lines(&self, block: usize) -> &[String] {
        &self.blocks[block]
    }

    pub fn blocks(&self) -> &[Vec<String>] {
        &self.blocks
    }

    pub fn block_text(&self, block: usize) -> String {
        self.blocks[block].join("\n")
    }

    pub fn insert_char(&mut self, cursor: &mut Cursor, ch: char) {
        self.clamp(cursor);
        let line = &mut self.blocks[cursor.block][cursor.line];
        let at = byte_at(line, cursor.col);
        line.insert(at, ch);
        cursor.col += 1;
    }

    /// Delete the character before the cursor, merging with the previous
    /// line at column zero.
    pub fn backspace(&mut self, cursor: &mut Cursor) {
        self.clamp(cursor);
        if cursor.col > 0 {
            let line = &mut self.blocks[cursor.block][cursor.line];
            let at = byte_at(line, cursor.col - 1);
            line.remove(at);
            cursor.col -= 1;
        } else if cursor.line > 0 {
            let removed = self.blocks[cursor.block].remove(cursor.line);
            cursor.line -= 1;
            let prev = &mut self.blocks[cursor.block][cursor.line];
            cursor.col = prev.chars().count();
            prev.push_str(&removed);
        }
    }

    /// Split the current line at the cursor.
    pub fn insert_newline(&mut self, cursor: &mut Cursor) {
        self.clamp(cursor);
        let line = &mut self.blocks[cursor.block][cursor.line];
        let at = byte_at(line, cursor.col);
        let rest = line.split_off(at);
        self.blocks[cursor.block].insert(cursor.line + 1, rest);
        cursor.line += 1;
        cursor.col = 0;
    }

    pub fn move_left(&mut self, cursor: &mut Cursor) {
        self.clamp(cursor);
        if cursor.col > 0 {
            cursor.col -= 1;
        } else if cursor.line > 0 {
            cursor.line -= 1;
            cursor.col = self.line_len(cursor.block, cursor.line);
        }
    }

    pub fn move_right(&mut self, cursor: &mut Cursor) {
        self.clamp(cursor);
        if cursor.col < self.line_len(cursor.block, cursor.line) {
            cursor.col += 1;
        } else if cursor.line + 1 < self.blocks[cursor.block].len() {
            cursor.line += 1;
            cursor.col = 0;
        }
    }

    pub fn move_up(&mut self, cursor: &mut Cursor) {
        if cursor.line > 0 {
            cursor.line -= 1;
        }
        self.clamp(cursor);
    }

    pub fn move_down(&mut self, cursor: &mut Cursor) {
        if cursor.line + 1 < self.blocks[cursor.block.min(self.blocks.len() - 1)].len() {
            cursor.line += 1;
        }
        self.clamp(cursor);
    }

    /// Park the cursor on a specific block/line, e.g. a fault site.
    /// 1-based line, matching fault locations.
    pub fn move_to_line(&mut self, cursor: &mut Cursor, block: usize, line: usize) {
        cursor.block = block.min(self.blocks.len() - 1);
        cursor.line = line.saturating_sub(1);
        cursor.col = 0;
        self.clamp(cursor);
    }

    fn line_len(&self, block: usize, line: usize) -> usize {
        self.blocks[block][line].chars().count()
    }

    fn clamp(&self, cursor: &mut Cursor) {
        cursor.block = cursor.block.min(self.blocks.len() - 1);
        cursor.line = cursor.line.min(self.blocks[cursor.block].len() - 1);
        cursor.col = cursor.col.min(self.line_len(cursor.block, cursor.line));
    }
}

fn byte_at(line: &str, col: usize) -> usize {
    line.char_indices()
        .nth(col)
        .map(|(idx, _)| idx)
        .unwrap_or(line.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(lines: &[&str]) -> SourceBuffer {
        let mut buf = SourceBuffer::new(1);
        buf.load(vec![lines.iter().map(|line| line.to_string()).collect()]);
        buf
    }

    #[test]
    fn insert_and_backspace() {
        let mut buf = buffer(&["LDA"]);
        let mut cursor = Cursor { block: 0, line: 0, col: 3 };
        buf.insert_char(&mut cursor, '!');
        assert_eq!(buf.lines(0), &["LDA!"]);
        buf.backspace(&mut cursor);
        assert_eq!(buf.lines(0), &["LDA"]);
        assert_eq!(cursor.col, 3);
    }

    #[test]
    fn newline_splits_and_backspace_merges() {
        let mut buf = buffer(&["LDA #$01"]);
        let mut cursor = Cursor { block: 0, line: 0, col: 3 };
        buf.insert_newline(&mut cursor);
        assert_eq!(buf.lines(0), &["LDA", " #$01"]);
        assert_eq!((cursor.line, cursor.col), (1, 0));
        buf.backspace(&mut cursor);
        assert_eq!(buf.lines(0), &["LDA #$01"]);
        assert_eq!((cursor.line, cursor.col), (0, 3));
    }

    #[test]
    fn movement_clamps_to_line_ends() {
        let mut buf = buffer(&["NOP", "LDA #$01"]);
        let mut cursor = Cursor { block: 0, line: 1, col: 8 };
        buf.move_up(&mut cursor);
        assert_eq!((cursor.line, cursor.col), (0, 3));
        buf.move_right(&mut cursor);
        assert_eq!((cursor.line, cursor.col), (1, 0));
        buf.move_left(&mut cursor);
        assert_eq!((cursor.line, cursor.col), (0, 3));
    }

    #[test]
    fn move_to_fault_line() {
        let mut buf = buffer(&["NOP", "STA $C403", "NOP"]);
        let mut cursor = Cursor::default();
        buf.move_to_line(&mut cursor, 0, 2);
        assert_eq!((cursor.block, cursor.line, cursor.col), (0, 1, 0));
    }
}
