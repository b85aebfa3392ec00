use crate::lexer::cursor::Cursor;
use crate::span::{Idx, Span};

pub mod cursor;

/// Token over a block of driver source. Carries a span into the block text;
/// the parser slices the source to recover the token's characters.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    /// Whitespace-delimited word: mnemonic, operand, or bare label reference.
    Word,
    /// Word ending in `:`, declaring a label at the current flat index.
    Label,
    /// `;` until end of line.
    Comment,
    /// Spaces and tabs. Newlines are significant and lexed separately.
    Whitespace,
    Newline,
}

/// Test if a character terminates a word.
fn is_word_end(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n' | ';')
}

/// Lex a whole block of source into tokens with block-relative spans.
pub fn tokenize(input: &str) -> impl Iterator<Item = Token> + '_ {
    let mut cursor = Cursor::new(input);
    let mut offs = 0u32;
    std::iter::from_fn(move || {
        let token = advance_token(&mut cursor, offs)?;
        offs += token.span.len() as u32;
        Some(token)
    })
}

fn advance_token(cursor: &mut Cursor, offs: u32) -> Option<Token> {
    let first = cursor.bump()?;
    let kind = match first {
        '\n' => TokenKind::Newline,
        ';' => {
            cursor.take_while(|c| c != '\n');
            TokenKind::Comment
        }
        ' ' | '\t' | '\r' => {
            cursor.take_while(|c| matches!(c, ' ' | '\t' | '\r'));
            TokenKind::Whitespace
        }
        _ => {
            let last = cursor.take_while(|c| !is_word_end(c)).unwrap_or(first);
            if last == ':' {
                TokenKind::Label
            } else {
                TokenKind::Word
            }
        }
    };
    let span = Span::new(Idx(offs), cursor.pos_within_token());
    cursor.reset_pos_within_token();
    Some(Token { kind, span })
}
