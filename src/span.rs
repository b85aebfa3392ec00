use std::ops::Range;

use miette::SourceSpan;

/// Byte offset relative to the start of a block's source text.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Idx(pub u32);

/// Holds a view into a block's source.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash, Debug)]
pub struct Span {
    start: Idx,
    len: u32,
}

impl Span {
    pub fn new(start: Idx, len: u32) -> Self {
        Span { start, len }
    }

    /// Span covering a whole 1-based line of `src`, excluding the newline.
    ///
    /// An out-of-range line collapses to an empty span at the end of source,
    /// so diagnostics degrade instead of panicking.
    pub fn of_line(src: &str, line: usize) -> Self {
        let mut offs = 0usize;
        for (i, text) in src.split('\n').enumerate() {
            if i + 1 == line {
                return Span::new(Idx(offs as u32), text.len() as u32);
            }
            offs += text.len() + 1;
        }
        Span::new(Idx(src.len() as u32), 0)
    }

    pub fn offs(&self) -> usize {
        self.start.0 as usize
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn end(&self) -> usize {
        self.offs() + self.len()
    }

    pub fn as_range(&self) -> Range<usize> {
        self.offs()..self.end()
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

impl From<Span> for Range<usize> {
    fn from(value: Span) -> Self {
        value.as_range()
    }
}
