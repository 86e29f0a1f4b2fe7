//! Source positions and interned strings.

use std::fmt;
use std::ops::{Deref, DerefMut, Range};

/// File id, allocated by the external driver that owns the source files. The
/// core never reads source text itself; file ids only flow into rendered
/// diagnostics.
pub type FileId = usize;

/// Byte offsets into source files.
pub type BytePos = u32;

/// Byte ranges in source files.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ByteRange {
    start: BytePos,
    end: BytePos,
}

impl ByteRange {
    pub const fn new(start: BytePos, end: BytePos) -> ByteRange {
        ByteRange { start, end }
    }

    pub const fn start(&self) -> BytePos {
        self.start
    }

    pub const fn end(&self) -> BytePos {
        self.end
    }

    /// The smallest range covering both `self` and `other`.
    pub fn merge(&self, other: &ByteRange) -> ByteRange {
        ByteRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl From<ByteRange> for Range<usize> {
    fn from(range: ByteRange) -> Range<usize> {
        range.start as usize..range.end as usize
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Spans attached to core terms. Terms produced during elaboration inherit
/// the range of the surface term they came from; terms the system invents
/// out of thin air (inserted arguments, generated recursors) carry
/// [`Span::Empty`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Span {
    Range(ByteRange),
    Empty,
}

impl Span {
    pub fn merge(&self, other: &Span) -> Span {
        match (self, other) {
            (Span::Range(a), Span::Range(b)) => Span::Range(a.merge(b)),
            (_, _) => Span::Empty,
        }
    }

    pub fn range(&self) -> Option<ByteRange> {
        match self {
            Span::Range(range) => Some(*range),
            Span::Empty => None,
        }
    }
}

impl From<ByteRange> for Span {
    fn from(range: ByteRange) -> Span {
        Span::Range(range)
    }
}

impl From<Option<ByteRange>> for Span {
    fn from(range: Option<ByteRange>) -> Span {
        range.map_or(Span::Empty, Span::Range)
    }
}

/// Interned strings.
pub type StringId = string_interner::symbol::SymbolU32;

type Interner = string_interner::StringInterner<
    string_interner::backend::BucketBackend<StringId>,
    std::hash::BuildHasherDefault<fxhash::FxHasher32>,
>;

/// String interner.
pub struct StringInterner {
    alphabetic_names: Vec<StringId>,
    strings: Interner,
}

impl Deref for StringInterner {
    type Target = Interner;

    fn deref(&self) -> &Interner {
        &self.strings
    }
}

impl DerefMut for StringInterner {
    fn deref_mut(&mut self) -> &mut Interner {
        &mut self.strings
    }
}

impl StringInterner {
    /// Construct an empty string interner.
    pub fn new() -> StringInterner {
        StringInterner {
            alphabetic_names: Vec::new(),
            strings: Interner::new(),
        }
    }

    /// Allocate and intern all alphabetic names up-to and including
    /// `max_index` if they are not already present.
    pub fn reserve_alphabetic_names(&mut self, max_index: usize) {
        let strings = &mut self.strings;
        self.alphabetic_names.extend(
            (self.alphabetic_names.len()..=max_index)
                .map(|index| strings.get_or_intern(alphabetic_name(index))),
        );
    }

    /// Retrieve an alphabetic name based on a numeric count. This is useful
    /// for producing human-readable names for unnamed binders when rendering
    /// terms in diagnostics.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use keel::source::StringInterner;
    ///
    /// let mut interner = StringInterner::new();
    /// assert_eq!(interner.get_alphabetic_name(0), interner.get_or_intern("a"));
    /// assert_eq!(interner.get_alphabetic_name(25), interner.get_or_intern("z"));
    /// assert_eq!(interner.get_alphabetic_name(26), interner.get_or_intern("a1"));
    /// assert_eq!(interner.get_alphabetic_name(52), interner.get_or_intern("a2"));
    /// ```
    pub fn get_alphabetic_name(&mut self, index: usize) -> StringId {
        self.reserve_alphabetic_names(index);
        self.alphabetic_names[index]
    }
}

impl Default for StringInterner {
    fn default() -> StringInterner {
        StringInterner::new()
    }
}

fn alphabetic_name(index: usize) -> String {
    let base = index / 26;
    let letter = (index % 26) as u8;
    let letter = (letter + b'a') as char;
    if base == 0 {
        format!("{letter}")
    } else {
        format!("{letter}{base}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabetic_names() {
        assert_eq!(alphabetic_name(0), "a");
        assert_eq!(alphabetic_name(25), "z");
        assert_eq!(alphabetic_name(26), "a1");
        assert_eq!(alphabetic_name(51), "z1");
        assert_eq!(alphabetic_name(52), "a2");
    }

    #[test]
    fn range_merge() {
        let a = ByteRange::new(3, 10);
        let b = ByteRange::new(7, 25);
        assert_eq!(a.merge(&b), ByteRange::new(3, 25));
        assert_eq!(
            Span::from(a).merge(&Span::Empty),
            Span::Empty,
        );
    }
}
