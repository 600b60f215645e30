//! Source positions, text ranges and the expansion-ancestry arena.
//!
//! Every token carries a [`SymbolLoc`]: a span inside one [`LocationContext`].
//! Contexts form an upward tree: a macro expansion or an `#include` creates a
//! new context whose [`Expansion`] points at the use site one level up. The
//! tree lives in a [`LocationMap`] for the whole compilation unit and is never
//! mutated after a node is pushed.

use std::fmt;
use std::rc::Rc;

use crate::macros::MacroId;
use crate::source::FileId;

/// A 1-based line/column position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextPosition {
    /// 1-based line number
    pub line: u32,
    /// 1-based column, counted in bytes
    pub column: u32,
}

impl TextPosition {
    /// Position of the first byte of a buffer
    pub const START: Self = Self { line: 1, column: 1 };

    /// Create a position from a line and a column
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Move to the first column of the next line
    pub fn next_line(&mut self) {
        self.line += 1;
        self.column = 1;
    }

    /// Move `n` columns to the right
    pub fn advance(&mut self, n: usize) {
        self.column = self.column.saturating_add(u32::try_from(n).unwrap_or(u32::MAX));
    }
}

impl fmt::Display for TextPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open slice of an immutable text buffer plus the position of its
/// first byte.
///
/// The buffer is shared, so cloning a range is cheap and a range can never
/// outlive the text it points into.
#[derive(Clone)]
pub struct TextRange {
    source: Rc<str>,
    first: usize,
    last: usize,
    /// Position of the byte at `first`
    pub pos: TextPosition,
}

impl TextRange {
    /// A range covering a whole buffer, starting at line 1, column 1
    #[must_use]
    pub fn new(source: Rc<str>) -> Self {
        let last = source.len();
        Self {
            source,
            first: 0,
            last,
            pos: TextPosition::START,
        }
    }

    /// A range over a freshly allocated copy of `text`
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        Self::new(Rc::from(text))
    }

    /// The whole underlying buffer
    #[must_use]
    pub fn source(&self) -> &Rc<str> {
        &self.source
    }

    /// Byte offset of the range start within the buffer
    #[must_use]
    pub const fn first(&self) -> usize {
        self.first
    }

    /// Byte offset one past the range end within the buffer
    #[must_use]
    pub const fn last(&self) -> usize {
        self.last
    }

    /// Length in bytes
    #[must_use]
    pub const fn len(&self) -> usize {
        self.last - self.first
    }

    /// Whether the range has been fully consumed
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first == self.last
    }

    /// The remaining bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.source.as_bytes()[self.first..self.last]
    }

    /// The remaining text, or an empty string if the bounds split a character
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.source.get(self.first..self.last).unwrap_or_default()
    }

    /// Text between two absolute offsets of the same buffer
    #[must_use]
    pub fn slice(&self, first: usize, last: usize) -> &str {
        self.source.get(first..last).unwrap_or_default()
    }

    /// The next byte, if any
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.peek_at(0)
    }

    /// The byte `n` positions ahead, if any
    #[must_use]
    pub fn peek_at(&self, n: usize) -> Option<u8> {
        self.as_bytes().get(n).copied()
    }

    /// Consume `n` bytes that contain no line break
    pub fn bump(&mut self, n: usize) {
        let n = n.min(self.len());
        self.first += n;
        self.pos.advance(n);
    }

    /// Consume one `\n`
    pub fn bump_newline(&mut self) {
        if self.first < self.last {
            self.first += 1;
            self.pos.next_line();
        }
    }

    /// Consume `n` bytes, keeping track of line breaks
    pub fn skip(&mut self, n: usize) {
        let n = n.min(self.len());
        for &b in &self.source.as_bytes()[self.first..self.first + n] {
            if b == b'\n' {
                self.pos.next_line();
            } else {
                self.pos.advance(1);
            }
        }
        self.first += n;
    }

    /// Consume everything without tracking positions
    pub fn exhaust(&mut self) {
        self.first = self.last;
    }

    /// Shrink the range so that it ends at the absolute offset `last`
    pub fn set_last(&mut self, last: usize) {
        self.last = last.clamp(self.first, self.source.len());
    }

    /// An empty range at the current start
    #[must_use]
    pub fn empty_at(&self) -> Self {
        Self {
            source: Rc::clone(&self.source),
            first: self.first,
            last: self.first,
            pos: self.pos,
        }
    }

    /// The text consumed since the absolute offset `from`; its position is
    /// the current one, so the result is only good for spelling
    #[must_use]
    pub fn consumed_since(&self, from: usize) -> Self {
        Self {
            source: Rc::clone(&self.source),
            first: from.min(self.first),
            last: self.first,
            pos: self.pos,
        }
    }

    /// The range from `self`'s start up to `end`'s start
    #[must_use]
    pub fn until(&self, end: &Self) -> Self {
        let mut range = self.clone();
        range.set_last(end.first);
        range
    }
}

impl fmt::Debug for TextRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextRange")
            .field("text", &self.as_str())
            .field("pos", &self.pos)
            .finish()
    }
}

/// Handle of a [`LocationContext`] inside a [`LocationMap`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocCtxId(u32);

impl LocCtxId {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw arena index
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A span inside one location context.
///
/// `first <= last` holds for every location produced by the lexer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SymbolLoc {
    /// Owning context, absent for locations that have no source at all
    pub ctx: Option<LocCtxId>,
    /// Position of the first byte
    pub first: TextPosition,
    /// Position of the last byte (inclusive)
    pub last: TextPosition,
}

impl SymbolLoc {
    /// A span between two positions of one context
    #[must_use]
    pub const fn new(ctx: LocCtxId, first: TextPosition, last: TextPosition) -> Self {
        Self {
            ctx: Some(ctx),
            first,
            last,
        }
    }

    /// A zero-width location at one position
    #[must_use]
    pub const fn at(ctx: LocCtxId, pos: TextPosition) -> Self {
        Self::new(ctx, pos, pos)
    }
}

/// How the text of a location context was produced
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Expansion {
    /// Text read directly from the primary source
    #[default]
    None,
    /// Text of a file pulled in by `#include` at `from`
    Include {
        /// The `#include` directive location
        from: SymbolLoc,
    },
    /// Text produced by expanding `macro_def` at `from`
    Macro {
        /// The macro use site
        from: SymbolLoc,
        /// The definition that was expanded
        macro_def: MacroId,
    },
}

impl Expansion {
    /// The use site one level up, if any
    #[must_use]
    pub const fn from_loc(&self) -> Option<&SymbolLoc> {
        match self {
            Self::None => None,
            Self::Include { from } | Self::Macro { from, .. } => Some(from),
        }
    }

    /// The macro that produced this text, if any
    #[must_use]
    pub const fn macro_def(&self) -> Option<MacroId> {
        match self {
            Self::Macro { macro_def, .. } => Some(*macro_def),
            _ => None,
        }
    }
}

/// A node of the expansion-ancestry tree
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocationContext {
    /// The file the text belongs to; `None` for synthesized text
    pub file: Option<FileId>,
    /// How the text was produced
    pub expansion: Expansion,
}

/// Append-only arena of location contexts for one compilation unit
#[derive(Debug, Default)]
pub struct LocationMap {
    contexts: Vec<LocationContext>,
}

impl LocationMap {
    /// Create an empty arena
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a context and return its handle
    pub fn push(&mut self, file: Option<FileId>, expansion: Expansion) -> LocCtxId {
        let id = LocCtxId(u32::try_from(self.contexts.len()).unwrap_or(u32::MAX));
        self.contexts.push(LocationContext { file, expansion });
        id
    }

    /// Look up a context
    ///
    /// # Panics
    /// Panics if `id` was not produced by this arena.
    #[must_use]
    pub fn get(&self, id: LocCtxId) -> &LocationContext {
        &self.contexts[id.index()]
    }

    /// Number of contexts created so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether no context has been created yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// The location one expansion level up; the root maps to a context-less location
    fn parent(&self, loc: &SymbolLoc) -> SymbolLoc {
        match loc.ctx {
            Some(ctx) => self
                .get(ctx)
                .expansion
                .from_loc()
                .copied()
                .unwrap_or_default(),
            None => *loc,
        }
    }

    /// Number of contexts between `loc` and the root
    #[must_use]
    pub fn depth(&self, loc: &SymbolLoc) -> usize {
        let mut depth = 0;
        let mut loc = *loc;
        while loc.ctx.is_some() {
            loc = self.parent(&loc);
            depth += 1;
        }
        depth
    }

    /// Merge two locations into the smallest span that contains both.
    ///
    /// When the contexts differ both sides are lifted to equal depth and then
    /// walked up in lockstep until they meet, so the result lives in their
    /// common ancestor context.
    #[must_use]
    pub fn merge(&self, a: &SymbolLoc, b: &SymbolLoc) -> SymbolLoc {
        if a.ctx == b.ctx {
            return SymbolLoc {
                ctx: a.ctx,
                first: a.first,
                last: b.last,
            };
        }

        let mut l1 = *a;
        let mut l2 = *b;
        let mut level1 = self.depth(&l1);
        let mut level2 = self.depth(&l2);

        while level1 < level2 {
            l2 = self.parent(&l2);
            level2 -= 1;
        }
        while level1 > level2 {
            l1 = self.parent(&l1);
            level1 -= 1;
        }
        while l1.ctx != l2.ctx {
            l1 = self.parent(&l1);
            l2 = self.parent(&l2);
        }

        SymbolLoc {
            ctx: l1.ctx,
            first: l1.first,
            last: l2.last,
        }
    }

    /// In-place form of [`LocationMap::merge`]
    pub fn merge_into(&self, target: &mut SymbolLoc, other: &SymbolLoc) {
        *target = self.merge(target, other);
    }

    /// The chain of `(context, location)` pairs from `loc` up to the root file
    #[must_use]
    pub fn unwind(&self, loc: &SymbolLoc) -> Vec<(LocCtxId, SymbolLoc)> {
        let mut chain = Vec::new();
        let mut loc = *loc;
        while let Some(ctx) = loc.ctx {
            chain.push((ctx, loc));
            loc = self.parent(&loc);
        }
        chain
    }

    /// Walk up through macro expansions until a location in real source text
    #[must_use]
    pub fn macro_origin(&self, loc: &SymbolLoc) -> SymbolLoc {
        let mut loc = *loc;
        while let Some(ctx) = loc.ctx {
            match self.get(ctx).expansion {
                Expansion::Macro { from, .. } => loc = from,
                _ => break,
            }
        }
        loc
    }

    /// Number of `#include` levels above `ctx`
    #[must_use]
    pub fn include_depth(&self, ctx: LocCtxId) -> usize {
        self.unwind(&SymbolLoc::at(ctx, TextPosition::START))
            .iter()
            .filter(|(ctx, _)| matches!(self.get(*ctx).expansion, Expansion::Include { .. }))
            .count()
    }
}
