//! The stack of active input contexts.
//!
//! The lexer always reads from the top context. Files, macro bodies, macro
//! arguments and directive lines each get a frame; a frame is popped once
//! its text is consumed unless it is flagged to stop there.

use std::rc::Rc;

use crate::location::{LocCtxId, SymbolLoc, TextRange};
use crate::macros::MacroId;

bitflags::bitflags! {
    /// Per-context behaviour flags
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct InputFlags: u8 {
        /// Report `EndOfInput` instead of popping when the text is consumed
        const STOP_AT_END_OF_INPUT = 1 << 0;
        /// The context is a directive line; keywords are not recognized
        const PREPROC_DIRECTIVE = 1 << 1;
        /// The context is a macro body
        const EXPANDING_MACRO = 1 << 2;
        /// Identifiers are never looked up in the macro table
        const DISABLE_MACRO_EXPANSION = 1 << 3;
        /// The rest of the file is skipped after the current directive
        const SKIP_FILE = 1 << 4;
    }
}

/// One active macro expansion, shared by the body context and the
/// contexts of its substituted arguments
#[derive(Debug)]
pub struct MacroExpansion {
    /// The expanded definition
    pub macro_def: MacroId,
    /// Location context of the text that contained the use site
    pub source_ctx: LocCtxId,
    /// The expansion that was active at the use site, if any
    pub source_expansion: Option<Rc<MacroExpansion>>,
    /// The use site, from the macro name to the closing `)`
    pub loc: SymbolLoc,
    /// Raw text of each actual argument, in order
    pub actual_args: Vec<TextRange>,
}

/// A frame of the input stack
#[derive(Debug)]
pub struct InputContext {
    /// The text still to be lexed
    pub text: TextRange,
    /// Location context assigned to tokens lexed from `text`
    pub loc_ctx: LocCtxId,
    /// Behaviour flags
    pub flags: InputFlags,
    /// The macro expansion whose body or argument this is
    pub macro_expansion: Option<Rc<MacroExpansion>>,
    /// Number of open conditional sections when the frame was pushed
    pub(crate) if_depth: usize,
}

impl InputContext {
    /// Create a frame over `text`
    #[must_use]
    pub fn new(text: TextRange, loc_ctx: LocCtxId, flags: InputFlags) -> Self {
        Self {
            text,
            loc_ctx,
            flags,
            macro_expansion: None,
            if_depth: 0,
        }
    }

    /// Attach the expansion this frame belongs to
    #[must_use]
    pub fn with_expansion(mut self, expansion: Option<Rc<MacroExpansion>>) -> Self {
        self.macro_expansion = expansion;
        self
    }
}

/// LIFO stack of input frames
#[derive(Debug, Default)]
pub struct InputStack {
    frames: Vec<InputContext>,
}

impl InputStack {
    /// Push a frame, recording how many conditional sections are open
    pub fn push(&mut self, mut ctx: InputContext, if_depth: usize) {
        ctx.if_depth = if_depth;
        self.frames.push(ctx);
    }

    /// Pop the top frame; returns `true` if the stack is now empty
    pub fn pop(&mut self) -> bool {
        self.frames.pop();
        self.frames.is_empty()
    }

    /// The frame the lexer reads from
    #[must_use]
    pub fn top(&self) -> Option<&InputContext> {
        self.frames.last()
    }

    /// Mutable access to the top frame
    pub fn top_mut(&mut self) -> Option<&mut InputContext> {
        self.frames.last_mut()
    }

    /// Frame at `index`, counted from the bottom
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&InputContext> {
        self.frames.get(index)
    }

    /// Mutable frame at `index`, counted from the bottom
    pub fn get_mut(&mut self, index: usize) -> Option<&mut InputContext> {
        self.frames.get_mut(index)
    }

    /// Drop every frame above the first `len`
    pub fn truncate(&mut self, len: usize) {
        self.frames.truncate(len);
    }

    /// Number of frames
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the stack is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{Expansion, LocationMap};

    #[test]
    fn pop_reports_emptiness_and_frames_remember_if_depth() {
        let mut locations = LocationMap::new();
        let ctx = locations.push(None, Expansion::None);
        let mut stack = InputStack::default();
        stack.push(InputContext::new(TextRange::from_text("a"), ctx, InputFlags::empty()), 0);
        stack.push(
            InputContext::new(TextRange::from_text("b"), ctx, InputFlags::STOP_AT_END_OF_INPUT),
            2,
        );

        assert_eq!(stack.top().map(|c| c.if_depth), Some(2));
        assert!(!stack.pop());
        assert_eq!(stack.top().map(|c| c.text.as_str()), Some("a"));
        assert!(stack.pop());
    }

    #[test]
    fn flags_insert_and_remove() {
        let mut flags = InputFlags::PREPROC_DIRECTIVE | InputFlags::DISABLE_MACRO_EXPANSION;
        assert!(flags.contains(InputFlags::PREPROC_DIRECTIVE));
        flags.remove(InputFlags::DISABLE_MACRO_EXPANSION);
        assert!(!flags.contains(InputFlags::DISABLE_MACRO_EXPANSION));
        flags.insert(InputFlags::SKIP_FILE);
        assert!(flags.contains(InputFlags::SKIP_FILE | InputFlags::PREPROC_DIRECTIVE));
    }
}
