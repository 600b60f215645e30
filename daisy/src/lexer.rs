//! The lexer driver.
//!
//! [`Preprocessor`] owns every piece of per-unit state: loaded files, the
//! location arena, the macro table, the input stack and the open conditional
//! sections. [`Preprocessor::lex`] pulls lexemes from the automaton and turns
//! them into tokens, expanding macros and running directives as side effects
//! so the parser only ever sees preprocessed tokens.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use smol_str::SmolStr;

use crate::automaton::{DaisyAutomaton, LexFlags, LexStateStack, Pattern, Scan, StartCondition, TokenAutomaton};
use crate::conditional::{condition_actions, IfSectionState};
use crate::config::FrontendConfig;
use crate::diag::{CompileStatus, Diagnostic, Diagnostics, Severity, TraceEntry, TraceKind};
use crate::error::FrontendError;
use crate::input::{InputContext, InputFlags, InputStack};
use crate::literal::{FloatConst, IntegerConst};
use crate::location::{Expansion, LocCtxId, LocationMap, SymbolLoc, TextPosition, TextRange};
use crate::macros::{MacroDefinition, MacroTable};
use crate::oracle::{ConditionOracle, ParseOracle};
use crate::parser::{ReduceActions, SymbolInfo, SymbolValue};
use crate::source::{FileId, SourceFiles};
use crate::text::{skip_comment_block, skip_till_newline};
use crate::token::{Keyword, TokenKind};

/// The preprocessing lexer of one compilation unit
pub struct Preprocessor {
    pub(crate) files: SourceFiles,
    pub(crate) locations: LocationMap,
    pub(crate) macros: MacroTable,
    pub(crate) input: InputStack,
    pub(crate) if_sections: Vec<IfSectionState>,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) include_paths: Vec<PathBuf>,
    pub(crate) include_depth_limit: usize,
    /// File context queued by `#include`, pushed once the directive line is done
    pub(crate) pending_include: Option<InputContext>,
    pub(crate) condition_oracle: Rc<dyn ParseOracle>,
    pub(crate) condition_actions: Rc<ReduceActions<Self>>,
    /// Set by a condition reduce action that reported an error
    pub(crate) condition_failed: bool,
    /// Frame whose expansion is suspended while a `defined` argument is read
    pub(crate) operator_ctx: Option<usize>,
    automaton: Rc<dyn TokenAutomaton>,
    lex_states: LexStateStack,
    at_beginning_of_line: bool,
    last_token: Option<TextRange>,
}

impl Preprocessor {
    /// Create a preprocessor with built-in and configured macros defined
    #[must_use]
    pub fn new(config: &FrontendConfig) -> Self {
        let mut pp = Self {
            files: SourceFiles::new(config.file_resolver.clone()),
            locations: LocationMap::new(),
            macros: MacroTable::default(),
            input: InputStack::default(),
            if_sections: Vec::new(),
            diagnostics: Diagnostics::new(config.diagnostic_handler.clone()),
            include_paths: config.include_paths.clone(),
            include_depth_limit: config.include_depth_limit,
            pending_include: None,
            condition_oracle: config
                .condition_oracle
                .clone()
                .unwrap_or_else(|| Rc::new(ConditionOracle)),
            condition_actions: Rc::new(condition_actions()),
            condition_failed: false,
            operator_ctx: None,
            automaton: config
                .automaton
                .clone()
                .unwrap_or_else(|| Rc::new(DaisyAutomaton)),
            lex_states: LexStateStack::default(),
            at_beginning_of_line: true,
            last_token: None,
        };
        pp.define_builtin_macros();
        for (name, value) in &config.defines {
            pp.define_predefined(name, value);
        }
        pp
    }

    /// Start lexing a file, resolved through the configured file resolver
    ///
    /// # Errors
    /// Returns [`FrontendError::InputNotFound`] if the file cannot be read.
    pub fn push_file(&mut self, path: &Path) -> Result<(), FrontendError> {
        let name = path.to_string_lossy();
        let file = self
            .files
            .load(&name, path)
            .ok_or_else(|| FrontendError::InputNotFound {
                path: path.to_path_buf(),
            })?;
        self.push_source_file(file);
        Ok(())
    }

    /// Start lexing in-memory text registered under `name`
    pub fn push_source(&mut self, name: &str, text: &str) {
        let file = self.files.add_virtual(name, text);
        self.push_source_file(file);
    }

    fn push_source_file(&mut self, file: FileId) {
        let loc_ctx = self.locations.push(Some(file), Expansion::None);
        let text = self.files.get(file).text();
        self.lex_states.reset();
        self.push_input(InputContext::new(text, loc_ctx, InputFlags::empty()));
        self.at_beginning_of_line = true;
    }

    pub(crate) fn push_input(&mut self, ctx: InputContext) {
        self.input.push(ctx, self.if_sections.len());
    }

    /// Whether a macro is currently defined
    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.lookup(name).is_some()
    }

    /// The current definition of a macro
    #[must_use]
    pub fn macro_definition(&self, name: &str) -> Option<&MacroDefinition> {
        self.macros.lookup(name).map(|id| self.macros.get(id))
    }

    /// The location arena of this unit
    #[must_use]
    pub fn locations(&self) -> &LocationMap {
        &self.locations
    }

    /// Loaded source files
    #[must_use]
    pub fn files(&self) -> &SourceFiles {
        &self.files
    }

    /// The diagnostic sink
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Warning and error counts so far
    #[must_use]
    pub fn status(&self) -> CompileStatus {
        self.diagnostics.status()
    }

    /// Number of active input contexts
    #[must_use]
    pub fn input_depth(&self) -> usize {
        self.input.len()
    }

    /// Number of open conditional sections
    #[must_use]
    pub fn if_depth(&self) -> usize {
        self.if_sections.len()
    }

    /// Current classification capacity of the automaton
    #[must_use]
    pub fn lex_state_capacity(&self) -> usize {
        self.lex_states.avail()
    }

    /// Exact source spelling of the last token returned by [`Preprocessor::lex`]
    #[must_use]
    pub fn token_text(&self) -> &str {
        self.last_token.as_ref().map_or("", TextRange::as_str)
    }

    /// Display name of the file a location context belongs to
    #[must_use]
    pub fn file_name(&self, ctx: LocCtxId) -> Option<&str> {
        self.locations
            .get(ctx)
            .file
            .map(|file| self.files.get(file).name())
    }

    /// Report a diagnostic at `loc`, resolving its location chain
    pub fn report(&mut self, severity: Severity, loc: Option<SymbolLoc>, message: impl Into<String>) {
        let trace = loc.map_or_else(Vec::new, |loc| self.resolve_trace(&loc));
        let diagnostic = Diagnostic {
            severity,
            message: message.into(),
            loc,
            trace,
        };
        self.diagnostics.emit(&diagnostic);
    }

    pub(crate) fn error(&mut self, loc: SymbolLoc, message: impl Into<String>) {
        self.report(Severity::Error, Some(loc), message);
    }

    pub(crate) fn warning(&mut self, loc: SymbolLoc, message: impl Into<String>) {
        self.report(Severity::Warning, Some(loc), message);
    }

    pub(crate) fn note(&mut self, loc: SymbolLoc, message: impl Into<String>) {
        self.report(Severity::Note, Some(loc), message);
    }

    fn resolve_trace(&self, loc: &SymbolLoc) -> Vec<TraceEntry> {
        self.locations
            .unwind(loc)
            .into_iter()
            .map(|(ctx, loc)| {
                let context = self.locations.get(ctx);
                let kind = match context.expansion {
                    Expansion::None => TraceKind::Source,
                    Expansion::Include { .. } => TraceKind::Include,
                    Expansion::Macro { macro_def, .. } => {
                        TraceKind::MacroExpansion(self.macros.get(macro_def).id.clone())
                    }
                };
                TraceEntry {
                    kind,
                    file: self.file_name(ctx).map(str::to_owned),
                    first: loc.first,
                    last: loc.last,
                }
            })
            .collect()
    }

    pub(crate) fn report_syntax_error(&mut self, token: TokenKind, loc: &SymbolLoc) {
        let message = match token {
            TokenKind::EndOfFile => "unexpected end of file",
            TokenKind::EndOfInput => "expected token in expression",
            _ => "unexpected token",
        };
        self.error(*loc, message);
    }

    /// Start a new token at the top context's current position; returns the
    /// offset the token's spelling starts at, or `None` if there is no input
    fn begin_token(&self, tkn: &mut SymbolInfo) -> Option<usize> {
        let top = self.input.top()?;
        tkn.loc = SymbolLoc::at(top.loc_ctx, top.text.pos);
        Some(top.text.first())
    }

    fn finish_token(&mut self, spelling_start: usize, kind: TokenKind) -> TokenKind {
        self.last_token = self
            .input
            .top()
            .map(|top| top.text.consumed_since(spelling_start));
        kind
    }

    /// Ask the automaton for the next lexeme, widening its window as needed
    fn classify(&mut self) -> Option<(Pattern, usize)> {
        loop {
            let top = self.input.top()?;
            let text = top.text.as_bytes();
            let mut flags = LexFlags::empty();
            if self.at_beginning_of_line && !top.flags.contains(InputFlags::PREPROC_DIRECTIVE) {
                flags |= LexFlags::AT_BEGINNING_OF_LINE;
            }
            let avail = self.lex_states.avail();
            let window = if avail < text.len() {
                flags |= LexFlags::HAS_MORE;
                &text[..avail]
            } else {
                text
            };
            match self.automaton.classify(window, &mut self.lex_states, flags) {
                Scan::Match { pattern, len } => return Some((pattern, len.max(1))),
                Scan::Starved if flags.contains(LexFlags::HAS_MORE) => {
                    let grow = window.len();
                    log::trace!("growing lexer window past {grow} bytes");
                    self.lex_states.reserve(grow);
                }
                Scan::Starved | Scan::Exhausted => return None,
            }
        }
    }

    /// Produce the next token
    pub fn lex(&mut self, tkn: &mut SymbolInfo) -> TokenKind {
        self.lex_impl(tkn, None)
    }

    /// Produce the next token and tell whether whitespace preceded it
    pub fn lex_with_whitespace(&mut self, tkn: &mut SymbolInfo, leading_ws: &mut bool) -> TokenKind {
        *leading_ws = false;
        self.lex_impl(tkn, Some(leading_ws))
    }

    fn lex_impl(&mut self, tkn: &mut SymbolInfo, mut leading_ws: Option<&mut bool>) -> TokenKind {
        tkn.value = SymbolValue::Empty;
        let Some(mut spelling_start) = self.begin_token(tkn) else {
            return TokenKind::EndOfFile;
        };
        let mut literal = String::new();

        loop {
            let Some((pattern, len)) = self.classify() else {
                if let Some(kind) = self.end_of_context(tkn, &mut literal) {
                    return self.finish_token(spelling_start, kind);
                }
                match self.begin_token(tkn) {
                    Some(start) => spelling_start = start,
                    None => return TokenKind::EndOfFile,
                }
                continue;
            };

            let condition = self.lex_states.current();
            if condition == StartCondition::Initial {
                self.at_beginning_of_line = false;
            }
            let Some(top) = self.input.top_mut() else {
                return TokenKind::EndOfFile;
            };
            let lexeme_start = top.text.first();
            let source = Rc::clone(top.text.source());
            top.text.bump(len);
            let end_pos = top.text.pos;
            let expanding_macro = top.flags.contains(InputFlags::EXPANDING_MACRO);
            tkn.loc.last = TextPosition::new(end_pos.line, end_pos.column.saturating_sub(1).max(1));
            let lexeme = source.get(lexeme_start..lexeme_start + len).unwrap_or_default();
            let lexeme_byte = |i: usize| lexeme.as_bytes().get(i).copied().unwrap_or(0);

            match pattern {
                Pattern::EscapeA => literal.push('\x07'),
                Pattern::EscapeB => literal.push('\x08'),
                Pattern::EscapeF => literal.push('\x0c'),
                Pattern::EscapeR => literal.push('\r'),
                Pattern::EscapeN => literal.push('\n'),
                Pattern::EscapeT => literal.push('\t'),
                Pattern::EscapeV => literal.push('\x0b'),
                Pattern::EscapeLiteral => literal.push(char::from(lexeme_byte(1))),
                Pattern::EscapeOther => {
                    let mut loc = tkn.loc;
                    loc.first = pos_of(end_pos, len);
                    self.warning(loc, "unknown escape sequence");
                    literal.extend(lexeme.get(1..).unwrap_or_default().chars().next());
                }
                Pattern::EscapeHex => {
                    let v = u8::from_str_radix(lexeme.get(2..).unwrap_or_default(), 16).unwrap_or(0);
                    literal.push(char::from(v));
                }
                Pattern::EscapeOct => {
                    let v = u32::from_str_radix(lexeme.get(1..).unwrap_or_default(), 8).unwrap_or(0);
                    literal.push(char::from((v & 0xff) as u8));
                }
                Pattern::QuotedSeq => literal.push_str(lexeme),
                Pattern::QuotedLineWrap => {
                    if let Some(top) = self.input.top_mut() {
                        top.text.pos.next_line();
                    }
                }
                Pattern::QuotedNewline => {
                    let mut loc = tkn.loc;
                    loc.first = loc.last;
                    self.warning(loc, "line break in string literal");
                    literal.push('\n');
                    if let Some(top) = self.input.top_mut() {
                        top.text.pos.next_line();
                    }
                }
                Pattern::StringOpen => self.lex_states.set_current(StartCondition::String),
                Pattern::CharOpen => self.lex_states.set_current(StartCondition::Char),
                Pattern::QuoteClose => {
                    let kind = if condition == StartCondition::Char {
                        TokenKind::CharLiteral
                    } else {
                        TokenKind::StringLiteral
                    };
                    self.lex_states.set_current(StartCondition::Initial);
                    tkn.value = SymbolValue::String(std::mem::take(&mut literal));
                    return self.finish_token(spelling_start, kind);
                }
                Pattern::Punct(kind) => return self.finish_token(spelling_start, kind),
                Pattern::EscChar => {
                    return self.finish_token(spelling_start, TokenKind::Char(lexeme_byte(1)));
                }
                Pattern::OtherChar => {
                    return self.finish_token(spelling_start, TokenKind::Char(lexeme_byte(0)));
                }
                Pattern::TrueLiteral | Pattern::FalseLiteral => {
                    tkn.value = SymbolValue::Bool(pattern == Pattern::TrueLiteral);
                    return self.finish_token(spelling_start, TokenKind::BoolLiteral);
                }
                Pattern::BinLiteral | Pattern::OctLiteral | Pattern::DecLiteral | Pattern::HexLiteral => {
                    let (digits, base) = match pattern {
                        Pattern::BinLiteral => (lexeme.get(2..).unwrap_or_default(), 2),
                        Pattern::HexLiteral => (lexeme.get(2..).unwrap_or_default(), 16),
                        Pattern::OctLiteral => (lexeme, 8),
                        _ => (lexeme, 10),
                    };
                    let value = IntegerConst::from_str_radix(digits, base).unwrap_or_else(|err| {
                        self.error(tkn.loc, err.to_string());
                        IntegerConst::default()
                    });
                    tkn.value = SymbolValue::Integer(value);
                    return self.finish_token(spelling_start, TokenKind::IntLiteral);
                }
                Pattern::FloatLiteral => {
                    let value = FloatConst::parse(lexeme).unwrap_or_else(|err| {
                        self.error(tkn.loc, err.to_string());
                        FloatConst::default()
                    });
                    tkn.value = SymbolValue::Float(value);
                    return self.finish_token(spelling_start, TokenKind::FloatLiteral);
                }
                Pattern::Id => {
                    if let Some(kind) = self.identifier(tkn, lexeme) {
                        return self.finish_token(spelling_start, kind);
                    }
                    let Some(start) = self.begin_token(tkn) else {
                        return TokenKind::EndOfFile;
                    };
                    spelling_start = start;
                    continue;
                }
                Pattern::Comment1 => {
                    if let Some(top) = self.input.top_mut() {
                        skip_till_newline(&mut top.text);
                    }
                    if !expanding_macro {
                        self.at_beginning_of_line = true;
                    }
                    mark_whitespace(&mut leading_ws);
                }
                Pattern::Comment2 => {
                    let terminated = self
                        .input
                        .top_mut()
                        .is_some_and(|top| skip_comment_block(&mut top.text));
                    if !terminated {
                        self.warning(tkn.loc, "unterminated comment block");
                    }
                    mark_whitespace(&mut leading_ws);
                }
                Pattern::Newline | Pattern::FakeNewline => {
                    if pattern == Pattern::Newline && !expanding_macro {
                        self.at_beginning_of_line = true;
                    }
                    if let Some(top) = self.input.top_mut() {
                        top.text.pos.next_line();
                    }
                    mark_whitespace(&mut leading_ws);
                }
                Pattern::Whitespace => mark_whitespace(&mut leading_ws),
                Pattern::Sharp => {
                    let in_directive = self
                        .input
                        .top()
                        .is_some_and(|top| top.flags.contains(InputFlags::PREPROC_DIRECTIVE));
                    if in_directive {
                        return self.finish_token(spelling_start, TokenKind::Char(b'#'));
                    }
                    self.parse_preprocessor_directive();
                    self.at_beginning_of_line = true;
                    mark_whitespace(&mut leading_ws);
                }
            }

            if self.lex_states.current() == StartCondition::Initial && pattern_skips(pattern) {
                match self.begin_token(tkn) {
                    Some(start) => spelling_start = start,
                    None => return TokenKind::EndOfFile,
                }
            }
        }
    }

    /// Handle an identifier; returns `None` if it was consumed by an expansion
    fn identifier(&mut self, tkn: &mut SymbolInfo, id: &str) -> Option<TokenKind> {
        let top = self.input.top()?;
        let flags = top.flags;

        if let Some(expansion) = top.macro_expansion.clone()
            && let Some(ordinal) = self.macros.get(expansion.macro_def).formal_ordinal(id)
        {
            self.expand_macro_argument(&expansion, ordinal);
            return None;
        }

        if !flags.contains(InputFlags::DISABLE_MACRO_EXPANSION)
            && let Some(macro_id) = self.macros.lookup(id)
        {
            self.expand_macro(tkn.loc, macro_id);
            return None;
        }

        if !flags.contains(InputFlags::PREPROC_DIRECTIVE)
            && let Some(keyword) = Keyword::from_ident(id)
        {
            return Some(TokenKind::Keyword(keyword));
        }

        tkn.value = SymbolValue::Ident(SmolStr::new(id));
        Some(TokenKind::Id)
    }

    /// The top context ran out of text. Returns the token to yield, or `None`
    /// if lexing continues in the context below.
    fn end_of_context(&mut self, tkn: &mut SymbolInfo, literal: &mut String) -> Option<TokenKind> {
        let condition = self.lex_states.current();
        if condition != StartCondition::Initial {
            let (kind, message) = if condition == StartCondition::Char {
                (TokenKind::CharLiteral, "unterminated character literal")
            } else {
                (TokenKind::StringLiteral, "unterminated string literal")
            };
            self.warning(tkn.loc, message);
            self.lex_states.set_current(StartCondition::Initial);
            tkn.value = SymbolValue::String(std::mem::take(literal));
            return Some(kind);
        }

        let top = self.input.top()?;
        tkn.loc = SymbolLoc::at(top.loc_ctx, top.text.pos);
        if top.flags.contains(InputFlags::STOP_AT_END_OF_INPUT) {
            return Some(TokenKind::EndOfInput);
        }

        self.close_unterminated_sections();
        if self.input.pop() {
            return Some(TokenKind::EndOfFile);
        }
        None
    }

    /// Close the conditional sections opened inside the top context
    fn close_unterminated_sections(&mut self) {
        let depth = self.input.top().map_or(0, |top| top.if_depth);
        while self.if_sections.len() > depth {
            if let Some(section) = self.if_sections.pop() {
                self.warning(section.loc, "`#if` without `#endif`");
            }
        }
    }
}

/// Patterns that produce no token and restart the token at the next byte
const fn pattern_skips(pattern: Pattern) -> bool {
    matches!(
        pattern,
        Pattern::Comment1
            | Pattern::Comment2
            | Pattern::Newline
            | Pattern::FakeNewline
            | Pattern::Whitespace
            | Pattern::Sharp
    )
}

fn mark_whitespace(leading_ws: &mut Option<&mut bool>) {
    if let Some(flag) = leading_ws.as_deref_mut() {
        *flag = true;
    }
}

/// Position `len` bytes before `end` on the same line
fn pos_of(end: TextPosition, len: usize) -> TextPosition {
    let back = u32::try_from(len).unwrap_or(0);
    TextPosition::new(end.line, end.column.saturating_sub(back).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> Preprocessor {
        Preprocessor::new(&FrontendConfig::new().with_diagnostic_handler(|_| {}))
    }

    #[test]
    fn bounded_context_ends_with_end_of_input() {
        let mut pp = quiet();
        pp.push_source("outer.dy", "x");
        let ctx = pp.locations.push(None, Expansion::None);
        pp.push_input(InputContext::new(
            TextRange::from_text("1 2"),
            ctx,
            InputFlags::STOP_AT_END_OF_INPUT,
        ));

        let mut tkn = SymbolInfo::default();
        assert_eq!(pp.lex(&mut tkn), TokenKind::IntLiteral);
        assert_eq!(pp.lex(&mut tkn), TokenKind::IntLiteral);
        assert_eq!(pp.lex(&mut tkn), TokenKind::EndOfInput);
        assert_eq!(pp.lex(&mut tkn), TokenKind::EndOfInput);
        assert_eq!(pp.input_depth(), 2);

        pp.input.truncate(1);
        assert_eq!(pp.lex(&mut tkn), TokenKind::Id);
        assert_eq!(pp.lex(&mut tkn), TokenKind::EndOfFile);
        assert_eq!(pp.input_depth(), 0);
    }

    #[test]
    fn keywords_and_spellings() {
        let mut pp = quiet();
        pp.push_source("kw.dy", "func  f ->");
        let mut tkn = SymbolInfo::default();
        assert_eq!(pp.lex(&mut tkn), TokenKind::Keyword(Keyword::Func));
        assert_eq!(pp.token_text(), "func");
        let mut ws = false;
        assert_eq!(pp.lex_with_whitespace(&mut tkn, &mut ws), TokenKind::Id);
        assert!(ws);
        assert_eq!((tkn.loc.first.column, tkn.loc.last.column), (7, 7));
        assert_eq!(pp.lex_with_whitespace(&mut tkn, &mut ws), TokenKind::Arrow);
        assert_eq!(pp.token_text(), "->");
    }

    #[test]
    fn syntax_error_wording_depends_on_the_token() {
        let captured = Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = Rc::clone(&captured);
        let config = FrontendConfig::new().with_diagnostic_handler(move |d| sink.borrow_mut().push(d.message.clone()));
        let mut pp = Preprocessor::new(&config);
        let loc = SymbolLoc::default();
        pp.report_syntax_error(TokenKind::EndOfFile, &loc);
        pp.report_syntax_error(TokenKind::EndOfInput, &loc);
        pp.report_syntax_error(TokenKind::Char(b')'), &loc);
        assert_eq!(
            *captured.borrow(),
            ["unexpected end of file", "expected token in expression", "unexpected token"]
        );
        assert_eq!(pp.status().errors, 3);
    }
}
