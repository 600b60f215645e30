//! Macro definitions and expansion.
//!
//! A definition keeps its body as raw text; every expansion pushes that text
//! as a new input context and the lexer re-reads it, substituting formal
//! arguments as they are encountered. Expansion is suppressed for a macro
//! that is already being expanded further up the location chain.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::input::{InputContext, InputFlags, MacroExpansion};
use crate::lexer::Preprocessor;
use crate::location::{Expansion, SymbolLoc, TextRange};
use crate::parser::SymbolInfo;
use crate::text::{
    find_macro_argument_list, find_macro_argument_separator, skip_whitespaces, trim_trailing_whitespaces,
};
use crate::token::{is_keyword, TokenKind};

/// Internal name of the variadic parameter
pub const VA_ARGS: &str = "__va_args__";

/// Handle of a [`MacroDefinition`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacroId(u32);

impl MacroId {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

/// Macros whose expansion is computed rather than read from a body
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinMacro {
    /// `__line__`: line of the outermost use site
    Line,
    /// `__file__`: file name of the outermost use site, as a string literal
    File,
    /// `__va_opt__(x)`: `x` if the enclosing variadic argument is non-empty
    VaOpt,
    /// `__str__(x)`: the spelling of `x` as a string literal
    Str,
    /// `__paste__(x)`: the spelling of `x` with `##` joining its neighbours
    Paste,
}

impl BuiltinMacro {
    const ALL: [Self; 5] = [Self::Line, Self::File, Self::VaOpt, Self::Str, Self::Paste];

    /// The macro's name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Line => "__line__",
            Self::File => "__file__",
            Self::VaOpt => "__va_opt__",
            Self::Str => "__str__",
            Self::Paste => "__paste__",
        }
    }

    const fn takes_argument(self) -> bool {
        matches!(self, Self::VaOpt | Self::Str | Self::Paste)
    }
}

/// Where a definition came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacroKind {
    /// `#define` or a configured define
    UserDefined,
    /// Installed by the preprocessor itself
    BuiltIn(BuiltinMacro),
}

/// A formal argument of a function-like macro
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormalArg {
    /// Position in the argument list
    pub ordinal: usize,
    /// Where the argument was declared
    pub loc: SymbolLoc,
}

/// A macro definition
#[derive(Debug)]
pub struct MacroDefinition {
    /// User or built-in
    pub kind: MacroKind,
    /// Macro name
    pub id: SmolStr,
    /// Whether the last formal argument collects all remaining arguments
    pub is_variadic: bool,
    /// Formal arguments by name
    pub formal_args: FxHashMap<SmolStr, FormalArg>,
    /// Location of the name in the `#define`
    pub loc: SymbolLoc,
    /// Unexpanded replacement text
    pub body: TextRange,
}

impl MacroDefinition {
    /// Number of actual arguments an invocation must supply.
    ///
    /// A variadic macro without named formals still takes one argument.
    #[must_use]
    pub fn formal_arg_count(&self) -> usize {
        if self.formal_args.is_empty() && self.is_variadic {
            1
        } else {
            self.formal_args.len()
        }
    }

    /// Ordinal of a formal argument
    #[must_use]
    pub fn formal_ordinal(&self, name: &str) -> Option<usize> {
        self.formal_args.get(name).map(|arg| arg.ordinal)
    }

    /// Whether the definition is built in
    #[must_use]
    pub const fn is_builtin(&self) -> bool {
        matches!(self.kind, MacroKind::BuiltIn(_))
    }
}

/// Name-to-definition table; definitions stay alive after removal so
/// locations referring to them remain valid
#[derive(Debug, Default)]
pub struct MacroTable {
    defs: Vec<Rc<MacroDefinition>>,
    by_name: FxHashMap<SmolStr, MacroId>,
}

impl MacroTable {
    /// Install a definition; returns the one it replaced
    pub fn define(&mut self, def: MacroDefinition) -> Option<MacroId> {
        let id = MacroId(u32::try_from(self.defs.len()).unwrap_or(u32::MAX));
        let name = def.id.clone();
        self.defs.push(Rc::new(def));
        self.by_name.insert(name, id)
    }

    /// Remove a name; returns the definition it referred to
    pub fn undef(&mut self, name: &str) -> Option<MacroId> {
        self.by_name.remove(name)
    }

    /// The current definition of a name
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<MacroId> {
        self.by_name.get(name).copied()
    }

    /// Look up a definition by handle
    ///
    /// # Panics
    /// Panics if `id` was not produced by this table.
    #[must_use]
    pub fn get(&self, id: MacroId) -> &MacroDefinition {
        &self.defs[id.0 as usize]
    }

    fn get_rc(&self, id: MacroId) -> Rc<MacroDefinition> {
        Rc::clone(&self.defs[id.0 as usize])
    }

    /// Number of currently defined names
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether no name is defined
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl Preprocessor {
    pub(crate) fn define_builtin_macros(&mut self) {
        for builtin in BuiltinMacro::ALL {
            self.macros.define(MacroDefinition {
                kind: MacroKind::BuiltIn(builtin),
                id: SmolStr::new_static(builtin.name()),
                is_variadic: builtin.takes_argument(),
                formal_args: FxHashMap::default(),
                loc: SymbolLoc::default(),
                body: TextRange::from_text(""),
            });
        }
    }

    /// Install an object-like macro with a synthesized body
    pub(crate) fn define_predefined(&mut self, name: &str, value: &str) {
        let mut body = TextRange::from_text(value);
        trim_trailing_whitespaces(&mut body);
        let previous = self.macros.define(MacroDefinition {
            kind: MacroKind::UserDefined,
            id: SmolStr::new(name),
            is_variadic: false,
            formal_args: FxHashMap::default(),
            loc: SymbolLoc::default(),
            body,
        });
        if previous.is_some() {
            log::warn!("predefined macro `{name}` redefined");
        }
    }

    /// `#define NAME[(args)] body`
    pub(crate) fn parse_define_directive(&mut self, tkn: &mut SymbolInfo) {
        if self.lex(tkn) != TokenKind::Id {
            self.error(tkn.loc, "expected macro name");
            return;
        }
        let Some(id) = tkn.ident().cloned() else {
            return;
        };
        if is_keyword(&id) {
            self.error(tkn.loc, format!("keyword `{id}` cannot be used as a macro name"));
            return;
        }
        let name_loc = tkn.loc;

        let mut formal_args = FxHashMap::default();
        let mut is_variadic = false;
        let has_args = self.input.top().is_some_and(|top| top.text.peek() == Some(b'('));
        if has_args {
            if let Some(top) = self.input.top_mut() {
                top.text.bump(1);
            }
            if !self.parse_formal_args(tkn, &mut formal_args, &mut is_variadic) {
                return;
            }
        }

        let Some(top) = self.input.top() else {
            return;
        };
        let mut body = top.text.clone();
        skip_whitespaces(&mut body);
        trim_trailing_whitespaces(&mut body);

        let def = MacroDefinition {
            kind: MacroKind::UserDefined,
            id: id.clone(),
            is_variadic,
            formal_args,
            loc: name_loc,
            body,
        };
        log::debug!("define `{id}`");
        if let Some(previous) = self.macros.define(def) {
            let message = if self.macros.get(previous).is_builtin() {
                format!("builtin macro `{id}` redefinition")
            } else {
                format!("macro `{id}` redefinition")
            };
            self.warning(name_loc, message);
        }
    }

    /// Parse `a, b, ...)` after the opening parenthesis; reports and returns
    /// `false` on malformed lists
    fn parse_formal_args(
        &mut self,
        tkn: &mut SymbolInfo,
        formal_args: &mut FxHashMap<SmolStr, FormalArg>,
        is_variadic: &mut bool,
    ) -> bool {
        loop {
            let arg_id = match self.lex(tkn) {
                TokenKind::Id => {
                    let Some(arg_id) = tkn.ident().cloned() else {
                        return false;
                    };
                    if arg_id == VA_ARGS {
                        self.error(tkn.loc, format!("identifier `{VA_ARGS}` is reserved for variable argument"));
                        return false;
                    }
                    arg_id
                }
                TokenKind::Ellipsis => {
                    *is_variadic = true;
                    SmolStr::new_static(VA_ARGS)
                }
                _ => {
                    self.error(tkn.loc, "expected macro argument identifier or `...`");
                    return false;
                }
            };

            if formal_args.contains_key(&arg_id) {
                self.error(tkn.loc, format!("duplicate macro argument `{arg_id}`"));
                return false;
            }
            let ordinal = formal_args.len();
            formal_args.insert(arg_id, FormalArg { ordinal, loc: tkn.loc });

            let mut tt = self.lex(tkn);
            if tt == TokenKind::Ellipsis && !*is_variadic {
                *is_variadic = true;
                tt = self.lex(tkn);
            }
            match tt {
                TokenKind::Char(b')') => return true,
                TokenKind::Char(b',') if !*is_variadic => {}
                _ if *is_variadic => {
                    self.error(tkn.loc, "expected `)`");
                    return false;
                }
                _ => {
                    self.error(tkn.loc, "expected `)` or `,`");
                    return false;
                }
            }
        }
    }

    /// `#undef NAME`
    pub(crate) fn parse_undef_directive(&mut self, tkn: &mut SymbolInfo) {
        if self.lex(tkn) != TokenKind::Id {
            self.error(tkn.loc, "expected macro name");
            return;
        }
        let Some(id) = tkn.ident().cloned() else {
            return;
        };
        match self.macros.undef(&id) {
            Some(previous) if self.macros.get(previous).is_builtin() => {
                self.warning(tkn.loc, format!("cannot undefine builtin macro `{id}`"));
            }
            Some(_) => log::debug!("undef `{id}`"),
            None => self.warning(tkn.loc, format!("macro `{id}` is not defined")),
        }
        self.ensure_end_of_input(tkn);
    }

    /// Expand `macro_id` used at `loc`, capturing its arguments from the
    /// current context. Errors are reported and leave nothing pushed.
    pub(crate) fn expand_macro(&mut self, loc: SymbolLoc, macro_id: MacroId) {
        let def = self.macros.get_rc(macro_id);
        let Some(top) = self.input.top() else {
            return;
        };
        let mut expansion = MacroExpansion {
            macro_def: macro_id,
            source_ctx: top.loc_ctx,
            source_expansion: top.macro_expansion.clone(),
            loc,
            actual_args: Vec::new(),
        };

        let formal_count = def.formal_arg_count();
        if formal_count > 0 && !self.capture_arguments(&def, formal_count, &mut expansion) {
            return;
        }

        let expansion = Rc::new(expansion);
        match def.kind {
            MacroKind::BuiltIn(builtin) => self.expand_builtin(builtin, &expansion),
            MacroKind::UserDefined => {
                if self.is_recursive_expansion(&def.id) {
                    self.error(loc, format!("recursive macro `{}` expansion", def.id));
                    return;
                }
                let file = def.loc.ctx.and_then(|ctx| self.locations.get(ctx).file);
                let loc_ctx = self.locations.push(
                    file,
                    Expansion::Macro {
                        from: expansion.loc,
                        macro_def: macro_id,
                    },
                );
                let ctx = InputContext::new(def.body.clone(), loc_ctx, InputFlags::EXPANDING_MACRO)
                    .with_expansion(Some(expansion));
                self.push_input(ctx);
            }
        }
    }

    fn report_with_definition(&mut self, def: &MacroDefinition, loc: SymbolLoc, message: String) {
        self.error(loc, message);
        if def.loc.ctx.is_some() {
            self.note(def.loc, format!("macro `{}` defined here", def.id));
        }
    }

    /// Capture `( a, b, ... )` from the current context into `expansion`
    fn capture_arguments(&mut self, def: &MacroDefinition, formal_count: usize, expansion: &mut MacroExpansion) -> bool {
        let Some(top) = self.input.top() else {
            return false;
        };
        let mut text = top.text.clone();
        find_macro_argument_list(&mut text);
        if text.peek() != Some(b'(') {
            self.report_with_definition(def, expansion.loc, format!("macro `{}` requires arguments", def.id));
            return false;
        }

        let args = &mut expansion.actual_args;
        while let Some(c) = text.peek()
            && c != b')'
        {
            text.bump(1);
            skip_whitespaces(&mut text);
            let start = text.clone();
            find_macro_argument_separator(&mut text);
            let mut arg = start.until(&text);
            trim_trailing_whitespaces(&mut arg);
            let args_len = args.len();
            match args.last_mut() {
                Some(last) if def.is_variadic && args_len >= formal_count => last.set_last(arg.last()),
                _ => args.push(arg),
            }
        }

        if text.is_empty() {
            self.report_with_definition(
                def,
                expansion.loc,
                format!("unterminated argument list for macro `{}`", def.id),
            );
            return false;
        }

        expansion.loc.last = text.pos;
        text.bump(1);
        if let Some(top) = self.input.top_mut() {
            top.text = text.clone();
        }

        let provided = expansion.actual_args.len();
        if def.is_variadic {
            if provided + 1 < formal_count {
                self.report_with_definition(
                    def,
                    expansion.loc,
                    format!(
                        "variadic macro `{}` requires at least {} arguments, but {} provided",
                        def.id,
                        formal_count - 1,
                        provided
                    ),
                );
                return false;
            }
            if provided < formal_count {
                expansion.actual_args.push(text.empty_at());
            }
        } else if provided != formal_count {
            self.report_with_definition(
                def,
                expansion.loc,
                format!(
                    "macro `{}` requires {} arguments, but {} provided",
                    def.id, formal_count, provided
                ),
            );
            return false;
        }
        true
    }

    /// Whether a macro named `id` is already being expanded at the current position
    fn is_recursive_expansion(&self, id: &str) -> bool {
        let Some(top) = self.input.top() else {
            return false;
        };
        let mut ctx = top.loc_ctx;
        loop {
            let Expansion::Macro { from, macro_def } = self.locations.get(ctx).expansion else {
                return false;
            };
            if self.macros.get(macro_def).id == id {
                return true;
            }
            match from.ctx {
                Some(parent) => ctx = parent,
                None => return false,
            }
        }
    }

    /// Substitute the `ordinal`-th actual argument of `expansion`.
    ///
    /// An argument substituted while expansion is disabled, as when spelling
    /// the operand of `__str__`, stays unexpanded.
    pub(crate) fn expand_macro_argument(&mut self, expansion: &MacroExpansion, ordinal: usize) {
        let Some(arg) = expansion.actual_args.get(ordinal) else {
            return;
        };
        let flags = self
            .input
            .top()
            .map_or(InputFlags::empty(), |top| top.flags & InputFlags::DISABLE_MACRO_EXPANSION);
        let ctx = InputContext::new(arg.clone(), expansion.source_ctx, flags)
            .with_expansion(expansion.source_expansion.clone());
        self.push_input(ctx);
    }

    fn expand_builtin(&mut self, builtin: BuiltinMacro, expansion: &Rc<MacroExpansion>) {
        match builtin {
            BuiltinMacro::Line => {
                let origin = self.locations.macro_origin(&expansion.loc);
                self.push_string_input(origin.first.line.to_string(), expansion);
            }
            BuiltinMacro::File => {
                let origin = self.locations.macro_origin(&expansion.loc);
                let name = origin
                    .ctx
                    .and_then(|ctx| self.file_name(ctx))
                    .unwrap_or_default()
                    .to_owned();
                self.push_string_input(quote(&name), expansion);
            }
            BuiltinMacro::VaOpt => {
                let enclosing = expansion
                    .source_expansion
                    .as_ref()
                    .filter(|outer| self.macros.get(outer.macro_def).is_variadic);
                let Some(outer) = enclosing else {
                    self.error(
                        expansion.loc,
                        "`__va_opt__` can only be used in the expansion of a variadic macro",
                    );
                    return;
                };
                let has_variadic_args = outer.actual_args.last().is_some_and(|arg| !arg.is_empty());
                if has_variadic_args {
                    self.expand_macro_argument(expansion, 0);
                }
            }
            BuiltinMacro::Str => {
                let text = self.spell_argument(expansion);
                self.push_string_input(quote(&text), expansion);
            }
            BuiltinMacro::Paste => {
                let text = self.spell_argument(expansion);
                self.push_string_input(text, expansion);
            }
        }
    }

    /// Re-lex the first argument with expansion disabled and join the token
    /// spellings, keeping single spaces where whitespace separated tokens
    fn spell_argument(&mut self, expansion: &MacroExpansion) -> String {
        let Some(arg) = expansion.actual_args.first() else {
            return String::new();
        };
        let ctx = InputContext::new(
            arg.clone(),
            expansion.source_ctx,
            InputFlags::STOP_AT_END_OF_INPUT | InputFlags::DISABLE_MACRO_EXPANSION,
        )
        .with_expansion(expansion.source_expansion.clone());
        self.push_input(ctx);
        let height = self.input.len();

        let mut out = String::new();
        let mut glue = false;
        let mut tkn = SymbolInfo::default();
        loop {
            let mut leading_ws = false;
            let tt = self.lex_with_whitespace(&mut tkn, &mut leading_ws);
            match tt {
                TokenKind::EndOfInput | TokenKind::EndOfFile => break,
                TokenKind::Concatenate => glue = true,
                _ => {
                    if leading_ws && !glue && !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(self.token_text());
                    glue = false;
                }
            }
        }
        self.input.truncate(height.saturating_sub(1));
        out
    }

    /// Push synthesized text as the expansion of a built-in macro
    fn push_string_input(&mut self, text: String, expansion: &MacroExpansion) {
        let loc_ctx = self.locations.push(
            None,
            Expansion::Macro {
                from: expansion.loc,
                macro_def: expansion.macro_def,
            },
        );
        let ctx = InputContext::new(TextRange::from_text(&text), loc_ctx, InputFlags::EXPANDING_MACRO);
        self.push_input(ctx);
    }
}

/// Spell `text` as a string literal
fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variadic_without_named_formals_takes_one_argument() {
        let def = MacroDefinition {
            kind: MacroKind::BuiltIn(BuiltinMacro::Str),
            id: SmolStr::new_static("__str__"),
            is_variadic: true,
            formal_args: FxHashMap::default(),
            loc: SymbolLoc::default(),
            body: TextRange::from_text(""),
        };
        assert_eq!(def.formal_arg_count(), 1);
        assert!(def.is_builtin());
    }

    #[test]
    fn table_reports_replaced_and_removed_definitions() {
        let mut table = MacroTable::default();
        let def = |id: &str| MacroDefinition {
            kind: MacroKind::UserDefined,
            id: SmolStr::new(id),
            is_variadic: false,
            formal_args: FxHashMap::default(),
            loc: SymbolLoc::default(),
            body: TextRange::from_text("1"),
        };
        assert!(table.define(def("A")).is_none());
        let first = table.lookup("A");
        assert_eq!(table.define(def("A")), first);
        assert_ne!(table.lookup("A"), first);
        assert!(table.undef("A").is_some());
        assert!(table.lookup("A").is_none());
        assert!(table.undef("A").is_none());
    }

    #[test]
    fn quote_escapes_specials() {
        assert_eq!(quote(r#"a "b" \c"#), r#""a \"b\" \\c""#);
    }
}
