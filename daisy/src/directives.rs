//! Preprocessing directives.
//!
//! A directive runs with its input limited to the rest of the line, with
//! macro expansion off until a handler turns it on. Whatever a handler
//! leaves unread on the line is dropped. While the innermost conditional
//! section is disabled only the `#if` family is looked at; everything up to
//! the next directive is skipped.

use std::path::{Path, PathBuf};

use crate::conditional::Condition;
use crate::diag::Severity;
use crate::input::{InputContext, InputFlags};
use crate::lexer::Preprocessor;
use crate::location::Expansion;
use crate::parser::{SymbolInfo, SymbolValue};
use crate::text::{skip_till_newline, skip_till_preproc_directive, skip_whitespaces, trim_trailing_whitespaces};
use crate::token::TokenKind;

/// A known directive name
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Directive {
    Define,
    Undef,
    Include,
    If,
    Ifdef,
    Ifndef,
    Elif,
    Elifdef,
    Elifndef,
    Else,
    Endif,
    Pragma,
    Info,
    Warning,
    Error,
}

impl Directive {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "define" => Self::Define,
            "undef" => Self::Undef,
            "include" => Self::Include,
            "if" => Self::If,
            "ifdef" => Self::Ifdef,
            "ifndef" => Self::Ifndef,
            "elif" => Self::Elif,
            "elifdef" => Self::Elifdef,
            "elifndef" => Self::Elifndef,
            "else" => Self::Else,
            "endif" => Self::Endif,
            "pragma" => Self::Pragma,
            "info" => Self::Info,
            "warning" => Self::Warning,
            "error" => Self::Error,
            _ => return None,
        })
    }

    /// Whether the directive is looked at inside disabled text
    pub(crate) const fn parses_disabled_text(self) -> bool {
        matches!(
            self,
            Self::If
                | Self::Ifdef
                | Self::Ifndef
                | Self::Elif
                | Self::Elifdef
                | Self::Elifndef
                | Self::Else
                | Self::Endif
        )
    }
}

impl Preprocessor {
    /// Run the directive after a `#`, then skip any disabled text that follows
    pub(crate) fn parse_preprocessor_directive(&mut self) {
        let Some(idx) = self.input.len().checked_sub(1) else {
            return;
        };
        let mut is_text_disabled = false;

        loop {
            let Some(frame) = self.input.get_mut(idx) else {
                return;
            };
            let mut rest = frame.text.clone();
            skip_till_newline(&mut rest);
            frame.text.set_last(rest.first());
            let saved_flags = frame.flags;
            frame.flags =
                InputFlags::PREPROC_DIRECTIVE | InputFlags::STOP_AT_END_OF_INPUT | InputFlags::DISABLE_MACRO_EXPANSION;

            let mut tkn = SymbolInfo::default();
            if self.lex(&mut tkn) == TokenKind::Id {
                let directive = tkn.ident().and_then(|name| Directive::from_name(name));
                match directive {
                    Some(directive) if !is_text_disabled || directive.parses_disabled_text() => {
                        self.run_directive(directive, &mut tkn);
                    }
                    Some(_) => {}
                    None if !is_text_disabled => self.error(tkn.loc, "unknown preprocessing directive"),
                    None => {}
                }
            } else if !is_text_disabled {
                self.error(tkn.loc, "expected preprocessing directive identifier");
            }

            self.input.truncate(idx + 1);
            if let Some(frame) = self.input.get_mut(idx) {
                if frame.flags.contains(InputFlags::SKIP_FILE) {
                    rest.exhaust();
                }
                frame.text = rest;
                frame.flags = saved_flags;
            }

            if let Some(include) = self.pending_include.take() {
                self.push_input(include);
                return;
            }
            if !self.is_text_disabled() {
                return;
            }

            let Some(frame) = self.input.get_mut(idx) else {
                return;
            };
            skip_till_preproc_directive(&mut frame.text);
            if frame.text.is_empty() {
                return;
            }
            is_text_disabled = true;
        }
    }

    fn run_directive(&mut self, directive: Directive, tkn: &mut SymbolInfo) {
        log::trace!("directive {directive:?} at {}", tkn.loc.first);
        match directive {
            Directive::Define => self.parse_define_directive(tkn),
            Directive::Undef => self.parse_undef_directive(tkn),
            Directive::Include => self.parse_include_directive(tkn),
            Directive::If => self.parse_if_directive(tkn, Condition::Expr),
            Directive::Ifdef => self.parse_if_directive(tkn, Condition::Defined),
            Directive::Ifndef => self.parse_if_directive(tkn, Condition::NotDefined),
            Directive::Elif => self.parse_elif_directive(tkn, Condition::Expr),
            Directive::Elifdef => self.parse_elif_directive(tkn, Condition::Defined),
            Directive::Elifndef => self.parse_elif_directive(tkn, Condition::NotDefined),
            Directive::Else => self.parse_else_directive(tkn),
            Directive::Endif => self.parse_endif_directive(tkn),
            Directive::Pragma => self.parse_pragma_directive(tkn),
            Directive::Info => {
                let message = self.directive_message();
                self.report(Severity::Info, Some(tkn.loc), message);
            }
            Directive::Warning => {
                let message = self.directive_message();
                self.warning(tkn.loc, message);
            }
            Directive::Error => {
                let message = self.directive_message();
                self.error(tkn.loc, message);
            }
        }
    }

    /// Warn if anything but the end of the directive line follows
    pub(crate) fn ensure_end_of_input(&mut self, tkn: &mut SymbolInfo) {
        if self.lex(tkn) != TokenKind::EndOfInput {
            self.warning(tkn.loc, "extra tokens at end of preprocessing directive");
        }
    }

    /// The rest of the directive line, trimmed
    fn directive_message(&self) -> String {
        let Some(top) = self.input.top() else {
            return String::new();
        };
        let mut text = top.text.clone();
        skip_whitespaces(&mut text);
        trim_trailing_whitespaces(&mut text);
        text.as_str().to_owned()
    }

    /// `#include "path"`
    fn parse_include_directive(&mut self, tkn: &mut SymbolInfo) {
        if self.lex(tkn) != TokenKind::StringLiteral {
            self.error(tkn.loc, "expected file name");
            return;
        }
        let SymbolValue::String(file_name) = std::mem::take(&mut tkn.value) else {
            return;
        };
        let include_loc = tkn.loc;

        let base = include_loc
            .ctx
            .and_then(|ctx| self.locations.get(ctx).file)
            .and_then(|file| self.files.get(file).path().parent().map(Path::to_path_buf))
            .unwrap_or_default();
        let candidates: Vec<PathBuf> = std::iter::once(base)
            .chain(self.include_paths.iter().cloned())
            .map(|dir| dir.join(&file_name))
            .collect();

        let Some(file) = candidates
            .iter()
            .find_map(|path| self.files.load(&path.to_string_lossy(), path))
        else {
            self.error(include_loc, format!("could not open input file `{file_name}`"));
            return;
        };

        self.ensure_end_of_input(tkn);
        let depth = include_loc.ctx.map_or(0, |ctx| self.locations.include_depth(ctx));
        if depth >= self.include_depth_limit {
            self.error(include_loc, "`#include` nested too deeply");
            return;
        }

        log::debug!("include `{}`", self.files.get(file).name());
        let loc_ctx = self.locations.push(Some(file), Expansion::Include { from: include_loc });
        let text = self.files.get(file).text();
        self.pending_include = Some(InputContext::new(text, loc_ctx, InputFlags::empty()));
    }

    /// `#pragma id`
    fn parse_pragma_directive(&mut self, tkn: &mut SymbolInfo) {
        if self.lex(tkn) != TokenKind::Id {
            self.error(tkn.loc, "expected pragma identifier");
            return;
        }
        match tkn.ident().map(|id| id.as_str()) {
            Some("once") => self.pragma_once(),
            _ => self.warning(tkn.loc, "unknown pragma identifier"),
        }
    }

    fn pragma_once(&mut self) {
        let Some(top) = self.input.top_mut() else {
            return;
        };
        let Some(file) = self.locations.get(top.loc_ctx).file else {
            return;
        };
        let source = self.files.get_mut(file);
        if source.once {
            top.flags.insert(InputFlags::SKIP_FILE);
        }
        source.once = true;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::config::FrontendConfig;
    use crate::diag::Diagnostic;

    fn run(text: &str, files: &'static [(&'static str, &'static str)]) -> (Vec<String>, Vec<(Severity, String)>) {
        let diags = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&diags);
        let config = FrontendConfig::new()
            .with_file_resolver(move |path: &Path| {
                files
                    .iter()
                    .find(|(name, _)| Path::new(name) == path)
                    .map(|(_, text)| (*text).to_owned())
            })
            .with_diagnostic_handler(move |d: &Diagnostic| sink.borrow_mut().push((d.severity, d.message.clone())));
        let mut pp = Preprocessor::new(&config);
        pp.push_source("main.dy", text);
        let mut tkn = SymbolInfo::default();
        let mut ids = Vec::new();
        while pp.lex(&mut tkn) != TokenKind::EndOfFile {
            ids.push(pp.token_text().to_owned());
        }
        let diags = diags.borrow().clone();
        (ids, diags)
    }

    #[test]
    fn directive_names_classify() {
        assert_eq!(Directive::from_name("elifndef"), Some(Directive::Elifndef));
        assert_eq!(Directive::from_name("import"), None);
        assert!(Directive::Endif.parses_disabled_text());
        assert!(!Directive::Define.parses_disabled_text());
    }

    #[test]
    fn pragma_once_skips_second_inclusion() {
        let (ids, diags) = run(
            "#include \"a.dy\"\n#include \"a.dy\"\nend\n",
            &[("a.dy", "#pragma once\nfrom_a\n")],
        );
        assert_eq!(ids, ["from_a", "end"]);
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn message_directives_report_rest_of_line() {
        let (_, diags) = run("#info  hello there  \n#warning careful\n#error stop\n", &[]);
        assert_eq!(
            diags,
            [
                (Severity::Info, "hello there".to_owned()),
                (Severity::Warning, "careful".to_owned()),
                (Severity::Error, "stop".to_owned()),
            ]
        );
    }

    #[test]
    fn disabled_text_ignores_unknown_directives() {
        let (ids, diags) = run("#if 0\n#bogus\n#define X 1\n#endif\n#ifdef X\nx\n#endif\nok\n", &[]);
        assert_eq!(ids, ["ok"]);
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn bad_directives_are_errors() {
        let (_, diags) = run("#bogus\n# 1\n#include nope\n#include \"missing.dy\"\n#pragma\n#pragma whatever\n", &[]);
        let messages: Vec<_> = diags.iter().map(|(_, m)| m.as_str()).collect();
        assert_eq!(
            messages,
            [
                "unknown preprocessing directive",
                "expected preprocessing directive identifier",
                "expected file name",
                "could not open input file `missing.dy`",
                "expected pragma identifier",
                "unknown pragma identifier",
            ]
        );
    }
}
