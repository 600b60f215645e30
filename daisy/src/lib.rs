#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # Daisy Front End
//!
//! This library implements the front end of the Daisy compiler: a macro
//! preprocessor fused with a longest-match lexer driver, and a generic
//! shift/reduce parser driver that threads a token automaton and a parse
//! oracle together with error recovery.
//!
//! ## Features
//!
//! - Object-like, function-like and variadic macros, with recursion detection
//! - Built-in macros `__line__`, `__file__`, `__va_opt__`, `__str__` and `__paste__`
//! - Conditional compilation (`#if`, `#ifdef`, `#ifndef`, `#elif*`, `#else`, `#endif`)
//! - `#include` with search paths and `#pragma once`
//! - Typed integer and floating-point literals
//! - Location chains that trace every token through includes and macro expansions
//!
//! ## Example
//!
//! ```rust,no_run
//! use daisy::{tokenize_source, FrontendConfig};
//!
//! let code = r#"
//! #define SQUARE(x) ((x) * (x))
//! let a = SQUARE(3);
//! "#;
//!
//! let config = FrontendConfig::new().with_define("DEBUG", "1");
//! let stream = tokenize_source("main.dy", code, &config);
//! println!("{}", stream.to_text());
//! assert!(stream.status.is_success());
//! ```

mod automaton;
mod conditional;
mod config;
mod diag;
mod directives;
mod error;
mod input;
mod lexer;
mod literal;
mod location;
mod macros;
mod oracle;
mod parser;
mod source;
mod text;
mod token;

pub use automaton::{DaisyAutomaton, LexFlags, LexStateStack, Pattern, Scan, StartCondition, TokenAutomaton};
pub use conditional::IfSectionState;
pub use config::FrontendConfig;
pub use diag::{CompileStatus, Diagnostic, DiagnosticHandler, Diagnostics, Severity, TraceEntry, TraceKind};
pub use error::FrontendError;
pub use input::{InputContext, InputFlags, MacroExpansion};
pub use lexer::Preprocessor;
pub use literal::{FloatConst, FloatType, IntegerConst, IntegerType, LiteralError};
pub use location::{
    Expansion, LocCtxId, LocationContext, LocationMap, SymbolLoc, TextPosition, TextRange,
};
pub use macros::{BuiltinMacro, FormalArg, MacroDefinition, MacroId, MacroKind, MacroTable};
pub use oracle::{Action, ConditionOracle, ParseOracle, PreprocRule, RuleId, StartState, StateId};
pub use parser::{
    parse, NodeId, ParseContext, ParseHost, ParseOutcome, ReduceActions, ReduceFn, ScopeId,
    SymbolInfo, SymbolValue, TypeId,
};
pub use source::{normalize_path, FileId, FileResolver, SourceFile, SourceFiles};
pub use token::{is_keyword, Keyword, TokenKind};

use std::path::Path;

/// A preprocessed token
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    /// Token tag
    pub kind: TokenKind,
    /// Exact source spelling
    pub text: String,
    /// Semantic value
    pub value: SymbolValue,
    /// Where the token was lexed, possibly inside a macro body
    pub loc: SymbolLoc,
    /// Where the token appears in real source, outside any macro expansion
    pub origin: SymbolLoc,
    /// Whether whitespace or a comment preceded the token
    pub leading_whitespace: bool,
}

/// All tokens of one compilation unit plus its diagnostic counts
#[derive(Debug)]
pub struct TokenStream {
    /// Tokens up to, not including, the end of file
    pub tokens: Vec<Token>,
    /// Warning and error counts
    pub status: CompileStatus,
}

impl TokenStream {
    /// Render the tokens as text, one source line per output line
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let mut prev: Option<&SymbolLoc> = None;
        for token in &self.tokens {
            match prev {
                Some(p) if p.ctx != token.origin.ctx || p.first.line != token.origin.first.line => {
                    out.push('\n');
                }
                Some(_) if token.leading_whitespace => out.push(' '),
                _ => {}
            }
            out.push_str(&token.text);
            prev = Some(&token.origin);
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

fn collect_tokens(mut pp: Preprocessor) -> TokenStream {
    let mut tokens = Vec::new();
    let mut tkn = SymbolInfo::default();
    loop {
        let mut leading_whitespace = false;
        let kind = pp.lex_with_whitespace(&mut tkn, &mut leading_whitespace);
        if kind == TokenKind::EndOfFile {
            break;
        }
        let origin = pp.locations().macro_origin(&tkn.loc);
        tokens.push(Token {
            kind,
            text: pp.token_text().to_owned(),
            value: std::mem::take(&mut tkn.value),
            loc: tkn.loc,
            origin,
            leading_whitespace,
        });
    }
    log::debug!("{} tokens, {}", tokens.len(), pp.status());
    TokenStream {
        tokens,
        status: pp.status(),
    }
}

/// Preprocess and tokenize in-memory source text.
///
/// Diagnostics go to the configured handler; the returned status counts them.
#[must_use]
pub fn tokenize_source(name: &str, text: &str, config: &FrontendConfig) -> TokenStream {
    let mut pp = Preprocessor::new(config);
    pp.push_source(name, text);
    collect_tokens(pp)
}

/// Preprocess and tokenize a file read through the configured resolver
///
/// # Errors
/// Returns [`FrontendError::InputNotFound`] if the file cannot be read.
pub fn tokenize_file<P: AsRef<Path>>(path: P, config: &FrontendConfig) -> Result<TokenStream, FrontendError> {
    let mut pp = Preprocessor::new(config);
    pp.push_file(path.as_ref())?;
    Ok(collect_tokens(pp))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> FrontendConfig {
        FrontendConfig::new().with_diagnostic_handler(|_| {})
    }

    #[test]
    fn simple_object_macro() {
        let src = r#"
#define PI 3.14
let x = PI;
"#;
        let stream = tokenize_source("main.dy", src, &quiet());
        assert_eq!(stream.to_text(), "let x = 3.14;\n");
        assert!(stream.status.is_success());
    }

    #[test]
    fn function_like_macro() {
        let src = r#"
#define ADD(a, b) ((a)+(b))
let z = ADD(1, 2);
"#;
        let stream = tokenize_source("main.dy", src, &quiet());
        assert_eq!(stream.to_text(), "let z = ((1)+(2));\n");
    }

    #[test]
    fn include_example() {
        let src = r#"
#include "inc.dy"
let x = FOO;
"#;
        let config = quiet().with_file_resolver(|p| {
            if p == Path::new("inc.dy") {
                Some("#define FOO 42\n".to_string())
            } else {
                None
            }
        });
        let stream = tokenize_source("main.dy", src, &config);
        assert!(stream.to_text().contains("42"));
        assert!(stream.status.is_success());
    }

    #[test]
    fn conditional_compilation_ifdef() {
        let src = r#"
#define DEBUG 1
#ifdef DEBUG
let x = 1;
#else
let x = 0;
#endif
"#;
        let stream = tokenize_source("main.dy", src, &quiet());
        assert_eq!(stream.to_text(), "let x = 1;\n");
    }

    #[test]
    fn predefined_macros_from_config() {
        let config = quiet().with_define("WIDTH", "8");
        let stream = tokenize_source("main.dy", "let w = WIDTH * 2;", &config);
        assert_eq!(stream.to_text(), "let w = 8 * 2;\n");
    }

    #[test]
    fn tokens_carry_values_and_keywords() {
        let stream = tokenize_source("main.dy", "let n = 0x10u8;", &quiet());
        let kinds: Vec<_> = stream.tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            [
                TokenKind::Keyword(Keyword::Let),
                TokenKind::Id,
                TokenKind::Char(b'='),
                TokenKind::IntLiteral,
                TokenKind::Char(b';'),
            ]
        );
        assert_eq!(
            stream.tokens[3].value,
            SymbolValue::Integer(IntegerConst::new(IntegerType::U8, 16))
        );
        assert_eq!(stream.tokens[3].text, "0x10u8");
    }

    #[test]
    fn missing_file_is_fatal() {
        let config = quiet().with_file_resolver(|_| None);
        let err = tokenize_file("nope.dy", &config).unwrap_err();
        assert!(matches!(err, FrontendError::InputNotFound { .. }));
    }
}
