//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use daisy::{tokenize_source, Diagnostic, FrontendConfig, Severity, TokenStream};

/// Diagnostics collected by a capturing handler
pub type Captured = Rc<RefCell<Vec<Diagnostic>>>;

/// A configuration reading files from `files` and capturing diagnostics
pub fn config(files: &[(&str, &str)]) -> (FrontendConfig, Captured) {
    let files: Vec<(String, String)> = files
        .iter()
        .map(|(name, text)| ((*name).to_owned(), (*text).to_owned()))
        .collect();
    let captured = Captured::default();
    let sink = Rc::clone(&captured);
    let config = FrontendConfig::new()
        .with_file_resolver(move |path: &Path| {
            files
                .iter()
                .find(|(name, _)| Path::new(name) == path)
                .map(|(_, text)| text.clone())
        })
        .with_diagnostic_handler(move |d: &Diagnostic| sink.borrow_mut().push(d.clone()));
    (config, captured)
}

/// Output of one run
pub struct Run {
    pub stream: TokenStream,
    pub diagnostics: Vec<Diagnostic>,
}

impl Run {
    /// Rendered token text
    pub fn text(&self) -> String {
        self.stream.to_text()
    }

    /// Messages of the given severity, in report order
    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .map(|d| d.message.clone())
            .collect()
    }

    /// Error messages
    pub fn errors(&self) -> Vec<String> {
        self.messages(Severity::Error)
    }

    /// Warning messages
    pub fn warnings(&self) -> Vec<String> {
        self.messages(Severity::Warning)
    }
}

/// Tokenize `text` as `main.dy` with extra files available for `#include`
pub fn run_with(text: &str, files: &[(&str, &str)]) -> Run {
    let (config, captured) = config(files);
    let stream = tokenize_source("main.dy", text, &config);
    let diagnostics = captured.borrow().clone();
    Run { stream, diagnostics }
}

/// Tokenize `text` as `main.dy`
pub fn run(text: &str) -> Run {
    run_with(text, &[])
}

/// One line per token: `line:column kind spelling`
pub fn dump(stream: &TokenStream) -> String {
    stream
        .tokens
        .iter()
        .map(|t| format!("{} {} {}\n", t.origin.first, t.kind, t.text))
        .collect()
}
