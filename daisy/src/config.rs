use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::automaton::TokenAutomaton;
use crate::diag::{Diagnostic, DiagnosticHandler};
use crate::oracle::ParseOracle;
use crate::source::FileResolver;

/// Configuration for one compilation unit
#[derive(Clone)]
pub struct FrontendConfig {
    /// Directories searched, in order, after the including file's own directory
    pub include_paths: Vec<PathBuf>,
    /// Predefined macros as `(name, body)` pairs
    pub defines: Vec<(String, String)>,
    /// Maximum `#include` nesting
    pub include_depth_limit: usize,
    /// Custom file reader; the file system is used if `None`
    pub file_resolver: Option<FileResolver>,
    /// Receives diagnostics; they go to the `log` facade if `None`
    pub diagnostic_handler: Option<DiagnosticHandler>,
    /// Token classifier; the built-in Daisy automaton is used if `None`
    pub automaton: Option<Rc<dyn TokenAutomaton>>,
    /// Oracle for `#if` conditions; the built-in condition oracle is used if `None`
    pub condition_oracle: Option<Rc<dyn ParseOracle>>,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl FrontendConfig {
    /// Default include nesting limit
    pub const DEFAULT_INCLUDE_DEPTH_LIMIT: usize = 200;

    /// Create an empty configuration
    #[must_use]
    pub const fn new() -> Self {
        Self {
            include_paths: Vec::new(),
            defines: Vec::new(),
            include_depth_limit: Self::DEFAULT_INCLUDE_DEPTH_LIMIT,
            file_resolver: None,
            diagnostic_handler: None,
            automaton: None,
            condition_oracle: None,
        }
    }

    /// Append an include search directory
    #[must_use]
    pub fn with_include_path(mut self, path: impl AsRef<Path>) -> Self {
        self.include_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Predefine a macro
    #[must_use]
    pub fn with_define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.push((name.into(), value.into()));
        self
    }

    /// Override the include nesting limit
    #[must_use]
    pub const fn with_include_depth_limit(mut self, limit: usize) -> Self {
        self.include_depth_limit = limit;
        self
    }

    /// Read files through a custom resolver
    #[must_use]
    pub fn with_file_resolver(mut self, resolver: impl Fn(&Path) -> Option<String> + 'static) -> Self {
        self.file_resolver = Some(Rc::new(resolver));
        self
    }

    /// Send diagnostics to a handler
    #[must_use]
    pub fn with_diagnostic_handler(mut self, handler: impl Fn(&Diagnostic) + 'static) -> Self {
        self.diagnostic_handler = Some(Rc::new(handler));
        self
    }

    /// Use a different token classifier
    #[must_use]
    pub fn with_automaton(mut self, automaton: Rc<dyn TokenAutomaton>) -> Self {
        self.automaton = Some(automaton);
        self
    }

    /// Use a different oracle for `#if` conditions
    #[must_use]
    pub fn with_condition_oracle(mut self, oracle: Rc<dyn ParseOracle>) -> Self {
        self.condition_oracle = Some(oracle);
        self
    }
}
