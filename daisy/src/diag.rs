//! Diagnostics: severities, counters and the reporting sink.

use std::fmt;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::location::{SymbolLoc, TextPosition};

/// How serious a diagnostic is
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Compilation cannot continue
    Fatal,
    /// The unit will not compile
    Error,
    /// Suspicious but accepted input
    Warning,
    /// Additional context for the previous diagnostic
    Note,
    /// Informational message, e.g. from `#info`
    Info,
    /// Debug output
    Debug,
}

impl Severity {
    /// The `log` level used when no handler is installed
    #[must_use]
    pub const fn log_level(self) -> log::Level {
        match self {
            Self::Fatal | Self::Error => log::Level::Error,
            Self::Warning => log::Level::Warn,
            Self::Note | Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fatal => "fatal error",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Note => "note",
            Self::Info => "info",
            Self::Debug => "debug",
        })
    }
}

/// What produced the text of one trace entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceKind {
    /// Text of the primary source file
    Source,
    /// Text of a file pulled in by `#include`
    Include,
    /// Text produced by expanding the named macro
    MacroExpansion(SmolStr),
}

/// One resolved level of a location chain
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceEntry {
    /// What produced the text at this level
    pub kind: TraceKind,
    /// Display name of the file, absent for synthesized text
    pub file: Option<String>,
    /// First position of the span
    pub first: TextPosition,
    /// Last position of the span
    pub last: TextPosition,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.as_deref().unwrap_or("<built-in>"), self.first)
    }
}

/// A message attached to a source location
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Message text
    pub message: String,
    /// Location the message refers to
    pub loc: Option<SymbolLoc>,
    /// Resolved location chain, innermost first
    pub trace: Vec<TraceEntry>,
}

impl Diagnostic {
    /// The innermost resolved position, if any
    #[must_use]
    pub fn primary(&self) -> Option<&TraceEntry> {
        self.trace.first()
    }

    /// The outermost position in real source, skipping macro-expanded text
    #[must_use]
    pub fn origin(&self) -> Option<&TraceEntry> {
        self.trace
            .iter()
            .find(|entry| !matches!(entry.kind, TraceKind::MacroExpansion(_)))
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(origin) = self.origin().or_else(|| self.primary()) {
            write!(f, "{origin}: ")?;
        }
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// Receives every diagnostic as soon as it is reported
pub type DiagnosticHandler = Rc<dyn Fn(&Diagnostic)>;

/// Warning and error counts of one compilation unit
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompileStatus {
    /// Number of warnings
    pub warnings: u32,
    /// Number of errors, fatal ones included
    pub errors: u32,
}

impl CompileStatus {
    /// Whether no error was reported
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.errors == 0
    }
}

impl fmt::Display for CompileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "warnings {}, errors {}", self.warnings, self.errors)
    }
}

/// Counting diagnostic sink
#[derive(Default)]
pub struct Diagnostics {
    status: CompileStatus,
    handler: Option<DiagnosticHandler>,
}

impl Diagnostics {
    /// Create a sink that forwards to `handler`, or to the `log` facade if `None`
    #[must_use]
    pub fn new(handler: Option<DiagnosticHandler>) -> Self {
        Self {
            status: CompileStatus::default(),
            handler,
        }
    }

    /// Count and forward a diagnostic
    pub fn emit(&mut self, diagnostic: &Diagnostic) {
        match diagnostic.severity {
            Severity::Fatal | Severity::Error => self.status.errors += 1,
            Severity::Warning => self.status.warnings += 1,
            Severity::Note | Severity::Info | Severity::Debug => {}
        }
        match &self.handler {
            Some(handler) => handler(diagnostic),
            None => log::log!(diagnostic.severity.log_level(), "{diagnostic}"),
        }
    }

    /// Counts so far
    #[must_use]
    pub const fn status(&self) -> CompileStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn diagnostic(severity: Severity) -> Diagnostic {
        Diagnostic {
            severity,
            message: "message".into(),
            loc: None,
            trace: vec![
                TraceEntry {
                    kind: TraceKind::MacroExpansion("M".into()),
                    file: None,
                    first: TextPosition::new(1, 3),
                    last: TextPosition::new(1, 3),
                },
                TraceEntry {
                    kind: TraceKind::Source,
                    file: Some("main.dsy".into()),
                    first: TextPosition::new(7, 5),
                    last: TextPosition::new(7, 9),
                },
            ],
        }
    }

    #[test]
    fn counts_errors_and_warnings_but_not_notes() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut diagnostics = Diagnostics::new(Some(Rc::new(move |d: &Diagnostic| {
            sink.borrow_mut().push(d.severity);
        })));

        for severity in [Severity::Error, Severity::Note, Severity::Warning, Severity::Fatal] {
            diagnostics.emit(&diagnostic(severity));
        }

        assert_eq!(
            diagnostics.status(),
            CompileStatus {
                warnings: 1,
                errors: 2
            }
        );
        assert_eq!(seen.borrow().len(), 4);
        assert!(!diagnostics.status().is_success());
    }

    #[test]
    fn display_uses_source_origin() {
        assert_eq!(
            diagnostic(Severity::Warning).to_string(),
            "main.dsy:7:5: warning: message"
        );
        assert_eq!(CompileStatus::default().to_string(), "warnings 0, errors 0");
    }
}
