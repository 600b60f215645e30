use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop a compilation unit
#[derive(Debug, Error)]
pub enum FrontendError {
    /// The primary input file could not be read
    #[error("could not open input file `{}`", path.display())]
    InputNotFound {
        /// The requested path
        path: PathBuf,
    },
    /// The parser state stack emptied while recovering from a syntax error
    #[error("unrecoverable syntax error after {errors} error(s)")]
    SyntaxUnrecoverable {
        /// Errors reported before giving up
        errors: u32,
    },
}
