//! Transform capabilities for the compile stage.
//!
//! Each asset category delegates its single content transformation to an
//! implementation of [`Transform`], chosen statically at startup. The seam
//! is deliberately narrow: text in, text out, error with file location.

pub mod markup;
pub mod script;
pub mod style;

pub use markup::MarkupExpander;
pub use script::ScriptTransform;
pub use style::StyleCompiler;

use std::path::{Path, PathBuf};

/// Error from a transform, pointing at the offending source file.
#[derive(Debug, Clone)]
pub struct TransformError {
    /// Path to the file containing the error
    pub file: PathBuf,
    /// Line number (1-indexed, None if unknown)
    pub line: Option<u32>,
    /// Error message
    pub message: String,
}

impl TransformError {
    /// Create a transform error with file and message.
    pub fn new(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self { file: file.into(), line: None, message: message.into() }
    }

    /// Create a transform error with line information.
    pub fn with_line(file: impl Into<PathBuf>, line: u32, message: impl Into<String>) -> Self {
        Self { file: file.into(), line: Some(line), message: message.into() }
    }
}

impl std::fmt::Display for TransformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file.display())?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for TransformError {}

/// A single content transformation applied by a transform task.
///
/// Implementations must be pure with respect to their inputs: applying the
/// same source twice yields the same output, which is what makes the
/// transform tasks idempotent.
pub trait Transform: Send + Sync {
    /// Transform one source file's contents.
    ///
    /// `path` is the absolute path of the source, used for error reporting
    /// and (for markup) resolving relative include references.
    fn apply(&self, source: &str, path: &Path) -> Result<String, TransformError>;
}
