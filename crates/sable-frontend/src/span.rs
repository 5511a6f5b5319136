//! Source span and location types for error reporting
//!
//! Spans are attached to the AST nodes that diagnostics point at: package and
//! module declarations, generic parameters, constants and qualified references.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Source location of an AST node
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpan {
    /// File path (if available)
    pub file: Option<PathBuf>,
    /// Line number (1-indexed, 0 when unknown)
    pub line: usize,
    /// Column number (1-indexed, 0 when unknown)
    pub column: usize,
}

impl SourceSpan {
    /// Create a span at a line and column
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            file: None,
            line,
            column,
        }
    }

    /// Create span with file path
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Whether this span points at a real location
    pub fn is_known(&self) -> bool {
        self.line != 0
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self
            .file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        write!(f, "{}:{}:{}", file, self.line, self.column)
    }
}
