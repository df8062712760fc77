//! Error types for the lvc compiler.

use thiserror::Error;

use crate::location::SourceLocation;

/// Result type alias using the compiler error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A fatal syntax error raised while turning a CST into an AST.
///
/// Carries the precise source location so hosts can point at the offending
/// span (`{file, line, column, offset}`).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Syntax error: {message} at {location}")]
pub struct SyntaxError {
    pub message: String,
    pub location: SourceLocation,
}

/// An import resolution failure, carrying the chain of imports it crossed
/// while propagating out of the module graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportError {
    pub message: String,
    /// One frame per enclosing import, innermost first.
    pub trace: Vec<String>,
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        for frame in &self.trace {
            write!(f, "\n{}", frame)?;
        }
        Ok(())
    }
}

impl std::error::Error for ImportError {}

/// Compiler-wide error type.
///
/// The variants mirror the diagnostic surface: syntax errors are fatal per
/// file, import errors accumulate a trace as they cross the module graph,
/// build errors cover the filesystem and descriptor layer, and assertions are
/// always bugs.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("Build error: {0}")]
    Build(String),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a new syntax error at a source location.
    #[must_use]
    pub fn syntax(message: impl Into<String>, location: SourceLocation) -> Self {
        Self::Syntax(SyntaxError { message: message.into(), location })
    }

    /// Create a new import error with an empty trace.
    #[must_use]
    pub fn import(message: impl Into<String>) -> Self {
        Self::Import(ImportError { message: message.into(), trace: Vec::new() })
    }

    /// Create a new build error.
    #[must_use]
    pub fn build(message: impl Into<String>) -> Self {
        Self::Build(message.into())
    }

    /// Create a new assertion error.
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion(message.into())
    }

    /// Append a trace frame to an import error as it propagates up through
    /// import resolution. Other error kinds pass through unchanged.
    #[must_use]
    pub fn with_import_frame(self, frame: impl Into<String>) -> Self {
        match self {
            Self::Import(mut e) => {
                e.trace.push(frame.into());
                Self::Import(e)
            }
            other => other,
        }
    }

    /// Short stable code identifying the error kind, part of the host-facing
    /// error payload.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Syntax(_) => "~Syntax",
            Self::Import(e) => {
                if e.message.contains("cycle") {
                    "Cycle"
                } else {
                    "~Import"
                }
            }
            Self::Build(_) => "~Build",
            Self::Assertion(_) => "Assertion",
            Self::Io(_) => "~File",
            Self::Serialization(_) => "~Json",
        }
    }

    /// The source location, present for syntax errors.
    pub fn source_location(&self) -> Option<&SourceLocation> {
        match self {
            Self::Syntax(e) => Some(&e.location),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
