//! Core types for the lvc compiler.
//!
//! This crate holds the pieces shared by every stage of the pipeline: source
//! positions ([`SourcePoint`], [`SourceRange`], [`SourceLocation`]) and the
//! compiler-wide [`Error`] type with its [`Result`] alias.

mod error;
mod location;

pub use error::{Error, ImportError, Result, SyntaxError};
pub use location::{SourceLocation, SourcePoint, SourceRange};
