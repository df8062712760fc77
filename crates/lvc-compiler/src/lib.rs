//! Compiler front-end and lowering pipeline for the `.lv` component
//! language.
//!
//! A `.lv` file declares components with typed properties, event signatures,
//! listeners, methods, constructor initializers, nested child instances, and
//! data-binding expressions. This crate lowers each file into a JavaScript
//! module that constructs components at runtime against a small helper API on
//! a configurable base class (`Element` by default).
//!
//! The pipeline, in order:
//!
//! - [`cst`]: the adapter over the opaque concrete syntax tree an external
//!   incremental parser provides
//! - [`ast`]: the arena AST, its builder, scope attachment, and binding
//!   capture
//! - [`module`], [`module_file`], [`module_build`]: module/package metadata,
//!   the per-file and per-module build states, import resolution, and cycle
//!   detection
//! - [`descriptors`]: the persisted module descriptor format
//! - [`lowering`]: AST to target-source fragments
//! - [`fragments`]: the byte-positional rewrite assembler
//! - [`compiler`]: the driver tying it together
//!
//! ```rust,ignore
//! use lvc_compiler::{Compiler, Config};
//!
//! let compiler = Compiler::new(Config::default(), parser);
//! let output = compiler.compile("src/main.lv")?;
//! println!("compiled to {}", output.display());
//! ```

pub mod ast;
pub mod compiler;
pub mod config;
pub mod cst;
pub mod descriptors;
pub mod fragments;
pub mod lowering;
pub mod module;
pub mod module_build;
pub mod module_file;

pub use compiler::Compiler;
pub use config::{Config, ConversionContext};
pub use cst::{CstNode, LanguageParser, LineIndex, SyntaxTree, SyntaxTreeBuilder};
pub use descriptors::{ExportDescriptor, ExportKind, ModuleDescriptor, ModuleFileDescriptor};
pub use module::{Module, Package};
pub use module_build::{BuildStatus, ModuleBuild};
pub use module_file::{FileStatus, ModuleFile};
