//! Abstract syntax tree for `.lv` source files.
//!
//! The AST is organized into:
//!
//! - [`node`]: the arena, node kinds, scope tables and import-type records
//! - [`builder`]: the CST walk that constructs nodes, attaches scopes, and
//!   captures bindings
//! - [`bindings`]: property binding containers and subscription rendering

pub mod bindings;
mod builder;
mod node;

pub use builder::{
    AstBuilder, collect_import_types, identifier_declared, is_keyword, is_predeclared,
};
pub use node::{
    AccessorKind, Ast, ComponentNode, ConstructorNode, DeclOrigin, DeclarationForm, FunctionNode,
    ImportNode, ImportType, JsImportNode, ListenerNode, NewComponentNode, Node, NodeId, NodeKind,
    PropertyAccessorNode, PropertyAssignmentNode, PropertyNode, ProgramNode, ScopeTable,
    TryCatchNode, TypedMethodNode, VariableDeclarationNode,
};
