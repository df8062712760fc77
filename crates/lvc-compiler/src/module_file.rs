//! Per-file compile state.
//!
//! A [`ModuleFile`] owns the parsed AST of one `.lv` source file, its import
//! list, its descriptor entry, and its dependency edges onto sibling files of
//! the same module. Dependency edges are cycle-checked as they are added: a
//! new edge that closes a cycle is rolled back and reported with the full
//! path.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use lvc_core::{Error, Result};

use crate::ast::{Ast, NodeKind};
use crate::descriptors::{ExportDescriptor, ModuleFileDescriptor};
use crate::module_build::ModuleBuild;

/// Lifecycle of a single module file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileStatus {
    Initialized,
    Resolved,
    Compiled,
}

/// One `import` statement of a file, resolved to its producing module once
/// the graph is built.
#[derive(Debug, Clone)]
pub struct ModuleImport {
    pub uri: String,
    pub alias: String,
    pub is_relative: bool,
    pub module: Option<Rc<RefCell<ModuleBuild>>>,
}

/// A single source file inside a module build.
#[derive(Debug)]
pub struct ModuleFile {
    /// File stem, without the `.lv` extension.
    pub name: String,
    pub content: String,
    pub ast: Option<Ast>,
    pub status: FileStatus,
    pub imports: Vec<ModuleImport>,
    /// Sibling files (by file name) this file depends on.
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
    pub descriptor: ModuleFileDescriptor,
}

impl ModuleFile {
    /// Create a file from its freshly built AST, recording exports and
    /// imports into the descriptor.
    pub fn from_program(
        name: &str,
        content: String,
        ast: Ast,
        exports: Vec<ExportDescriptor>,
    ) -> Self {
        let stem = name.strip_suffix(".lv").unwrap_or(name).to_string();
        let mut descriptor = ModuleFileDescriptor::new(format!("{stem}.lv"));
        for export in exports {
            descriptor.add_export(export);
        }

        let mut imports = Vec::new();
        for &import in &ast.program().imports {
            let NodeKind::Import(node) = ast.kind(import) else { continue };
            let mut uri = String::new();
            if node.is_relative {
                uri.push('.');
            }
            for (i, &segment) in node.segments.iter().enumerate() {
                if i != 0 {
                    uri.push('.');
                }
                uri.push_str(ast.slice(&content, segment));
            }
            let alias = node.alias.map(|a| ast.slice(&content, a).to_string()).unwrap_or_default();

            descriptor.add_dependency(uri.clone());
            imports.push(ModuleImport {
                uri,
                alias,
                is_relative: node.is_relative,
                module: None,
            });
        }

        Self {
            name: stem,
            content,
            ast: Some(ast),
            status: FileStatus::Initialized,
            imports,
            dependencies: Vec::new(),
            dependents: Vec::new(),
            descriptor,
        }
    }

    /// Reconstruct a file from a cached descriptor. No source is attached;
    /// the file counts as already compiled.
    pub fn from_descriptor(name: &str, descriptor: ModuleFileDescriptor) -> Self {
        let stem = name.strip_suffix(".lv").unwrap_or(name).to_string();
        Self {
            name: stem,
            content: String::new(),
            ast: None,
            status: FileStatus::Compiled,
            imports: Vec::new(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
            descriptor,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.lv", self.name)
    }

    pub fn js_file_name(&self, output_extension: &str) -> String {
        format!("{}{}", self.file_name(), output_extension)
    }

    /// Attach the resolved module build to every import of `uri`.
    pub fn resolve_import(&mut self, uri: &str, module: Rc<RefCell<ModuleBuild>>) {
        for import in &mut self.imports {
            if import.uri == uri {
                import.module = Some(module.clone());
            }
        }
    }
}

/// Add a dependency edge `from -> to` between sibling files, rejecting (and
/// rolling back) edges that would close a cycle.
pub fn add_dependency(
    files: &mut BTreeMap<String, ModuleFile>,
    from: &str,
    to: &str,
) -> Result<()> {
    if from == to {
        return Ok(());
    }
    if let Some(file) = files.get(from)
        && file.dependencies.iter().any(|d| d == to)
    {
        return Ok(());
    }

    if let Some(file) = files.get_mut(from) {
        file.dependencies.push(to.to_string());
    }
    if let Some(file) = files.get_mut(to) {
        file.dependents.push(from.to_string());
    }

    if let Some(cycle) = find_cycle(files, from) {
        // Roll the edge back before reporting.
        if let Some(file) = files.get_mut(from) {
            file.dependencies.retain(|d| d != to);
        }
        if let Some(file) = files.get_mut(to) {
            file.dependents.retain(|d| d != from);
        }
        let path = cycle
            .iter()
            .map(|f| f.strip_suffix(".lv").unwrap_or(f).to_string())
            .collect::<Vec<_>>()
            .join(" -> ");
        return Err(Error::import(format!("Module file dependency cycle found: {path}")));
    }
    Ok(())
}

/// Depth-first search for a path from `start` back to itself along
/// dependency edges.
fn find_cycle(files: &BTreeMap<String, ModuleFile>, start: &str) -> Option<Vec<String>> {
    fn walk(
        files: &BTreeMap<String, ModuleFile>,
        start: &str,
        current: &str,
        path: &mut Vec<String>,
    ) -> bool {
        path.push(current.to_string());
        if current == start && path.len() > 1 {
            return true;
        }
        if let Some(file) = files.get(current) {
            for dep in &file.dependencies {
                if walk(files, start, dep, path) {
                    return true;
                }
            }
        }
        path.pop();
        false
    }

    let mut path = vec![start.to_string()];
    let deps = files.get(start)?.dependencies.clone();
    for dep in &deps {
        if walk(files, start, dep, &mut path) {
            return Some(path);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::ModuleFileDescriptor;

    fn file(name: &str) -> ModuleFile {
        ModuleFile::from_descriptor(name, ModuleFileDescriptor::new(name))
    }

    fn files(names: &[&str]) -> BTreeMap<String, ModuleFile> {
        names.iter().map(|n| (n.to_string(), file(n))).collect()
    }

    #[test]
    fn acyclic_edges_are_accepted() {
        let mut map = files(&["a.lv", "b.lv", "c.lv"]);
        add_dependency(&mut map, "a.lv", "b.lv").unwrap();
        add_dependency(&mut map, "b.lv", "c.lv").unwrap();
        add_dependency(&mut map, "a.lv", "c.lv").unwrap();
        assert_eq!(map["a.lv"].dependencies, vec!["b.lv", "c.lv"]);
        assert_eq!(map["c.lv"].dependents, vec!["b.lv", "a.lv"]);
    }

    #[test]
    fn self_edges_are_ignored() {
        let mut map = files(&["a.lv"]);
        add_dependency(&mut map, "a.lv", "a.lv").unwrap();
        assert!(map["a.lv"].dependencies.is_empty());
    }

    #[test]
    fn closing_edge_is_rejected_and_rolled_back() {
        let mut map = files(&["a.lv", "b.lv", "c.lv"]);
        add_dependency(&mut map, "a.lv", "b.lv").unwrap();
        add_dependency(&mut map, "b.lv", "c.lv").unwrap();

        let err = add_dependency(&mut map, "c.lv", "a.lv").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("cycle"), "unexpected message: {message}");
        assert!(message.contains("c -> a -> b -> c"), "unexpected path: {message}");
        assert_eq!(err.code(), "Cycle");

        // The rejected edge must not survive.
        assert!(map["c.lv"].dependencies.is_empty());
        assert!(map["a.lv"].dependents.is_empty());

        // The graph still accepts unrelated edges afterwards.
        add_dependency(&mut map, "a.lv", "c.lv").unwrap();
    }

    #[test]
    fn two_node_cycles_are_detected() {
        let mut map = files(&["a.lv", "b.lv"]);
        add_dependency(&mut map, "a.lv", "b.lv").unwrap();
        assert!(add_dependency(&mut map, "b.lv", "a.lv").is_err());
    }
}
