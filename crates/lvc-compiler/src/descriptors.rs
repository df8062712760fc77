//! Module descriptors.
//!
//! The persisted summary of a compiled module: which files it contains, what
//! each file exports, and which modules each file depends on. Serialized as
//! JSON at `<buildPath>/__module__.lv.json` with `_` as the type
//! discriminator:
//!
//! ```json
//! { "_": "Module", "uri": "a.b",
//!   "exports": [
//!     { "_": "ModuleFile", "fileName": "x.lv",
//!       "exports": [{ "name": "X", "kind": "component" }],
//!       "dependencies": [{ "importUri": "a.c" }] },
//!     { "_": "ModuleLibrary", "name": "native" }
//!   ] }
//! ```

use serde::{Deserialize, Serialize};

use lvc_core::{Error, Result};

/// File name of the persisted module descriptor.
pub const BUILD_FILE_NAME: &str = "__module__.lv.json";

/// What kind of value an export is: a component class or a ready element
/// instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Component,
    Element,
}

/// One exported name of a module file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDescriptor {
    pub name: String,
    pub kind: ExportKind,
}

/// One import edge recorded for a module file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportDependency {
    #[serde(rename = "importUri")]
    pub import_uri: String,
}

/// Exports and dependencies of a single source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleFileDescriptor {
    #[serde(rename = "fileName")]
    pub file_name: String,
    pub exports: Vec<ExportDescriptor>,
    pub dependencies: Vec<ImportDependency>,
}

impl ModuleFileDescriptor {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self { file_name: file_name.into(), exports: Vec::new(), dependencies: Vec::new() }
    }

    pub fn add_export(&mut self, export: ExportDescriptor) {
        self.exports.push(export);
    }

    pub fn add_dependency(&mut self, import_uri: impl Into<String>) {
        self.dependencies.push(ImportDependency { import_uri: import_uri.into() });
    }
}

/// A module-level export entry: either a compiled file or an opaque native
/// library reference. Libraries round-trip through the descriptor but are
/// never loaded by this layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_")]
pub enum ModuleExport {
    #[serde(rename = "ModuleFile")]
    File(ModuleFileDescriptor),
    #[serde(rename = "ModuleLibrary")]
    Library { name: String },
}

/// A resolved export lookup: the exporting file is absent for library
/// exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportLink<'a> {
    pub name: &'a str,
    pub kind: ExportKind,
    pub file: Option<&'a ModuleFileDescriptor>,
}

/// The whole-module descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_", rename = "Module")]
pub struct ModuleDescriptor {
    pub uri: String,
    pub exports: Vec<ModuleExport>,
}

impl ModuleDescriptor {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into(), exports: Vec::new() }
    }

    pub fn add_file(&mut self, descriptor: ModuleFileDescriptor) {
        self.exports.push(ModuleExport::File(descriptor));
    }

    pub fn add_library(&mut self, name: impl Into<String>) {
        self.exports.push(ModuleExport::Library { name: name.into() });
    }

    /// Find an export by name across all files.
    pub fn find_export(&self, name: &str) -> Option<ExportLink<'_>> {
        for entry in &self.exports {
            match entry {
                ModuleExport::File(file) => {
                    for export in &file.exports {
                        if export.name == name {
                            return Some(ExportLink {
                                name: &export.name,
                                kind: export.kind,
                                file: Some(file),
                            });
                        }
                    }
                }
                ModuleExport::Library { name: lib } if lib == name => {
                    return Some(ExportLink { name: lib, kind: ExportKind::Element, file: None });
                }
                ModuleExport::Library { .. } => {}
            }
        }
        None
    }

    /// The file entry with the given file name.
    pub fn find_file(&self, file_name: &str) -> Option<&ModuleFileDescriptor> {
        self.exports.iter().find_map(|entry| match entry {
            ModuleExport::File(file) if file.file_name == file_name => Some(file),
            _ => None,
        })
    }

    /// Unique file entries in recorded order.
    pub fn files(&self) -> Vec<&ModuleFileDescriptor> {
        let mut result: Vec<&ModuleFileDescriptor> = Vec::new();
        for entry in &self.exports {
            if let ModuleExport::File(file) = entry
                && !result.iter().any(|f| f.file_name == file.file_name)
            {
                result.push(file);
            }
        }
        result
    }

    /// Unique library names in recorded order.
    pub fn libraries(&self) -> Vec<&str> {
        let mut result: Vec<&str> = Vec::new();
        for entry in &self.exports {
            if let ModuleExport::Library { name } = entry
                && !result.contains(&name.as_str())
            {
                result.push(name);
            }
        }
        result
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let tag = value.get("_").and_then(|v| v.as_str());
        if tag != Some("Module") {
            return Err(Error::Serialization(format!(
                "Attempting to create a module descriptor from a different node type: {}",
                tag.unwrap_or("<missing>")
            )));
        }
        Ok(serde_json::from_value(value)?)
    }
}
