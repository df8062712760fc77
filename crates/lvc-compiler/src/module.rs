//! Module and package metadata.
//!
//! A module is a directory of `.lv` source files described by
//! `lv.module.json`; a package is the enclosing grouping described by
//! `lv.package.json` and is the anchor for relative imports. A module's
//! import URI is its package name joined with the "."-separated path from the
//! package root to the module directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use lvc_core::{Error, Result};

/// Metadata file name of a package root.
pub const PACKAGE_FILE_NAME: &str = "lv.package.json";
/// Metadata file name of a module directory.
pub const MODULE_FILE_NAME: &str = "lv.module.json";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PackageMeta {
    name: String,
    release: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ModuleMeta {
    files: Option<Vec<String>>,
    libraries: Vec<String>,
    assets: Vec<String>,
}

/// A package on disk: the anchor for relative imports and release caching.
#[derive(Debug, Clone)]
pub struct Package {
    pub path: PathBuf,
    pub name: String,
    /// Non-empty release tags enable descriptor caching.
    pub release: String,
}

impl Package {
    pub fn exists_in(dir: &Path) -> bool {
        dir.join(PACKAGE_FILE_NAME).is_file()
    }

    pub fn create_from_path(dir: &Path) -> Result<Self> {
        let metadata_path = dir.join(PACKAGE_FILE_NAME);
        let content = std::fs::read_to_string(&metadata_path).map_err(|e| {
            Error::build(format!("Cannot read package metadata '{}': {}", metadata_path.display(), e))
        })?;
        let meta: PackageMeta = serde_json::from_str(&content)?;
        Ok(Self { path: dir.to_path_buf(), name: meta.name, release: meta.release })
    }

    /// Walk upward from `start` until a package metadata file is found.
    pub fn find_containing(start: &Path) -> Result<Option<Self>> {
        let mut current = Some(start);
        while let Some(dir) = current {
            if Self::exists_in(dir) {
                return Self::create_from_path(dir).map(Some);
            }
            current = dir.parent();
        }
        Ok(None)
    }

    /// The placeholder package of a standalone source file. Its `"."` name
    /// disables relative imports.
    pub fn standalone(dir: &Path) -> Self {
        Self { path: dir.to_path_buf(), name: ".".to_string(), release: String::new() }
    }
}

/// A module directory: its files, native libraries, assets, import URI, and
/// containing package.
#[derive(Debug, Clone)]
pub struct Module {
    pub path: PathBuf,
    pub import_uri: String,
    pub package: Option<Package>,
    /// Source file names including the `.lv` extension, in build order.
    pub files: Vec<String>,
    pub libraries: Vec<String>,
    pub assets: Vec<String>,
}

impl Module {
    pub fn exists_in(dir: &Path) -> bool {
        dir.join(MODULE_FILE_NAME).is_file()
    }

    pub fn create_from_path(dir: &Path) -> Result<Self> {
        let metadata_path = dir.join(MODULE_FILE_NAME);
        let content = std::fs::read_to_string(&metadata_path).map_err(|e| {
            Error::build(format!("Cannot read module metadata '{}': {}", metadata_path.display(), e))
        })?;
        let meta: ModuleMeta = serde_json::from_str(&content)?;

        let files = match meta.files {
            Some(files) => files,
            None => scan_source_files(dir)?,
        };

        let package = Package::find_containing(dir)?;
        let import_uri = match &package {
            Some(package) => module_uri(&package.name, &package.path, dir)?,
            None => directory_name(dir),
        };

        Ok(Self {
            path: dir.to_path_buf(),
            import_uri,
            package,
            files,
            libraries: meta.libraries,
            assets: meta.assets,
        })
    }

    /// Synthesize a single-file module for a bare script with no metadata.
    /// It belongs to the `"."` package, so relative imports are rejected.
    pub fn standalone_file(file_path: &Path) -> Result<Self> {
        let dir = file_path
            .parent()
            .ok_or_else(|| Error::build(format!("Script has no parent directory: {}", file_path.display())))?;
        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::build(format!("Invalid script path: {}", file_path.display())))?;
        Ok(Self {
            path: dir.to_path_buf(),
            import_uri: directory_name(dir),
            package: Some(Package::standalone(dir)),
            files: vec![file_name.to_string()],
            libraries: Vec::new(),
            assets: Vec::new(),
        })
    }

    /// The package-relative URI segments of this module ("" at the package
    /// root, `"x.y"` for a nested directory).
    pub fn package_relative_uri(&self) -> &str {
        match &self.package {
            Some(package) => package_relative(&self.import_uri, &package.name),
            None => "",
        }
    }
}

/// Strip the package-name prefix from a module URI, returning the dotted
/// remainder ("" when the URI is the package itself).
pub fn package_relative<'a>(uri: &'a str, package_name: &str) -> &'a str {
    if uri == package_name || package_name.is_empty() {
        ""
    } else if let Some(rest) = uri.strip_prefix(package_name)
        && let Some(rest) = rest.strip_prefix('.')
    {
        rest
    } else {
        ""
    }
}

fn module_uri(package_name: &str, package_path: &Path, module_dir: &Path) -> Result<String> {
    let relative = module_dir.strip_prefix(package_path).map_err(|_| {
        Error::build(format!(
            "Module '{}' lies outside its package '{}'",
            module_dir.display(),
            package_path.display()
        ))
    })?;
    let mut uri = package_name.to_string();
    for segment in relative.components() {
        let segment = segment.as_os_str().to_string_lossy();
        uri.push('.');
        uri.push_str(&segment);
    }
    Ok(uri)
}

fn directory_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string())
}

fn scan_source_files(dir: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".lv") && entry.file_type()?.is_file() {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_relative_strips_the_prefix() {
        assert_eq!(package_relative("root.pkg.x", "root.pkg"), "x");
        assert_eq!(package_relative("root.pkg", "root.pkg"), "");
        assert_eq!(package_relative("root.pkgx", "root.pkg"), "");
        assert_eq!(package_relative("other", ""), "");
    }
}
