//! Per-module build state.
//!
//! A [`ModuleBuild`] walks one module through the pipeline: parse every
//! source file, resolve imported identifiers across modules, lower each file
//! to JS, copy assets, and persist the module descriptor. When the
//! containing package carries a non-empty release tag, a cached descriptor at
//! the build location short-circuits the whole build.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use lvc_core::{Error, Result};

use crate::compiler::Compiler;
use crate::cst::LanguageParser;
use crate::descriptors::{BUILD_FILE_NAME, ExportLink, ModuleDescriptor};
use crate::module::{Module, package_relative};
use crate::module_file::{FileStatus, ModuleFile, add_dependency};

/// Lifecycle of a module build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildStatus {
    Initialized,
    Parsed,
    Resolved,
    Compiling,
    Compiled,
}

#[derive(Debug)]
pub struct ModuleBuild {
    module: Module,
    descriptor: ModuleDescriptor,
    files: BTreeMap<String, ModuleFile>,
    build_location: PathBuf,
    status: BuildStatus,
}

impl ModuleBuild {
    /// Create the build state for `module`, either from the cached descriptor
    /// (release-tagged packages only) or by parsing every source file. The
    /// build registers itself with the compiler before touching its files so
    /// imports resolve against it by URI.
    pub fn create<P: LanguageParser>(
        compiler: &Compiler<P>,
        module: Module,
    ) -> Result<Rc<RefCell<Self>>> {
        let build_location = compiler.module_build_path(&module);

        let caching = module.package.as_ref().is_some_and(|p| !p.release.is_empty());
        let cached = if caching {
            let descriptor_path = build_location.join(BUILD_FILE_NAME);
            if descriptor_path.is_file() {
                let content = std::fs::read_to_string(&descriptor_path).map_err(|e| {
                    Error::build(format!(
                        "Cannot read module descriptor '{}': {}",
                        descriptor_path.display(),
                        e
                    ))
                })?;
                Some(ModuleDescriptor::from_json(&content)?)
            } else {
                None
            }
        } else {
            None
        };

        match cached {
            Some(descriptor) => {
                debug!(uri = %module.import_uri, "loading module from cached descriptor");
                let build = Rc::new(RefCell::new(Self {
                    module,
                    descriptor,
                    files: BTreeMap::new(),
                    build_location,
                    status: BuildStatus::Compiled,
                }));
                compiler.register_module(&build);
                let file_names = build.borrow().module.files.clone();
                for name in file_names {
                    Self::load_module_file(&build, compiler, &name)?;
                }
                Ok(build)
            }
            None => {
                debug!(uri = %module.import_uri, "parsing module sources");
                let descriptor = ModuleDescriptor::new(&module.import_uri);
                let build = Rc::new(RefCell::new(Self {
                    module,
                    descriptor,
                    files: BTreeMap::new(),
                    build_location,
                    status: BuildStatus::Initialized,
                }));
                compiler.register_module(&build);
                let file_names = build.borrow().module.files.clone();
                for name in file_names {
                    Self::parse_module_file(&build, compiler, &name)?;
                }
                {
                    let mut b = build.borrow_mut();
                    let libraries = b.module.libraries.clone();
                    for library in libraries {
                        b.descriptor.add_library(library);
                    }
                    b.status = BuildStatus::Parsed;
                }
                Ok(build)
            }
        }
    }

    /// Reconstruct one file from the cached descriptor and re-resolve its
    /// recorded dependencies so the imported modules exist.
    fn load_module_file<P: LanguageParser>(
        build: &Rc<RefCell<Self>>,
        compiler: &Compiler<P>,
        name: &str,
    ) -> Result<()> {
        let (current_uri_name, dependencies) = {
            let mut b = build.borrow_mut();
            if b.files.contains_key(name) {
                return Ok(());
            }
            let Some(descriptor) = b.descriptor.find_file(name).cloned() else {
                return Ok(());
            };
            let dependencies: Vec<String> =
                descriptor.dependencies.iter().map(|d| d.import_uri.clone()).collect();
            b.files.insert(name.to_string(), ModuleFile::from_descriptor(name, descriptor));
            (format!("{}.{}", b.module.import_uri, name), dependencies)
        };

        let module = build.borrow().module.clone();
        for dependency in dependencies {
            let full_uri = expand_import_uri(&dependency, &module, &current_uri_name)?;
            compiler
                .create_and_resolve_imported_module(&full_uri, &module)
                .and_then(|found| {
                    found.ok_or_else(|| {
                        Error::import(format!(
                            "Failed to find module '{full_uri}' imported in '{current_uri_name}'"
                        ))
                    })
                })
                .map_err(|e| {
                    e.with_import_frame(format!(
                        " - Imported '{dependency}' from '{current_uri_name}'"
                    ))
                })?;
        }
        Ok(())
    }

    /// Parse one source file into the build, then resolve its imports.
    fn parse_module_file<P: LanguageParser>(
        build: &Rc<RefCell<Self>>,
        compiler: &Compiler<P>,
        name: &str,
    ) -> Result<()> {
        let (module, file_path, current_uri_name) = {
            let b = build.borrow();
            if b.files.contains_key(name) {
                return Ok(());
            }
            (
                b.module.clone(),
                b.module.path.join(name),
                format!("{}.{}", b.module.import_uri, name),
            )
        };

        if !file_path.is_file() {
            return Err(Error::build(format!(
                "Module file '{}' does not exist. (Defined in '{}')",
                file_path.display(),
                module.path.join(crate::module::MODULE_FILE_NAME).display()
            )));
        }
        let content = std::fs::read_to_string(&file_path)?;
        let stem = name.strip_suffix(".lv").unwrap_or(name);

        let ast = compiler.parse_program(&content, stem, &file_path.to_string_lossy())?;
        let exports = Compiler::<P>::collect_program_exports(&ast, &content);
        let file = ModuleFile::from_program(name, content, ast, exports);
        let imports: Vec<(String, bool)> =
            file.imports.iter().map(|i| (i.uri.clone(), i.is_relative)).collect();

        {
            let mut b = build.borrow_mut();
            b.descriptor.add_file(file.descriptor.clone());
            b.files.insert(name.to_string(), file);
        }
        debug!(file = %file_path.display(), "parsed module file");

        for (uri, is_relative) in imports {
            let full_uri = expand_import_uri(&uri, &module, &current_uri_name)?;
            if full_uri == module.import_uri {
                return Err(Error::import(format!(
                    "Cannot import own module ('import {}') in file '{}'.",
                    uri,
                    file_path.display()
                )));
            }

            let frame_uri = if is_relative { full_uri.clone() } else { uri.clone() };
            let resolved = compiler
                .create_and_resolve_imported_module(&full_uri, &module)
                .and_then(|found| {
                    found.ok_or_else(|| {
                        Error::import(format!(
                            "Failed to find module '{full_uri}' imported in '{current_uri_name}'"
                        ))
                    })
                })
                .map_err(|e| {
                    e.with_import_frame(format!(
                        " - Imported '{frame_uri}' from '{current_uri_name}'"
                    ))
                })?;

            if let Some(file) = build.borrow_mut().files.get_mut(name) {
                file.resolve_import(&uri, resolved);
            }
        }
        Ok(())
    }

    /// Compile the module: resolve identifier paths, compile imported modules
    /// first, lower every file, copy assets, and persist the descriptor last.
    pub fn compile<P: LanguageParser>(
        build: &Rc<RefCell<Self>>,
        compiler: &Compiler<P>,
    ) -> Result<()> {
        {
            let b = build.borrow();
            if matches!(b.status, BuildStatus::Compiled | BuildStatus::Compiling) {
                return Ok(());
            }
        }
        {
            let mut b = build.borrow_mut();
            if b.status < BuildStatus::Resolved {
                b.resolve_types(compiler)?;
                b.status = BuildStatus::Resolved;
            }
            b.status = BuildStatus::Compiling;
        }

        // Imported modules compile first so their descriptors exist.
        let imported: Vec<(String, PathBuf, Option<Rc<RefCell<ModuleBuild>>>)> = {
            let b = build.borrow();
            b.files
                .values()
                .flat_map(|f| {
                    let path = b.module.path.join(f.file_name());
                    f.imports.iter().map(move |i| (i.uri.clone(), path.clone(), i.module.clone()))
                })
                .collect()
        };
        for (uri, path, module) in imported {
            let Some(module) = module else {
                return Err(Error::import(format!(
                    "Import not resolved '{}' when compiling '{}'",
                    uri,
                    path.display()
                )));
            };
            Self::compile(&module, compiler)?;
        }

        {
            let mut b = build.borrow_mut();
            let ModuleBuild { module, files, build_location, .. } = &mut *b;
            for file in files.values_mut() {
                if file.status != FileStatus::Compiled {
                    compiler.compile_module_file_to_js(module, build_location, file)?;
                    file.status = FileStatus::Compiled;
                }
            }

            std::fs::create_dir_all(&b.build_location)?;
            let assets = b.module.assets.clone();
            for asset in assets {
                let source = b.module.path.join(&asset);
                let target = b.build_location.join(&asset);
                if target.exists() {
                    std::fs::remove_file(&target)?;
                }
                std::fs::copy(&source, &target)?;
            }

            let descriptor_path = b.build_location.join(BUILD_FILE_NAME);
            debug!(path = %descriptor_path.display(), "saving module descriptor");
            std::fs::write(&descriptor_path, b.descriptor.to_json()?)?;
            b.status = BuildStatus::Compiled;
        }
        Ok(())
    }

    /// Resolve every import-type entry of every file to the JS path of its
    /// producing file, recording sibling dependencies as they surface.
    fn resolve_types<P: LanguageParser>(&mut self, compiler: &Compiler<P>) -> Result<()> {
        let output_extension = compiler.config().output_extension.clone();
        let package_build_path = compiler.config().package_build_path.clone();
        let names: Vec<String> = self.files.keys().cloned().collect();

        for name in names {
            let Some(mut ast) = self.files.get_mut(&name).and_then(|f| f.ast.take()) else {
                continue;
            };

            let entries: Vec<(String, String)> = ast
                .program()
                .import_types
                .iter()
                .flat_map(|(ns, names)| names.keys().map(|n| (ns.clone(), n.clone())))
                .collect();

            for (namespace, type_name) in entries {
                let mut resolved_locally = false;
                if namespace.is_empty() {
                    let target_file = match self.descriptor.find_export(&type_name) {
                        Some(ExportLink { file: Some(file), .. }) => Some(file.file_name.clone()),
                        _ => None,
                    };
                    if let Some(target_file) = target_file {
                        let js_name = {
                            let target = self.files.get(&target_file).ok_or_else(|| {
                                Error::assertion(format!("File not found: {target_file}"))
                            })?;
                            target.js_file_name(&output_extension)
                        };
                        add_dependency(&mut self.files, &name, &target_file)?;
                        ast.resolve_import_type("", &type_name, format!("./{js_name}"));
                        resolved_locally = true;
                    }
                }

                if resolved_locally {
                    continue;
                }
                let imports = self.files.get(&name).map(|f| f.imports.clone()).unwrap_or_default();
                for import in &imports {
                    if import.alias != namespace {
                        continue;
                    }
                    let Some(target_build) = &import.module else { continue };
                    let target = target_build.borrow();
                    let Some(ExportLink { file: Some(file), .. }) =
                        target.descriptor.find_export(&type_name)
                    else {
                        continue;
                    };
                    let js_name = match target.files.get(&file.file_name) {
                        Some(f) => f.js_file_name(&output_extension),
                        None => {
                            return Err(Error::assertion(format!(
                                "File not found: {}",
                                file.file_name
                            )));
                        }
                    };

                    let path = if import.is_relative {
                        relative_import_path(&self.module, &target.module, &js_name)
                    } else {
                        absolute_import_path(&target.module, &package_build_path, &js_name)
                    };
                    ast.resolve_import_type(&namespace, &type_name, path);
                    break;
                }
            }

            if let Some(file) = self.files.get_mut(&name) {
                file.ast = Some(ast);
                if file.status != FileStatus::Compiled {
                    file.status = FileStatus::Resolved;
                }
            }
            debug!(file = %name, module = %self.module.import_uri, "resolved import types");
        }
        Ok(())
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    pub fn build_location(&self) -> &Path {
        &self.build_location
    }

    pub fn status(&self) -> BuildStatus {
        self.status
    }

    pub fn find_export(&self, name: &str) -> Option<ExportLink<'_>> {
        self.descriptor.find_export(name)
    }

    pub fn file_by_name(&self, file_name: &str) -> Option<&ModuleFile> {
        self.files.get(file_name)
    }

    /// The module file whose source path equals `path`.
    pub fn file_by_path(&self, path: &Path) -> Option<&ModuleFile> {
        self.files.values().find(|f| self.module.path.join(f.file_name()) == path)
    }
}

/// Expand a possibly-relative import URI against the importing module's
/// package. Relative imports require a real package.
fn expand_import_uri(uri: &str, module: &Module, current_uri_name: &str) -> Result<String> {
    if !uri.starts_with('.') {
        return Ok(uri.to_string());
    }
    let package = match &module.package {
        Some(p) if p.name != "." => p,
        _ => {
            return Err(Error::import(format!(
                "Cannot import relative path without package: '{uri}' in '{current_uri_name}'"
            )));
        }
    };
    if uri == "." {
        Ok(package.name.clone())
    } else {
        Ok(format!("{}{}", package.name, uri))
    }
}

/// `../`-style path from the importing module up to the package root and back
/// down into the target module.
fn relative_import_path(from: &Module, to: &Module, js_name: &str) -> String {
    let package_name = to.package.as_ref().map(|p| p.name.as_str()).unwrap_or("");
    let own_rel = package_relative(&from.import_uri, package_name);
    let up = if own_rel.is_empty() {
        ".".to_string()
    } else {
        own_rel.split('.').map(|_| "..").collect::<Vec<_>>().join("/")
    };

    let target_rel = package_relative(&to.import_uri, package_name);
    let down = if target_rel.is_empty() {
        String::new()
    } else {
        format!("{}/", target_rel.split('.').collect::<Vec<_>>().join("/"))
    };

    format!("{up}/{down}{js_name}")
}

/// Package-rooted path to a file of an absolutely imported module.
fn absolute_import_path(to: &Module, package_build_path: &str, js_name: &str) -> String {
    let package_name = to.package.as_ref().map(|p| p.name.as_str()).unwrap_or("");
    let mut base = if package_name.is_empty() {
        to.import_uri.split('.').collect::<Vec<_>>().join("/")
    } else {
        package_name.to_string()
    };
    if !package_build_path.is_empty() {
        base.push('/');
        base.push_str(package_build_path);
    }
    let target_rel = package_relative(&to.import_uri, package_name);
    if !target_rel.is_empty() {
        base.push('/');
        base.push_str(&target_rel.split('.').collect::<Vec<_>>().join("/"));
    }
    format!("{base}/{js_name}")
}
