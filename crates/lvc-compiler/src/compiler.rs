//! The compiler driver.
//!
//! [`Compiler`] owns the configuration, the parse collaborator, the package
//! import paths, and the registry of module builds keyed by import URI. The
//! host surface is three operations: [`Compiler::new`],
//! [`Compiler::compile`] for a single script (which transitively compiles its
//! dependencies), and [`Compiler::compile_module`] for a whole module
//! directory.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use lvc_core::{Error, Result};

use crate::ast::{Ast, AstBuilder, NodeKind, collect_import_types};
use crate::config::{Config, ConversionContext};
use crate::cst::LanguageParser;
use crate::descriptors::{ExportDescriptor, ExportKind};
use crate::fragments::write_fragments;
use crate::lowering;
use crate::module::Module;
use crate::module_build::ModuleBuild;
use crate::module_file::ModuleFile;

pub struct Compiler<P: LanguageParser> {
    config: Config,
    parser: P,
    package_import_paths: RefCell<Vec<PathBuf>>,
    modules: RefCell<HashMap<String, Rc<RefCell<ModuleBuild>>>>,
}

impl<P: LanguageParser> Compiler<P> {
    pub fn new(config: Config, parser: P) -> Self {
        Self {
            config,
            parser,
            package_import_paths: RefCell::new(Vec::new()),
            modules: RefCell::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    /// Directories searched when resolving absolute import URIs. Set once at
    /// driver start.
    pub fn set_package_import_paths(&self, paths: Vec<PathBuf>) {
        *self.package_import_paths.borrow_mut() = paths;
    }

    pub(crate) fn register_module(&self, build: &Rc<RefCell<ModuleBuild>>) {
        let uri = build.borrow().module().import_uri.clone();
        self.modules.borrow_mut().insert(uri, build.clone());
    }

    // ------------------------------------------------------------------------
    // Host operations
    // ------------------------------------------------------------------------

    /// Compile a single script file; its module and every imported module
    /// compile transitively. Returns the path of the emitted JS file.
    pub fn compile(&self, file_path: impl AsRef<Path>) -> Result<PathBuf> {
        let file_path = file_path.as_ref();
        if !file_path.is_file() {
            return Err(Error::build("Script file not found."));
        }
        let dir = file_path
            .parent()
            .ok_or_else(|| Error::build(format!("Script has no parent directory: {}", file_path.display())))?;

        let module = if Module::exists_in(dir) {
            Module::create_from_path(dir)?
        } else {
            Module::standalone_file(file_path)?
        };

        self.default_import_paths(&module);

        debug!(file = %file_path.display(), module = %module.import_uri, "compiling script");
        let build = self.build_module(module)?;
        ModuleBuild::compile(&build, self)?;

        let b = build.borrow();
        let file = b
            .file_by_path(file_path)
            .ok_or_else(|| Error::assertion(format!("Compiled file not found: {}", file_path.display())))?;
        Ok(b.build_location().join(file.js_file_name(&self.config.output_extension)))
    }

    /// Compile every source file of a module directory and persist its
    /// descriptor. Returns the module build path.
    pub fn compile_module(&self, module_path: impl AsRef<Path>) -> Result<PathBuf> {
        let module_path = module_path.as_ref();
        if !module_path.is_dir() {
            return Err(Error::build("Module path not found."));
        }
        let module = Module::create_from_path(module_path)?;
        self.default_import_paths(&module);

        debug!(path = %module_path.display(), module = %module.import_uri, "compiling module");
        let build = self.build_module(module)?;
        ModuleBuild::compile(&build, self)?;
        let location = build.borrow().build_location().to_path_buf();
        Ok(location)
    }

    // ------------------------------------------------------------------------
    // Module graph plumbing
    // ------------------------------------------------------------------------

    /// Seed the import paths from the module's own package when the host has
    /// not set any.
    fn default_import_paths(&self, module: &Module) {
        let unset = self.package_import_paths.borrow().is_empty();
        if unset
            && let Some(package) = &module.package
            && package.name != "."
        {
            let base = if self.config.import_local_path.is_empty() {
                package.path.clone()
            } else {
                package.path.join(&self.config.import_local_path)
            };
            self.set_package_import_paths(vec![base]);
        }
    }

    fn build_module(&self, module: Module) -> Result<Rc<RefCell<ModuleBuild>>> {
        if let Some(existing) = self.modules.borrow().get(&module.import_uri) {
            return Ok(existing.clone());
        }
        ModuleBuild::create(self, module)
    }

    /// Resolve an import URI to its module build, creating it on first use.
    /// Returns `None` when no module directory matches the URI.
    pub(crate) fn create_and_resolve_imported_module(
        &self,
        uri: &str,
        from: &Module,
    ) -> Result<Option<Rc<RefCell<ModuleBuild>>>> {
        if let Some(existing) = self.modules.borrow().get(uri) {
            return Ok(Some(existing.clone()));
        }

        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(package) = &from.package
            && package.name != "."
        {
            if uri == package.name {
                candidates.push(package.path.clone());
            } else if let Some(rest) = uri.strip_prefix(&format!("{}.", package.name)) {
                let mut path = package.path.clone();
                for segment in rest.split('.') {
                    path.push(segment);
                }
                candidates.push(path);
            }
        }
        for base in self.package_import_paths.borrow().iter() {
            let mut path = base.clone();
            for segment in uri.split('.') {
                path.push(segment);
            }
            candidates.push(path);
        }

        for candidate in candidates {
            if !Module::exists_in(&candidate) {
                continue;
            }
            let module = Module::create_from_path(&candidate)?;
            let build = ModuleBuild::create(self, module)?;
            // The computed URI can differ from the requested one when the
            // import path is not itself a package root; both resolve here.
            self.modules.borrow_mut().insert(uri.to_string(), build.clone());
            return Ok(Some(build));
        }
        Ok(None)
    }

    // ------------------------------------------------------------------------
    // Per-file pipeline
    // ------------------------------------------------------------------------

    /// Parse one source text into its AST, with import types collected.
    pub fn parse_program(&self, source: &str, file_name: &str, file_path: &str) -> Result<Ast> {
        let root = self.parser.parse(source)?;
        let mut ast = AstBuilder::new(source, file_path).build(file_name, &root)?;
        collect_import_types(&mut ast, source, &self.config.effective_implicit_types());
        Ok(ast)
    }

    /// The export list of a parsed program: component declarations export
    /// components, instance statements export elements. A declaration named
    /// `default` exports under the file name.
    pub fn collect_program_exports(ast: &Ast, source: &str) -> Vec<ExportDescriptor> {
        let mut exports = Vec::new();
        for &export in &ast.program().exports {
            match ast.kind(export) {
                NodeKind::ComponentDeclaration(c) => {
                    exports.push(ExportDescriptor {
                        name: exported_name(ast, source, c.name),
                        kind: ExportKind::Component,
                    });
                }
                NodeKind::ComponentInstanceStatement { name } => {
                    exports.push(ExportDescriptor {
                        name: exported_name(ast, source, *name),
                        kind: ExportKind::Element,
                    });
                }
                _ => {}
            }
        }
        exports
    }

    /// Lower one parsed file to JS and write it into the build location.
    pub(crate) fn compile_module_file_to_js(
        &self,
        module: &Module,
        build_location: &Path,
        file: &mut ModuleFile,
    ) -> Result<()> {
        let Some(mut ast) = file.ast.take() else {
            return Err(Error::assertion("ModuleFile being compiled without parsed node."));
        };

        let mut ctx = ConversionContext::from_config(&self.config);
        ctx.component_path = module.path.join(file.file_name()).to_string_lossy().into_owned();
        ctx.current_import_uri = module.import_uri.clone();

        let fragments = lowering::lower_program(&mut ast, &file.content, &ctx)?;
        let output = write_fragments(&file.content, fragments)?;

        std::fs::create_dir_all(build_location)?;
        let output_path = build_location.join(file.js_file_name(&self.config.output_extension));
        std::fs::write(&output_path, output)?;
        debug!(path = %output_path.display(), "compiled module file");

        file.ast = Some(ast);
        Ok(())
    }

    /// Filesystem location a module's outputs are written to.
    pub fn module_build_path(&self, module: &Module) -> PathBuf {
        match &module.package {
            Some(package) if package.name != "." && !self.config.package_build_path.is_empty() => {
                let mut path = package.path.join(&self.config.package_build_path);
                let relative = module.package_relative_uri();
                if !relative.is_empty() {
                    for segment in relative.split('.') {
                        path.push(segment);
                    }
                }
                path
            }
            _ => module.path.clone(),
        }
    }
}

fn exported_name(ast: &Ast, source: &str, name: Option<crate::ast::NodeId>) -> String {
    match name {
        Some(name) => {
            let text = ast.slice(source, name);
            if text == "default" { ast.program().file_name.clone() } else { text.to_string() }
        }
        None => String::new(),
    }
}
