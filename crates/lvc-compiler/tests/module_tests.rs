//! On-disk module and package builds: import resolution, descriptors,
//! caching, and the driver surface.

mod common;

use std::fs;
use std::path::Path;

use common::FixtureParser;
use lvc_compiler::descriptors::BUILD_FILE_NAME;
use lvc_compiler::{Compiler, Config, ModuleDescriptor};

fn write(path: impl AsRef<Path>, content: &str) {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn read(path: impl AsRef<Path>) -> String {
    fs::read_to_string(path.as_ref())
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.as_ref().display()))
}

fn compiler() -> Compiler<FixtureParser> {
    Compiler::new(Config::default(), FixtureParser)
}

fn compiler_with(config: Config) -> Compiler<FixtureParser> {
    Compiler::new(config, FixtureParser)
}

/// A package with one root module exporting `Item` and `A extends Item`.
fn simple_package(dir: &Path) {
    write(dir.join("lv.package.json"), r#"{ "name": "root.pkg" }"#);
    write(dir.join("lv.module.json"), "{}");
    write(dir.join("item.lv"), "component Item{}");
    write(dir.join("a.lv"), "component A extends Item{}");
}

#[test]
fn module_compile_resolves_local_exports() {
    let dir = tempfile::tempdir().unwrap();
    simple_package(dir.path());

    let build_path = compiler().compile_module(dir.path()).unwrap();
    assert_eq!(build_path, dir.path());

    let a = read(dir.path().join("a.lv.js"));
    assert!(a.contains("import { Item } from './item.lv.js'"), "missing local import: {a}");
    assert!(a.contains("export class A extends Item {"), "missing class: {a}");
    assert!(dir.path().join("item.lv.js").is_file(), "item must compile too");

    let descriptor = ModuleDescriptor::from_json(&read(dir.path().join(BUILD_FILE_NAME))).unwrap();
    assert_eq!(descriptor.uri, "root.pkg");
    let link = descriptor.find_export("A").expect("A exported");
    assert_eq!(link.file.unwrap().file_name, "a.lv");
    assert!(descriptor.find_export("Item").is_some());
}

#[test]
fn single_file_compile_returns_the_output_path() {
    let dir = tempfile::tempdir().unwrap();
    simple_package(dir.path());

    let output = compiler().compile(dir.path().join("a.lv")).unwrap();
    assert_eq!(output, dir.path().join("a.lv.js"));
    assert!(output.is_file());
}

#[test]
fn relative_imports_resolve_through_the_package() {
    let dir = tempfile::tempdir().unwrap();
    let pkg = dir.path();
    write(pkg.join("lv.package.json"), r#"{ "name": "root.pkg" }"#);
    write(pkg.join("lv.module.json"), "{}");
    write(pkg.join("item.lv"), "component Item{}");
    write(pkg.join("x/lv.module.json"), "{}");
    write(pkg.join("x/a.lv"), "import .\ncomponent A extends Item{}");

    compiler().compile_module(pkg.join("x")).unwrap();

    let a = read(pkg.join("x/a.lv.js"));
    assert!(
        a.contains("import { Item } from '../item.lv.js'"),
        "relative import must climb to the package: {a}"
    );

    // The imported module compiled first and both descriptors exist.
    assert!(pkg.join("item.lv.js").is_file());
    assert!(pkg.join(BUILD_FILE_NAME).is_file());
    let x_descriptor = ModuleDescriptor::from_json(&read(pkg.join("x").join(BUILD_FILE_NAME))).unwrap();
    assert_eq!(x_descriptor.uri, "root.pkg.x");
    let a_entry = x_descriptor.find_file("a.lv").unwrap();
    assert_eq!(a_entry.dependencies.len(), 1);
    assert_eq!(a_entry.dependencies[0].import_uri, ".");
}

#[test]
fn relative_import_without_a_package_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path().join("b.lv"), "import .\ncomponent B{}");

    let err = compiler().compile(dir.path().join("b.lv")).unwrap_err();
    assert!(
        err.to_string().contains("Cannot import relative path without package"),
        "got: {err}"
    );
    assert_eq!(err.code(), "~Import");
}

#[test]
fn importing_the_own_module_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let pkg = dir.path();
    write(pkg.join("lv.package.json"), r#"{ "name": "root.pkg" }"#);
    write(pkg.join("x/lv.module.json"), "{}");
    write(pkg.join("x/a.lv"), "import root.pkg.x\ncomponent A{}");

    let err = compiler().compile_module(pkg.join("x")).unwrap_err();
    assert!(err.to_string().contains("Cannot import own module"), "got: {err}");
}

#[test]
fn missing_imports_accumulate_a_trace() {
    let dir = tempfile::tempdir().unwrap();
    let pkg = dir.path();
    write(pkg.join("lv.package.json"), r#"{ "name": "root.pkg" }"#);
    write(pkg.join("lv.module.json"), "{}");
    write(pkg.join("a.lv"), "import no.such\ncomponent A{}");

    let err = compiler().compile_module(pkg).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Failed to find module 'no.such'"), "got: {message}");
    assert!(
        message.contains(" - Imported 'no.such' from 'root.pkg.a.lv'"),
        "missing trace frame: {message}"
    );
}

#[test]
fn mutual_file_references_report_a_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let pkg = dir.path();
    write(pkg.join("lv.package.json"), r#"{ "name": "root.pkg" }"#);
    write(pkg.join("lv.module.json"), "{}");
    write(pkg.join("a.lv"), "component A extends B{}");
    write(pkg.join("b.lv"), "component B extends A{}");

    let err = compiler().compile_module(pkg).unwrap_err();
    assert_eq!(err.code(), "Cycle");
    assert!(err.to_string().contains("Module file dependency cycle found"), "got: {err}");
}

#[test]
fn aliased_absolute_imports_produce_namespace_objects() {
    let dir = tempfile::tempdir().unwrap();
    let pkg = dir.path();
    write(pkg.join("lv.package.json"), r#"{ "name": "p" }"#);
    write(pkg.join("q/lv.module.json"), "{}");
    write(pkg.join("q/b.lv"), "component B{}");
    write(pkg.join("m/lv.module.json"), "{}");
    write(pkg.join("m/a.lv"), "import p.q as P\ncomponent A extends P.B{}");

    compiler().compile_module(pkg.join("m")).unwrap();

    let a = read(pkg.join("m/a.lv.js"));
    assert!(a.contains("import { B as __P__B } from 'p/q/b.lv.js'"), "missing import: {a}");
    assert!(a.contains("let P = { B: __P__B }"), "missing namespace object: {a}");
    assert!(a.contains("export class A extends P.B {"), "missing heritage: {a}");
}

#[test]
fn compiling_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    simple_package(dir.path());

    compiler().compile_module(dir.path()).unwrap();
    let first_a = read(dir.path().join("a.lv.js"));
    let first_descriptor = read(dir.path().join(BUILD_FILE_NAME));

    compiler().compile_module(dir.path()).unwrap();
    assert_eq!(read(dir.path().join("a.lv.js")), first_a);
    assert_eq!(read(dir.path().join(BUILD_FILE_NAME)), first_descriptor);
}

#[test]
fn release_tagged_packages_reuse_the_cached_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let pkg = dir.path();
    write(pkg.join("lv.package.json"), r#"{ "name": "root.rel", "release": "1.0.0" }"#);
    write(pkg.join("lv.module.json"), "{}");
    write(pkg.join("a.lv"), "component A{ int x: 1 }");

    compiler().compile_module(pkg).unwrap();
    let first = read(pkg.join("a.lv.js"));
    assert!(first.contains("this.x = 1"));

    // The source changes, but the cached descriptor short-circuits the
    // rebuild: outputs stay as they were.
    write(pkg.join("a.lv"), "component A{ int x: 2 }");
    compiler().compile_module(pkg).unwrap();
    assert_eq!(read(pkg.join("a.lv.js")), first);
}

#[test]
fn untagged_packages_always_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let pkg = dir.path();
    write(pkg.join("lv.package.json"), r#"{ "name": "root.pkg" }"#);
    write(pkg.join("lv.module.json"), "{}");
    write(pkg.join("a.lv"), "component A{ int x: 1 }");

    compiler().compile_module(pkg).unwrap();
    write(pkg.join("a.lv"), "component A{ int x: 2 }");
    compiler().compile_module(pkg).unwrap();
    assert!(read(pkg.join("a.lv.js")).contains("this.x = 2"), "untagged builds must refresh");
}

#[test]
fn package_build_path_relocates_outputs() {
    let dir = tempfile::tempdir().unwrap();
    simple_package(dir.path());

    let config = Config { package_build_path: "build".to_string(), ..Config::default() };
    let build_path = compiler_with(config).compile_module(dir.path()).unwrap();
    assert_eq!(build_path, dir.path().join("build"));
    assert!(dir.path().join("build/a.lv.js").is_file());
    assert!(dir.path().join("build").join(BUILD_FILE_NAME).is_file());
    assert!(!dir.path().join("a.lv.js").exists(), "sources stay clean");
}

#[test]
fn module_assets_are_copied_into_the_build() {
    let dir = tempfile::tempdir().unwrap();
    let pkg = dir.path();
    write(pkg.join("lv.package.json"), r#"{ "name": "root.pkg" }"#);
    write(pkg.join("lv.module.json"), r#"{ "assets": ["style.css"] }"#);
    write(pkg.join("a.lv"), "component A{}");
    write(pkg.join("style.css"), ".a { color: red }");

    let config = Config { package_build_path: "build".to_string(), ..Config::default() };
    compiler_with(config).compile_module(pkg).unwrap();
    assert_eq!(read(pkg.join("build/style.css")), ".a { color: red }");
}

#[test]
fn libraries_round_trip_through_the_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let pkg = dir.path();
    write(pkg.join("lv.package.json"), r#"{ "name": "root.pkg" }"#);
    write(pkg.join("lv.module.json"), r#"{ "libraries": ["native"] }"#);
    write(pkg.join("a.lv"), "component A{}");

    compiler().compile_module(pkg).unwrap();
    let descriptor = ModuleDescriptor::from_json(&read(pkg.join(BUILD_FILE_NAME))).unwrap();
    assert_eq!(descriptor.libraries(), vec!["native"]);
}

#[test]
fn instance_statements_export_elements_in_the_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let pkg = dir.path();
    write(pkg.join("lv.package.json"), r#"{ "name": "root.pkg" }"#);
    write(pkg.join("lv.module.json"), "{}");
    write(pkg.join("app.lv"), "component App{}\ninstance main = App{}");

    compiler().compile_module(pkg).unwrap();
    let descriptor = ModuleDescriptor::from_json(&read(pkg.join(BUILD_FILE_NAME))).unwrap();
    let app = descriptor.find_export("App").unwrap();
    assert_eq!(app.kind, lvc_compiler::ExportKind::Component);
    let main = descriptor.find_export("main").unwrap();
    assert_eq!(main.kind, lvc_compiler::ExportKind::Element);

    let js = read(pkg.join("app.lv.js"));
    assert!(js.contains("export let main = (function(parent){"), "missing instance: {js}");
}

#[test]
fn output_extension_is_configurable() {
    let dir = tempfile::tempdir().unwrap();
    simple_package(dir.path());

    let config = Config { output_extension: ".mjs".to_string(), ..Config::default() };
    compiler_with(config).compile_module(dir.path()).unwrap();
    assert!(dir.path().join("a.lv.mjs").is_file());
    let a = read(dir.path().join("a.lv.mjs"));
    assert!(a.contains("import { Item } from './item.lv.mjs'"), "extension flows into paths: {a}");
}
