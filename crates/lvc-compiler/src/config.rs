//! Compiler configuration.
//!
//! [`Config`] carries the host-facing options; it deserializes from the JSON
//! object hosts pass to the compiler entry points, with field names in
//! camelCase. [`ConversionContext`] is the per-file slice of it the lowering
//! engine reads, extended with the file and module being converted.

use serde::Deserialize;

/// Host options controlling compilation. All fields are optional on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Name of the runtime base class lowered components extend.
    pub base_component: String,
    /// Import path injected so the base class resolves in emitted files.
    pub base_component_import_uri: String,
    /// Emit `__UNRESOLVED__` instead of failing on unresolved imports.
    pub allow_unresolved: bool,
    /// Emit a `Meta` block per component.
    pub output_component_meta: bool,
    /// Preserve type annotations in non-component forms.
    pub output_types: bool,
    /// Gate js-import statements.
    pub js_imports_enabled: bool,
    /// Prefix applied to relative js-import paths.
    pub relative_path_from_build: String,
    /// Subdirectory of the package used as the import root.
    pub import_local_path: String,
    /// Build-layout control for output and import-path composition.
    pub package_build_path: String,
    /// Suffix appended to source file names.
    pub output_extension: String,
    /// Additional names treated as predeclared.
    pub implicit_types: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_component: "Element".to_string(),
            base_component_import_uri: String::new(),
            allow_unresolved: false,
            output_component_meta: false,
            output_types: false,
            js_imports_enabled: true,
            relative_path_from_build: String::new(),
            import_local_path: String::new(),
            package_build_path: String::new(),
            output_extension: ".js".to_string(),
            implicit_types: Vec::new(),
        }
    }
}

impl Config {
    /// The effective base component name; never empty.
    pub fn base_component_name(&self) -> &str {
        if self.base_component.is_empty() { "Element" } else { &self.base_component }
    }

    /// Output file name for a module source file (`a.lv` -> `a.lv.js`).
    pub fn output_file_name(&self, file_name: &str) -> String {
        format!("{}{}", file_name, self.output_extension)
    }

    /// The predeclared name list the scope checks consult: the base component
    /// plus the configured implicit types.
    pub fn effective_implicit_types(&self) -> Vec<String> {
        let mut types = vec![self.base_component_name().to_string()];
        types.extend(self.implicit_types.iter().cloned());
        types
    }
}

/// Per-file conversion state handed to the lowering engine.
#[derive(Debug, Clone, Default)]
pub struct ConversionContext {
    pub base_component: String,
    pub base_component_import_uri: String,
    pub allow_unresolved: bool,
    pub output_component_meta: bool,
    pub output_types: bool,
    pub js_imports_enabled: bool,
    pub relative_path_from_build: String,
    pub implicit_types: Vec<String>,
    /// Path of the file being converted, used for `Meta.sourceFileName`.
    pub component_path: String,
    /// Import URI of the module being converted, used for `Meta.module`.
    pub current_import_uri: String,
}

impl ConversionContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_component: config.base_component.clone(),
            base_component_import_uri: config.base_component_import_uri.clone(),
            allow_unresolved: config.allow_unresolved,
            output_component_meta: config.output_component_meta,
            output_types: config.output_types,
            js_imports_enabled: config.js_imports_enabled,
            relative_path_from_build: config.relative_path_from_build.clone(),
            implicit_types: config.implicit_types.clone(),
            component_path: String::new(),
            current_import_uri: String::new(),
        }
    }

    /// The effective base component name; never empty.
    pub fn base_component_name(&self) -> &str {
        if self.base_component.is_empty() { "Element" } else { &self.base_component }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_host_contract() {
        let config = Config::default();
        assert_eq!(config.base_component_name(), "Element");
        assert_eq!(config.output_extension, ".js");
        assert!(config.js_imports_enabled);
        assert!(!config.allow_unresolved);
        assert_eq!(config.output_file_name("a.lv"), "a.lv.js");
    }

    #[test]
    fn deserializes_camel_case_host_options() {
        let config: Config = serde_json::from_str(
            r#"{ "baseComponent": "Container",
                 "allowUnresolved": true,
                 "outputExtension": ".mjs",
                 "implicitTypes": ["console", "Math"] }"#,
        )
        .unwrap();
        assert_eq!(config.base_component_name(), "Container");
        assert!(config.allow_unresolved);
        assert_eq!(config.output_file_name("a.lv"), "a.lv.mjs");
        assert_eq!(
            config.effective_implicit_types(),
            vec!["Container".to_string(), "console".to_string(), "Math".to_string()]
        );
    }
}
