//! Lowering engine: AST to target script fragments.
//!
//! A dispatch over the AST node kinds. Component declarations become classes
//! with a generated `__initialize` method, new-component expressions become
//! self-applying functions, and the remaining JS forms pass through with
//! type annotations stripped (unless `outputTypes` is set). Everything is
//! emitted as byte-positional fragments so untouched spans of the original
//! source survive verbatim.

use std::collections::BTreeSet;

use lvc_core::{Error, Result};

use crate::ast::bindings::{BindingEnv, implicit_property_roots, subscriptions_js};
use crate::ast::{Ast, ComponentNode, ImportType, NodeId, NodeKind, PropertyNode};
use crate::config::ConversionContext;
use crate::fragments::{Fragment, FragmentWriter};

fn indent(level: usize) -> String {
    "  ".repeat(level)
}

/// Lower a whole program into its ordered fragment list.
pub fn lower_program(ast: &mut Ast, source: &str, ctx: &ConversionContext) -> Result<Vec<Fragment>> {
    if !ctx.js_imports_enabled && !ast.program().js_imports.is_empty() {
        return Err(Error::build("Javascript imports are not enabled."));
    }

    // Make the base component resolvable when the host supplied a path.
    if !ctx.base_component_import_uri.is_empty() && !ctx.base_component.is_empty() {
        ast.add_import_type(ImportType {
            namespace: String::new(),
            name: ctx.base_component.clone(),
            location: Default::default(),
            resolved_path: Some(ctx.base_component_import_uri.clone()),
        });
    }

    attach_property_accessors(ast, source);

    let namespaces: BTreeSet<String> = ast
        .program()
        .imports
        .iter()
        .filter_map(|&imp| match ast.kind(imp) {
            NodeKind::Import(i) => i.alias.map(|a| ast.slice(source, a).to_string()),
            _ => None,
        })
        .collect();

    let engine = Lowering { source, ctx, namespaces };
    let mut fragments = vec![engine.imports_fragment(ast)?];
    let exports = ast.program().exports.clone();
    for export in exports {
        engine.convert(ast, export, &mut fragments, 0)?;
    }
    Ok(fragments)
}

/// Pair property accessors with their declared property by name, marking the
/// matched ones attached so they are emitted inside `addProperty` instead of
/// as class members.
fn attach_property_accessors(ast: &mut Ast, source: &str) {
    for id in ast.node_ids().collect::<Vec<_>>() {
        let NodeKind::ComponentDeclaration(c) = ast.kind(id) else { continue };
        let property_names: Vec<String> = c
            .properties
            .iter()
            .filter_map(|&p| match ast.kind(p) {
                NodeKind::PropertyDeclaration(prop) => {
                    prop.name.map(|n| ast.slice(source, n).to_string())
                }
                _ => None,
            })
            .collect();
        let accessors = c.accessors.clone();

        for accessor in accessors {
            let matched = match ast.kind(accessor) {
                NodeKind::PropertyAccessor(a) => a
                    .name
                    .map(|n| property_names.iter().any(|p| p == ast.slice(source, n)))
                    .unwrap_or(false),
                _ => false,
            };
            if matched && let NodeKind::PropertyAccessor(a) = &mut ast.node_mut(accessor).kind {
                a.is_attached = true;
            }
        }
    }
}

struct Lowering<'a> {
    source: &'a str,
    ctx: &'a ConversionContext,
    namespaces: BTreeSet<String>,
}

impl<'a> Lowering<'a> {
    fn slice(&self, ast: &Ast, id: NodeId) -> &'a str {
        ast.slice(self.source, id)
    }

    fn base(&self) -> &str {
        self.ctx.base_component_name()
    }

    /// Type annotation text with a leading `:` stripped.
    fn type_slice(&self, ast: &Ast, id: NodeId) -> &'a str {
        let text = self.slice(ast, id);
        text.strip_prefix(':').map(str::trim_start).unwrap_or(text)
    }

    /// A component or instance name; `default` resolves to the file name.
    fn declared_name(&self, ast: &Ast, name: Option<NodeId>) -> String {
        match name {
            Some(name) => {
                let text = self.slice(ast, name);
                if text == "default" {
                    ast.program().file_name.clone()
                } else {
                    text.to_string()
                }
            }
            None => String::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    fn convert(&self, ast: &Ast, id: NodeId, out: &mut Vec<Fragment>, ind: usize) -> Result<()> {
        match ast.kind(id) {
            NodeKind::ComponentDeclaration(_) => out.push(self.component_declaration(ast, id, ind)?),
            NodeKind::ConstructorInitializer { .. } => {
                out.push(self.constructor_initializer(ast, id, ind)?)
            }
            NodeKind::NewComponentExpression(_) => {
                out.push(self.new_component_expression(ast, id, ind)?)
            }
            NodeKind::NewTaggedComponentExpression => out.push(self.tagged(ast, id, ind, false)?),
            NodeKind::NewTrippleTaggedComponentExpression => {
                out.push(self.tagged(ast, id, ind, true)?)
            }
            NodeKind::VariableDeclaration(_) => out.push(self.variable_declaration(ast, id, ind)?),
            NodeKind::FunctionDeclaration(_) => out.push(self.function_form(ast, id, ind, true)?),
            NodeKind::Function(_) => out.push(self.function_form(ast, id, ind, false)?),
            NodeKind::ArrowFunction(_) => out.push(self.arrow_function(ast, id, ind)?),
            _ => {
                for &child in ast.children(id) {
                    self.convert(ast, child, out, ind)?;
                }
            }
        }
        Ok(())
    }

    /// A source-preserving rewrite of a node's span with its recognized
    /// descendants converted in place.
    fn section(&self, ast: &Ast, id: NodeId, ind: usize) -> Result<Fragment> {
        let mut children = Vec::new();
        self.convert(ast, id, &mut children, ind)?;
        Ok(Fragment::rewrite(ast.start_byte(id), ast.end_byte(id), children))
    }

    /// Conversion of one node into a single fragment.
    fn single(&self, ast: &Ast, id: NodeId, ind: usize) -> Result<Fragment> {
        let mut fragments = Vec::new();
        self.convert(ast, id, &mut fragments, ind)?;
        if fragments.len() == 1 {
            return Ok(fragments.remove(0));
        }
        Ok(Fragment::rewrite(ast.start_byte(id), ast.end_byte(id), fragments))
    }

    /// Like [`section`](Self::section), but additionally inserts `this.`
    /// before every captured chain root that reads a declared property of the
    /// enclosing component without qualification.
    fn bindable_section(
        &self,
        ast: &Ast,
        property: NodeId,
        value: NodeId,
        ind: usize,
    ) -> Result<Fragment> {
        let mut children = Vec::new();
        self.convert(ast, value, &mut children, ind)?;

        if let Some(container) = ast.bindings(property) {
            let env = BindingEnv { namespaces: &self.namespaces };
            let from = ast.start_byte(value);
            let to = ast.end_byte(value);
            let mut prefixes = Vec::new();
            for root in implicit_property_roots(ast, self.source, property, container, &env) {
                let offset = ast.start_byte(root);
                // Roots inside already-converted subfragments keep their
                // rewritten text; a prefix there would overlap.
                let clear = children.iter().all(|c| offset < c.from || offset >= c.to);
                if offset >= from && offset < to && clear {
                    prefixes.push(Fragment::text(offset, offset, "this."));
                }
            }
            children.extend(prefixes);
        }
        Ok(Fragment::rewrite(ast.start_byte(value), ast.end_byte(value), children))
    }

    fn subscriptions(&self, ast: &Ast, property: NodeId) -> String {
        match ast.bindings(property) {
            Some(container) => subscriptions_js(
                ast,
                self.source,
                property,
                container,
                &BindingEnv { namespaces: &self.namespaces },
            ),
            None => String::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Program imports
    // ------------------------------------------------------------------------

    fn imports_fragment(&self, ast: &Ast) -> Result<Fragment> {
        let program = ast.program();
        let mut to = 0;
        for &import in program.imports.iter().chain(program.js_imports.iter()) {
            to = to.max(ast.end_byte(import));
        }
        let mut w = FragmentWriter::new(0, to);

        for &js_import in &program.js_imports {
            let NodeKind::JsImport(node) = ast.kind(js_import) else { continue };
            let names = node
                .names
                .iter()
                .map(|&n| self.slice(ast, n))
                .collect::<Vec<_>>()
                .join(", ");

            let mut path = node.path.map(|p| self.slice(ast, p)).unwrap_or("").to_string();
            if path.len() > 2 {
                path = path[1..path.len() - 1].to_string();
            }
            if !self.ctx.relative_path_from_build.is_empty()
                && path.len() > 2
                && path.starts_with('.')
                && (path.as_bytes()[1] == b'.' || path.as_bytes()[1] == b'/')
            {
                path = format!("{}/{}", self.ctx.relative_path_from_build, path);
            }

            if node.is_object_import {
                w.text(format!("import {{ {names} }} from '{path}'\n"));
            } else {
                w.text(format!("import {names} from '{path}'\n"));
            }
        }

        for (namespace, entries) in &program.import_types {
            if namespace.is_empty() {
                for entry in entries.values() {
                    let path = self.resolved_path(ast, entry)?;
                    w.text(format!("import {{ {} }} from '{}'\n", entry.name, path));
                }
            } else {
                let mut wrap_fields = Vec::new();
                for entry in entries.values() {
                    let path = self.resolved_path(ast, entry)?;
                    let key = format!("__{}__{}", namespace, entry.name);
                    w.text(format!("import {{ {} as {} }} from '{}'\n", entry.name, key, path));
                    wrap_fields.push(format!("{}: {}", entry.name, key));
                }
                w.text(format!("let {} = {{ {} }}\n", namespace, wrap_fields.join(", ")));
            }
        }

        Ok(w.finish())
    }

    fn resolved_path(&self, ast: &Ast, entry: &ImportType) -> Result<String> {
        match &entry.resolved_path {
            Some(path) if !path.is_empty() => Ok(path.clone()),
            _ if self.ctx.allow_unresolved => Ok("__UNRESOLVED__".to_string()),
            _ => Err(Error::import(format!(
                "Identifier not found in imports: '{}' in {}",
                entry.name,
                ast.program().file_path
            ))),
        }
    }

    // ------------------------------------------------------------------------
    // Component declaration
    // ------------------------------------------------------------------------

    fn component_declaration(&self, ast: &Ast, id: NodeId, ind: usize) -> Result<Fragment> {
        let NodeKind::ComponentDeclaration(comp) = ast.kind(id) else {
            return Err(Error::assertion("component_declaration on a non-component node"));
        };

        let name = self.declared_name(ast, comp.name);
        let anonymous = comp.name.is_none();
        let heritage = if comp.heritage.is_empty() {
            self.base().to_string()
        } else {
            comp.heritage.iter().map(|&h| self.slice(ast, h)).collect::<Vec<_>>().join(".")
        };

        let i1 = indent(ind + 1);
        let i2 = indent(ind + 2);
        let mut w = FragmentWriter::new(ast.start_byte(id), ast.end_byte(id));

        if matches!(ast.parent(id).map(|p| ast.kind(p)), Some(NodeKind::Program(_))) {
            w.text(format!("{}export ", indent(ind)));
        }
        w.text("class ");
        if !anonymous {
            w.text(format!("{name} "));
        }
        w.text(format!("extends {heritage} {{\n"));

        let constructor = comp.body.and_then(|b| match ast.kind(b) {
            NodeKind::ComponentBody { constructor } => *constructor,
            _ => None,
        });
        let constructor_data = constructor.and_then(|c| match ast.kind(c) {
            NodeKind::ConstructorDefinition(data) => Some(data),
            _ => None,
        });

        // Explicit constructors are copied through; otherwise a default one
        // forwards into __initialize.
        match constructor_data {
            Some(ctor) => {
                let params = self.parameter_names(ast, ctor.parameters).join(",");
                w.text(format!("{i1}constructor({params})"));
                if let Some(body) = ctor.body {
                    w.nested(self.section(ast, body, ind + 1)?);
                }
                w.text("\n");
            }
            None => {
                let target = if anonymous { "new.target" } else { name.as_str() };
                w.text(format!(
                    "{i1}constructor(){{ super(); {target}.prototype.__initialize.call(this) }}\n"
                ));
            }
        }

        // __initialize carries the whole declarative surface.
        w.text(format!("{i1}__initialize("));
        let initializer_names = constructor_data
            .and_then(|c| c.initializer)
            .map(|init| self.initializer_names(ast, init))
            .unwrap_or_default();
        w.text(
            initializer_names.iter().map(|n| format!("__{n}__")).collect::<Vec<_>>().join(","),
        );
        w.text("){\n");

        if comp.id.is_some() || !comp.id_components.is_empty() {
            w.text(format!("{i2}this.ids = {{}}\n"));
        }
        if let Some(component_id) = comp.id {
            let id_name = self.slice(ast, component_id);
            w.text(format!("{i2}var {id_name} = this\n"));
            w.text(format!("{i2}this.ids['{id_name}'] = {id_name}\n"));
        }
        for &child in &comp.id_components {
            self.emit_id_component_var(ast, child, &i2, &mut w)?;
        }
        for &child in &comp.id_components {
            let NodeKind::NewComponentExpression(nce) = ast.kind(child) else { continue };
            let Some(child_id) = nce.id else { continue };
            let object = self.slice(ast, child_id).to_string();
            for &property in &nce.properties {
                self.add_property(ast, property, &object, ind + 2, None, None, &mut w)?;
            }
        }

        for &property in &comp.properties {
            let (getter, setter) = self.attached_accessors(ast, comp, property);
            self.add_property(ast, property, "this", ind + 2, getter, setter, &mut w)?;
        }

        self.emit_events(ast, &comp.events, ind + 2, &mut w);
        self.emit_listeners(ast, &comp.listeners, ind + 2, &mut w)?;

        for name in &initializer_names {
            w.text(format!("{i2}this.{name} = __{name}__\n"));
        }

        for &property in &comp.properties {
            self.emit_property_value(ast, property, ind + 2, &mut w)?;
        }
        for &assignment in &comp.assignments {
            self.emit_property_assignment(ast, assignment, ind + 2, &mut w)?;
        }

        if !comp.default_children.is_empty() {
            w.text(format!("{i2}{}.assignChildren(this,[\n", self.base()));
            for (i, &child) in comp.default_children.iter().enumerate() {
                if i != 0 {
                    w.text(",\n");
                }
                w.text(indent(ind + 3));
                w.nested(self.single(ast, child, ind + 3)?);
            }
            w.text(format!("\n{i2}])\n"));
        }

        w.text(format!("{i1}}}\n"));

        for &accessor in &comp.accessors {
            let NodeKind::PropertyAccessor(a) = ast.kind(accessor) else { continue };
            if a.is_attached {
                continue;
            }
            let accessor_name = a.name.map(|n| self.slice(ast, n)).unwrap_or("");
            match a.kind {
                crate::ast::AccessorKind::Getter => {
                    w.text(format!("{i1}get {accessor_name}()"));
                }
                crate::ast::AccessorKind::Setter => {
                    let param =
                        self.parameter_names(ast, a.parameters).first().cloned().unwrap_or_default();
                    w.text(format!("{i1}set {accessor_name}({param})"));
                }
            }
            if let Some(body) = a.body {
                w.nested(self.section(ast, body, ind + 1)?);
            }
            w.text("\n");
        }

        for &method in &comp.methods {
            let NodeKind::TypedMethod(m) = ast.kind(method) else { continue };
            let method_name = m.name.map(|n| self.slice(ast, n)).unwrap_or("");
            let params = self.parameter_names(ast, m.parameters).join(",");
            let mut annotations = String::new();
            if m.is_static {
                annotations.push_str("static ");
            }
            if m.is_async {
                annotations.push_str("async ");
            }
            w.text(format!("{i1}{annotations}{method_name}({params})"));
            if let Some(body) = m.body {
                w.nested(self.section(ast, body, ind + 1)?);
            }
            w.text("\n");
        }

        if self.ctx.output_component_meta && anonymous {
            w.text(format!("{i1}static get Meta(){{ return {{\n"));
            self.emit_meta_body(ind + 2, &mut w);
            w.text(format!("{i1}}}}}\n"));
        }

        w.text(format!("{}}}\n", indent(ind)));

        for &static_property in &comp.static_properties {
            let NodeKind::StaticPropertyDeclaration(p) = ast.kind(static_property) else {
                continue;
            };
            let property_name = p.name.map(|n| self.slice(ast, n)).unwrap_or("");
            w.text(format!("{}{}.{}", indent(ind), name, property_name));
            if let Some(expression) = p.expression {
                w.text(" = ");
                w.nested(self.section(ast, expression, ind + 1)?);
            }
            w.text("\n");
        }

        if self.ctx.output_component_meta && !anonymous {
            w.text(format!("{}{}.Meta = {{\n", indent(ind), name));
            self.emit_meta_body(ind + 1, &mut w);
            w.text(format!("{}}}\n", indent(ind)));
        }

        Ok(w.finish())
    }

    fn emit_meta_body(&self, ind: usize, w: &mut FragmentWriter) {
        let file_name = std::path::Path::new(&self.ctx.component_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        w.text(format!("{}get sourceFileName(){{ return '{}' }},\n", indent(ind), file_name));
        if !self.ctx.current_import_uri.is_empty() {
            w.text(format!(
                "{}get module(){{ return '{}' }}\n",
                indent(ind),
                self.ctx.current_import_uri
            ));
        }
    }

    fn attached_accessors(
        &self,
        ast: &Ast,
        comp: &ComponentNode,
        property: NodeId,
    ) -> (Option<NodeId>, Option<NodeId>) {
        let NodeKind::PropertyDeclaration(p) = ast.kind(property) else { return (None, None) };
        let Some(name) = p.name else { return (None, None) };
        let property_name = self.slice(ast, name);

        let mut getter = None;
        let mut setter = None;
        for &accessor in &comp.accessors {
            let NodeKind::PropertyAccessor(a) = ast.kind(accessor) else { continue };
            if a.name.map(|n| self.slice(ast, n)) != Some(property_name) {
                continue;
            }
            match a.kind {
                crate::ast::AccessorKind::Getter => getter = Some(accessor),
                crate::ast::AccessorKind::Setter => setter = Some(accessor),
            }
        }
        (getter, setter)
    }

    /// `var <id> = new <Type>(<args>)` plus the ids-table entry.
    fn emit_id_component_var(
        &self,
        ast: &Ast,
        child: NodeId,
        ind: &str,
        w: &mut FragmentWriter,
    ) -> Result<()> {
        let NodeKind::NewComponentExpression(nce) = ast.kind(child) else { return Ok(()) };
        let Some(child_id) = nce.id else { return Ok(()) };
        let id_name = self.slice(ast, child_id);
        let type_name =
            nce.name.iter().map(|&n| self.slice(ast, n)).collect::<Vec<_>>().join(".");
        let args = match nce.arguments {
            Some(arguments) => self.slice(ast, arguments).to_string(),
            None => "()".to_string(),
        };
        w.text(format!("{ind}var {id_name} = new {type_name}{args}\n"));
        w.text(format!("{ind}this.ids['{id_name}'] = {id_name}\n"));
        Ok(())
    }

    /// `<base>.addProperty(<object>,'name',{type:…, notify:…, get?, set?})`.
    #[allow(clippy::too_many_arguments)]
    fn add_property(
        &self,
        ast: &Ast,
        property: NodeId,
        object: &str,
        ind: usize,
        getter: Option<NodeId>,
        setter: Option<NodeId>,
        w: &mut FragmentWriter,
    ) -> Result<()> {
        let NodeKind::PropertyDeclaration(p) = ast.kind(property) else { return Ok(()) };
        let name = p.name.map(|n| self.slice(ast, n)).unwrap_or("");
        let type_text = p.type_annotation.map(|t| self.type_slice(ast, t)).unwrap_or("");

        w.text(format!(
            "{}{}.addProperty({},'{}',{{type:'{}', notify:'{}Changed'",
            indent(ind),
            self.base(),
            object,
            name,
            type_text,
            name
        ));
        if let Some(getter) = getter
            && let NodeKind::PropertyAccessor(a) = ast.kind(getter)
            && let Some(body) = a.body
        {
            w.text(", get: function()");
            w.nested(self.section(ast, body, ind + 1)?);
        }
        if let Some(setter) = setter
            && let NodeKind::PropertyAccessor(a) = ast.kind(setter)
        {
            let param = self.parameter_names(ast, a.parameters).first().cloned().unwrap_or_default();
            w.text(format!(", set: function({param})"));
            if let Some(body) = a.body {
                w.nested(self.section(ast, body, ind + 1)?);
            }
        }
        w.text("})\n");
        Ok(())
    }

    /// Value assignment of a declared property: reactive binding, direct
    /// expression, or immediately-invoked block.
    fn emit_property_value(
        &self,
        ast: &Ast,
        property: NodeId,
        ind: usize,
        w: &mut FragmentWriter,
    ) -> Result<()> {
        let NodeKind::PropertyDeclaration(p) = ast.kind(property) else { return Ok(()) };
        let name = p.name.map(|n| self.slice(ast, n)).unwrap_or("");
        self.emit_value(ast, property, p, &format!("this.{name}"), "this", name, ind, w)
    }

    /// A dotted `property: value` assignment in a component body.
    fn emit_property_assignment(
        &self,
        ast: &Ast,
        assignment: NodeId,
        ind: usize,
        w: &mut FragmentWriter,
    ) -> Result<()> {
        let NodeKind::PropertyAssignment(p) = ast.kind(assignment) else { return Ok(()) };
        if p.property.is_empty() {
            return Ok(());
        }
        let segments: Vec<&str> = p.property.iter().map(|&s| self.slice(ast, s)).collect();
        let target = format!("this.{}", segments.join("."));
        let object = if segments.len() > 1 {
            format!("this.{}", segments[..segments.len() - 1].join("."))
        } else {
            "this".to_string()
        };
        let last = segments[segments.len() - 1];

        let value = PropertyNode {
            name: None,
            type_annotation: None,
            expression: p.expression,
            statement_block: p.statement_block,
            is_binding_assignment: p.is_binding_assignment,
        };
        self.emit_value(ast, assignment, &value, &target, &object, last, ind, w)
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_value(
        &self,
        ast: &Ast,
        property: NodeId,
        p: &PropertyNode,
        target: &str,
        object: &str,
        name: &str,
        ind: usize,
        w: &mut FragmentWriter,
    ) -> Result<()> {
        let subscriptions = self.subscriptions(ast, property);
        let i = indent(ind);

        if !subscriptions.is_empty() && p.is_binding_assignment {
            if let Some(expression) = p.expression {
                w.text(format!(
                    "{i}{}.assignPropertyExpression({object},'{name}',function(){{ return ",
                    self.base()
                ));
                w.nested(self.bindable_section(ast, property, expression, ind + 1)?);
                w.text(format!(" }}.bind({object}),{subscriptions})\n"));
            } else if let Some(block) = p.statement_block {
                w.text(format!(
                    "{i}{}.assignPropertyExpression({object},'{name}',function()",
                    self.base()
                ));
                w.nested(self.bindable_section(ast, property, block, ind + 1)?);
                w.text(format!(".bind({object}),{subscriptions})\n"));
            }
        } else if let Some(expression) = p.expression {
            w.text(format!("{i}{target} = "));
            w.nested(self.bindable_section(ast, property, expression, ind + 1)?);
            w.text("\n");
        } else if let Some(block) = p.statement_block {
            w.text(format!("{i}{target} = (function()"));
            w.nested(self.bindable_section(ast, property, block, ind + 1)?);
            w.text(".bind(this))()\n");
        }
        Ok(())
    }

    fn emit_events(&self, ast: &Ast, events: &[NodeId], ind: usize, w: &mut FragmentWriter) {
        for &event in events {
            let NodeKind::EventDeclaration { name, parameters } = ast.kind(event) else { continue };
            let event_name = name.map(|n| self.slice(ast, n)).unwrap_or("");
            let params = self
                .parameters(ast, *parameters)
                .iter()
                .map(|(param_name, param_type)| {
                    format!("['{}','{}']", param_type.unwrap_or(""), param_name)
                })
                .collect::<Vec<_>>()
                .join(",");
            w.text(format!(
                "{}{}.addEvent(this, '{}', [{}])\n",
                indent(ind),
                self.base(),
                event_name,
                params
            ));
        }
    }

    fn emit_listeners(
        &self,
        ast: &Ast,
        listeners: &[NodeId],
        ind: usize,
        w: &mut FragmentWriter,
    ) -> Result<()> {
        for &listener in listeners {
            let NodeKind::ListenerDeclaration(l) = ast.kind(listener) else { continue };
            let listener_name = l.name.map(|n| self.slice(ast, n)).unwrap_or("");
            let params = self.parameter_names(ast, l.parameters).join(",");
            w.text(format!("{}this.on('{}', function({})", indent(ind), listener_name, params));
            if let Some(body) = l.body {
                w.nested(self.section(ast, body, ind + 1)?);
                w.text(".bind(this))\n");
            } else if let Some(expression) = l.body_expression {
                w.text("{");
                w.nested(self.section(ast, expression, ind + 1)?);
                w.text("}.bind(this))\n");
            }
        }
        Ok(())
    }

    fn initializer_names(&self, ast: &Ast, initializer: NodeId) -> Vec<String> {
        let NodeKind::ConstructorInitializer { assignments } = ast.kind(initializer) else {
            return Vec::new();
        };
        assignments
            .iter()
            .filter_map(|&a| match ast.kind(a) {
                NodeKind::ConstructorInitializerAssignment { name, .. } => {
                    name.map(|n| self.slice(ast, n).to_string())
                }
                _ => None,
            })
            .collect()
    }

    /// Parameter (name, type) pairs of a parameter list node.
    fn parameters(&self, ast: &Ast, list: Option<NodeId>) -> Vec<(&'a str, Option<&'a str>)> {
        let Some(list) = list else { return Vec::new() };
        let NodeKind::ParameterList { parameters } = ast.kind(list) else { return Vec::new() };
        parameters
            .iter()
            .filter_map(|&p| match ast.kind(p) {
                NodeKind::Parameter { identifier, type_annotation, .. } => Some((
                    self.slice(ast, *identifier),
                    type_annotation.map(|t| self.type_slice(ast, t)),
                )),
                _ => None,
            })
            .collect()
    }

    fn parameter_names(&self, ast: &Ast, list: Option<NodeId>) -> Vec<String> {
        self.parameters(ast, list).iter().map(|(name, _)| name.to_string()).collect()
    }

    // ------------------------------------------------------------------------
    // Constructor initializer
    // ------------------------------------------------------------------------

    fn constructor_initializer(&self, ast: &Ast, id: NodeId, ind: usize) -> Result<Fragment> {
        let NodeKind::ConstructorInitializer { assignments } = ast.kind(id) else {
            return Err(Error::assertion("constructor_initializer on a wrong node kind"));
        };

        let mut component = None;
        let mut current = ast.parent(id);
        while let Some(p) = current {
            if let NodeKind::ComponentDeclaration(c) = ast.kind(p) {
                component = Some(c);
                break;
            }
            current = ast.parent(p);
        }
        let Some(component) = component else {
            return Err(Error::assertion(format!(
                "Could not find component declaration for constructor initializer: {}",
                ast.slice(self.source, id)
            )));
        };

        let init_object = if component.name.is_none() {
            "new.target".to_string()
        } else {
            self.declared_name(ast, component.name)
        };

        let mut w = FragmentWriter::new(ast.start_byte(id), ast.end_byte(id));
        w.text(format!("{init_object}.prototype.__initialize.call(this"));
        for &assignment in assignments {
            let NodeKind::ConstructorInitializerAssignment { expression, .. } = ast.kind(assignment)
            else {
                continue;
            };
            if let Some(expression) = expression {
                w.text(",");
                w.nested(self.section(ast, *expression, ind + 1)?);
            }
        }
        w.text(")");
        Ok(w.finish())
    }

    // ------------------------------------------------------------------------
    // New component expressions
    // ------------------------------------------------------------------------

    fn new_component_expression(&self, ast: &Ast, id: NodeId, ind: usize) -> Result<Fragment> {
        let NodeKind::NewComponentExpression(nce) = ast.kind(id) else {
            return Err(Error::assertion("new_component_expression on a wrong node kind"));
        };

        let parent = ast.parent(id);
        let instance_statement = parent.filter(|&p| {
            matches!(ast.kind(p), NodeKind::ComponentInstanceStatement { .. })
        });

        let from = instance_statement.map(|p| ast.start_byte(p)).unwrap_or(ast.start_byte(id));
        let mut w = FragmentWriter::new(from, ast.end_byte(id));

        if let Some(statement) = instance_statement
            && let NodeKind::ComponentInstanceStatement { name } = ast.kind(statement)
        {
            let instance_name = self.declared_name(ast, *name);
            w.text(format!("export let {instance_name} = "));
        }

        let i1 = indent(ind + 1);
        w.text("(function(parent){\n");
        w.text(format!("{i1}this.setParent(parent)\n"));

        let id_name = nce.id.map(|n| self.slice(ast, n));
        let id_root = match id_name {
            Some(name) if nce.is_root => name,
            _ => "this",
        };

        if nce.is_root && (nce.id.is_some() || !nce.id_components.is_empty()) {
            w.text(format!("{i1}this.ids = {{}}\n"));
        }
        if let Some(name) = id_name {
            w.text(format!("{i1}{}.assignId({}, '{}')\n", self.base(), name, name));
            if nce.is_root {
                w.text(format!("{i1}var {name} = this\n"));
                w.text(format!("{i1}this.ids['{name}'] = {name}\n"));
            }
        }
        if nce.is_root {
            for &child in &nce.id_components {
                self.emit_id_component_var(ast, child, &i1, &mut w)?;
            }
        }

        if nce.is_root || nce.id.is_none() {
            for &property in &nce.properties {
                self.add_property(ast, property, id_root, ind + 1, None, None, &mut w)?;
            }
        }
        if nce.is_root {
            for &child in &nce.id_components {
                let NodeKind::NewComponentExpression(child_nce) = ast.kind(child) else { continue };
                let Some(child_id) = child_nce.id else { continue };
                let object = self.slice(ast, child_id).to_string();
                for &property in &child_nce.properties {
                    self.add_property(ast, property, &object, ind + 1, None, None, &mut w)?;
                }
            }
        }

        for &property in &nce.properties {
            self.emit_property_value(ast, property, ind + 1, &mut w)?;
        }
        for &assignment in &nce.assignments {
            self.emit_property_assignment(ast, assignment, ind + 1, &mut w)?;
        }
        self.emit_events(ast, &nce.events, ind + 1, &mut w);
        self.emit_listeners(ast, &nce.listeners, ind + 1, &mut w)?;

        for &method in &nce.methods {
            let NodeKind::TypedMethod(m) = ast.kind(method) else { continue };
            let method_name = m.name.map(|n| self.slice(ast, n)).unwrap_or("");
            let params = self.parameter_names(ast, m.parameters).join(",");
            let is_async = if m.is_async { "async " } else { "" };
            w.text(format!("{i1}this.{method_name} = {is_async}function({params})"));
            if let Some(body) = m.body {
                w.nested(self.section(ast, body, ind + 2)?);
            }
            w.text("\n");
        }

        if nce.default_children.is_empty() {
            w.text(format!("{i1}{}.complete(this)\n", self.base()));
        } else {
            w.text(format!("{i1}{}.assignChildrenAndComplete(this,[\n", self.base()));
            for (i, &child) in nce.default_children.iter().enumerate() {
                if i != 0 {
                    w.text(",\n");
                }
                w.text(indent(ind + 2));
                w.nested(self.single(ast, child, ind + 2)?);
            }
            w.text(format!("\n{i1}])\n"));
        }

        w.text(format!("{i1}return this\n"));
        w.text(format!("{}}}.bind(", indent(ind)));

        if nce.id.is_none() || nce.is_root {
            let type_name =
                nce.name.iter().map(|&n| self.slice(ast, n)).collect::<Vec<_>>().join(".");
            w.text(format!("new {type_name}"));
            match nce.arguments {
                Some(arguments) => {
                    w.text(self.slice(ast, arguments));
                }
                None => {
                    w.text("()");
                }
            }
        } else if let Some(name) = id_name {
            w.text(name);
        }

        // The parent argument is `this` for expressions sitting in a
        // component body, directly or as a property value.
        let mut is_this = matches!(
            parent.map(|p| ast.kind(p)),
            Some(NodeKind::ComponentBody { .. })
        );
        if !is_this
            && let Some(p) = parent
            && let Some(pp) = ast.parent(p)
            && matches!(ast.kind(pp), NodeKind::PropertyDeclaration(_))
            && let Some(ppp) = ast.parent(pp)
            && matches!(ast.kind(ppp), NodeKind::ComponentBody { .. })
        {
            is_this = true;
        }
        w.text(if is_this { ")(this))" } else { ")(null))" });

        Ok(w.finish())
    }

    // ------------------------------------------------------------------------
    // Tagged components
    // ------------------------------------------------------------------------

    fn tagged(&self, ast: &Ast, id: NodeId, ind: usize, tripple: bool) -> Result<Fragment> {
        let mut name = "";
        let mut value = String::new();
        for &child in ast.children(id) {
            match ast.kind(child) {
                NodeKind::Identifier => name = self.slice(ast, child),
                NodeKind::TaggedString | NodeKind::TrippleTaggedString => {
                    let raw = self.slice(ast, child);
                    value = if tripple {
                        tripple_tagged_value(raw)
                    } else {
                        tagged_value(raw)
                    };
                }
                _ => {}
            }
        }

        let i1 = indent(ind + 1);
        let mut w = FragmentWriter::new(ast.start_byte(id), ast.end_byte(id));
        w.text("(function(parent){\n");
        w.text(format!("{i1}this.setParent(parent)\n"));
        w.text(format!("{i1}{}.complete(this)\n", self.base()));
        w.text(format!("{i1}return this\n"));
        w.text(format!("{}}}.bind(new {}(\"{}\"))(this))", indent(ind), name, value));
        Ok(w.finish())
    }

    // ------------------------------------------------------------------------
    // Pass-through JS forms
    // ------------------------------------------------------------------------

    fn variable_declaration(&self, ast: &Ast, id: NodeId, ind: usize) -> Result<Fragment> {
        let NodeKind::VariableDeclaration(decl) = ast.kind(id) else {
            return Err(Error::assertion("variable_declaration on a wrong node kind"));
        };

        let mut w = FragmentWriter::new(ast.start_byte(id), ast.end_byte(id));
        w.text(decl.form.keyword());
        w.text(" ");
        for (i, &declarator) in decl.declarators.iter().enumerate() {
            let NodeKind::VariableDeclarator { name, type_annotation, value } = ast.kind(declarator)
            else {
                continue;
            };
            if i != 0 {
                w.text(",");
            }
            if let Some(name) = name {
                w.text(self.slice(ast, *name));
            }
            if self.ctx.output_types
                && let Some(type_annotation) = type_annotation
            {
                w.text(self.slice(ast, *type_annotation));
            }
            if let Some(value) = value {
                w.text(" = ");
                w.nested(self.section(ast, *value, ind + 1)?);
            }
        }
        if decl.has_semicolon {
            w.text(";");
        }
        Ok(w.finish())
    }

    fn function_form(&self, ast: &Ast, id: NodeId, ind: usize, named: bool) -> Result<Fragment> {
        let (NodeKind::Function(f) | NodeKind::FunctionDeclaration(f)) = ast.kind(id) else {
            return Err(Error::assertion("function_form on a wrong node kind"));
        };

        let mut w = FragmentWriter::new(ast.start_byte(id), ast.end_byte(id));
        if f.is_async {
            w.text("async ");
        }
        w.text("function ");
        if named && let Some(name) = f.name {
            w.text(self.slice(ast, name));
        }
        w.text(format!("({})", self.typed_parameter_list(ast, f.parameters)));
        if self.ctx.output_types
            && let Some(return_type) = f.return_type
        {
            w.text(self.slice(ast, return_type));
        }
        if let Some(body) = f.body {
            w.nested(self.section(ast, body, ind + 1)?);
        }
        Ok(w.finish())
    }

    fn arrow_function(&self, ast: &Ast, id: NodeId, ind: usize) -> Result<Fragment> {
        let NodeKind::ArrowFunction(f) = ast.kind(id) else {
            return Err(Error::assertion("arrow_function on a wrong node kind"));
        };

        let mut w = FragmentWriter::new(ast.start_byte(id), ast.end_byte(id));
        if f.is_async {
            w.text("async ");
        }
        w.text(format!("({})", self.typed_parameter_list(ast, f.parameters)));
        if self.ctx.output_types
            && let Some(return_type) = f.return_type
        {
            w.text(self.slice(ast, return_type));
        }
        w.text(" => ");
        if let Some(body) = f.body.or(f.expression) {
            w.nested(self.section(ast, body, ind + 1)?);
        }
        Ok(w.finish())
    }

    /// Parameter list text, with type annotations kept only under
    /// `outputTypes`.
    fn typed_parameter_list(&self, ast: &Ast, list: Option<NodeId>) -> String {
        let Some(list) = list else { return String::new() };
        let NodeKind::ParameterList { parameters } = ast.kind(list) else { return String::new() };
        parameters
            .iter()
            .filter_map(|&p| match ast.kind(p) {
                NodeKind::Parameter { identifier, type_annotation, .. } => {
                    let mut text = self.slice(ast, *identifier).to_string();
                    if self.ctx.output_types
                        && let Some(t) = type_annotation
                    {
                        text.push_str(self.slice(ast, *t));
                    }
                    Some(text)
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

// ============================================================================
// TAGGED STRING CANONICALIZATION
// ============================================================================

/// Canonicalize a tagged string payload: `\s` becomes a space, runs of
/// whitespace collapse, and escapes survive doubled where the runtime needs
/// them. `raw` still carries its surrounding quotes.
fn tagged_value(raw: &str) -> String {
    if raw.len() < 2 {
        return String::new();
    }
    let inner = &raw[1..raw.len() - 1];

    #[derive(PartialEq)]
    enum State {
        Default,
        Space,
        Escape,
    }

    let mut value = String::new();
    if inner.is_empty() {
        return value;
    }

    let mut state = State::Space;
    if inner.starts_with(' ') {
        value.push(' ');
    }

    for c in inner.chars() {
        match c {
            '\n' | '\t' => match state {
                State::Default => {
                    value.push(' ');
                    state = State::Space;
                }
                State::Escape => {
                    value.push_str("\\\\");
                    state = State::Space;
                }
                State::Space => {}
            },
            '\r' => {
                if state == State::Escape {
                    value.push('\\');
                    state = State::Default;
                }
            }
            ' ' => match state {
                State::Default => {
                    value.push(' ');
                    state = State::Space;
                }
                State::Escape => {
                    value.push('\\');
                    state = State::Space;
                }
                State::Space => {}
            },
            '\\' => {
                if state == State::Escape {
                    value.push_str("\\\\");
                    state = State::Default;
                } else {
                    state = State::Escape;
                }
            }
            's' => {
                if state == State::Escape {
                    value.push(' ');
                    state = State::Default;
                } else {
                    value.push('s');
                    state = State::Default;
                }
            }
            other => {
                if state == State::Escape {
                    value.push('\\');
                }
                value.push(other);
                state = State::Default;
            }
        }
    }
    value
}

/// Triple-tagged payloads keep their inner lines: the outer newlines are
/// stripped and embedded control characters become explicit escapes. `raw`
/// still carries its three-quote delimiters.
fn tripple_tagged_value(raw: &str) -> String {
    if raw.len() < 6 {
        return String::new();
    }
    let mut value = raw[3..raw.len() - 3].to_string();

    if let Some(start) = value.find('\n') {
        let end = value.rfind('\n').unwrap_or(start);
        value = if end > start + 1 { value[start + 1..end].to_string() } else { String::new() };
    }

    value.replace('\r', "").replace('\n', "\\n").replace('\t', "\\t")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_values_collapse_whitespace() {
        assert_eq!(tagged_value("'a  b'"), "a b");
        assert_eq!(tagged_value("'a\n  b'"), "a b");
        assert_eq!(tagged_value("' leading'"), " leading");
        assert_eq!(tagged_value("''"), "");
    }

    #[test]
    fn tagged_escape_s_becomes_a_space() {
        assert_eq!(tagged_value(r"'a\sb'"), "a b");
        assert_eq!(tagged_value(r"'a\\b'"), r"a\\b");
    }

    #[test]
    fn tripple_tagged_values_keep_inner_lines() {
        assert_eq!(tripple_tagged_value("```\nline1\nline2\n```"), "line1\\nline2");
        assert_eq!(tripple_tagged_value("```one```"), "one");
        assert_eq!(tripple_tagged_value("```\n\n```"), "");
    }
}
