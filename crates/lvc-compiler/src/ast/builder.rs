//! AST builder - constructs the arena AST from a concrete syntax tree.
//!
//! A single recursive walk over the CST. Each recognized node kind gets a
//! typed arena node with its fields filled from named-field lookups;
//! unrecognized kinds are walked through transparently so nested recognized
//! constructs still surface. Scope attachment (declared/used identifier
//! lists) and binding capture happen during the same walk.
//!
//! Failures are fatal for the file: a CST `ERROR` node or a missing required
//! field raises a syntax error carrying the precise source location.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;

use lvc_core::{Error, Result, SourceLocation, SourceRange};

use crate::cst::CstNode;

use super::node::{
    AccessorKind, Ast, ComponentNode, ConstructorNode, DeclOrigin, DeclarationForm, FunctionNode,
    ImportNode, ImportType, JsImportNode, ListenerNode, NewComponentNode, NodeId, NodeKind,
    PropertyAssignmentNode, PropertyNode, TryCatchNode, TypedMethodNode, VariableDeclarationNode,
};

/// Names that are always considered declared.
static KEYWORDS: Lazy<BTreeSet<&'static str>> =
    Lazy::new(|| ["this", "parent", "import"].into_iter().collect());

pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(name)
}

/// Builds the AST of one source file.
pub struct AstBuilder<'s> {
    source: &'s str,
    file_path: String,
}

impl<'s> AstBuilder<'s> {
    pub fn new(source: &'s str, file_path: impl Into<String>) -> Self {
        Self { source, file_path: file_path.into() }
    }

    /// Walk the CST rooted at `root` into a fresh arena. `file_name` is the
    /// component name the file exports under when a declaration is named
    /// `default`.
    pub fn build<N: CstNode>(&self, file_name: &str, root: &N) -> Result<Ast> {
        let ast = Ast::new(file_name, self.file_path.clone(), range_of(root));
        let mut walker = Walker { source: self.source, file_path: &self.file_path, ast };
        let program = walker.ast.root();
        for child in root.children() {
            walker.visit(program, &child)?;
        }
        Ok(walker.ast)
    }
}

fn range_of<N: CstNode>(node: &N) -> SourceRange {
    SourceRange::new(node.start_point(), node.end_point())
}

/// True when `name` needs no declaration: keyword or implicit type.
pub fn is_predeclared(name: &str, implicit_types: &[String]) -> bool {
    is_keyword(name) || implicit_types.iter().any(|t| t == name)
}

struct Walker<'s> {
    source: &'s str,
    file_path: &'s str,
    ast: Ast,
}

impl<'s> Walker<'s> {
    // ------------------------------------------------------------------------
    // Error plumbing
    // ------------------------------------------------------------------------

    fn location<N: CstNode>(&self, node: &N) -> SourceLocation {
        SourceLocation::new(range_of(node), self.file_path)
    }

    fn syntax_error<N: CstNode>(&self, node: &N, message: impl Into<String>) -> Error {
        Error::syntax(message, self.location(node))
    }

    fn assert_not_error<N: CstNode>(&self, node: &N, message: &str) -> Result<()> {
        if node.is_error() {
            return Err(self.syntax_error(node, message));
        }
        Ok(())
    }

    fn required_field<N: CstNode>(&self, node: &N, field: &str, message: &str) -> Result<N> {
        let child = node
            .child_by_field(field)
            .ok_or_else(|| self.syntax_error(node, message))?;
        self.assert_not_error(&child, message)?;
        Ok(child)
    }

    // ------------------------------------------------------------------------
    // Arena helpers
    // ------------------------------------------------------------------------

    fn add<N: CstNode>(&mut self, parent: NodeId, node: &N, kind: NodeKind) -> NodeId {
        self.ast.add_node(parent, range_of(node), kind)
    }

    fn add_identifier<N: CstNode>(&mut self, parent: NodeId, node: &N) -> NodeId {
        self.add(parent, node, NodeKind::Identifier)
    }

    fn slice(&self, id: NodeId) -> &str {
        self.ast.slice(self.source, id)
    }

    /// Push `id` onto one of the member lists of the component-shaped node
    /// `target` (a component declaration or a new-component expression).
    fn with_component<F, G>(&mut self, target: NodeId, decl: F, expr: G) -> bool
    where
        F: FnOnce(&mut ComponentNode),
        G: FnOnce(&mut NewComponentNode),
    {
        match &mut self.ast.node_mut(target).kind {
            NodeKind::ComponentDeclaration(c) => {
                decl(c);
                true
            }
            NodeKind::NewComponentExpression(n) => {
                expr(n);
                true
            }
            _ => false,
        }
    }

    /// The component-shaped grandparent of a body member, if any.
    fn body_owner(&self, parent: NodeId) -> Option<NodeId> {
        let owner = self.ast.parent(parent)?;
        match self.ast.kind(owner) {
            NodeKind::ComponentDeclaration(_) | NodeKind::NewComponentExpression(_) => Some(owner),
            _ => None,
        }
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    fn visit<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<Option<NodeId>> {
        let recognized = self.visit_recognized(parent, node)?;
        match recognized {
            Some(id) => {
                if parent == self.ast.root() {
                    self.register_program_child(node, id)?;
                }
                Ok(Some(id))
            }
            None => {
                self.visit_children(parent, node)?;
                Ok(None)
            }
        }
    }

    fn visit_children<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<()> {
        for child in node.children() {
            self.visit(parent, &child)?;
        }
        Ok(())
    }

    fn visit_recognized<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<Option<NodeId>> {
        let id = match node.kind() {
            "import_statement" => Some(self.visit_import(parent, node)?),
            "js_import_statement" => Some(self.visit_js_import(parent, node)?),
            "identifier" | "this" => Some(self.visit_identifier(parent, node)?),
            "property_identifier" => Some(self.add_identifier(parent, node)),
            "constructor_definition" => Some(self.visit_constructor_definition(parent, node)?),
            "component" | "component_declaration" => {
                Some(self.visit_component_declaration(parent, node)?)
            }
            "component_instance_statement" => {
                Some(self.visit_component_instance_statement(parent, node)?)
            }
            "new_component_expression" | "nested_new_component_expression" => {
                Some(self.visit_new_component_expression(parent, node)?)
            }
            "constructor_initializer" => Some(self.visit_constructor_initializer(parent, node)?),
            "arrow_function" => Some(self.visit_arrow_function(parent, node)?),
            "component_body" | "new_component_body" => {
                Some(self.visit_component_body(parent, node)?)
            }
            "class_declaration" => Some(self.visit_class_declaration(parent, node)?),
            "property_declaration" => Some(self.visit_property_declaration(parent, node)?),
            "static_property_declaration" => {
                Some(self.visit_static_property_declaration(parent, node)?)
            }
            "member_expression" => Some(self.visit_member_expression(parent, node)?),
            "subscript_expression" => {
                let id = self.add(parent, node, NodeKind::SubscriptExpression);
                self.visit_children(id, node)?;
                Some(id)
            }
            "identifier_property_assignment" => self.visit_identifier_assignment(parent, node)?,
            "property_assignment" => Some(self.visit_property_assignment(parent, node)?),
            "event_declaration" => Some(self.visit_event_declaration(parent, node)?),
            "listener_declaration" => Some(self.visit_listener_declaration(parent, node)?),
            "method_definition" => Some(self.visit_method_definition(parent, node)?),
            "typed_method_declaration" => Some(self.visit_typed_method_declaration(parent, node)?),
            "property_accessor_declaration" => {
                Some(self.visit_property_accessor_declaration(parent, node)?)
            }
            "function_declaration" => Some(self.visit_function_declaration(parent, node)?),
            "function_expression" => Some(self.visit_function(parent, node)?),
            "number" => Some(self.add(parent, node, NodeKind::Number)),
            "string" => Some(self.add(parent, node, NodeKind::StringLiteral)),
            "expression_statement" => {
                let id = self.add(parent, node, NodeKind::ExpressionStatement);
                self.visit_children(id, node)?;
                Some(id)
            }
            "assignment_expression" => Some(self.visit_assignment_expression(parent, node)?),
            "call_expression" => Some(self.visit_call_expression(parent, node)?),
            "new_tagged_component_expression" => {
                Some(self.visit_tagged_component(parent, node, false)?)
            }
            "new_tripple_tagged_component_expression" => {
                Some(self.visit_tagged_component(parent, node, true)?)
            }
            "tagged_type_string" => Some(self.add(parent, node, NodeKind::TaggedString)),
            "tripple_tagged_type_string" => Some(self.add(parent, node, NodeKind::TrippleTaggedString)),
            "variable_declaration" => {
                Some(self.visit_declaration_form(parent, node, DeclarationForm::Var)?)
            }
            "lexical_declaration" => {
                let form = match node.child_by_field("kind") {
                    Some(k) if k.kind() == "const" => DeclarationForm::Const,
                    _ => DeclarationForm::Let,
                };
                Some(self.visit_declaration_form(parent, node, form)?)
            }
            "array_pattern" | "object_pattern" => {
                self.visit_destructuring_pattern(parent, node)?;
                None
            }
            "new_expression" => Some(self.visit_new_expression(parent, node)?),
            "return_statement" => {
                let id = self.add(parent, node, NodeKind::ReturnStatement);
                self.visit_children(id, node)?;
                Some(id)
            }
            "object" => {
                let id = self.add(parent, node, NodeKind::Object);
                self.visit_children(id, node)?;
                Some(id)
            }
            "try_statement" => Some(self.visit_try_catch(parent, node)?),
            "ERROR" => return Err(self.syntax_error(node, "Unexpected token.")),
            _ => None,
        };
        Ok(id)
    }

    fn register_program_child<N: CstNode>(&mut self, node: &N, id: NodeId) -> Result<()> {
        let kind_name = self.ast.kind(id).name();
        match self.ast.kind(id) {
            NodeKind::Import(_) => self.ast.program_mut().imports.push(id),
            NodeKind::JsImport(_) => self.ast.program_mut().js_imports.push(id),
            NodeKind::ComponentDeclaration(_) | NodeKind::ComponentInstanceStatement { .. } => {
                self.ast.program_mut().exports.push(id)
            }
            _ => {
                return Err(self.syntax_error(
                    node,
                    format!("Unexpected expression in file root of type '{}'", kind_name),
                ));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------------

    fn visit_import<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::Import(ImportNode::default()));
        for child in node.children() {
            self.assert_not_error(&child, "Import segment error.")?;
            match child.kind() {
                "import_as" => {
                    if let Some(alias) = child.child(1) {
                        let alias_id = self.add_identifier(id, &alias);
                        if let NodeKind::Import(imp) = &mut self.ast.node_mut(id).kind {
                            imp.alias = Some(alias_id);
                        }
                    }
                }
                "import_path" => {
                    let is_relative = child.child_by_field("relative").is_some();
                    let mut segments = Vec::new();
                    let mut has_scope = false;
                    for seg in child.children() {
                        match seg.kind() {
                            "import_path_segment" => {
                                segments.push(self.add(id, &seg, NodeKind::ImportPathSegment));
                            }
                            "import_path_scope_segment" => {
                                has_scope = true;
                                segments.push(self.add(id, &seg, NodeKind::ImportPathSegment));
                            }
                            _ => {}
                        }
                    }
                    if let NodeKind::Import(imp) = &mut self.ast.node_mut(id).kind {
                        imp.is_relative = is_relative;
                        imp.has_scope_segment = has_scope;
                        imp.segments = segments;
                    }
                }
                _ => {}
            }
        }
        Ok(id)
    }

    fn visit_js_import<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::JsImport(JsImportNode::default()));
        for child in node.children() {
            match child.kind() {
                "identifier" => {
                    let name = self.add_identifier(id, &child);
                    self.ast.declare(parent, name, DeclOrigin::Local);
                    if let NodeKind::JsImport(imp) = &mut self.ast.node_mut(id).kind {
                        imp.names.push(name);
                    }
                }
                "string" => {
                    let path = self.add(id, &child, NodeKind::StringLiteral);
                    if let NodeKind::JsImport(imp) = &mut self.ast.node_mut(id).kind {
                        imp.path = Some(path);
                    }
                }
                "{" | "}" => {
                    if let NodeKind::JsImport(imp) = &mut self.ast.node_mut(id).kind {
                        imp.is_object_import = true;
                    }
                }
                _ => {}
            }
        }
        Ok(id)
    }

    // ------------------------------------------------------------------------
    // Identifiers and expressions
    // ------------------------------------------------------------------------

    fn visit_identifier<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add_identifier(parent, node);
        self.ast.mark_used(parent, id);
        self.capture_binding(id, parent, vec![id]);
        Ok(id)
    }

    fn visit_member_expression<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::MemberExpression);
        for child in node.children() {
            if child.kind() == "import" {
                // `import.meta`-style chains surface the keyword as a plain
                // identifier segment.
                self.add_identifier(id, &child);
            } else {
                self.visit(id, &child)?;
            }
        }

        // For call targets like `a.b.c()` the reactive read is the object
        // chain `a.b`, not the method reference.
        let mut capture_from = id;
        if matches!(self.ast.kind(parent), NodeKind::CallExpression { .. }) {
            match self.ast.children(id).first().copied() {
                Some(first) if matches!(self.ast.kind(first), NodeKind::MemberExpression) => {
                    capture_from = first;
                }
                _ => return Ok(id),
            }
        }

        match self.ast.children(capture_from).first().copied() {
            Some(first)
                if matches!(
                    self.ast.kind(first),
                    NodeKind::Identifier | NodeKind::MemberExpression
                ) => {}
            _ => return Ok(id),
        }
        let chain = self.ast.identifier_chain(capture_from);
        self.capture_binding(capture_from, parent, chain);
        Ok(id)
    }

    /// Walk toward the root from the visit parent looking for the property
    /// the captured chain belongs to; give up at any binding boundary.
    fn capture_binding(&mut self, node: NodeId, start: NodeId, chain: Vec<NodeId>) {
        if chain.is_empty() {
            return;
        }
        let mut prev = node;
        let mut current = Some(start);
        while let Some(p) = current {
            match self.ast.kind(p) {
                NodeKind::MemberExpression
                | NodeKind::Function(_)
                | NodeKind::FunctionDeclaration(_)
                | NodeKind::ArrowFunction(_)
                | NodeKind::ClassDeclaration
                | NodeKind::NewComponentExpression(_)
                | NodeKind::ComponentDeclaration(_)
                | NodeKind::ListenerDeclaration(_) => return,
                NodeKind::AssignmentExpression { left, .. } if *left == Some(prev) => return,
                NodeKind::PropertyDeclaration(_) | NodeKind::PropertyAssignment(_) => {
                    self.ast.bindings_mut(p).add_chain(node, chain);
                    return;
                }
                _ => {}
            }
            prev = p;
            current = self.ast.parent(p);
        }
    }

    fn visit_assignment_expression<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(
            parent,
            node,
            NodeKind::AssignmentExpression { left: None, right: None },
        );
        // The left side must be known before its subtree is visited so that
        // binding capture can recognize write positions.
        if let Some(left) = node.child_by_field("left") {
            let left_id = self.add(id, &left, NodeKind::Expression);
            let right = node.child_by_field("right");
            if let NodeKind::AssignmentExpression { left: l, .. } = &mut self.ast.node_mut(id).kind {
                *l = Some(left_id);
            }
            self.visit_children(left_id, &left)?;
            if let Some(right) = right {
                let right_id = match self.visit(id, &right)? {
                    Some(r) => r,
                    None => {
                        let r = self.add(id, &right, NodeKind::Expression);
                        self.visit_children(r, &right)?;
                        r
                    }
                };
                if let NodeKind::AssignmentExpression { right: r, .. } =
                    &mut self.ast.node_mut(id).kind
                {
                    *r = Some(right_id);
                }
            }
        } else {
            self.visit_children(id, node)?;
        }
        Ok(id)
    }

    fn visit_call_expression<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::CallExpression { arguments: None, is_super: false });
        for child in node.children() {
            match child.kind() {
                "arguments" => {
                    let args = self.add(id, &child, NodeKind::Arguments);
                    self.visit_children(args, &child)?;
                    if let NodeKind::CallExpression { arguments, .. } = &mut self.ast.node_mut(id).kind {
                        *arguments = Some(args);
                    }
                }
                "super" => {
                    if let NodeKind::CallExpression { is_super, .. } = &mut self.ast.node_mut(id).kind {
                        *is_super = true;
                    }
                    // A super() call directly in a constructor body is the
                    // constructor's super-call reference.
                    if let Some(gp) = self.ast.parent(parent)
                        && let Some(ggp) = self.ast.parent(gp)
                        && let NodeKind::ConstructorDefinition(c) = &mut self.ast.node_mut(ggp).kind
                    {
                        c.super_call = Some(id);
                    }
                }
                _ => {
                    self.visit(id, &child)?;
                }
            }
        }
        Ok(id)
    }

    fn visit_new_expression<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::NewExpression);
        for child in node.children() {
            if child.kind() == "identifier" {
                let ident = self.add_identifier(id, &child);
                self.ast.mark_used(id, ident);
            } else {
                self.visit(id, &child)?;
            }
        }
        Ok(id)
    }

    // ------------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------------

    fn visit_component_declaration<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::ComponentDeclaration(ComponentNode::default()));

        if let Some(name) = node.child_by_field("name") {
            let name_id = self.add_identifier(id, &name);
            if let NodeKind::ComponentDeclaration(c) = &mut self.ast.node_mut(id).kind {
                c.name = Some(name_id);
            }
            self.ast.declare(parent, name_id, DeclOrigin::Local);
        }

        if let Some(heritage) = node.child_by_field("heritage")
            && matches!(heritage.kind(), "component_heritage" | "component_short_heritage")
        {
            let mut segments = Vec::new();
            for seg in heritage.children() {
                if seg.kind() == "identifier" {
                    segments.push(self.add_identifier(id, &seg));
                }
            }
            if let Some(&first) = segments.first() {
                self.ast.mark_used(id, first);
            }
            if let NodeKind::ComponentDeclaration(c) = &mut self.ast.node_mut(id).kind {
                c.heritage = segments;
            }
        }

        if let Some(comp_id) = node.child_by_field("id")
            && comp_id.named_child_count() > 0
            && let Some(id_child) = comp_id.child(1)
        {
            let id_ident = self.add_identifier(id, &id_child);
            if let NodeKind::ComponentDeclaration(c) = &mut self.ast.node_mut(id).kind {
                c.id = Some(id_ident);
            }
            self.ast.declare(parent, id_ident, DeclOrigin::Id);
        }

        let body = self.required_field(node, "body", "Component declaration body is null.")?;
        let body_id = self.add(id, &body, NodeKind::ComponentBody { constructor: None });
        if let NodeKind::ComponentDeclaration(c) = &mut self.ast.node_mut(id).kind {
            c.body = Some(body_id);
        }
        self.visit_children(body_id, &body)?;

        for child in node.children() {
            self.assert_not_error(&child, "Unexpected component syntax.")?;
        }
        Ok(id)
    }

    fn visit_component_body<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::ComponentBody { constructor: None });
        self.visit_children(id, node)?;
        Ok(id)
    }

    fn visit_component_instance_statement<N: CstNode>(
        &mut self,
        parent: NodeId,
        node: &N,
    ) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::ComponentInstanceStatement { name: None });
        for child in node.children() {
            self.assert_not_error(&child, "Unexpected token.")?;
            match child.kind() {
                "component_instance" => {
                    if let Some(name) = child.child(1)
                        && name.kind() == "identifier"
                    {
                        let name_id = self.add_identifier(id, &name);
                        if let NodeKind::ComponentInstanceStatement { name } =
                            &mut self.ast.node_mut(id).kind
                        {
                            *name = Some(name_id);
                        }
                        self.ast.declare(parent, name_id, DeclOrigin::Local);
                    }
                }
                "new_component_expression" => {
                    self.visit_new_component_expression(id, &child)?;
                }
                _ => {}
            }
        }
        Ok(id)
    }

    fn visit_new_component_expression<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        // Root expressions live at file top level (through an instance
        // statement) or inside a block scope; they own their `ids` table.
        let is_root = match self.ast.kind(parent) {
            NodeKind::ComponentInstanceStatement { .. } => {
                matches!(
                    self.ast.parent(parent).map(|p| self.ast.kind(p)),
                    Some(NodeKind::Program(_))
                )
            }
            _ => matches!(
                self.ast.nearest_scope(parent).map(|s| self.ast.kind(s)),
                Some(NodeKind::JsBlock)
            ),
        };

        let id = self.add(
            parent,
            node,
            NodeKind::NewComponentExpression(NewComponentNode { is_root, ..NewComponentNode::default() }),
        );

        for child in node.children() {
            match child.kind() {
                "identifier" => {
                    let ident = self.add_identifier(id, &child);
                    let first = {
                        let NodeKind::NewComponentExpression(n) = &mut self.ast.node_mut(id).kind
                        else {
                            unreachable!()
                        };
                        n.name.push(ident);
                        n.name.len() == 1
                    };
                    if first {
                        self.ast.mark_used(id, ident);
                    }
                }
                "nested_identifier" => {
                    let segments = self.nested_identifier(id, &child)?;
                    if let Some(&first) = segments.first() {
                        self.ast.mark_used(id, first);
                    }
                    if let NodeKind::NewComponentExpression(n) = &mut self.ast.node_mut(id).kind {
                        n.name = segments;
                    }
                }
                "new_component_body" => {
                    let body = self.add(id, &child, NodeKind::ComponentBody { constructor: None });
                    if let NodeKind::NewComponentExpression(n) = &mut self.ast.node_mut(id).kind {
                        n.body = Some(body);
                    }
                    self.visit_children(body, &child)?;
                }
                "arguments" => {
                    let args = self.add(id, &child, NodeKind::Arguments);
                    self.visit_children(args, &child)?;
                    if let NodeKind::NewComponentExpression(n) = &mut self.ast.node_mut(id).kind {
                        n.arguments = Some(args);
                    }
                }
                "component_identifier" => {
                    if let Some(id_child) = child.child(1)
                        && id_child.kind() == "identifier"
                    {
                        let ident = self.add_identifier(id, &id_child);
                        if let NodeKind::NewComponentExpression(n) = &mut self.ast.node_mut(id).kind {
                            n.id = Some(ident);
                        }
                    }
                }
                _ => {}
            }
        }

        // Publish a declared id to the enclosing component or root expression
        // so sibling expressions can reference the instance.
        let own_id = match self.ast.kind(id) {
            NodeKind::NewComponentExpression(n) if !n.is_root => n.id,
            _ => None,
        };
        if let Some(own_id) = own_id {
            let mut current = Some(parent);
            while let Some(p) = current {
                match self.ast.kind(p) {
                    NodeKind::ComponentBody { .. } => {
                        if let Some(owner) = self.ast.parent(p)
                            && matches!(self.ast.kind(owner), NodeKind::ComponentDeclaration(_))
                        {
                            if let NodeKind::ComponentDeclaration(c) = &mut self.ast.node_mut(owner).kind {
                                c.id_components.push(id);
                            }
                            self.ast.declare(p, own_id, DeclOrigin::Id);
                            break;
                        }
                    }
                    NodeKind::NewComponentExpression(n) if n.is_root => {
                        if let NodeKind::NewComponentExpression(n) = &mut self.ast.node_mut(p).kind {
                            n.id_components.push(id);
                        }
                        self.ast.declare(p, own_id, DeclOrigin::Id);
                        break;
                    }
                    _ => {}
                }
                current = self.ast.parent(p);
            }
        }

        // Nested children of a component body become default children.
        if matches!(self.ast.kind(parent), NodeKind::ComponentBody { .. })
            && let Some(owner) = self.ast.parent(parent)
        {
            self.with_component(
                owner,
                |c| c.default_children.push(id),
                |n| n.default_children.push(id),
            );
        }

        Ok(id)
    }

    /// Collect the identifier segments of a dotted name, creating one
    /// `Identifier` node per segment under `parent`.
    fn nested_identifier<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<Vec<NodeId>> {
        let mut result = Vec::new();
        match node.kind() {
            "identifier" => result.push(self.add_identifier(parent, node)),
            "nested_identifier" | "member_expression" => {
                for child in node.children() {
                    self.assert_not_error(&child, "Expected identifier.")?;
                    match child.kind() {
                        "identifier" | "property_identifier" => {
                            result.push(self.add_identifier(parent, &child));
                        }
                        "nested_identifier" | "member_expression" => {
                            result.extend(self.nested_identifier(parent, &child)?);
                        }
                        "." => {}
                        _ => return Err(self.syntax_error(&child, "Expected identifier.")),
                    }
                }
            }
            _ => {}
        }
        Ok(result)
    }

    fn visit_tagged_component<N: CstNode>(
        &mut self,
        parent: NodeId,
        node: &N,
        tripple: bool,
    ) -> Result<NodeId> {
        let kind = if tripple {
            NodeKind::NewTrippleTaggedComponentExpression
        } else {
            NodeKind::NewTaggedComponentExpression
        };
        let id = self.add(parent, node, kind);
        self.visit_children(id, node)?;

        if matches!(self.ast.kind(parent), NodeKind::ComponentBody { .. })
            && let Some(owner) = self.ast.parent(parent)
        {
            self.with_component(
                owner,
                |c| c.default_children.push(id),
                |n| n.default_children.push(id),
            );
        }
        Ok(id)
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    fn visit_property_declaration<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::PropertyDeclaration(PropertyNode {
            is_binding_assignment: true,
            ..PropertyNode::default()
        }));

        let name = self.required_field(node, "name", "Property name is null.")?;
        let name_id = self.add_identifier(id, &name);
        if let NodeKind::PropertyDeclaration(p) = &mut self.ast.node_mut(id).kind {
            p.name = Some(name_id);
        }
        if let Some(type_node) = node.child_by_field("type") {
            let type_id = self.add(id, &type_node, NodeKind::TypeAnnotation);
            if let NodeKind::PropertyDeclaration(p) = &mut self.ast.node_mut(id).kind {
                p.type_annotation = Some(type_id);
            }
        }

        for child in node.children() {
            match child.kind() {
                "property_assignment_expression" => {
                    let expr = self.add(id, &child, NodeKind::BindableExpression);
                    if let NodeKind::PropertyDeclaration(p) = &mut self.ast.node_mut(id).kind {
                        p.expression = Some(expr);
                    }
                    self.visit_children(expr, &child)?;
                }
                "statement_block" => {
                    let block = self.add(id, &child, NodeKind::JsBlock);
                    if let NodeKind::PropertyDeclaration(p) = &mut self.ast.node_mut(id).kind {
                        p.statement_block = Some(block);
                    }
                    self.visit_children(block, &child)?;
                }
                "=" => {
                    if let NodeKind::PropertyDeclaration(p) = &mut self.ast.node_mut(id).kind {
                        p.is_binding_assignment = false;
                    }
                }
                _ => {}
            }
        }

        if let Some(owner) = self.body_owner(parent) {
            self.with_component(owner, |c| c.properties.push(id), |n| n.properties.push(id));
        }
        // The property name is visible to sibling binding expressions.
        self.ast.declare(parent, name_id, DeclOrigin::Property);
        Ok(id)
    }

    fn visit_static_property_declaration<N: CstNode>(
        &mut self,
        parent: NodeId,
        node: &N,
    ) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::StaticPropertyDeclaration(PropertyNode::default()));

        let name = self.required_field(node, "name", "Property name is null.")?;
        let name_id = self.add_identifier(id, &name);
        if let NodeKind::StaticPropertyDeclaration(p) = &mut self.ast.node_mut(id).kind {
            p.name = Some(name_id);
        }
        if let Some(type_node) = node.child_by_field("type") {
            let type_id = self.add(id, &type_node, NodeKind::TypeAnnotation);
            if let NodeKind::StaticPropertyDeclaration(p) = &mut self.ast.node_mut(id).kind {
                p.type_annotation = Some(type_id);
            }
        }

        for child in node.children() {
            if child.kind() == "property_expression_initializer" && child.child_count() == 2 {
                if let Some(init) = child.child(1) {
                    let expr = self.add(id, &init, NodeKind::BindableExpression);
                    if let NodeKind::StaticPropertyDeclaration(p) = &mut self.ast.node_mut(id).kind {
                        p.expression = Some(expr);
                    }
                    self.visit_children(expr, &init)?;
                }
            }
        }

        if let Some(owner) = self.body_owner(parent) {
            match self.ast.kind(owner) {
                NodeKind::ComponentDeclaration(c) => {
                    if c.name.is_none() {
                        return Err(self.syntax_error(
                            node,
                            "Cannot declare static members for an anonymous component.",
                        ));
                    }
                    if let NodeKind::ComponentDeclaration(c) = &mut self.ast.node_mut(owner).kind {
                        c.static_properties.push(id);
                    }
                }
                NodeKind::NewComponentExpression(_) => {
                    return Err(
                        self.syntax_error(node, "Cannot declare static members on a new expression.")
                    );
                }
                _ => {}
            }
        }
        Ok(id)
    }

    fn visit_property_assignment<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::PropertyAssignment(PropertyAssignmentNode {
            is_binding_assignment: true,
            ..PropertyAssignmentNode::default()
        }));

        let name = self.required_field(node, "name", "Failed to find property name.")?;
        let property = self.nested_identifier(id, &name)?;
        if let NodeKind::PropertyAssignment(p) = &mut self.ast.node_mut(id).kind {
            p.property = property;
        }

        for child in node.children() {
            match child.kind() {
                "property_assignment_expression" => {
                    let expr = self.add(id, &child, NodeKind::BindableExpression);
                    if let NodeKind::PropertyAssignment(p) = &mut self.ast.node_mut(id).kind {
                        p.expression = Some(expr);
                    }
                    self.visit_children(expr, &child)?;
                }
                "statement_block" => {
                    let block = self.add(id, &child, NodeKind::JsBlock);
                    if let NodeKind::PropertyAssignment(p) = &mut self.ast.node_mut(id).kind {
                        p.statement_block = Some(block);
                    }
                    self.visit_children(block, &child)?;
                }
                "=" => {
                    if let NodeKind::PropertyAssignment(p) = &mut self.ast.node_mut(id).kind {
                        p.is_binding_assignment = false;
                    }
                }
                _ => {}
            }
        }

        if let Some(owner) = self.body_owner(parent) {
            self.with_component(owner, |c| c.assignments.push(id), |n| n.assignments.push(id));
        }
        Ok(id)
    }

    /// `id: x` inside a component body assigns the id of the enclosing
    /// component or new-component expression and publishes it outward.
    fn visit_identifier_assignment<N: CstNode>(
        &mut self,
        parent: NodeId,
        node: &N,
    ) -> Result<Option<NodeId>> {
        let Some(owner) = self.ast.parent(parent) else {
            return Ok(None);
        };
        let Some(id_child) = node.child(2) else {
            return Ok(None);
        };

        match self.ast.kind(owner) {
            NodeKind::ComponentDeclaration(_) => {
                let ident = self.add_identifier(parent, &id_child);
                if let NodeKind::ComponentDeclaration(c) = &mut self.ast.node_mut(owner).kind {
                    c.id = Some(ident);
                }
                self.ast.declare(owner, ident, DeclOrigin::Id);
                Ok(Some(ident))
            }
            NodeKind::NewComponentExpression(_) => {
                let ident = self.add_identifier(parent, &id_child);
                if let NodeKind::NewComponentExpression(n) = &mut self.ast.node_mut(owner).kind {
                    n.id = Some(ident);
                }
                self.ast.declare(owner, ident, DeclOrigin::Id);
                Ok(Some(ident))
            }
            _ => Ok(None),
        }
    }

    // ------------------------------------------------------------------------
    // Events, listeners, methods, accessors
    // ------------------------------------------------------------------------

    fn visit_event_declaration<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::EventDeclaration { name: None, parameters: None });

        let name = self.required_field(node, "name", "Event name is null.")?;
        let name_id = self.add_identifier(id, &name);

        let parameters = self.required_field(node, "parameters", "Event parameters are null.")?;
        let params = self.scan_formal_type_parameters(id, &parameters, "Event parameter not declared properly.")?;

        if let NodeKind::EventDeclaration { name, parameters } = &mut self.ast.node_mut(id).kind {
            *name = Some(name_id);
            *parameters = Some(params);
        }

        if let Some(owner) = self.body_owner(parent) {
            self.with_component(owner, |c| c.events.push(id), |n| n.events.push(id));
        }
        Ok(id)
    }

    fn visit_listener_declaration<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::ListenerDeclaration(ListenerNode::default()));

        for child in node.children() {
            match child.kind() {
                "property_identifier" => {
                    let name = self.add_identifier(id, &child);
                    if let NodeKind::ListenerDeclaration(l) = &mut self.ast.node_mut(id).kind {
                        l.name = Some(name);
                    }
                }
                "async" => {
                    if let NodeKind::ListenerDeclaration(l) = &mut self.ast.node_mut(id).kind {
                        l.is_async = true;
                    }
                }
                "formal_parameters" => {
                    let params = self.scan_formal_parameters(id, &child)?;
                    if let NodeKind::ListenerDeclaration(l) = &mut self.ast.node_mut(id).kind {
                        l.parameters = Some(params);
                    }
                }
                _ => {}
            }
        }

        let body = self.required_field(node, "body", "Failed to find listener body.")?;
        if body.kind() == "statement_block" {
            let block = self.add(id, &body, NodeKind::JsBlock);
            if let NodeKind::ListenerDeclaration(l) = &mut self.ast.node_mut(id).kind {
                l.body = Some(block);
            }
            self.declare_parameters(id, Some(block));
            self.visit_children(block, &body)?;
        } else {
            let expr = self.add(id, &body, NodeKind::Expression);
            if let NodeKind::ListenerDeclaration(l) = &mut self.ast.node_mut(id).kind {
                l.body_expression = Some(expr);
            }
            self.declare_parameters(id, None);
            self.visit_children(expr, &body)?;
        }

        if let Some(owner) = self.body_owner(parent) {
            self.with_component(owner, |c| c.listeners.push(id), |n| n.listeners.push(id));
        }
        Ok(id)
    }

    fn visit_method_definition<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::MethodDefinition { name: None, parameters: None, body: None });
        for child in node.children() {
            match child.kind() {
                "property_identifier" => {
                    let name = self.add_identifier(id, &child);
                    if let NodeKind::MethodDefinition { name: n, .. } = &mut self.ast.node_mut(id).kind {
                        *n = Some(name);
                    }
                }
                "formal_parameters" => {
                    let params = self.scan_formal_parameters(id, &child)?;
                    if let NodeKind::MethodDefinition { parameters, .. } = &mut self.ast.node_mut(id).kind {
                        *parameters = Some(params);
                    }
                }
                "statement_block" => {
                    let block = self.add(id, &child, NodeKind::JsBlock);
                    if let NodeKind::MethodDefinition { body, .. } = &mut self.ast.node_mut(id).kind {
                        *body = Some(block);
                    }
                    self.visit_children(block, &child)?;
                }
                _ => {}
            }
        }
        Ok(id)
    }

    fn visit_typed_method_declaration<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::TypedMethod(TypedMethodNode::default()));

        let name = self.required_field(node, "name", "Function name is null.")?;
        let name_id = self.add_identifier(id, &name);

        let parameters = self.required_field(node, "parameters", "Function parameters are null.")?;
        let params = self.scan_formal_type_parameters(id, &parameters, "Function parameter not declared properly.")?;

        if let NodeKind::TypedMethod(m) = &mut self.ast.node_mut(id).kind {
            m.name = Some(name_id);
            m.parameters = Some(params);
        }

        let body = self.required_field(node, "body", "Function body is null.")?;
        let block = self.add(id, &body, NodeKind::JsBlock);
        if let NodeKind::TypedMethod(m) = &mut self.ast.node_mut(id).kind {
            m.body = Some(block);
        }
        self.declare_parameters(id, Some(block));
        self.visit_children(block, &body)?;

        for child in node.children() {
            match child.kind() {
                "static" => {
                    if let NodeKind::TypedMethod(m) = &mut self.ast.node_mut(id).kind {
                        m.is_static = true;
                    }
                }
                "async" => {
                    if let NodeKind::TypedMethod(m) = &mut self.ast.node_mut(id).kind {
                        m.is_async = true;
                    }
                }
                _ => {}
            }
        }

        if let Some(owner) = self.body_owner(parent) {
            self.with_component(owner, |c| c.methods.push(id), |n| n.methods.push(id));
        }
        Ok(id)
    }

    fn visit_property_accessor_declaration<N: CstNode>(
        &mut self,
        parent: NodeId,
        node: &N,
    ) -> Result<NodeId> {
        let mut kind = AccessorKind::Getter;
        for child in node.children() {
            match child.kind() {
                "get" => kind = AccessorKind::Getter,
                "set" => kind = AccessorKind::Setter,
                _ => {}
            }
        }

        let id = self.add(
            parent,
            node,
            NodeKind::PropertyAccessor(super::node::PropertyAccessorNode { kind, ..Default::default() }),
        );

        let name = self.required_field(node, "name", "Accessor name is null.")?;
        let name_id = self.add_identifier(id, &name);
        if let NodeKind::PropertyAccessor(a) = &mut self.ast.node_mut(id).kind {
            a.name = Some(name_id);
        }

        if kind == AccessorKind::Setter {
            let parameters = self.required_field(node, "parameters", "Set parameters are null.")?;
            let params = self.scan_formal_type_parameters(id, &parameters, "Set parameter not declared properly.")?;
            if let NodeKind::PropertyAccessor(a) = &mut self.ast.node_mut(id).kind {
                a.parameters = Some(params);
            }
        }

        let body = self.required_field(node, "body", "Accessor body is null.")?;
        let block = self.add(id, &body, NodeKind::JsBlock);
        if let NodeKind::PropertyAccessor(a) = &mut self.ast.node_mut(id).kind {
            a.body = Some(block);
        }
        self.declare_parameters(id, Some(block));
        self.visit_children(block, &body)?;

        if let Some(owner) = self.body_owner(parent)
            && let NodeKind::ComponentDeclaration(_) = self.ast.kind(owner)
            && let NodeKind::ComponentDeclaration(c) = &mut self.ast.node_mut(owner).kind
        {
            c.accessors.push(id);
        }
        Ok(id)
    }

    // ------------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------------

    fn visit_constructor_definition<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::ConstructorDefinition(ConstructorNode::default()));

        for child in node.children() {
            match child.kind() {
                "statement_block" => {
                    let block = self.add(id, &child, NodeKind::JsBlock);
                    if let NodeKind::ConstructorDefinition(c) = &mut self.ast.node_mut(id).kind {
                        c.body = Some(block);
                    }
                    self.declare_parameters(id, Some(block));
                    self.visit_children(block, &child)?;
                }
                "formal_type_parameters" => {
                    let params = self.scan_formal_type_parameters(id, &child, "Constructor parameter not declared properly.")?;
                    if let NodeKind::ConstructorDefinition(c) = &mut self.ast.node_mut(id).kind {
                        c.parameters = Some(params);
                    }
                }
                _ => {
                    self.visit(id, &child)?;
                }
            }
        }

        if let NodeKind::ComponentBody { constructor } = &mut self.ast.node_mut(parent).kind {
            *constructor = Some(id);
        }
        Ok(id)
    }

    fn visit_constructor_initializer<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::ConstructorInitializer { assignments: Vec::new() });

        // Must sit directly in the constructor body (expression statements
        // and blocks in between are allowed).
        let mut current = Some(parent);
        let constructor = loop {
            match current {
                Some(p) => match self.ast.kind(p) {
                    NodeKind::ExpressionStatement | NodeKind::JsBlock => current = self.ast.parent(p),
                    NodeKind::ConstructorDefinition(_) => break p,
                    _ => {
                        return Err(self.syntax_error(
                            node,
                            "Constructor initializer must be called directly from the constructor body.",
                        ));
                    }
                },
                None => {
                    return Err(self.syntax_error(
                        node,
                        "Constructor initializer must be called directly from the constructor body.",
                    ));
                }
            }
        };
        if let NodeKind::ConstructorDefinition(c) = &mut self.ast.node_mut(constructor).kind {
            c.initializer = Some(id);
        }

        for child in node.children() {
            self.assert_not_error(&child, "Constructor initializer not declared properly.")?;
            if child.kind() != "constructor_initializer_assignment" {
                continue;
            }
            let name = self.required_field(&child, "name", "Constructor initializer assignment name missing.")?;
            let value = self.required_field(&child, "value", "Constructor initializer assignment value not set.")?;

            let assignment = self.add(
                id,
                &child,
                NodeKind::ConstructorInitializerAssignment { name: None, expression: None },
            );
            let name_id = self.add_identifier(assignment, &name);
            let expr = self.add(assignment, &value, NodeKind::BindableExpression);
            if let NodeKind::ConstructorInitializerAssignment { name, expression } =
                &mut self.ast.node_mut(assignment).kind
            {
                *name = Some(name_id);
                *expression = Some(expr);
            }
            if let NodeKind::ConstructorInitializer { assignments } = &mut self.ast.node_mut(id).kind {
                assignments.push(assignment);
            }
            self.visit(expr, &value)?;
        }
        Ok(id)
    }

    // ------------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------------

    fn visit_function<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::Function(FunctionNode::default()));
        self.fill_function(id, node, false)?;
        Ok(id)
    }

    fn visit_function_declaration<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::FunctionDeclaration(FunctionNode::default()));

        let name = self.required_field(node, "name", "Function name is null.")?;
        let name_id = self.add_identifier(id, &name);
        self.with_function(id, |f| f.name = Some(name_id));
        self.ast.declare(parent, name_id, DeclOrigin::Local);

        self.fill_function(id, node, false)?;
        Ok(id)
    }

    fn visit_arrow_function<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::ArrowFunction(FunctionNode::default()));

        if let Some(parameters) = node.child_by_field("parameters") {
            let params = self.scan_formal_parameters(id, &parameters)?;
            self.with_function(id, |f| f.parameters = Some(params));
        } else if let Some(parameter) = node.child_by_field("parameter") {
            // Single-parameter shorthand: `x => …`.
            let list = self.add(id, &parameter, NodeKind::ParameterList { parameters: Vec::new() });
            let ident = self.add_identifier(list, &parameter);
            let param = self.ast.add_node(
                list,
                range_of(&parameter),
                NodeKind::Parameter { identifier: ident, type_annotation: None, is_optional: false },
            );
            if let NodeKind::ParameterList { parameters } = &mut self.ast.node_mut(list).kind {
                parameters.push(param);
            }
            self.with_function(id, |f| f.parameters = Some(list));
        }

        if let Some(return_type) = node.child_by_field("return_type") {
            let rt = self.add(id, &return_type, NodeKind::TypeAnnotation);
            self.with_function(id, |f| f.return_type = Some(rt));
        }
        for child in node.children() {
            if child.kind() == "async" {
                self.with_function(id, |f| f.is_async = true);
            }
        }

        if let Some(body) = node.child_by_field("body") {
            if body.kind() == "statement_block" {
                let block = self.add(id, &body, NodeKind::JsBlock);
                self.with_function(id, |f| f.body = Some(block));
                self.declare_parameters(id, Some(block));
                self.visit_children(block, &body)?;
            } else {
                self.declare_parameters(id, None);
                let expr = match self.visit_recognized(id, &body)? {
                    Some(e) => e,
                    None => {
                        let e = self.add(id, &body, NodeKind::Expression);
                        self.visit_children(e, &body)?;
                        e
                    }
                };
                self.with_function(id, |f| f.expression = Some(expr));
            }
        } else {
            self.declare_parameters(id, None);
        }
        Ok(id)
    }

    fn with_function(&mut self, id: NodeId, f: impl FnOnce(&mut FunctionNode)) {
        match &mut self.ast.node_mut(id).kind {
            NodeKind::Function(func)
            | NodeKind::FunctionDeclaration(func)
            | NodeKind::ArrowFunction(func) => f(func),
            _ => {}
        }
    }

    fn fill_function<N: CstNode>(&mut self, id: NodeId, node: &N, params_optional: bool) -> Result<()> {
        match node.child_by_field("parameters") {
            Some(parameters) => {
                let params = self.scan_formal_parameters(id, &parameters)?;
                self.with_function(id, |f| f.parameters = Some(params));
            }
            None if !params_optional => {
                return Err(self.syntax_error(node, "Function parameters are null."));
            }
            None => {}
        }

        if let Some(return_type) = node.child_by_field("return_type") {
            let rt = self.add(id, &return_type, NodeKind::TypeAnnotation);
            self.with_function(id, |f| f.return_type = Some(rt));
        }
        for child in node.children() {
            if child.kind() == "async" {
                self.with_function(id, |f| f.is_async = true);
            }
        }

        let body = self.required_field(node, "body", "Function body is null.")?;
        let block = self.add(id, &body, NodeKind::JsBlock);
        self.with_function(id, |f| f.body = Some(block));
        self.declare_parameters(id, Some(block));
        self.visit_children(block, &body)?;
        Ok(())
    }

    /// Declare the parameters of a callable into its body block, or into the
    /// nearest enclosing scope when there is no block.
    fn declare_parameters(&mut self, owner: NodeId, body: Option<NodeId>) {
        let params = self.parameter_identifiers(owner);
        let target = body.unwrap_or(owner);
        for ident in params {
            self.ast.declare(target, ident, DeclOrigin::Local);
        }
    }

    fn parameter_identifiers(&self, owner: NodeId) -> Vec<NodeId> {
        let list = match self.ast.kind(owner) {
            NodeKind::Function(f) | NodeKind::FunctionDeclaration(f) | NodeKind::ArrowFunction(f) => {
                f.parameters
            }
            NodeKind::ListenerDeclaration(l) => l.parameters,
            NodeKind::TypedMethod(m) => m.parameters,
            NodeKind::PropertyAccessor(a) => a.parameters,
            NodeKind::ConstructorDefinition(c) => c.parameters,
            _ => None,
        };
        let Some(list) = list else { return Vec::new() };
        let NodeKind::ParameterList { parameters } = self.ast.kind(list) else {
            return Vec::new();
        };
        parameters
            .iter()
            .filter_map(|&p| match self.ast.kind(p) {
                NodeKind::Parameter { identifier, .. } => Some(*identifier),
                _ => None,
            })
            .collect()
    }

    /// Plain (untyped) formal parameters: `(a, b = 1, c)`.
    fn scan_formal_parameters<N: CstNode>(&mut self, owner: NodeId, node: &N) -> Result<NodeId> {
        let list = self.add(owner, node, NodeKind::ParameterList { parameters: Vec::new() });
        for child in node.children() {
            self.assert_not_error(&child, "Function declaration not supported.")?;
            let (pattern, type_node, optional) = match child.kind() {
                "identifier" => (Some(child.clone()), None, false),
                "required_parameter" => (child.child_by_field("pattern"), child.child_by_field("type"), false),
                "optional_parameter" => (child.child_by_field("pattern"), child.child_by_field("type"), true),
                _ => continue,
            };
            let Some(pattern) = pattern else { continue };
            let ident = self.add_identifier(list, &pattern);
            let type_id = type_node.map(|t| self.add(list, &t, NodeKind::TypeAnnotation));
            let param = self.ast.add_node(
                list,
                range_of(&child),
                NodeKind::Parameter { identifier: ident, type_annotation: type_id, is_optional: optional },
            );
            if let NodeKind::ParameterList { parameters } = &mut self.ast.node_mut(list).kind {
                parameters.push(param);
            }
        }
        Ok(list)
    }

    /// Typed formal parameters: `(int a, string b)`.
    fn scan_formal_type_parameters<N: CstNode>(
        &mut self,
        owner: NodeId,
        node: &N,
        error: &str,
    ) -> Result<NodeId> {
        let list = self.add(owner, node, NodeKind::ParameterList { parameters: Vec::new() });
        for child in node.children() {
            self.assert_not_error(&child, error)?;
            if child.kind() != "formal_type_parameter" || child.child_count() == 0 {
                continue;
            }
            let Some(tp) = child.child(0) else { continue };
            let optional = match tp.kind() {
                "required_type_parameter" => false,
                "optional_type_parameter" => true,
                _ => continue,
            };
            let name = self.required_field(&tp, "name", "Parameter name is null.")?;
            let type_node = self.required_field(&tp, "type", "Parameter type is null.")?;

            let ident = self.add_identifier(list, &name);
            let type_id = self.add(list, &type_node, NodeKind::TypeAnnotation);
            let param = self.ast.add_node(
                list,
                range_of(&tp),
                NodeKind::Parameter { identifier: ident, type_annotation: Some(type_id), is_optional: optional },
            );
            if let NodeKind::ParameterList { parameters } = &mut self.ast.node_mut(list).kind {
                parameters.push(param);
            }
        }
        Ok(list)
    }

    // ------------------------------------------------------------------------
    // Declarations, patterns, classes, try/catch
    // ------------------------------------------------------------------------

    fn visit_declaration_form<N: CstNode>(
        &mut self,
        parent: NodeId,
        node: &N,
        form: DeclarationForm,
    ) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::VariableDeclaration(VariableDeclarationNode {
            form,
            ..VariableDeclarationNode::default()
        }));

        for child in node.children() {
            match child.kind() {
                "variable_declarator" => {
                    let declarator = self.add(id, &child, NodeKind::VariableDeclarator {
                        name: None,
                        type_annotation: None,
                        value: None,
                    });
                    if let NodeKind::VariableDeclaration(v) = &mut self.ast.node_mut(id).kind {
                        v.declarators.push(declarator);
                    }

                    if let Some(name) = child.child_by_field("name") {
                        let name_id = self.add_identifier(declarator, &name);
                        if let NodeKind::VariableDeclarator { name, .. } =
                            &mut self.ast.node_mut(declarator).kind
                        {
                            *name = Some(name_id);
                        }
                        self.ast.declare(declarator, name_id, DeclOrigin::Local);
                    }
                    if let Some(type_node) = child.child_by_field("type") {
                        let type_id = self.add(declarator, &type_node, NodeKind::TypeAnnotation);
                        if let NodeKind::VariableDeclarator { type_annotation, .. } =
                            &mut self.ast.node_mut(declarator).kind
                        {
                            *type_annotation = Some(type_id);
                        }
                    }
                    if let Some(value) = child.child_by_field("value") {
                        let expr = self.add(declarator, &value, NodeKind::Expression);
                        if let NodeKind::VariableDeclarator { value: v, .. } =
                            &mut self.ast.node_mut(declarator).kind
                        {
                            *v = Some(expr);
                        }
                        self.visit(expr, &value)?;
                    }
                }
                ";" => {
                    if let NodeKind::VariableDeclaration(v) = &mut self.ast.node_mut(id).kind {
                        v.has_semicolon = true;
                    }
                }
                _ => {
                    self.visit(id, &child)?;
                }
            }
        }
        Ok(id)
    }

    fn visit_destructuring_pattern<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<()> {
        for child in node.children() {
            match child.kind() {
                "identifier" | "shorthand_property_identifier" => {
                    let ident = self.add_identifier(parent, &child);
                    self.ast.declare(parent, ident, DeclOrigin::Local);
                }
                _ => self.visit_destructuring_pattern(parent, &child)?,
            }
        }
        Ok(())
    }

    fn visit_class_declaration<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::ClassDeclaration);
        self.visit_children(id, node)?;

        // The class name binds in the enclosing scope.
        let direct_identifiers: Vec<NodeId> = self
            .ast
            .children(id)
            .iter()
            .copied()
            .filter(|&c| matches!(self.ast.kind(c), NodeKind::Identifier))
            .collect();
        for ident in direct_identifiers {
            self.ast.declare(parent, ident, DeclOrigin::Local);
        }
        Ok(id)
    }

    fn visit_try_catch<N: CstNode>(&mut self, parent: NodeId, node: &N) -> Result<NodeId> {
        let id = self.add(parent, node, NodeKind::TryCatchBlock(TryCatchNode::default()));

        for child in node.children() {
            match child.kind() {
                "statement_block" => {
                    let block = self.add(id, &child, NodeKind::JsBlock);
                    if let NodeKind::TryCatchBlock(t) = &mut self.ast.node_mut(id).kind {
                        t.try_body = Some(block);
                    }
                    self.visit_children(block, &child)?;
                }
                "catch_clause" => {
                    let mut param = None;
                    if let Some(parameter) = child.child_by_field("parameter")
                        && parameter.kind() == "identifier"
                    {
                        let ident = self.add_identifier(id, &parameter);
                        let type_id = child
                            .child_by_field("type")
                            .map(|t| self.add(id, &t, NodeKind::TypeAnnotation));
                        let p = self.ast.add_node(
                            id,
                            range_of(&parameter),
                            NodeKind::Parameter { identifier: ident, type_annotation: type_id, is_optional: false },
                        );
                        if let NodeKind::TryCatchBlock(t) = &mut self.ast.node_mut(id).kind {
                            t.catch_parameter = Some(p);
                        }
                        param = Some(ident);
                    }
                    if let Some(body) = child.child_by_field("body") {
                        let block = self.add(id, &body, NodeKind::JsBlock);
                        if let NodeKind::TryCatchBlock(t) = &mut self.ast.node_mut(id).kind {
                            t.catch_body = Some(block);
                        }
                        if let Some(param) = param {
                            self.ast.declare(block, param, DeclOrigin::Local);
                        }
                        self.visit_children(block, &body)?;
                    }
                }
                "finally_clause" => {
                    let block = self.add(id, &child, NodeKind::JsBlock);
                    if let NodeKind::TryCatchBlock(t) = &mut self.ast.node_mut(id).kind {
                        t.finally_body = Some(block);
                    }
                    self.visit_children(block, &child)?;
                }
                _ => {}
            }
        }
        Ok(id)
    }
}

// ============================================================================
// IMPORT TYPE COLLECTION
// ============================================================================

/// Whether `name` resolves to a declaration in any scope at or above `from`,
/// or needs none (keyword, implicit type).
pub fn identifier_declared(
    ast: &Ast,
    source: &str,
    from: NodeId,
    name: &str,
    implicit_types: &[String],
) -> bool {
    is_predeclared(name, implicit_types) || ast.find_declaration(source, from, name).is_some()
}

/// Collect the free identifiers of every export into the program's
/// import-type table, classifying namespace reads through import aliases.
/// Idempotent per AST.
pub fn collect_import_types(ast: &mut Ast, source: &str, implicit_types: &[String]) {
    if ast.program().import_types_collected {
        return;
    }

    // Free identifiers: used but not declared along their scope chain.
    let mut free = Vec::new();
    for scope in ast.scope_ids().collect::<Vec<_>>() {
        if !under_an_export(ast, scope) {
            continue;
        }
        let Some(table) = ast.scope(scope) else { continue };
        for &used in &table.used {
            let name = ast.slice(source, used);
            if !identifier_declared(ast, source, scope, name, implicit_types) {
                free.push(used);
            }
        }
    }

    // Alias set of the program's imports.
    let aliases: Vec<String> = ast
        .program()
        .imports
        .iter()
        .filter_map(|&imp| match ast.kind(imp) {
            NodeKind::Import(i) => i.alias.map(|a| ast.slice(source, a).to_string()),
            _ => None,
        })
        .collect();

    let mut entries = Vec::new();
    for used in free {
        let name = ast.slice(source, used).to_string();
        let location = ast.range(used).start;

        let mut is_namespace = false;
        for alias in &aliases {
            if *alias != name {
                continue;
            }
            is_namespace = true;
            // The real type is the next identifier in the surrounding
            // heritage, member expression, or new-component name.
            let Some(parent) = ast.parent(used) else { continue };
            let next = match ast.kind(parent) {
                NodeKind::ComponentDeclaration(c)
                    if c.heritage.len() > 1 && c.heritage[0] == used =>
                {
                    Some(c.heritage[1])
                }
                NodeKind::MemberExpression => {
                    let children = ast.children(parent);
                    if children.len() > 1 && children[0] == used {
                        Some(children[1])
                    } else {
                        None
                    }
                }
                NodeKind::NewComponentExpression(n) if n.name.len() > 1 && n.name[0] == used => {
                    Some(n.name[1])
                }
                _ => None,
            };
            if let Some(next) = next {
                entries.push(ImportType {
                    namespace: name.clone(),
                    name: ast.slice(source, next).to_string(),
                    location,
                    resolved_path: None,
                });
            }
        }

        if !is_namespace {
            entries.push(ImportType { namespace: String::new(), name, location, resolved_path: None });
        }
    }

    for entry in entries {
        ast.add_import_type(entry);
    }
    ast.program_mut().import_types_collected = true;
}

fn under_an_export(ast: &Ast, mut id: NodeId) -> bool {
    loop {
        match ast.parent(id) {
            Some(parent) => {
                if matches!(ast.kind(parent), NodeKind::Program(_)) {
                    return ast.program().exports.contains(&id);
                }
                id = parent;
            }
            None => return false,
        }
    }
}
