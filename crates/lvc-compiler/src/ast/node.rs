//! Arena-backed abstract syntax tree.
//!
//! The AST is a vector of nodes indexed by [`NodeId`]; every node records its
//! parent, its ordered children, its source span, and a [`NodeKind`] variant.
//! Parent links are plain indices, so ownership cycles are unrepresentable
//! and upward walks (scope lookup, binding capture) are cheap.
//!
//! Scope tables and binding containers are side maps on the arena keyed by
//! the owning node id; entries exist only for scope-bearing kinds and for
//! properties/assignments respectively.

use std::collections::BTreeMap;

use lvc_core::{SourcePoint, SourceRange};

use super::bindings::BindingContainer;

/// Index of a node in the [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Why an identifier appears in a scope's declared list.
///
/// The origin drives binding-subscription rendering: `Property` roots observe
/// the enclosing component through `this`, `Id` roots observe a sibling
/// instance, and `Local` roots never subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclOrigin {
    Local,
    Property,
    Id,
}

/// Declared and used identifier lists of one scope-bearing node.
#[derive(Debug, Default)]
pub struct ScopeTable {
    pub declared: Vec<(NodeId, DeclOrigin)>,
    pub used: Vec<NodeId>,
}

/// A free identifier recorded on the program, keyed by import namespace
/// (empty for plain identifiers), later resolved to a producing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportType {
    pub namespace: String,
    pub name: String,
    pub location: SourcePoint,
    pub resolved_path: Option<String>,
}

// ============================================================================
// NODE VARIANTS
// ============================================================================

#[derive(Debug, Default)]
pub struct ProgramNode {
    pub file_name: String,
    pub file_path: String,
    pub imports: Vec<NodeId>,
    pub js_imports: Vec<NodeId>,
    /// Component declarations and component-instance statements at file root,
    /// in source order.
    pub exports: Vec<NodeId>,
    /// namespace -> name -> entry. Sorted maps keep emission deterministic.
    pub import_types: BTreeMap<String, BTreeMap<String, ImportType>>,
    pub import_types_collected: bool,
}

#[derive(Debug, Default)]
pub struct ImportNode {
    pub segments: Vec<NodeId>,
    pub alias: Option<NodeId>,
    pub is_relative: bool,
    pub has_scope_segment: bool,
}

#[derive(Debug, Default)]
pub struct JsImportNode {
    pub names: Vec<NodeId>,
    pub path: Option<NodeId>,
    /// `import { X, Y } from "p"` as opposed to `import X from "p"`.
    pub is_object_import: bool,
}

#[derive(Debug, Default)]
pub struct ComponentNode {
    pub name: Option<NodeId>,
    pub id: Option<NodeId>,
    pub heritage: Vec<NodeId>,
    pub body: Option<NodeId>,
    pub properties: Vec<NodeId>,
    pub static_properties: Vec<NodeId>,
    pub accessors: Vec<NodeId>,
    pub events: Vec<NodeId>,
    pub listeners: Vec<NodeId>,
    pub methods: Vec<NodeId>,
    pub assignments: Vec<NodeId>,
    /// Nested children lowered into `assignChildren`.
    pub default_children: Vec<NodeId>,
    /// Nested new-component expressions carrying an `id`.
    pub id_components: Vec<NodeId>,
}

#[derive(Debug, Default)]
pub struct NewComponentNode {
    /// Dotted type name, one identifier per segment.
    pub name: Vec<NodeId>,
    pub id: Option<NodeId>,
    pub arguments: Option<NodeId>,
    pub body: Option<NodeId>,
    pub properties: Vec<NodeId>,
    pub assignments: Vec<NodeId>,
    pub events: Vec<NodeId>,
    pub listeners: Vec<NodeId>,
    pub methods: Vec<NodeId>,
    pub default_children: Vec<NodeId>,
    pub id_components: Vec<NodeId>,
    /// Set for expressions at file top level or inside a block scope; root
    /// expressions own their `ids` table.
    pub is_root: bool,
}

#[derive(Debug, Default)]
pub struct PropertyNode {
    pub name: Option<NodeId>,
    pub type_annotation: Option<NodeId>,
    pub expression: Option<NodeId>,
    pub statement_block: Option<NodeId>,
    /// `:` assignment (reactive) as opposed to `=`.
    pub is_binding_assignment: bool,
}

#[derive(Debug, Default)]
pub struct PropertyAssignmentNode {
    /// Dotted property path, one identifier per segment.
    pub property: Vec<NodeId>,
    pub expression: Option<NodeId>,
    pub statement_block: Option<NodeId>,
    pub is_binding_assignment: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessorKind {
    #[default]
    Getter,
    Setter,
}

#[derive(Debug, Default)]
pub struct PropertyAccessorNode {
    pub kind: AccessorKind,
    pub name: Option<NodeId>,
    pub parameters: Option<NodeId>,
    pub body: Option<NodeId>,
    /// True once paired with a matching declared property; attached accessors
    /// are emitted inside `addProperty` instead of as class members.
    pub is_attached: bool,
}

#[derive(Debug, Default)]
pub struct ListenerNode {
    pub name: Option<NodeId>,
    pub parameters: Option<NodeId>,
    pub body: Option<NodeId>,
    pub body_expression: Option<NodeId>,
    pub is_async: bool,
}

#[derive(Debug, Default)]
pub struct TypedMethodNode {
    pub name: Option<NodeId>,
    pub parameters: Option<NodeId>,
    pub return_type: Option<NodeId>,
    pub body: Option<NodeId>,
    pub is_static: bool,
    pub is_async: bool,
}

#[derive(Debug, Default)]
pub struct ConstructorNode {
    pub parameters: Option<NodeId>,
    pub body: Option<NodeId>,
    pub initializer: Option<NodeId>,
    pub super_call: Option<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeclarationForm {
    #[default]
    Var,
    Let,
    Const,
}

impl DeclarationForm {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Var => "var",
            Self::Let => "let",
            Self::Const => "const",
        }
    }
}

#[derive(Debug, Default)]
pub struct VariableDeclarationNode {
    pub form: DeclarationForm,
    pub declarators: Vec<NodeId>,
    pub has_semicolon: bool,
}

#[derive(Debug, Default)]
pub struct FunctionNode {
    pub name: Option<NodeId>,
    pub parameters: Option<NodeId>,
    pub return_type: Option<NodeId>,
    pub body: Option<NodeId>,
    /// Expression body of an arrow function without a block.
    pub expression: Option<NodeId>,
    pub is_async: bool,
}

#[derive(Debug, Default)]
pub struct TryCatchNode {
    pub try_body: Option<NodeId>,
    pub catch_parameter: Option<NodeId>,
    pub catch_body: Option<NodeId>,
    pub finally_body: Option<NodeId>,
}

/// Tagged node variant. One arm per recognized construct; everything the
/// grammar produces that the compiler does not model is walked through
/// transparently by the builder and never materializes here.
#[derive(Debug)]
pub enum NodeKind {
    Program(ProgramNode),
    Import(ImportNode),
    ImportPathSegment,
    JsImport(JsImportNode),
    Identifier,
    TypeAnnotation,
    Number,
    StringLiteral,
    Object,
    ComponentDeclaration(ComponentNode),
    ComponentBody { constructor: Option<NodeId> },
    ComponentInstanceStatement { name: Option<NodeId> },
    NewComponentExpression(NewComponentNode),
    NewTaggedComponentExpression,
    NewTrippleTaggedComponentExpression,
    TaggedString,
    TrippleTaggedString,
    PropertyDeclaration(PropertyNode),
    StaticPropertyDeclaration(PropertyNode),
    PropertyAssignment(PropertyAssignmentNode),
    PropertyAccessor(PropertyAccessorNode),
    EventDeclaration { name: Option<NodeId>, parameters: Option<NodeId> },
    ListenerDeclaration(ListenerNode),
    TypedMethod(TypedMethodNode),
    MethodDefinition { name: Option<NodeId>, parameters: Option<NodeId>, body: Option<NodeId> },
    ConstructorDefinition(ConstructorNode),
    ConstructorInitializer { assignments: Vec<NodeId> },
    ConstructorInitializerAssignment { name: Option<NodeId>, expression: Option<NodeId> },
    Parameter { identifier: NodeId, type_annotation: Option<NodeId>, is_optional: bool },
    ParameterList { parameters: Vec<NodeId> },
    JsBlock,
    BindableExpression,
    Expression,
    MemberExpression,
    SubscriptExpression,
    CallExpression { arguments: Option<NodeId>, is_super: bool },
    Arguments,
    NewExpression,
    ReturnStatement,
    ExpressionStatement,
    AssignmentExpression { left: Option<NodeId>, right: Option<NodeId> },
    VariableDeclaration(VariableDeclarationNode),
    VariableDeclarator { name: Option<NodeId>, type_annotation: Option<NodeId>, value: Option<NodeId> },
    Function(FunctionNode),
    FunctionDeclaration(FunctionNode),
    ArrowFunction(FunctionNode),
    ClassDeclaration,
    TryCatchBlock(TryCatchNode),
}

impl NodeKind {
    /// Whether the kind owns a scope table.
    pub fn is_scope(&self) -> bool {
        matches!(
            self,
            NodeKind::Program(_)
                | NodeKind::JsBlock
                | NodeKind::ComponentDeclaration(_)
                | NodeKind::ComponentBody { .. }
                | NodeKind::PropertyDeclaration(_)
                | NodeKind::PropertyAssignment(_)
                | NodeKind::NewComponentExpression(NewComponentNode { is_root: true, .. })
        )
    }

    /// Short variant name for debug dumps.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Program(_) => "Program",
            NodeKind::Import(_) => "Import",
            NodeKind::ImportPathSegment => "ImportPathSegment",
            NodeKind::JsImport(_) => "JsImport",
            NodeKind::Identifier => "Identifier",
            NodeKind::TypeAnnotation => "TypeAnnotation",
            NodeKind::Number => "Number",
            NodeKind::StringLiteral => "StringLiteral",
            NodeKind::Object => "Object",
            NodeKind::ComponentDeclaration(_) => "ComponentDeclaration",
            NodeKind::ComponentBody { .. } => "ComponentBody",
            NodeKind::ComponentInstanceStatement { .. } => "ComponentInstanceStatement",
            NodeKind::NewComponentExpression(n) => {
                if n.is_root {
                    "RootNewComponentExpression"
                } else {
                    "NewComponentExpression"
                }
            }
            NodeKind::NewTaggedComponentExpression => "NewTaggedComponentExpression",
            NodeKind::NewTrippleTaggedComponentExpression => "NewTrippleTaggedComponentExpression",
            NodeKind::TaggedString => "TaggedString",
            NodeKind::TrippleTaggedString => "TrippleTaggedString",
            NodeKind::PropertyDeclaration(_) => "PropertyDeclaration",
            NodeKind::StaticPropertyDeclaration(_) => "StaticPropertyDeclaration",
            NodeKind::PropertyAssignment(_) => "PropertyAssignment",
            NodeKind::PropertyAccessor(_) => "PropertyAccessor",
            NodeKind::EventDeclaration { .. } => "EventDeclaration",
            NodeKind::ListenerDeclaration(_) => "ListenerDeclaration",
            NodeKind::TypedMethod(_) => "TypedMethod",
            NodeKind::MethodDefinition { .. } => "MethodDefinition",
            NodeKind::ConstructorDefinition(_) => "ConstructorDefinition",
            NodeKind::ConstructorInitializer { .. } => "ConstructorInitializer",
            NodeKind::ConstructorInitializerAssignment { .. } => "ConstructorInitializerAssignment",
            NodeKind::Parameter { .. } => "Parameter",
            NodeKind::ParameterList { .. } => "ParameterList",
            NodeKind::JsBlock => "JsBlock",
            NodeKind::BindableExpression => "BindableExpression",
            NodeKind::Expression => "Expression",
            NodeKind::MemberExpression => "MemberExpression",
            NodeKind::SubscriptExpression => "SubscriptExpression",
            NodeKind::CallExpression { .. } => "CallExpression",
            NodeKind::Arguments => "Arguments",
            NodeKind::NewExpression => "NewExpression",
            NodeKind::ReturnStatement => "ReturnStatement",
            NodeKind::ExpressionStatement => "ExpressionStatement",
            NodeKind::AssignmentExpression { .. } => "AssignmentExpression",
            NodeKind::VariableDeclaration(_) => "VariableDeclaration",
            NodeKind::VariableDeclarator { .. } => "VariableDeclarator",
            NodeKind::Function(_) => "Function",
            NodeKind::FunctionDeclaration(_) => "FunctionDeclaration",
            NodeKind::ArrowFunction(_) => "ArrowFunction",
            NodeKind::ClassDeclaration => "ClassDeclaration",
            NodeKind::TryCatchBlock(_) => "TryCatchBlock",
        }
    }
}

/// One node in the arena.
#[derive(Debug)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub range: SourceRange,
    pub kind: NodeKind,
}

// ============================================================================
// ARENA
// ============================================================================

/// The AST of one source file.
#[derive(Debug)]
pub struct Ast {
    nodes: Vec<Node>,
    root: NodeId,
    scopes: BTreeMap<NodeId, ScopeTable>,
    bindings: BTreeMap<NodeId, BindingContainer>,
}

impl Ast {
    /// Create an AST holding only its `Program` root.
    pub fn new(file_name: impl Into<String>, file_path: impl Into<String>, range: SourceRange) -> Self {
        let program = ProgramNode {
            file_name: file_name.into(),
            file_path: file_path.into(),
            ..ProgramNode::default()
        };
        let root_node = Node {
            parent: None,
            children: Vec::new(),
            range,
            kind: NodeKind::Program(program),
        };
        let mut scopes = BTreeMap::new();
        scopes.insert(NodeId(0), ScopeTable::default());
        Self { nodes: vec![root_node], root: NodeId(0), scopes, bindings: BTreeMap::new() }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn range(&self, id: NodeId) -> SourceRange {
        self.node(id).range
    }

    pub fn start_byte(&self, id: NodeId) -> usize {
        self.node(id).range.start.offset
    }

    pub fn end_byte(&self, id: NodeId) -> usize {
        self.node(id).range.end.offset
    }

    /// The source text a node spans. Byte offsets, not char indices.
    pub fn slice<'s>(&self, source: &'s str, id: NodeId) -> &'s str {
        let range = self.node(id).range;
        &source[range.start.offset..range.end.offset]
    }

    /// Append a node under `parent` and return its id. The scope table is
    /// created eagerly for scope-bearing kinds.
    pub fn add_node(&mut self, parent: NodeId, range: SourceRange, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let is_scope = kind.is_scope();
        self.nodes.push(Node { parent: Some(parent), children: Vec::new(), range, kind });
        self.nodes[parent.index()].children.push(id);
        if is_scope {
            self.scopes.insert(id, ScopeTable::default());
        }
        id
    }

    // ------------------------------------------------------------------------
    // Scope attachment
    // ------------------------------------------------------------------------

    /// The nearest scope-bearing node at or above `from`.
    pub fn nearest_scope(&self, from: NodeId) -> Option<NodeId> {
        let mut current = Some(from);
        while let Some(id) = current {
            if self.node(id).kind.is_scope() {
                return Some(id);
            }
            current = self.node(id).parent;
        }
        None
    }

    /// Append `identifier` to the declared list of the nearest scope at or
    /// above `from`. Returns the scope it landed on.
    pub fn declare(&mut self, from: NodeId, identifier: NodeId, origin: DeclOrigin) -> Option<NodeId> {
        let scope = self.nearest_scope(from)?;
        self.scopes.entry(scope).or_default().declared.push((identifier, origin));
        Some(scope)
    }

    /// Append `identifier` to the used list of the nearest scope at or above
    /// `from`.
    pub fn mark_used(&mut self, from: NodeId, identifier: NodeId) -> Option<NodeId> {
        let scope = self.nearest_scope(from)?;
        self.scopes.entry(scope).or_default().used.push(identifier);
        Some(scope)
    }

    pub fn scope(&self, id: NodeId) -> Option<&ScopeTable> {
        self.scopes.get(&id)
    }

    pub fn scope_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.scopes.keys().copied()
    }

    /// Walk every scope at or above `from` looking for a declaration of
    /// `name`. Keywords and implicit types are the caller's concern.
    pub fn find_declaration(&self, source: &str, from: NodeId, name: &str) -> Option<(NodeId, DeclOrigin)> {
        let mut current = Some(from);
        while let Some(id) = current {
            if let Some(table) = self.scopes.get(&id) {
                for (decl, origin) in &table.declared {
                    if self.slice(source, *decl) == name {
                        return Some((id, *origin));
                    }
                }
            }
            current = self.node(id).parent;
        }
        None
    }

    /// Like [`find_declaration`](Self::find_declaration), but stops the walk
    /// once `boundary` has been examined. Used by the binding container to
    /// decide whether a chain root is local to its property.
    pub fn find_declaration_below(
        &self,
        source: &str,
        from: NodeId,
        boundary: NodeId,
        name: &str,
    ) -> Option<(NodeId, DeclOrigin)> {
        let mut current = Some(from);
        while let Some(id) = current {
            if id == boundary {
                return None;
            }
            if let Some(table) = self.scopes.get(&id) {
                for (decl, origin) in &table.declared {
                    if self.slice(source, *decl) == name {
                        return Some((id, *origin));
                    }
                }
            }
            current = self.node(id).parent;
        }
        None
    }

    // ------------------------------------------------------------------------
    // Binding containers
    // ------------------------------------------------------------------------

    pub fn bindings(&self, property: NodeId) -> Option<&BindingContainer> {
        self.bindings.get(&property)
    }

    pub fn bindings_mut(&mut self, property: NodeId) -> &mut BindingContainer {
        self.bindings.entry(property).or_default()
    }

    // ------------------------------------------------------------------------
    // Typed accessors
    // ------------------------------------------------------------------------

    pub fn program(&self) -> &ProgramNode {
        match &self.node(self.root).kind {
            NodeKind::Program(p) => p,
            _ => unreachable!("root is always a Program"),
        }
    }

    pub fn program_mut(&mut self) -> &mut ProgramNode {
        let root = self.root;
        match &mut self.node_mut(root).kind {
            NodeKind::Program(p) => p,
            _ => unreachable!("root is always a Program"),
        }
    }

    /// Record a free identifier on the program's import-type table.
    pub fn add_import_type(&mut self, entry: ImportType) {
        self.program_mut()
            .import_types
            .entry(entry.namespace.clone())
            .or_default()
            .insert(entry.name.clone(), entry);
    }

    /// Set the resolved path of an import-type entry, if present.
    pub fn resolve_import_type(&mut self, namespace: &str, name: &str, path: impl Into<String>) {
        if let Some(names) = self.program_mut().import_types.get_mut(namespace)
            && let Some(entry) = names.get_mut(name)
        {
            entry.resolved_path = Some(path.into());
        }
    }

    /// Dotted identifier chain of a member-expression subtree.
    pub fn identifier_chain(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        self.collect_chain(id, &mut result);
        result
    }

    fn collect_chain(&self, id: NodeId, into: &mut Vec<NodeId>) {
        for &child in self.children(id) {
            match self.kind(child) {
                NodeKind::Identifier => into.push(child),
                NodeKind::MemberExpression => self.collect_chain(child, into),
                _ => {}
            }
        }
    }

    /// Indented structural dump, for diagnostics.
    pub fn dump(&self, id: NodeId, indent: usize) -> String {
        let node = self.node(id);
        let mut out = format!(
            "{}{} [{}, {}]\n",
            "  ".repeat(indent),
            node.kind.name(),
            node.range.start.offset,
            node.range.end.offset
        );
        for &child in &node.children {
            out.push_str(&self.dump(child, indent + 1));
        }
        out
    }
}
