//! Property binding containers.
//!
//! While the builder walks a property's value expression, every member
//! expression or bare identifier that reaches the property without crossing a
//! function/class/listener/new-component boundary is captured here as an
//! identifier chain. At lowering time the container renders the runtime
//! subscription list (`[[sourceObject,'eventChanged'], …]`) and reports which
//! chain roots are implicit property reads that need a `this.` prefix in the
//! emitted expression.

use std::collections::BTreeSet;

use super::node::{Ast, DeclOrigin, NodeId};

/// One captured subexpression: the node it was captured from and its
/// identifier chain, root first.
#[derive(Debug, Clone)]
pub struct BindingChain {
    pub node: NodeId,
    pub identifiers: Vec<NodeId>,
}

/// The captured chains of a single property declaration or assignment.
///
/// All occurrences are kept (the emitter rewrites each one); subscription
/// rendering deduplicates by the `(root, first-field)` tuple so a source path
/// subscribes once.
#[derive(Debug, Default)]
pub struct BindingContainer {
    chains: Vec<BindingChain>,
}

impl BindingContainer {
    pub fn add_chain(&mut self, node: NodeId, identifiers: Vec<NodeId>) {
        if !identifiers.is_empty() {
            self.chains.push(BindingChain { node, identifiers });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn chains(&self) -> &[BindingChain] {
        &self.chains
    }
}

/// Name environment a chain root is classified against.
pub struct BindingEnv<'a> {
    /// Aliases introduced by `import … as N`.
    pub namespaces: &'a BTreeSet<String>,
}

/// How a chain root resolves, which decides its runtime subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootClass {
    /// Chain starts at `this`; the observed property is the second segment.
    This,
    /// Bare read of a property declared on the enclosing component.
    OwnProperty,
    /// Read through a sibling instance declared with `id:`.
    SiblingId,
    /// Read through an import namespace alias.
    Namespace,
    /// Locals, keywords, implicit types, and free identifiers never
    /// subscribe.
    Skipped,
}

/// Classify the root of a captured chain relative to its owning property.
pub fn classify_root(
    ast: &Ast,
    source: &str,
    property: NodeId,
    chain: &BindingChain,
    env: &BindingEnv<'_>,
) -> RootClass {
    let root = chain.identifiers[0];
    let root_name = ast.slice(source, root);

    if root_name == "this" {
        return if chain.identifiers.len() >= 2 { RootClass::This } else { RootClass::Skipped };
    }
    if root_name == "parent" || root_name == "import" {
        return RootClass::Skipped;
    }

    // A declaration between the captured node and the property makes the
    // chain a local read, not a reactive one.
    if let Some(start) = ast.parent(chain.node)
        && ast.find_declaration_below(source, start, property, root_name).is_some()
    {
        return RootClass::Skipped;
    }

    let outside = match ast.parent(property) {
        Some(p) => p,
        None => return RootClass::Skipped,
    };
    match ast.find_declaration(source, outside, root_name) {
        Some((_, DeclOrigin::Id)) => RootClass::SiblingId,
        Some((_, DeclOrigin::Property)) => RootClass::OwnProperty,
        Some((_, DeclOrigin::Local)) => RootClass::Skipped,
        None => {
            if env.namespaces.contains(root_name) {
                RootClass::Namespace
            } else {
                // Implicit types and free identifiers (imported component
                // names) are not reactive sources.
                RootClass::Skipped
            }
        }
    }
}

/// Render the runtime subscription list, `[[object,'eventChanged'], …]`.
/// Returns an empty string when nothing subscribes.
pub fn subscriptions_js(
    ast: &Ast,
    source: &str,
    property: NodeId,
    container: &BindingContainer,
    env: &BindingEnv<'_>,
) -> String {
    let mut seen = BTreeSet::new();
    let mut entries = Vec::new();

    for chain in container.chains() {
        let ids: Vec<&str> = chain.identifiers.iter().map(|&id| ast.slice(source, id)).collect();
        let entry = match classify_root(ast, source, property, chain, env) {
            RootClass::This => Some(format!("[this,'{}Changed']", ids[1])),
            RootClass::OwnProperty => Some(format!("[this,'{}Changed']", ids[0])),
            RootClass::SiblingId if ids.len() >= 2 => {
                Some(format!("[{},'{}Changed']", ids[0], ids[1]))
            }
            RootClass::Namespace if ids.len() >= 3 => {
                Some(format!("[{}.{},'{}Changed']", ids[0], ids[1], ids[2]))
            }
            _ => None,
        };
        if let Some(entry) = entry
            && seen.insert(entry.clone())
        {
            entries.push(entry);
        }
    }

    if entries.is_empty() { String::new() } else { format!("[{}]", entries.join(",")) }
}

/// Root identifiers of chains that read a declared property without
/// qualification. The emitter prefixes each occurrence with `this.`.
pub fn implicit_property_roots(
    ast: &Ast,
    source: &str,
    property: NodeId,
    container: &BindingContainer,
    env: &BindingEnv<'_>,
) -> Vec<NodeId> {
    let mut roots: Vec<NodeId> = container
        .chains()
        .iter()
        .filter(|chain| classify_root(ast, source, property, chain, env) == RootClass::OwnProperty)
        .map(|chain| chain.identifiers[0])
        .collect();
    roots.sort_by_key(|&id| ast.start_byte(id));
    roots.dedup();
    roots
}

/// Human-readable description of the captured chains, for diagnostics.
pub fn debug_string(ast: &Ast, source: &str, container: &BindingContainer) -> String {
    container
        .chains()
        .iter()
        .map(|chain| {
            chain
                .identifiers
                .iter()
                .map(|&id| ast.slice(source, id))
                .collect::<Vec<_>>()
                .join(".")
        })
        .collect::<Vec<_>>()
        .join(", ")
}
