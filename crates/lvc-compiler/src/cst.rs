//! Concrete syntax tree adapter.
//!
//! The incremental parser is an external collaborator: the compiler only sees
//! its tree through the [`CstNode`] trait, which exposes node kinds as
//! strings, ordered children, field-named child lookup, and byte plus
//! row/column spans. Nothing of the underlying parser leaks into the AST —
//! the builder copies spans out and drops the tree.
//!
//! The crate also ships [`SyntaxTree`], an owned implementation of the trait.
//! Adapters for real parsers can materialize into it, and tests build trees
//! directly through [`SyntaxTreeBuilder`].

use std::rc::Rc;

use lvc_core::{Result, SourcePoint};

/// Uniform interface over an opaque CST node.
///
/// Implementations are expected to be cheap handles (`Clone` is called
/// freely). Kind checks are stringly-typed on purpose: the grammar's node
/// vocabulary is the contract, not a parser-specific enum.
pub trait CstNode: Clone {
    /// Grammar node kind, e.g. `"component_declaration"`.
    fn kind(&self) -> &str;

    /// Number of children, named and anonymous.
    fn child_count(&self) -> usize;

    /// Child at `index`, counting anonymous token nodes.
    fn child(&self, index: usize) -> Option<Self>;

    /// Number of named (non-token) children.
    fn named_child_count(&self) -> usize;

    /// Child occupying the grammar field `field`, if present.
    fn child_by_field(&self, field: &str) -> Option<Self>;

    fn start_byte(&self) -> usize;
    fn end_byte(&self) -> usize;
    fn start_point(&self) -> SourcePoint;
    fn end_point(&self) -> SourcePoint;

    /// Whether the parser flagged this node as a parse error.
    fn is_error(&self) -> bool {
        self.kind() == "ERROR"
    }

    /// Iterate over all children in order.
    fn children(&self) -> Vec<Self> {
        (0..self.child_count()).filter_map(|i| self.child(i)).collect()
    }
}

/// The parse collaborator handed to the compiler by its host.
pub trait LanguageParser {
    type Node: CstNode;

    /// Parse a full source text and return the root node of its tree.
    fn parse(&self, source: &str) -> Result<Self::Node>;
}

// ============================================================================
// OWNED SYNTAX TREE
// ============================================================================

#[derive(Debug)]
struct TreeNode {
    kind: String,
    /// Field name assigned by the parent, if any.
    field: Option<String>,
    named: bool,
    start_byte: usize,
    end_byte: usize,
    start_point: SourcePoint,
    end_point: SourcePoint,
    children: Vec<Rc<TreeNode>>,
}

/// An owned, reference-counted syntax tree node implementing [`CstNode`].
///
/// External parsers convert their trees into this shape; the fixture parser
/// used by the integration tests produces it directly.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    node: Rc<TreeNode>,
}

impl CstNode for SyntaxTree {
    fn kind(&self) -> &str {
        &self.node.kind
    }

    fn child_count(&self) -> usize {
        self.node.children.len()
    }

    fn child(&self, index: usize) -> Option<Self> {
        self.node.children.get(index).map(|n| SyntaxTree { node: n.clone() })
    }

    fn named_child_count(&self) -> usize {
        self.node.children.iter().filter(|c| c.named).count()
    }

    fn child_by_field(&self, field: &str) -> Option<Self> {
        self.node
            .children
            .iter()
            .find(|c| c.field.as_deref() == Some(field))
            .map(|n| SyntaxTree { node: n.clone() })
    }

    fn start_byte(&self) -> usize {
        self.node.start_byte
    }

    fn end_byte(&self) -> usize {
        self.node.end_byte
    }

    fn start_point(&self) -> SourcePoint {
        self.node.start_point
    }

    fn end_point(&self) -> SourcePoint {
        self.node.end_point
    }
}

/// Builder for [`SyntaxTree`] values.
///
/// Spans are set explicitly in bytes; line/column points are derived from the
/// source text on [`finish`](SyntaxTreeBuilder::finish) so they stay
/// consistent with the byte offsets.
pub struct SyntaxTreeBuilder {
    kind: String,
    field: Option<String>,
    named: bool,
    start_byte: usize,
    end_byte: usize,
    children: Vec<SyntaxTreeBuilder>,
}

impl SyntaxTreeBuilder {
    /// A named grammar node spanning `[start, end)`.
    pub fn node(kind: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            kind: kind.into(),
            field: None,
            named: true,
            start_byte: start,
            end_byte: end,
            children: Vec::new(),
        }
    }

    /// An anonymous token node (its kind is its text, e.g. `"="`).
    pub fn token(kind: impl Into<String>, start: usize, end: usize) -> Self {
        Self { named: false, ..Self::node(kind, start, end) }
    }

    /// Assign the grammar field this node occupies in its parent.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.field = Some(name.into());
        self
    }

    /// Extend the node's span to a new end offset, for nodes built
    /// incrementally while their extent is still unknown.
    #[must_use]
    pub fn span_to(mut self, end: usize) -> Self {
        self.end_byte = end;
        self
    }

    /// The byte span assigned so far.
    pub fn span(&self) -> (usize, usize) {
        (self.start_byte, self.end_byte)
    }

    /// Append a child node.
    #[must_use]
    pub fn child(mut self, child: SyntaxTreeBuilder) -> Self {
        self.children.push(child);
        self
    }

    /// Append a child node in place.
    pub fn push(&mut self, child: SyntaxTreeBuilder) {
        self.children.push(child);
    }

    /// Materialize the tree, computing line/column points from `source`.
    pub fn finish(self, source: &str) -> SyntaxTree {
        let index = LineIndex::new(source);
        SyntaxTree { node: self.build(&index) }
    }

    fn build(self, index: &LineIndex) -> Rc<TreeNode> {
        Rc::new(TreeNode {
            start_point: index.point(self.start_byte),
            end_point: index.point(self.end_byte),
            kind: self.kind,
            field: self.field,
            named: self.named,
            start_byte: self.start_byte,
            end_byte: self.end_byte,
            children: self.children.into_iter().map(|c| c.build(index)).collect(),
        })
    }
}

/// Byte-offset to line/column lookup over a source text.
pub struct LineIndex {
    /// Byte offset of the start of each line.
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// The source point for a byte offset. Lines are 1-based, columns are
    /// 0-based byte columns.
    pub fn point(&self, offset: usize) -> SourcePoint {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        SourcePoint::new(line + 1, offset - self.line_starts[line], offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_index_points_are_byte_accurate() {
        let source = "ab\ncd\n";
        let index = LineIndex::new(source);
        assert_eq!(index.point(0), SourcePoint::new(1, 0, 0));
        assert_eq!(index.point(2), SourcePoint::new(1, 2, 2));
        assert_eq!(index.point(3), SourcePoint::new(2, 0, 3));
        assert_eq!(index.point(5), SourcePoint::new(2, 2, 5));
    }

    #[test]
    fn field_lookup_and_named_counts() {
        let source = "component A{}";
        let tree = SyntaxTreeBuilder::node("component_declaration", 0, 13)
            .child(SyntaxTreeBuilder::token("component", 0, 9))
            .child(SyntaxTreeBuilder::node("identifier", 10, 11).field("name"))
            .child(SyntaxTreeBuilder::node("component_body", 11, 13).field("body"))
            .finish(source);

        assert_eq!(tree.kind(), "component_declaration");
        assert_eq!(tree.child_count(), 3);
        assert_eq!(tree.named_child_count(), 2);
        let name = tree.child_by_field("name").expect("name field");
        assert_eq!(name.start_byte(), 10);
        assert_eq!(name.start_point().line, 1);
        assert!(tree.child_by_field("heritage").is_none());
    }
}
