//! Source fragment assembler.
//!
//! Lowering produces an ordered list of rewrite fragments keyed by byte
//! offsets into the original source. A fragment either replaces its span with
//! a stream of generated pieces, or preserves its span verbatim except where
//! nested fragments replace subranges. File emission applies the program's
//! fragment list as one rewrite over the whole source, which keeps untouched
//! spans byte-identical and line-accurate.

use lvc_core::{Error, Result};

/// A rewrite of the byte range `[from, to)` of the original source.
#[derive(Debug)]
pub struct Fragment {
    pub from: usize,
    pub to: usize,
    pub payload: Payload,
}

#[derive(Debug)]
pub enum Payload {
    /// Generated output: literals and nested fragments emitted in stream
    /// order, replacing the span outright.
    Stream(Vec<Piece>),
    /// Source-preserving rewrite: nested fragments are applied over the span,
    /// sorted by `from`, with the text between them emitted verbatim.
    Rewrite(Vec<Fragment>),
}

#[derive(Debug)]
pub enum Piece {
    Text(String),
    Fragment(Fragment),
}

impl Fragment {
    pub fn text(from: usize, to: usize, text: impl Into<String>) -> Self {
        Self { from, to, payload: Payload::Stream(vec![Piece::Text(text.into())]) }
    }

    pub fn rewrite(from: usize, to: usize, children: Vec<Fragment>) -> Self {
        Self { from, to, payload: Payload::Rewrite(children) }
    }

    /// Emit this fragment over `source` into `out`.
    pub fn write(&self, source: &str, out: &mut String) -> Result<()> {
        if self.from > self.to || self.to > source.len() {
            return Err(Error::assertion(format!(
                "fragment [{}, {}) out of bounds for source of length {}",
                self.from,
                self.to,
                source.len()
            )));
        }
        match &self.payload {
            Payload::Stream(pieces) => {
                for piece in pieces {
                    match piece {
                        Piece::Text(text) => out.push_str(text),
                        Piece::Fragment(fragment) => fragment.write(source, out)?,
                    }
                }
            }
            Payload::Rewrite(children) => {
                let mut ordered: Vec<&Fragment> = children.iter().collect();
                ordered.sort_by_key(|f| f.from);

                let mut cursor = self.from;
                for child in ordered {
                    if child.from < cursor || child.to > self.to {
                        return Err(Error::assertion(format!(
                            "overlapping fragments: [{}, {}) intersects emitted range ending at {}",
                            child.from, child.to, cursor
                        )));
                    }
                    out.push_str(slice(source, cursor, child.from)?);
                    child.write(source, out)?;
                    cursor = child.to;
                }
                out.push_str(slice(source, cursor, self.to)?);
            }
        }
        Ok(())
    }
}

fn slice(source: &str, from: usize, to: usize) -> Result<&str> {
    source.get(from..to).ok_or_else(|| {
        Error::assertion(format!("fragment boundary [{from}, {to}) splits a UTF-8 sequence"))
    })
}

/// Apply a list of top-level fragments over a full source text.
pub fn write_fragments(source: &str, fragments: Vec<Fragment>) -> Result<String> {
    let root = Fragment::rewrite(0, source.len(), fragments);
    let mut out = String::new();
    root.write(source, &mut out)?;
    Ok(out)
}

/// Incremental builder for a stream fragment.
///
/// Literal text accumulates into a pending buffer; nested fragments flush it.
/// The lowering engine threads one of these per generated section.
pub struct FragmentWriter {
    from: usize,
    to: usize,
    pieces: Vec<Piece>,
    pending: String,
}

impl FragmentWriter {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to, pieces: Vec::new(), pending: String::new() }
    }

    pub fn text(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.pending.push_str(text.as_ref());
        self
    }

    pub fn nested(&mut self, fragment: Fragment) -> &mut Self {
        self.flush();
        self.pieces.push(Piece::Fragment(fragment));
        self
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            self.pieces.push(Piece::Text(std::mem::take(&mut self.pending)));
        }
    }

    pub fn finish(mut self) -> Fragment {
        self.flush();
        Fragment { from: self.from, to: self.to, payload: Payload::Stream(self.pieces) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_spans_survive_verbatim() {
        let source = "aaa bbb ccc";
        let fragments = vec![Fragment::text(4, 7, "XYZ")];
        let out = write_fragments(source, fragments).unwrap();
        assert_eq!(out, "aaa XYZ ccc");
    }

    #[test]
    fn fragments_are_applied_in_offset_order() {
        let source = "one two three";
        let fragments = vec![Fragment::text(8, 13, "3"), Fragment::text(0, 3, "1")];
        let out = write_fragments(source, fragments).unwrap();
        assert_eq!(out, "1 two 3");
    }

    #[test]
    fn zero_width_fragment_inserts_without_consuming() {
        let source = "x+1";
        let fragments = vec![Fragment::text(0, 0, "this.")];
        let out = write_fragments(source, fragments).unwrap();
        assert_eq!(out, "this.x+1");
    }

    #[test]
    fn nested_rewrites_preserve_their_gaps() {
        let source = "{ a; b; c; }";
        // Replace `b` inside a rewrite covering the whole block.
        let inner = Fragment::text(5, 6, "B");
        let outer = Fragment::rewrite(0, source.len(), vec![inner]);
        let out = write_fragments(source, vec![outer]).unwrap();
        assert_eq!(out, "{ a; B; c; }");
    }

    #[test]
    fn stream_interleaves_literals_and_sections() {
        let source = "component A{ fn f(){ body } }";
        let mut writer = FragmentWriter::new(0, source.len());
        writer.text("class A {");
        writer.nested(Fragment::rewrite(19, 27, vec![]));
        writer.text("}");
        let out = write_fragments(source, vec![writer.finish()]).unwrap();
        assert_eq!(out, "class A {{ body }}");
    }

    #[test]
    fn overlapping_siblings_are_rejected() {
        let source = "abcdef";
        let fragments = vec![Fragment::text(0, 4, "x"), Fragment::text(2, 6, "y")];
        let err = write_fragments(source, fragments).unwrap_err();
        assert_eq!(err.code(), "Assertion");
    }

    #[test]
    fn out_of_bounds_fragments_are_rejected() {
        let source = "short";
        let fragments = vec![Fragment::text(0, 99, "x")];
        assert!(write_fragments(source, fragments).is_err());
    }
}
