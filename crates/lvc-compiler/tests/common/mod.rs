//! Test fixture parser for `.lv` sources.
//!
//! A small recursive-descent parser covering the language subset the
//! integration tests exercise. It produces [`SyntaxTree`] values with the
//! same node kinds, grammar fields, and byte-accurate spans the production
//! CST provider reports, so the AST builder and lowering engine run unchanged
//! against it.
#![allow(dead_code)]

use lvc_compiler::cst::{LanguageParser, SyntaxTree, SyntaxTreeBuilder};
use lvc_core::{Error, Result};

/// Parse collaborator for tests.
pub struct FixtureParser;

impl LanguageParser for FixtureParser {
    type Node = SyntaxTree;

    fn parse(&self, source: &str) -> Result<Self::Node> {
        parse(source)
    }
}

pub fn parse(source: &str) -> Result<SyntaxTree> {
    let mut parser = Parser { src: source, pos: 0 };
    let root = parser.program()?;
    Ok(root.finish(source))
}

type Node = SyntaxTreeBuilder;

struct Parser<'s> {
    src: &'s str,
    pos: usize,
}

impl<'s> Parser<'s> {
    // ------------------------------------------------------------------------
    // Low-level scanning
    // ------------------------------------------------------------------------

    fn error(&self, message: &str) -> Error {
        Error::build(format!("fixture parser: {message} at byte {}", self.pos))
    }

    fn bytes(&self) -> &[u8] {
        self.src.as_bytes()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn at(&self, text: &str) -> bool {
        self.src[self.pos..].starts_with(text)
    }

    fn at_word(&self, word: &str) -> bool {
        if !self.at(word) {
            return false;
        }
        match self.bytes().get(self.pos + word.len()) {
            Some(b) => !(b.is_ascii_alphanumeric() || *b == b'_'),
            None => true,
        }
    }

    fn eat(&mut self, text: &str) -> bool {
        if self.at(text) {
            self.pos += text.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, text: &str) -> Result<()> {
        if self.eat(text) { Ok(()) } else { Err(self.error(&format!("expected '{text}'"))) }
    }

    /// Consume `word` and return its token node.
    fn word_token(&mut self, word: &str) -> Result<Node> {
        let start = self.pos;
        self.expect(word)?;
        Ok(Node::token(word, start, self.pos))
    }

    fn ident_span(&mut self) -> Option<(usize, usize)> {
        let start = self.pos;
        match self.peek() {
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
            _ => return None,
        }
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        Some((start, self.pos))
    }

    fn identifier(&mut self) -> Result<Node> {
        let (start, end) = self.ident_span().ok_or_else(|| self.error("expected identifier"))?;
        Ok(Node::node("identifier", start, end))
    }

    fn peek_word(&self) -> Option<&'s str> {
        let bytes = self.bytes();
        let b = *bytes.get(self.pos)?;
        if !(b.is_ascii_alphabetic() || b == b'_') {
            return None;
        }
        let mut end = self.pos;
        while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
            end += 1;
        }
        Some(&self.src[self.pos..end])
    }

    /// Whether an identifier starts right after the current word and
    /// intervening whitespace, used to tell `int x` from `x: …`.
    fn word_then_ident(&self) -> bool {
        let bytes = self.bytes();
        let mut i = self.pos;
        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
            i += 1;
        }
        let mut saw_ws = false;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            if bytes[i] == b'\n' {
                return false;
            }
            saw_ws = true;
            i += 1;
        }
        saw_ws && i < bytes.len() && (bytes[i].is_ascii_alphabetic() || bytes[i] == b'_')
    }

    // ------------------------------------------------------------------------
    // Program
    // ------------------------------------------------------------------------

    fn program(&mut self) -> Result<Node> {
        let mut root = Node::node("program", 0, self.src.len());
        self.skip_ws();
        while self.pos < self.src.len() {
            if self.at_word("import") {
                root.push(self.import_statement()?);
            } else if self.at_word("component") {
                root.push(self.component_declaration()?);
            } else if self.at_word("instance") {
                root.push(self.instance_statement()?);
            } else {
                return Err(self.error("unexpected top-level construct"));
            }
            self.skip_ws();
        }
        Ok(root)
    }

    fn import_statement(&mut self) -> Result<Node> {
        let start = self.pos;
        let import_token = self.word_token("import")?;
        self.skip_ws();

        // `import X from "p"` or `import { X, Y } from "p"` is a js-import.
        let is_js = if self.at("{") {
            true
        } else {
            let save = self.pos;
            let looks_js = self.ident_span().is_some() && {
                self.skip_ws();
                self.at_word("from")
            };
            self.pos = save;
            looks_js
        };

        if is_js {
            return self.js_import(start, import_token);
        }

        let mut node = Node::node("import_statement", start, start).child(import_token);

        let path_start = self.pos;
        let mut path = Node::node("import_path", path_start, path_start);
        if self.peek() == Some(b'.') {
            let dot = self.pos;
            self.pos += 1;
            path.push(Node::token(".", dot, dot + 1).field("relative"));
        }
        while let Some((s, e)) = self.ident_span() {
            path.push(Node::node("import_path_segment", s, e));
            if self.peek() == Some(b'.') && self.bytes().get(self.pos + 1).is_some_and(|b| b.is_ascii_alphabetic()) {
                self.pos += 1;
            } else {
                break;
            }
        }
        path = path.span_to(self.pos);
        node.push(path);

        self.skip_ws();
        if self.at_word("as") {
            let as_start = self.pos;
            let as_token = self.word_token("as")?;
            self.skip_ws();
            let alias = self.identifier()?;
            let import_as =
                Node::node("import_as", as_start, self.pos).child(as_token).child(alias);
            node.push(import_as);
        }
        Ok(node.span_to(self.pos))
    }

    fn js_import(&mut self, start: usize, import_token: Node) -> Result<Node> {
        let mut node = Node::node("js_import_statement", start, start).child(import_token);
        self.skip_ws();
        if self.at("{") {
            let s = self.pos;
            self.pos += 1;
            node.push(Node::token("{", s, s + 1));
            loop {
                self.skip_ws();
                node.push(self.identifier()?);
                self.skip_ws();
                if !self.eat(",") {
                    break;
                }
            }
            self.skip_ws();
            let e = self.pos;
            self.expect("}")?;
            node.push(Node::token("}", e, e + 1));
        } else {
            node.push(self.identifier()?);
        }
        self.skip_ws();
        node.push(self.word_token("from")?);
        self.skip_ws();
        node.push(self.string_literal()?);
        Ok(node.span_to(self.pos))
    }

    fn string_literal(&mut self) -> Result<Node> {
        let start = self.pos;
        let quote = self.peek().filter(|&b| b == b'"' || b == b'\'').ok_or_else(|| self.error("expected string"))?;
        self.pos += 1;
        while let Some(b) = self.peek() {
            self.pos += 1;
            if b == b'\\' {
                self.pos += 1;
            } else if b == quote {
                return Ok(Node::node("string", start, self.pos));
            }
        }
        Err(self.error("unterminated string"))
    }

    // ------------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------------

    fn component_declaration(&mut self) -> Result<Node> {
        let start = self.pos;
        let mut node =
            Node::node("component_declaration", start, start).child(self.word_token("component")?);
        self.skip_ws();

        if self.peek_word().is_some_and(|w| w != "extends") {
            node.push(self.identifier()?.field("name"));
            self.skip_ws();
        }

        if self.at_word("extends") {
            let h_start = self.pos;
            let extends_token = self.word_token("extends")?;
            let mut heritage = Node::node("component_heritage", h_start, h_start).child(extends_token);
            loop {
                self.skip_ws();
                heritage.push(self.identifier()?);
                if self.peek() == Some(b'.') {
                    let dot = self.pos;
                    self.pos += 1;
                    heritage.push(Node::token(".", dot, dot + 1));
                } else {
                    break;
                }
            }
            node.push(heritage.span_to(self.pos).field("heritage"));
            self.skip_ws();
        }

        let body = self.component_body("component_body")?;
        node.push(body.field("body"));
        Ok(node.span_to(self.pos))
    }

    fn instance_statement(&mut self) -> Result<Node> {
        let start = self.pos;
        let instance_token = self.word_token("instance")?;
        let ci_start = start;
        self.skip_ws();
        let name = self.identifier()?;
        let component_instance =
            Node::node("component_instance", ci_start, self.pos).child(instance_token).child(name);

        self.skip_ws();
        self.expect("=")?;
        self.skip_ws();

        let expression = self.new_component_expression()?;
        Ok(Node::node("component_instance_statement", start, self.pos)
            .child(component_instance)
            .child(expression))
    }

    fn component_body(&mut self, kind: &str) -> Result<Node> {
        let start = self.pos;
        self.expect("{")?;
        let mut body = Node::node(kind, start, start);
        loop {
            self.skip_ws();
            if self.eat("}") {
                break;
            }
            if self.pos >= self.src.len() {
                return Err(self.error("unterminated component body"));
            }
            self.body_item(&mut body)?;
        }
        Ok(body.span_to(self.pos))
    }

    fn body_item(&mut self, body: &mut Node) -> Result<()> {
        if self.at_word("id") {
            let save = self.pos;
            let start = self.pos;
            let id_token = self.word_token("id")?;
            self.skip_ws();
            if self.eat(":") {
                let colon = self.pos - 1;
                self.skip_ws();
                let value = self.identifier()?;
                body.push(
                    Node::node("identifier_property_assignment", start, self.pos)
                        .child(id_token)
                        .child(Node::token(":", colon, colon + 1))
                        .child(value),
                );
                return Ok(());
            }
            self.pos = save;
        }

        if self.at_word("constructor") {
            body.push(self.constructor_definition()?);
            return Ok(());
        }
        if self.at_word("event") {
            body.push(self.event_declaration()?);
            return Ok(());
        }
        if self.at_word("on") {
            body.push(self.listener_declaration()?);
            return Ok(());
        }
        if self.at_word("get") || self.at_word("set") {
            body.push(self.accessor_declaration()?);
            return Ok(());
        }
        if self.at_word("fn") || self.at_word("async") {
            body.push(self.typed_method(Vec::new())?);
            return Ok(());
        }
        if self.at_word("static") {
            let start = self.pos;
            let static_token = self.word_token("static")?;
            self.skip_ws();
            if self.at_word("fn") || self.at_word("async") {
                body.push(self.typed_method(vec![(static_token, start)])?);
            } else {
                body.push(self.static_property(start, static_token)?);
            }
            return Ok(());
        }
        if self.at_word("default") && self.word_then_ident() {
            // Marker before a nested default child; walked through.
            body.push(self.word_token("default")?);
            return Ok(());
        }

        // Remaining forms start with a (possibly dotted) identifier.
        if self.word_then_ident() && !self.word_is_dotted() {
            body.push(self.property_declaration()?);
            return Ok(());
        }

        let save = self.pos;
        let segments = self.dotted_name()?;
        self.skip_ws();
        match self.peek() {
            Some(b'{') | Some(b'(') => {
                self.pos = save;
                body.push(self.new_component_expression()?);
            }
            Some(b'"') => {
                self.pos = save;
                body.push(self.tagged_component()?);
            }
            Some(b':') | Some(b'=') => {
                body.push(self.property_assignment(save, segments)?);
            }
            _ => return Err(self.error("unexpected component body member")),
        }
        Ok(())
    }

    fn word_is_dotted(&self) -> bool {
        let bytes = self.bytes();
        let mut i = self.pos;
        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
            i += 1;
        }
        i < bytes.len() && bytes[i] == b'.'
    }

    /// `(start, end)` spans of a dotted name's segments.
    fn dotted_name(&mut self) -> Result<Vec<(usize, usize)>> {
        let mut segments = Vec::new();
        loop {
            let span = self.ident_span().ok_or_else(|| self.error("expected identifier"))?;
            segments.push(span);
            if self.peek() == Some(b'.')
                && self.bytes().get(self.pos + 1).is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_')
            {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(segments)
    }

    fn property_declaration(&mut self) -> Result<Node> {
        let start = self.pos;
        let type_node = self.identifier()?;
        self.skip_ws();
        let name = self.identifier()?;
        let mut node = Node::node("property_declaration", start, start)
            .child(type_node.field("type"))
            .child(name.field("name"));

        self.skip_ws();
        if self.eat(":") {
            let colon = self.pos - 1;
            node.push(Node::token(":", colon, colon + 1));
            self.skip_ws();
            if self.at("{") {
                node.push(self.statement_block()?);
            } else {
                let expr_start = self.pos;
                let expr = self.expression()?;
                node.push(
                    Node::node("property_assignment_expression", expr_start, self.pos).child(expr),
                );
            }
        } else if self.eat("=") {
            let eq = self.pos - 1;
            node.push(Node::token("=", eq, eq + 1));
            self.skip_ws();
            if self.at("{") {
                node.push(self.statement_block()?);
            } else {
                let expr_start = self.pos;
                let expr = self.expression()?;
                node.push(
                    Node::node("property_assignment_expression", expr_start, self.pos).child(expr),
                );
            }
        }
        Ok(node.span_to(self.pos))
    }

    fn property_assignment(&mut self, start: usize, segments: Vec<(usize, usize)>) -> Result<Node> {
        let name_node = if segments.len() == 1 {
            Node::node("identifier", segments[0].0, segments[0].1)
        } else {
            let mut nested =
                Node::node("nested_identifier", segments[0].0, segments[segments.len() - 1].1);
            for (s, e) in &segments {
                nested.push(Node::node("identifier", *s, *e));
            }
            nested
        };
        let mut node = Node::node("property_assignment", start, start).child(name_node.field("name"));

        self.skip_ws();
        if self.eat(":") {
            let colon = self.pos - 1;
            node.push(Node::token(":", colon, colon + 1));
        } else {
            self.expect("=")?;
            let eq = self.pos - 1;
            node.push(Node::token("=", eq, eq + 1));
        }

        self.skip_ws();
        if self.at("{") {
            node.push(self.statement_block()?);
        } else {
            let expr_start = self.pos;
            let expr = self.expression()?;
            node.push(Node::node("property_assignment_expression", expr_start, self.pos).child(expr));
        }
        Ok(node.span_to(self.pos))
    }

    fn static_property(&mut self, start: usize, static_token: Node) -> Result<Node> {
        let type_node = self.identifier()?;
        self.skip_ws();
        let name = self.identifier()?;
        let mut node = Node::node("static_property_declaration", start, start)
            .child(static_token)
            .child(type_node.field("type"))
            .child(name.field("name"));

        self.skip_ws();
        if self.at("=") {
            let eq = self.pos;
            self.pos += 1;
            self.skip_ws();
            let expr = self.expression()?;
            node.push(
                Node::node("property_expression_initializer", eq, self.pos)
                    .child(Node::token("=", eq, eq + 1))
                    .child(expr),
            );
        }
        Ok(node.span_to(self.pos))
    }

    fn event_declaration(&mut self) -> Result<Node> {
        let start = self.pos;
        let event_token = self.word_token("event")?;
        self.skip_ws();
        let name = self.identifier()?;
        self.skip_ws();
        let parameters = self.formal_type_parameters()?;
        Ok(Node::node("event_declaration", start, self.pos)
            .child(event_token)
            .child(name.field("name"))
            .child(parameters.field("parameters")))
    }

    fn listener_declaration(&mut self) -> Result<Node> {
        let start = self.pos;
        let on_token = self.word_token("on")?;
        self.skip_ws();
        let (s, e) = self.ident_span().ok_or_else(|| self.error("expected listener name"))?;
        let name = Node::node("property_identifier", s, e);
        self.skip_ws();
        let parameters = self.formal_parameters()?;
        self.skip_ws();
        let body = self.statement_block()?;
        Ok(Node::node("listener_declaration", start, self.pos)
            .child(on_token)
            .child(name)
            .child(parameters)
            .child(body.field("body")))
    }

    fn accessor_declaration(&mut self) -> Result<Node> {
        let start = self.pos;
        let keyword = if self.at_word("get") { "get" } else { "set" };
        let keyword_token = self.word_token(keyword)?;
        self.skip_ws();
        let (s, e) = self.ident_span().ok_or_else(|| self.error("expected accessor name"))?;
        let name = Node::node("property_identifier", s, e);
        self.skip_ws();

        let mut node = Node::node("property_accessor_declaration", start, start)
            .child(keyword_token)
            .child(name.field("name"));
        if keyword == "set" {
            node.push(self.formal_type_parameters()?.field("parameters"));
        } else {
            self.expect("(")?;
            self.skip_ws();
            self.expect(")")?;
        }
        self.skip_ws();
        node.push(self.statement_block()?.field("body"));
        Ok(node.span_to(self.pos))
    }

    fn typed_method(&mut self, mut tokens: Vec<(Node, usize)>) -> Result<Node> {
        let mut start = self.pos;
        if let Some((_, s)) = tokens.first() {
            start = *s;
        }
        if self.at_word("async") {
            let s = self.pos;
            tokens.push((self.word_token("async")?, s));
            self.skip_ws();
        }
        let fn_token = self.word_token("fn")?;
        self.skip_ws();
        let name = self.identifier()?;
        self.skip_ws();
        let parameters = self.formal_type_parameters()?;
        self.skip_ws();
        let body = self.statement_block()?;

        let mut node = Node::node("typed_method_declaration", start, self.pos);
        for (token, _) in tokens {
            node.push(token);
        }
        node.push(fn_token);
        node.push(name.field("name"));
        node.push(parameters.field("parameters"));
        node.push(body.field("body"));
        Ok(node)
    }

    fn constructor_definition(&mut self) -> Result<Node> {
        let start = self.pos;
        let constructor_token = self.word_token("constructor")?;
        self.skip_ws();
        let parameters = self.formal_type_parameters()?;
        self.skip_ws();
        let body = self.statement_block()?;
        Ok(Node::node("constructor_definition", start, self.pos)
            .child(constructor_token)
            .child(parameters)
            .child(body))
    }

    /// `(int a, string b)` — typed parameters.
    fn formal_type_parameters(&mut self) -> Result<Node> {
        let start = self.pos;
        self.expect("(")?;
        let mut node = Node::node("formal_type_parameters", start, start);
        loop {
            self.skip_ws();
            if self.eat(")") {
                break;
            }
            let p_start = self.pos;
            let type_node = self.identifier()?;
            self.skip_ws();
            let name = self.identifier()?;
            let required = Node::node("required_type_parameter", p_start, self.pos)
                .child(type_node.field("type"))
                .child(name.field("name"));
            node.push(Node::node("formal_type_parameter", p_start, self.pos).child(required));
            self.skip_ws();
            if !self.eat(",") && !self.at(")") {
                return Err(self.error("expected ',' or ')' in parameter list"));
            }
        }
        Ok(node.span_to(self.pos))
    }

    /// `(a, b)` — plain parameters.
    fn formal_parameters(&mut self) -> Result<Node> {
        let start = self.pos;
        self.expect("(")?;
        let mut node = Node::node("formal_parameters", start, start);
        loop {
            self.skip_ws();
            if self.eat(")") {
                break;
            }
            node.push(self.identifier()?);
            self.skip_ws();
            if !self.eat(",") && !self.at(")") {
                return Err(self.error("expected ',' or ')' in parameter list"));
            }
        }
        Ok(node.span_to(self.pos))
    }

    fn new_component_expression(&mut self) -> Result<Node> {
        let start = self.pos;
        let segments = self.dotted_name()?;
        let mut node = Node::node("new_component_expression", start, start);
        if segments.len() == 1 {
            node.push(Node::node("identifier", segments[0].0, segments[0].1));
        } else {
            let mut nested =
                Node::node("nested_identifier", segments[0].0, segments[segments.len() - 1].1);
            for (s, e) in &segments {
                nested.push(Node::node("identifier", *s, *e));
            }
            node.push(nested);
        }
        self.skip_ws();
        if self.at("(") {
            node.push(self.arguments()?);
            self.skip_ws();
        }
        node.push(self.component_body("new_component_body")?);
        Ok(node.span_to(self.pos))
    }

    fn tagged_component(&mut self) -> Result<Node> {
        let start = self.pos;
        let name = self.identifier()?;
        if self.at("\"\"\"") {
            let s = self.pos;
            self.pos += 3;
            while self.pos < self.src.len() && !self.at("\"\"\"") {
                self.pos += 1;
            }
            self.expect("\"\"\"")?;
            let value = Node::node("tripple_tagged_type_string", s, self.pos);
            return Ok(Node::node("new_tripple_tagged_component_expression", start, self.pos)
                .child(name)
                .child(value));
        }
        let string = self.string_literal()?;
        let value = Node::node("tagged_type_string", string.span().0, string.span().1);
        Ok(Node::node("new_tagged_component_expression", start, self.pos).child(name).child(value))
    }

    fn arguments(&mut self) -> Result<Node> {
        let start = self.pos;
        self.expect("(")?;
        let mut node =
            Node::node("arguments", start, start).child(Node::token("(", start, start + 1));
        loop {
            self.skip_ws();
            if self.at(")") {
                break;
            }
            node.push(self.expression()?);
            self.skip_ws();
            if !self.eat(",") && !self.at(")") {
                return Err(self.error("expected ',' or ')' in arguments"));
            }
        }
        let close = self.pos;
        self.expect(")")?;
        node.push(Node::token(")", close, close + 1));
        Ok(node.span_to(self.pos))
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    fn statement_block(&mut self) -> Result<Node> {
        let start = self.pos;
        self.expect("{")?;
        let mut node = Node::node("statement_block", start, start);
        loop {
            self.skip_ws();
            if self.eat("}") {
                break;
            }
            if self.pos >= self.src.len() {
                return Err(self.error("unterminated block"));
            }
            node.push(self.statement()?);
        }
        Ok(node.span_to(self.pos))
    }

    fn statement(&mut self) -> Result<Node> {
        if self.at_word("var") || self.at_word("let") || self.at_word("const") {
            return self.variable_declaration();
        }
        if self.at_word("return") {
            let start = self.pos;
            let return_token = self.word_token("return")?;
            self.skip_ws();
            let mut node = Node::node("return_statement", start, start).child(return_token);
            if !self.at("}") && !self.at(";") {
                node.push(self.expression()?);
            }
            if self.at(";") {
                let semi = self.pos;
                self.pos += 1;
                node.push(Node::token(";", semi, semi + 1));
            }
            return Ok(node.span_to(self.pos));
        }
        if self.at_word("this") {
            // `this{ a: 1 }` is the constructor initializer form.
            let save = self.pos;
            let this_start = self.pos;
            self.pos += 4;
            self.skip_ws();
            if self.at("{") {
                return self.constructor_initializer(this_start);
            }
            self.pos = save;
        }

        let start = self.pos;
        let expr = self.expression()?;
        let mut statement = Node::node("expression_statement", start, start);
        self.skip_ws();
        if self.at("=") && !self.at("==") {
            let eq = self.pos;
            self.pos += 1;
            self.skip_ws();
            let right = self.expression()?;
            let assignment = Node::node("assignment_expression", start, self.pos)
                .child(expr.field("left"))
                .child(Node::token("=", eq, eq + 1))
                .child(right.field("right"));
            statement.push(assignment);
        } else {
            statement.push(expr);
        }
        if self.at(";") {
            let semi = self.pos;
            self.pos += 1;
            statement.push(Node::token(";", semi, semi + 1));
        }
        Ok(statement.span_to(self.pos))
    }

    fn variable_declaration(&mut self) -> Result<Node> {
        let start = self.pos;
        let keyword = if self.at_word("var") {
            "var"
        } else if self.at_word("let") {
            "let"
        } else {
            "const"
        };
        let keyword_token = self.word_token(keyword)?;
        let kind = if keyword == "var" { "variable_declaration" } else { "lexical_declaration" };
        let mut node = Node::node(kind, start, start);
        if keyword == "var" {
            node.push(keyword_token);
        } else {
            node.push(keyword_token.field("kind"));
        }

        loop {
            self.skip_ws();
            let d_start = self.pos;
            let name = self.identifier()?;
            let mut declarator =
                Node::node("variable_declarator", d_start, d_start).child(name.field("name"));
            self.skip_ws();
            if self.eat("=") {
                self.skip_ws();
                declarator.push(self.expression()?.field("value"));
            }
            node.push(declarator.span_to(self.pos));
            self.skip_ws();
            if !self.eat(",") {
                break;
            }
        }
        if self.at(";") {
            let semi = self.pos;
            self.pos += 1;
            node.push(Node::token(";", semi, semi + 1));
        }
        Ok(node.span_to(self.pos))
    }

    fn constructor_initializer(&mut self, start: usize) -> Result<Node> {
        let mut node = Node::node("constructor_initializer", start, start)
            .child(Node::token("this", start, start + 4));
        self.expect("{")?;
        loop {
            self.skip_ws();
            if self.eat("}") {
                break;
            }
            let a_start = self.pos;
            let name = self.identifier()?;
            self.skip_ws();
            self.expect(":")?;
            self.skip_ws();
            let value = self.expression()?;
            node.push(
                Node::node("constructor_initializer_assignment", a_start, self.pos)
                    .child(name.field("name"))
                    .child(value.field("value")),
            );
            self.skip_ws();
            self.eat(",");
        }
        Ok(node.span_to(self.pos))
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn expression(&mut self) -> Result<Node> {
        let start = self.pos;
        let mut left = self.postfix_expression()?;
        loop {
            let save = self.pos;
            self.skip_ws();
            let op = ["&&", "||", "==", "!=", "<=", ">=", "+", "-", "*", "/", "%", "<", ">"]
                .iter()
                .find(|op| self.at(op))
                .copied();
            let Some(op) = op else {
                self.pos = save;
                break;
            };
            let op_start = self.pos;
            self.pos += op.len();
            self.skip_ws();
            let right = self.postfix_expression()?;
            left = Node::node("binary_expression", start, self.pos)
                .child(left)
                .child(Node::token(op, op_start, op_start + op.len()))
                .child(right);
        }
        Ok(left)
    }

    fn postfix_expression(&mut self) -> Result<Node> {
        let start = self.pos;
        let mut expr = self.primary_expression()?;
        loop {
            if self.at(".") && self.bytes().get(self.pos + 1).is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_') {
                let dot = self.pos;
                self.pos += 1;
                let (s, e) = self.ident_span().ok_or_else(|| self.error("expected member name"))?;
                expr = Node::node("member_expression", start, self.pos)
                    .child(expr)
                    .child(Node::token(".", dot, dot + 1))
                    .child(Node::node("property_identifier", s, e));
            } else if self.at("(") {
                let arguments = self.arguments()?;
                expr = Node::node("call_expression", start, self.pos).child(expr).child(arguments);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary_expression(&mut self) -> Result<Node> {
        match self.peek() {
            Some(b) if b.is_ascii_digit() => {
                let start = self.pos;
                while self.peek().is_some_and(|b| b.is_ascii_digit() || b == b'.') {
                    self.pos += 1;
                }
                Ok(Node::node("number", start, self.pos))
            }
            Some(b'"') | Some(b'\'') => self.string_literal(),
            Some(b'(') => {
                let start = self.pos;
                self.pos += 1;
                self.skip_ws();
                let inner = self.expression()?;
                self.skip_ws();
                self.expect(")")?;
                Ok(Node::node("parenthesized_expression", start, self.pos).child(inner))
            }
            _ => {
                if self.at_word("new") {
                    let start = self.pos;
                    let new_token = self.word_token("new")?;
                    self.skip_ws();
                    let name = self.identifier()?;
                    let mut node =
                        Node::node("new_expression", start, start).child(new_token).child(name);
                    if self.at("(") {
                        node.push(self.arguments()?);
                    }
                    return Ok(node.span_to(self.pos));
                }
                if self.at_word("this") {
                    let start = self.pos;
                    self.pos += 4;
                    return Ok(Node::node("this", start, self.pos));
                }
                if self.at_word("super") {
                    let start = self.pos;
                    self.pos += 5;
                    return Ok(Node::node("super", start, self.pos));
                }

                // A (dotted) identifier; with a body it is a nested
                // component, with a string it is a tagged component.
                let save = self.pos;
                self.dotted_name()?;
                if self.at("\"") {
                    self.pos = save;
                    return self.tagged_component();
                }
                self.skip_ws();
                let is_component = self.at("{");
                self.pos = save;
                if is_component {
                    return self.new_component_expression();
                }
                // Just the head identifier; the postfix loop rebuilds the
                // member chain.
                let (s, e) = self.ident_span().ok_or_else(|| self.error("expected identifier"))?;
                Ok(Node::node("identifier", s, e))
            }
        }
    }
}
