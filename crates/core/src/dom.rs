//! Tolerant HTML parsing into an arena-backed document tree.
//!
//! This module provides the [`Document`] and [`Node`] types. A document is
//! a flat arena of nodes addressed by index; parents hold child indices and
//! every non-root node carries a parent index for upward navigation. The
//! arena owns all nodes, so parent links never create ownership cycles.
//!
//! Parsing never fails: unmatched close tags are ignored and elements left
//! open at end of input are closed implicitly.
//!
//! # Example
//!
//! ```rust
//! use pricewatch_core::dom::Document;
//!
//! let doc = Document::parse("<div class=\"price\">1 299</div>");
//! let div = doc.node(doc.node(doc.root()).children[0]);
//! assert_eq!(div.tag, "div");
//! assert_eq!(div.attrs.get("class").map(String::as_str), Some("price"));
//! ```

use std::collections::HashMap;

/// Tag name used for the synthetic root node.
pub const ROOT_TAG: &str = "document";

/// Elements that never take content and never go on the open-element stack.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// A single element in the document arena.
#[derive(Debug, Clone)]
pub struct Node {
    /// Lowercased tag name; the root uses [`ROOT_TAG`].
    pub tag: String,
    /// Attribute name to value. Names are lowercased; duplicate names keep
    /// the last value.
    pub attrs: HashMap<String, String>,
    /// Text accumulated directly under this element (child text excluded).
    pub text: String,
    /// Index of the parent node. `None` only for the root.
    pub parent: Option<usize>,
    /// Indices of child nodes in document order.
    pub children: Vec<usize>,
}

impl Node {
    fn new(tag: String, attrs: HashMap<String, String>, parent: Option<usize>) -> Self {
        Self { tag, attrs, text: String::new(), parent, children: Vec::new() }
    }

    /// Value of an attribute by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Space-separated class attribute split into individual class names.
    pub fn classes(&self) -> Vec<&str> {
        self.attr("class").map(|c| c.split_whitespace().collect()).unwrap_or_default()
    }
}

/// A parsed HTML document.
///
/// Node 0 is always a synthetic root with tag [`ROOT_TAG`]; real elements
/// hang below it. The tree is finite and acyclic by construction: children
/// are only ever appended to an already-existing parent.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    /// Parses markup into a document tree.
    ///
    /// This is a total function: malformed markup degrades gracefully
    /// instead of failing. Comments, doctypes, and processing instructions
    /// are skipped; `script` and `style` bodies are consumed as raw text.
    pub fn parse(html: &str) -> Self {
        Parser::new(html).run()
    }

    /// Index of the synthetic root node.
    pub fn root(&self) -> usize {
        0
    }

    /// Borrow a node by index.
    ///
    /// # Panics
    ///
    /// Panics when the index does not belong to this document.
    pub fn node(&self, id: usize) -> &Node {
        &self.nodes[id]
    }

    /// Number of nodes including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the document holds nothing but the root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Accumulated text of a node: own text followed by each child's text,
    /// in document order.
    pub fn all_text(&self, id: usize) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: usize, out: &mut String) {
        let node = &self.nodes[id];
        out.push_str(&node.text);
        for &child in &node.children {
            self.collect_text(child, out);
        }
    }

    /// All descendants of `scope` in preorder, excluding `scope` itself.
    ///
    /// Preorder over the arena is the canonical traversal order; selector
    /// matching and field scoring both resolve ties through it.
    pub fn descendants(&self, scope: usize) -> Vec<usize> {
        let mut out = Vec::new();
        self.push_descendants(scope, &mut out);
        out
    }

    fn push_descendants(&self, id: usize, out: &mut Vec<usize>) {
        for &child in &self.nodes[id].children {
            out.push(child);
            self.push_descendants(child, out);
        }
    }
}

struct Parser<'a> {
    input: &'a [u8],
    src: &'a str,
    pos: usize,
    nodes: Vec<Node>,
    /// Open-element stack; always starts with the root.
    stack: Vec<usize>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        let root = Node::new(ROOT_TAG.to_string(), HashMap::new(), None);
        Self { input: src.as_bytes(), src, pos: 0, nodes: vec![root], stack: vec![0] }
    }

    fn run(mut self) -> Document {
        while self.pos < self.input.len() {
            if self.input[self.pos] == b'<' {
                self.handle_markup();
            } else {
                self.handle_text();
            }
        }
        Document { nodes: self.nodes }
    }

    fn current(&self) -> usize {
        *self.stack.last().unwrap_or(&0)
    }

    fn handle_text(&mut self) {
        let start = self.pos;
        while self.pos < self.input.len() && self.input[self.pos] != b'<' {
            self.pos += 1;
        }
        let chunk = &self.src[start..self.pos];
        if !chunk.trim().is_empty() {
            let decoded = decode_entities(chunk);
            let current = self.current();
            self.nodes[current].text.push_str(&decoded);
        }
    }

    fn handle_markup(&mut self) {
        let rest = &self.src[self.pos..];
        if rest.starts_with("<!--") {
            self.skip_until(self.pos + 4, "-->");
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            self.skip_until(self.pos + 2, ">");
        } else if rest.starts_with("</") {
            self.handle_close_tag();
        } else if rest.len() > 1 && rest.as_bytes()[1].is_ascii_alphabetic() {
            self.handle_open_tag();
        } else {
            // Bare '<' in text, e.g. "price < 100".
            let current = self.current();
            self.nodes[current].text.push('<');
            self.pos += 1;
        }
    }

    fn skip_until(&mut self, from: usize, marker: &str) {
        match self.src[from..].find(marker) {
            Some(offset) => self.pos = from + offset + marker.len(),
            None => self.pos = self.input.len(),
        }
    }

    fn handle_close_tag(&mut self) {
        self.pos += 2;
        let name = self.read_name();
        // Discard anything up to the closing angle bracket.
        while self.pos < self.input.len() && self.input[self.pos] != b'>' {
            self.pos += 1;
        }
        if self.pos < self.input.len() {
            self.pos += 1;
        }

        // Pop through the nearest open ancestor with the same tag. A close
        // tag that matches nothing on the stack is a no-op.
        if let Some(depth) = self.stack.iter().rposition(|&id| id != 0 && self.nodes[id].tag == name)
        {
            self.stack.truncate(depth);
        }
    }

    fn handle_open_tag(&mut self) {
        self.pos += 1;
        let name = self.read_name();
        let mut attrs = HashMap::new();
        let mut self_closing = false;

        loop {
            self.skip_whitespace();
            if self.pos >= self.input.len() {
                break;
            }
            match self.input[self.pos] {
                b'>' => {
                    self.pos += 1;
                    break;
                }
                b'/' => {
                    self.pos += 1;
                    if self.pos < self.input.len() && self.input[self.pos] == b'>' {
                        self.pos += 1;
                        self_closing = true;
                        break;
                    }
                }
                _ => {
                    if let Some((attr_name, attr_value)) = self.read_attribute() {
                        attrs.insert(attr_name, attr_value);
                    }
                }
            }
        }

        let parent = self.current();
        let id = self.nodes.len();
        self.nodes.push(Node::new(name.clone(), attrs, Some(parent)));
        self.nodes[parent].children.push(id);

        if self_closing || VOID_TAGS.contains(&name.as_str()) {
            return;
        }

        if name == "script" || name == "style" {
            self.consume_raw_text(id, &name);
        } else {
            self.stack.push(id);
        }
    }

    /// Consume everything up to the matching close tag as the element's own
    /// text. Script bodies may contain `<`, so plain text scanning does not
    /// apply here.
    fn consume_raw_text(&mut self, id: usize, tag: &str) {
        let bytes = self.input;
        let needle = tag.as_bytes();
        let mut end = bytes.len();

        let mut i = self.pos;
        while i + 2 + needle.len() <= bytes.len() {
            if bytes[i] == b'<'
                && bytes[i + 1] == b'/'
                && bytes[i + 2..i + 2 + needle.len()].eq_ignore_ascii_case(needle)
            {
                end = i;
                break;
            }
            i += 1;
        }

        let body = &self.src[self.pos..end];
        if !body.trim().is_empty() {
            self.nodes[id].text.push_str(body);
        }
        self.pos = end;
        if self.pos < self.input.len() {
            self.skip_until(self.pos, ">");
        }
    }

    fn read_name(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.input.len() {
            let c = self.input[self.pos];
            if c.is_ascii_alphanumeric() || c == b'-' || c == b'_' || c == b':' {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.src[start..self.pos].to_ascii_lowercase()
    }

    fn read_attribute(&mut self) -> Option<(String, String)> {
        let name = self.read_name();
        if name.is_empty() {
            // Unparseable byte inside a tag; skip it to guarantee progress.
            self.pos += 1;
            return None;
        }
        self.skip_whitespace();
        if self.pos >= self.input.len() || self.input[self.pos] != b'=' {
            return Some((name, String::new()));
        }
        self.pos += 1;
        self.skip_whitespace();

        let value = if self.pos < self.input.len()
            && (self.input[self.pos] == b'"' || self.input[self.pos] == b'\'')
        {
            let quote = self.input[self.pos];
            self.pos += 1;
            let start = self.pos;
            while self.pos < self.input.len() && self.input[self.pos] != quote {
                self.pos += 1;
            }
            let raw = &self.src[start..self.pos];
            if self.pos < self.input.len() {
                self.pos += 1;
            }
            raw.to_string()
        } else {
            let start = self.pos;
            while self.pos < self.input.len() {
                let c = self.input[self.pos];
                if c.is_ascii_whitespace() || c == b'>' {
                    break;
                }
                self.pos += 1;
            }
            self.src[start..self.pos].to_string()
        };

        Some((name, decode_entities(&value)))
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }
}

/// Decode the character references that show up in real-world markup.
///
/// Named references outside the common set pass through untouched.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let end = rest[1..].find(';').map(|o| o + 1);
        let replacement = end.and_then(|semi| {
            let entity = &rest[1..semi];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => {
                    if let Some(num) =
                        entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X"))
                    {
                        u32::from_str_radix(num, 16).ok().and_then(char::from_u32)
                    } else if let Some(num) = entity.strip_prefix('#') {
                        num.parse::<u32>().ok().and_then(char::from_u32)
                    } else {
                        None
                    }
                }
            };
            decoded.map(|c| (c, semi + 1))
        });

        match replacement {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
