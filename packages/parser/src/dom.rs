use crate::error::{ParseError, ParseResult};
use crate::provenance::{DataParsoid, SourceRange};
use crate::token::{Attributes, TagToken, TextToken, Token};
use crate::tokenizer::VOID_TAGS;
use crate::visitor::{walk_element, walk_element_mut, Visitor, VisitorMut};
use serde::{Deserialize, Serialize};

/// Node of the annotated document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Node {
    Element(Element),
    Text(Text),
    Comment(Comment),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attrs: Attributes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
    #[serde(default, skip_serializing_if = "DataParsoid::is_empty")]
    pub data: DataParsoid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<SourceRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<SourceRange>,
}

/// A parsed page. The body element owns the top-level nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub body: Element,
}

impl Node {
    pub fn text(value: impl Into<String>) -> Self {
        Node::Text(Text {
            value: value.into(),
            range: None,
        })
    }

    pub fn range(&self) -> Option<SourceRange> {
        match self {
            Node::Element(el) => el.data.source_range,
            Node::Text(t) => t.range,
            Node::Comment(c) => c.range,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    /// Name used to pair a node with its counterpart in another tree.
    pub fn node_name(&self) -> &str {
        match self {
            Node::Element(el) => &el.name,
            Node::Text(_) => "#text",
            Node::Comment(_) => "#comment",
        }
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    pub fn strip_provenance(&mut self) {
        StripProvenance.visit_node_mut(self);
    }

    /// Flatten back into a token stream that rebuilds this node.
    pub fn to_tokens(&self, out: &mut Vec<Token>) {
        match self {
            Node::Text(t) => out.push(Token::Text(TextToken::new(&t.value, t.range))),
            Node::Comment(c) => out.push(Token::Comment(TextToken::new(&c.value, c.range))),
            Node::Element(el) => {
                let tag = TagToken {
                    name: el.name.clone(),
                    attrs: el.attrs.clone(),
                    data: el.data.clone(),
                };
                if el.children.is_empty() && VOID_TAGS.contains(&el.name.as_str()) {
                    out.push(Token::SelfClosingTag(tag));
                    return;
                }
                out.push(Token::StartTag(tag));
                for child in &el.children {
                    child.to_tokens(out);
                }
                out.push(Token::EndTag(TagToken::new(el.name.clone())));
            }
        }
    }
}

fn collect_text(node: &Node, out: &mut String) {
    match node {
        Node::Text(t) => out.push_str(&t.value),
        Node::Comment(_) => {}
        Node::Element(el) => {
            for child in &el.children {
                collect_text(child, out);
            }
        }
    }
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Attributes::new(),
            children: Vec::new(),
            data: DataParsoid::default(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.set(key, value);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn range(&self) -> Option<SourceRange> {
        self.data.source_range
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            collect_text(child, &mut out);
        }
        out
    }

    /// Same tag, attributes and provenance; children are not compared.
    pub fn shallow_eq(&self, other: &Element) -> bool {
        self.name == other.name && self.attrs == other.attrs && self.data == other.data
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            body: Element::new("body"),
        }
    }

    pub fn children(&self) -> &[Node] {
        &self.body.children
    }

    pub fn strip_provenance(&mut self) {
        StripProvenance.visit_element_mut(&mut self.body);
    }

    pub fn has_provenance(&self) -> bool {
        let mut finder = ProvenanceFinder { found: false };
        finder.visit_element(&self.body);
        finder.found
    }

    /// Check that every recorded range lies inside `[base, base + len)` of the source.
    pub fn validate_provenance(&self, base: usize, len: usize) -> ParseResult<()> {
        let mut check = RangeCheck {
            base,
            end: base + len,
            error: None,
        };
        check.visit_element(&self.body);
        match check.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Render as HTML with provenance in `data-parsoid` attributes.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        render_element(&self.body, &mut out);
        out
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

struct StripProvenance;

impl VisitorMut for StripProvenance {
    fn visit_element_mut(&mut self, element: &mut Element) {
        element.data.strip_source();
        walk_element_mut(self, element);
    }

    fn visit_text_mut(&mut self, text: &mut Text) {
        text.range = None;
    }

    fn visit_comment_mut(&mut self, comment: &mut Comment) {
        comment.range = None;
    }
}

struct ProvenanceFinder {
    found: bool,
}

impl Visitor for ProvenanceFinder {
    fn visit_element(&mut self, element: &Element) {
        if element.data.has_range() {
            self.found = true;
            return;
        }
        walk_element(self, element);
    }

    fn visit_text(&mut self, text: &Text) {
        self.found |= text.range.is_some();
    }

    fn visit_comment(&mut self, comment: &Comment) {
        self.found |= comment.range.is_some();
    }
}

struct RangeCheck {
    base: usize,
    end: usize,
    error: Option<ParseError>,
}

impl RangeCheck {
    fn check(&mut self, range: Option<SourceRange>) {
        let Some(range) = range else { return };
        if self.error.is_none()
            && (range.start > range.end || range.start < self.base || range.end > self.end)
        {
            self.error = Some(ParseError::invalid_range(range.start, range.end, self.end));
        }
    }
}

impl Visitor for RangeCheck {
    fn visit_element(&mut self, element: &Element) {
        self.check(element.data.source_range);
        walk_element(self, element);
    }

    fn visit_text(&mut self, text: &Text) {
        self.check(text.range);
    }

    fn visit_comment(&mut self, comment: &Comment) {
        self.check(comment.range);
    }
}

fn render_element(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.name);
    for (k, v) in el.attrs.iter() {
        out.push(' ');
        out.push_str(k);
        out.push_str("=\"");
        out.push_str(&escape_html(v));
        out.push('"');
    }
    if !el.data.is_empty() {
        let json = serde_json::to_string(&el.data).unwrap_or_default();
        out.push_str(" data-parsoid='");
        out.push_str(&json.replace('&', "&amp;").replace('\'', "&#39;"));
        out.push('\'');
    }
    out.push('>');
    if el.children.is_empty() && VOID_TAGS.contains(&el.name.as_str()) {
        return;
    }
    for child in &el.children {
        match child {
            Node::Element(child) => render_element(child, out),
            Node::Text(t) => out.push_str(&escape_html(&t.value)),
            Node::Comment(c) => {
                out.push_str("<!--");
                out.push_str(&c.value);
                out.push_str("-->");
            }
        }
    }
    out.push_str("</");
    out.push_str(&el.name);
    out.push('>');
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        let mut doc = Document::new();
        let mut p = Element::new("p").with_child(Node::Text(Text {
            value: "a < b".to_string(),
            range: Some(SourceRange::new(0, 5)),
        }));
        p.data = DataParsoid::with_range(0, 5).widths(0, 0);
        doc.body.children.push(Node::Element(p));
        doc
    }

    #[test]
    fn test_to_html() {
        let html = sample().to_html();
        assert_eq!(
            html,
            r#"<body><p data-parsoid='{"sourceRange":[0,5],"tagWidths":[0,0]}'>a &lt; b</p></body>"#
        );
    }

    #[test]
    fn test_validate_provenance() {
        let doc = sample();
        assert!(doc.validate_provenance(0, 5).is_ok());
        assert!(doc.validate_provenance(0, 4).is_err());
        assert!(doc.validate_provenance(1, 10).is_err());
    }

    #[test]
    fn test_strip_provenance() {
        let mut doc = sample();
        assert!(doc.has_provenance());
        doc.strip_provenance();
        assert!(!doc.has_provenance());
    }

    #[test]
    fn test_json_round_trip() {
        let doc = sample();
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains(r#""type":"Element""#));
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_to_tokens() {
        let doc = sample();
        let mut tokens = Vec::new();
        doc.body.children[0].to_tokens(&mut tokens);
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].tag_name(), Some("p"));
    }
}
