use crate::dom::{Comment, Document, Element, Node, Text};
use crate::provenance::{DataParsoid, SourceRange, TagWidths};
use crate::token::{TagToken, Token};
use tracing::trace;

/// Children a table or row may hold directly; anything else is fostered.
const TABLE_CONTENT: &[&str] = &["tr", "td", "th", "caption", "tbody", "thead", "tfoot"];

const BLOCK_TAGS: &[&str] = &[
    "blockquote", "center", "div", "dl", "figure", "h1", "h2", "h3", "h4", "h5", "h6", "hr",
    "ol", "p", "table", "ul",
];

/// Elements that stop the search for an open `<p>`.
const PARAGRAPH_SCOPE: &[&str] = &["table", "td", "th", "caption", "li", "dt", "dd", "div"];

struct OpenElement {
    element: Element,
    start: Option<SourceRange>,
    preset: bool,
    foster_parent: Option<usize>,
}

enum Close {
    Explicit(TagToken),
    Implicit(Option<usize>),
}

/// Builds a document from a finished token stream.
///
/// Start tags widen their delimiter range to cover the whole element once the
/// matching end tag (or an implicit close) is seen. Tokens whose data already
/// carries tag widths are taken to describe the complete element and are kept
/// as they are.
pub struct TreeBuilder {
    stack: Vec<OpenElement>,
    last_pos: Option<usize>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            stack: vec![OpenElement {
                element: Element::new("body"),
                start: None,
                preset: true,
                foster_parent: None,
            }],
            last_pos: None,
        }
    }

    pub fn push(&mut self, token: Token) {
        let pos = token.start().or(self.last_pos);
        let end = token.end();
        match token {
            Token::StartTag(tag) => self.start_tag(tag, pos),
            Token::EndTag(tag) => self.end_tag(tag, pos),
            Token::SelfClosingTag(tag) => self.self_closing(tag, pos),
            Token::Text(t) => self.text(t.value, t.range),
            Token::Newline(range) => self.text("\n".to_string(), range),
            Token::Comment(c) => self.append(
                Node::Comment(Comment {
                    value: c.value,
                    range: c.range,
                }),
                None,
            ),
            Token::EndOfInput(end) => self.pop_to(1, Some(end)),
        }
        if let Some(end) = end {
            self.last_pos = Some(self.last_pos.map_or(end, |last| last.max(end)));
        }
    }

    pub fn finish(mut self) -> Document {
        let pos = self.last_pos;
        self.pop_to(1, pos);
        let body = self
            .stack
            .pop()
            .map(|open| open.element)
            .unwrap_or_else(|| Element::new("body"));
        Document { body }
    }

    fn top_name(&self) -> &str {
        self.stack
            .last()
            .map(|open| open.element.name.as_str())
            .unwrap_or("body")
    }

    fn start_tag(&mut self, tag: TagToken, pos: Option<usize>) {
        self.apply_implied_closes(&tag.name, pos);

        let foster_parent = self.foster_parent(&tag.name);
        let preset = tag.data.tag_widths.is_some();
        let start = tag.range();
        let mut element = Element {
            name: tag.name,
            attrs: tag.attrs,
            children: Vec::new(),
            data: tag.data,
        };
        element.data.fostered |= foster_parent.is_some();

        self.stack.push(OpenElement {
            element,
            start,
            preset,
            foster_parent,
        });
    }

    fn self_closing(&mut self, tag: TagToken, pos: Option<usize>) {
        if BLOCK_TAGS.contains(&tag.name.as_str()) {
            self.close_until(&["p"], PARAGRAPH_SCOPE, pos);
        }
        let foster_parent = self.foster_parent(&tag.name);
        let mut data = tag.data;
        if data.tag_widths.is_none() {
            if let Some(range) = data.source_range {
                data.tag_widths = Some(TagWidths::new(range.len(), 0));
            }
        }
        data.fostered |= foster_parent.is_some();
        let element = Element {
            name: tag.name,
            attrs: tag.attrs,
            children: Vec::new(),
            data,
        };
        self.append(Node::Element(element), foster_parent);
    }

    fn end_tag(&mut self, tag: TagToken, pos: Option<usize>) {
        let mut found = None;
        for (idx, open) in self.stack.iter().enumerate().skip(1).rev() {
            if open.element.name == tag.name {
                found = Some(idx);
                break;
            }
            if open.element.name == "table" {
                break;
            }
        }

        match found {
            Some(idx) => {
                self.pop_to(idx + 1, pos);
                self.pop_one(Close::Explicit(tag));
            }
            None => {
                let range = tag.range();
                let synthetic = tag.data.auto_inserted_end || range.map_or(true, |r| r.is_empty());
                if synthetic && tag.data.src.is_none() {
                    trace!(name = %tag.name, "dropping unmatched synthetic end tag");
                    return;
                }
                let value = tag
                    .data
                    .src
                    .clone()
                    .unwrap_or_else(|| format!("</{}>", tag.name));
                trace!(name = %tag.name, "unmatched end tag kept as text");
                self.text(value, range);
            }
        }
    }

    fn text(&mut self, value: String, range: Option<SourceRange>) {
        if value.is_empty() {
            return;
        }
        let foster_parent = if value.chars().all(char::is_whitespace) {
            None
        } else {
            self.foster_parent("#text")
        };
        let target = self.children_mut(foster_parent);
        if let Some(Node::Text(last)) = target.last_mut() {
            match (last.range, range) {
                (Some(a), Some(b)) if a.end == b.start => {
                    last.value.push_str(&value);
                    last.range = Some(SourceRange::new(a.start, b.end));
                    return;
                }
                (None, None) => {
                    last.value.push_str(&value);
                    return;
                }
                _ => {}
            }
        }
        target.push(Node::Text(Text { value, range }));
    }

    fn append(&mut self, node: Node, foster_parent: Option<usize>) {
        self.children_mut(foster_parent).push(node);
    }

    fn children_mut(&mut self, foster_parent: Option<usize>) -> &mut Vec<Node> {
        let idx = foster_parent.unwrap_or(self.stack.len() - 1);
        &mut self.stack[idx].element.children
    }

    /// Where content named `name` goes if it cannot live in the current table context.
    fn foster_parent(&self, name: &str) -> Option<usize> {
        if !matches!(self.top_name(), "table" | "tr") || TABLE_CONTENT.contains(&name) {
            return None;
        }
        let table = self
            .stack
            .iter()
            .rposition(|open| open.element.name == "table")?;
        Some(table.saturating_sub(1))
    }

    fn apply_implied_closes(&mut self, name: &str, pos: Option<usize>) {
        match name {
            "td" | "th" => {
                self.close_until(&["td", "th", "caption"], &["tr", "table"], pos);
                if self.top_name() == "table" {
                    let mut data = DataParsoid::default();
                    data.auto_inserted_start = true;
                    let start = pos.map(SourceRange::empty_at);
                    data.source_range = start;
                    let mut element = Element::new("tr");
                    element.data = data;
                    self.stack.push(OpenElement {
                        element,
                        start,
                        preset: false,
                        foster_parent: None,
                    });
                }
            }
            "tr" | "caption" => self.close_until(&["tr", "caption"], &["table"], pos),
            _ if BLOCK_TAGS.contains(&name) => self.close_until(&["p"], PARAGRAPH_SCOPE, pos),
            _ => {}
        }
    }

    /// Implicitly close the innermost element named in `targets`, unless an
    /// element named in `stop` is reached first.
    fn close_until(&mut self, targets: &[&str], stop: &[&str], pos: Option<usize>) {
        for idx in (1..self.stack.len()).rev() {
            let name = self.stack[idx].element.name.as_str();
            if targets.contains(&name) {
                self.pop_to(idx, pos);
                return;
            }
            if stop.contains(&name) {
                return;
            }
        }
    }

    fn pop_to(&mut self, depth: usize, pos: Option<usize>) {
        while self.stack.len() > depth.max(1) {
            self.pop_one(Close::Implicit(pos));
        }
    }

    fn pop_one(&mut self, close: Close) {
        let Some(open) = self.stack.pop() else { return };
        let mut element = open.element;

        let implicit = matches!(close, Close::Implicit(_));
        if !open.preset {
            if let Some(start) = open.start {
                let (end, close_width, auto) = match &close {
                    Close::Explicit(tag) => match tag.range() {
                        Some(r) => (r.end, r.len(), tag.data.auto_inserted_end),
                        None => (self.last_pos.unwrap_or(start.end), 0, true),
                    },
                    Close::Implicit(pos) => (pos.or(self.last_pos).unwrap_or(start.end), 0, true),
                };
                let end = end.max(start.end);
                element.data.source_range = Some(SourceRange::new(start.start, end));
                element.data.tag_widths = Some(TagWidths::new(start.len(), close_width));
                element.data.auto_inserted_end |= auto;
            } else if implicit {
                element.data.auto_inserted_end = true;
            }
        }

        let node = Node::Element(element);
        match open.foster_parent {
            Some(idx) if idx < self.stack.len() => self.stack[idx].element.children.push(node),
            _ => {
                if let Some(parent) = self.stack.last_mut() {
                    parent.element.children.push(node);
                }
            }
        }
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a document from a complete token stream.
pub fn build_tree(tokens: impl IntoIterator<Item = Token>) -> Document {
    let mut builder = TreeBuilder::new();
    for token in tokens {
        builder.push(token);
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    fn element<'a>(node: &'a Node) -> &'a Element {
        node.as_element().expect("expected element")
    }

    #[test]
    fn test_element_ranges() {
        let doc = build_tree(tokenize("a [[Foo|bar]] b"));
        let children = doc.children();
        assert_eq!(children.len(), 3);
        let link = element(&children[1]);
        assert_eq!(link.data.source_range, Some(SourceRange::new(2, 13)));
        assert_eq!(link.data.tag_widths, Some(TagWidths::new(6, 2)));
    }

    #[test]
    fn test_text_merging() {
        let doc = build_tree(tokenize("a\nb"));
        assert_eq!(doc.children().len(), 1);
        assert_eq!(doc.children()[0].range(), Some(SourceRange::new(0, 3)));
    }

    #[test]
    fn test_unmatched_end_tag_is_text() {
        let doc = build_tree(tokenize("a</b>c"));
        assert_eq!(doc.children().len(), 1);
        assert_eq!(doc.children()[0].text_content(), "a</b>c");
    }

    #[test]
    fn test_unclosed_start_tag_closes_at_end() {
        let doc = build_tree(tokenize("<span>abc"));
        let span = element(&doc.children()[0]);
        assert!(span.data.auto_inserted_end);
        assert_eq!(span.data.source_range, Some(SourceRange::new(0, 9)));
        assert_eq!(span.data.tag_widths, Some(TagWidths::new(6, 0)));
    }

    #[test]
    fn test_implied_rows_and_cells() {
        let doc = build_tree(tokenize("{|\n| a\n| b\n|}"));
        let table = element(&doc.children()[0]);
        let rows: Vec<_> = table.child_elements().collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "tr");
        assert!(rows[0].data.auto_inserted_start);
        let cells: Vec<_> = rows[0].child_elements().map(|c| c.name.as_str()).collect();
        assert_eq!(cells, vec!["td", "td"]);
    }

    #[test]
    fn test_foster_parenting() {
        let doc = build_tree(tokenize("<table>stray<b>x</b><tr><td>ok</td></tr></table>"));
        let names: Vec<_> = doc.children().iter().map(|n| n.node_name()).collect();
        assert_eq!(names, vec!["#text", "b", "table"]);
        assert!(element(&doc.children()[1]).data.fostered);
        let table = element(&doc.children()[2]);
        assert_eq!(table.text_content(), "ok");
    }

    #[test]
    fn test_quote_reopen() {
        let doc = build_tree(tokenize("''a'''b''c'''"));
        let names: Vec<_> = doc.children().iter().map(|n| n.node_name()).collect();
        assert_eq!(names, vec!["i", "b"]);
        let reopened = element(&doc.children()[1]);
        assert!(reopened.data.auto_inserted_start);
        assert_eq!(reopened.text_content(), "c");
    }
}
