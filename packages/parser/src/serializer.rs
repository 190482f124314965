use crate::data_mw::{ExtensionInfo, TransclusionInfo};
use crate::dom::{Document, Element, Node};
use crate::provenance::{ProvenanceKind, Syntax};
use crate::token::Attributes;
use crate::tokenizer::VOID_TAGS;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Markup generation for an extension wrapper element.
///
/// Extensions own the syntax between their tags, so the serializers ask the
/// extension how to write its wrapper and each of its children.
pub trait ExtensionSerializer: Send + Sync {
    fn open_tag(&self, element: &Element) -> String {
        let attrs = ExtensionInfo::from_attrs(&element.attrs)
            .map(|info| info.attrs)
            .unwrap_or_default();
        format!("<{}{}>", extension_name(element).unwrap_or("div"), format_attributes(&attrs))
    }

    fn close_tag(&self, element: &Element) -> String {
        format!("</{}>", extension_name(element).unwrap_or("div"))
    }

    /// Inserted between consecutive children.
    fn child_separator(&self) -> &str {
        ""
    }

    /// Markup for a child that could not be reused verbatim. `None` falls back
    /// to the plain serializer.
    fn serialize_child(&self, child: &Node) -> Option<String>;
}

/// Extension serializers keyed by extension name.
#[derive(Clone, Default)]
pub struct SerializerHooks {
    hooks: HashMap<String, Arc<dyn ExtensionSerializer>>,
}

impl SerializerHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, hook: Arc<dyn ExtensionSerializer>) {
        self.hooks.insert(name.into(), hook);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ExtensionSerializer>> {
        self.hooks.get(name)
    }

    /// Hook responsible for `element`, if it is an extension wrapper.
    pub fn for_element(&self, element: &Element) -> Option<&Arc<dyn ExtensionSerializer>> {
        self.get(extension_name(element)?)
    }
}

impl fmt::Debug for SerializerHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.hooks.keys()).finish()
    }
}

/// Output of a serializer run, kept as the chunks it was produced in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Markup {
    chunks: Vec<String>,
}

impl Markup {
    pub fn chunks(&self) -> impl Iterator<Item = &str> {
        self.chunks.iter().map(String::as_str)
    }

    pub fn into_string(self) -> String {
        self.chunks.concat()
    }
}

impl fmt::Display for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for chunk in &self.chunks {
            f.write_str(chunk)?;
        }
        Ok(())
    }
}

/// Collects markup chunks and inserts the newlines block constructs need.
///
/// Separators are requested, not written: a request is satisfied by newlines
/// already at the end of the output or at the start of the next chunk.
#[derive(Debug, Default)]
pub struct MarkupWriter {
    chunks: Vec<String>,
    trailing_newlines: usize,
    pending_newlines: usize,
    after_paragraph: bool,
    empty: bool,
}

impl MarkupWriter {
    pub fn new() -> Self {
        Self {
            empty: true,
            ..Default::default()
        }
    }

    pub fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.pending_newlines > 0 && !self.empty {
            let leading = text.bytes().take_while(|b| *b == b'\n').count();
            let have = self.trailing_newlines + leading;
            if have < self.pending_newlines {
                self.push_raw("\n".repeat(self.pending_newlines - have));
            }
        }
        self.pending_newlines = 0;
        if !text.chars().all(char::is_whitespace) {
            self.after_paragraph = false;
        }
        self.push_raw(text.to_string());
    }

    fn push_raw(&mut self, text: String) {
        let trailing = text.bytes().rev().take_while(|b| *b == b'\n').count();
        if trailing == text.len() {
            self.trailing_newlines += trailing;
        } else {
            self.trailing_newlines = trailing;
        }
        self.empty = false;
        self.chunks.push(text);
    }

    pub fn require_newlines(&mut self, count: usize) {
        self.pending_newlines = self.pending_newlines.max(count);
    }

    pub fn at_line_start(&self) -> bool {
        self.empty || self.trailing_newlines > 0 || self.pending_newlines > 0
    }

    pub fn finish(self) -> Markup {
        Markup {
            chunks: self.chunks,
        }
    }
}

/// Deterministic tree to markup renderer.
///
/// The per-element rules are also used by the selective serializer whenever a
/// node cannot be reused verbatim, which is why delimiters, layout and context
/// tracking are separate steps.
pub struct Serializer<'h> {
    writer: MarkupWriter,
    hooks: &'h SerializerHooks,
    list_items: Vec<char>,
    table_depth: usize,
    raw_depth: usize,
}

impl<'h> Serializer<'h> {
    pub fn new(hooks: &'h SerializerHooks) -> Self {
        Self {
            writer: MarkupWriter::new(),
            hooks,
            list_items: Vec::new(),
            table_depth: 0,
            raw_depth: 0,
        }
    }

    pub fn hooks(&self) -> &'h SerializerHooks {
        self.hooks
    }

    pub fn serialize(mut self, doc: &Document) -> Markup {
        for child in &doc.body.children {
            self.node(child, &doc.body);
        }
        self.finish()
    }

    pub fn finish(self) -> Markup {
        self.writer.finish()
    }

    pub fn write(&mut self, text: &str) {
        self.writer.write(text);
    }

    /// Serialize a subtree from scratch.
    pub fn node(&mut self, node: &Node, parent: &Element) {
        match node {
            Node::Text(t) => self.text(&t.value),
            Node::Comment(c) => self.comment(&c.value),
            Node::Element(el) => self.element(el, parent),
        }
    }

    pub fn text(&mut self, value: &str) {
        if self.raw_depth > 0
            || !needs_nowiki(value, self.writer.at_line_start(), self.table_depth > 0)
        {
            self.writer.write(value);
        } else {
            self.writer.write(&format!("<nowiki>{}</nowiki>", value));
        }
    }

    pub fn comment(&mut self, value: &str) {
        self.writer.write(&format!("<!--{}-->", value));
    }

    fn element(&mut self, el: &Element, parent: &Element) {
        if let Some(hook) = self.hooks.for_element(el).cloned() {
            let open = hook.open_tag(el);
            self.before_open(el, &open);
            self.writer.write(&open);
            for (idx, child) in el.children.iter().enumerate() {
                if idx > 0 {
                    self.writer.write(hook.child_separator());
                }
                match hook.serialize_child(child) {
                    Some(markup) => self.writer.write(&markup),
                    None => self.node(child, el),
                }
            }
            self.writer.write(&hook.close_tag(el));
            self.after_close(el);
            return;
        }

        if let Some(markup) = atomic_markup(el) {
            self.before_open(el, &markup);
            self.writer.write(&markup);
            self.after_close(el);
            return;
        }

        let open = self.open_delimiter(el, parent);
        self.before_open(el, &open);
        self.writer.write(&open);
        self.enter(el, parent);
        for child in &el.children {
            self.node(child, el);
        }
        self.leave(el);
        let close = self.close_delimiter(el);
        self.before_close(el, &close);
        self.writer.write(&close);
        self.after_close(el);
    }

    // Layout

    /// Request the separators needed before `el` whose opening markup is `open`.
    pub fn before_open(&mut self, el: &Element, open: &str) {
        if is_html(el) {
            return;
        }
        match el.name.as_str() {
            "p" => {
                let count = if self.writer.after_paragraph { 2 } else { 1 };
                self.writer.require_newlines(count);
            }
            "ul" | "ol" | "dl" => self.writer.require_newlines(1),
            "td" | "th" if el.data.stx == Some(Syntax::Row) => {}
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "table" | "tr" | "td" | "th" | "caption"
            | "li" | "dt" | "dd" | "hr" | "listItem"
                if !open.is_empty() =>
            {
                self.writer.require_newlines(1)
            }
            _ => {}
        }
    }

    pub fn before_close(&mut self, el: &Element, close: &str) {
        if el.name == "table" && !is_html(el) && !close.is_empty() {
            self.writer.require_newlines(1);
        }
    }

    pub fn after_close(&mut self, el: &Element) {
        if is_html(el) {
            return;
        }
        match el.name.as_str() {
            "p" => self.writer.after_paragraph = true,
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "table" | "hr" => {
                self.writer.require_newlines(1)
            }
            "ul" | "ol" | "dl" if self.list_items.is_empty() => self.writer.require_newlines(1),
            _ => {}
        }
    }

    // Context

    pub fn enter(&mut self, el: &Element, parent: &Element) {
        if let Some(bullet) = item_bullet(el, parent) {
            self.list_items.push(bullet);
        }
        if el.name == "table" {
            self.table_depth += 1;
        }
        if is_raw_text(el) {
            self.raw_depth += 1;
        }
    }

    pub fn leave(&mut self, el: &Element) {
        if is_list_item(el) && !is_html(el) {
            self.list_items.pop();
        }
        if el.name == "table" {
            self.table_depth = self.table_depth.saturating_sub(1);
        }
        if is_raw_text(el) {
            self.raw_depth = self.raw_depth.saturating_sub(1);
        }
    }

    // Delimiters

    pub fn open_delimiter(&self, el: &Element, parent: &Element) -> String {
        if el.data.auto_inserted_start || is_fragment(el) {
            return String::new();
        }
        if is_html(el) {
            return html_open(el);
        }
        match el.name.as_str() {
            "body" | "p" | "ul" | "ol" | "dl" => String::new(),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = heading_level(&el.name);
                let leading = el.data.ws.as_ref().map_or(" ", |ws| ws.leading.as_str());
                format!("{}{}", "=".repeat(level), leading)
            }
            "i" => "''".to_string(),
            "b" => "'''".to_string(),
            "a" if is_wiki_link(el) => link_open(el),
            "table" => format!("{{|{}", format_attributes(&el.attrs)),
            "tr" => format!("|-{}", format_attributes(&el.attrs)),
            "td" if el.data.stx == Some(Syntax::Row) => "||".to_string(),
            "td" => "|".to_string(),
            "th" if el.data.stx == Some(Syntax::Row) => "!!".to_string(),
            "th" => "!".to_string(),
            "caption" => "|+".to_string(),
            "hr" => "----".to_string(),
            "listItem" => el.attrs.get("bullets").unwrap_or("*").to_string(),
            "li" | "dt" | "dd" => {
                let starts_with_list = el
                    .children
                    .first()
                    .and_then(Node::as_element)
                    .map_or(false, |child| matches!(child.name.as_str(), "ul" | "ol" | "dl"));
                if starts_with_list {
                    return String::new();
                }
                let mut bullets: String = self.list_items.iter().collect();
                bullets.push(item_bullet(el, parent).unwrap_or('*'));
                bullets
            }
            _ => html_open(el),
        }
    }

    pub fn close_delimiter(&self, el: &Element) -> String {
        if el.data.auto_inserted_end || is_fragment(el) {
            return String::new();
        }
        if is_html(el) {
            return html_close(el);
        }
        match el.name.as_str() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = heading_level(&el.name);
                let trailing = el.data.ws.as_ref().map_or(" ", |ws| ws.trailing.as_str());
                format!("{}{}", trailing, "=".repeat(level))
            }
            "i" => "''".to_string(),
            "b" => "'''".to_string(),
            "a" if is_wiki_link(el) => "]]".to_string(),
            "table" => "|}".to_string(),
            "body" | "p" | "ul" | "ol" | "dl" | "li" | "dt" | "dd" | "tr" | "td" | "th"
            | "caption" | "hr" | "listItem" => String::new(),
            _ => html_close(el),
        }
    }
}

/// Serialize a document without reusing any original source.
pub fn serialize(doc: &Document) -> String {
    let hooks = SerializerHooks::new();
    Serializer::new(&hooks).serialize(doc).into_string()
}

/// Name of the extension an element wraps, if any.
pub fn extension_name(el: &Element) -> Option<&str> {
    match &el.data.kind {
        Some(ProvenanceKind::Extension { name }) => Some(name.as_str()),
        _ => None,
    }
}

/// Elements whose markup is produced as a whole: their children are not
/// serialized one by one, so they can only be reused verbatim or regenerated.
pub fn is_atomic(el: &Element) -> bool {
    is_transclusion(el)
        || is_placeholder(el)
        || is_image(el)
        || is_nowiki(el)
        || el.data.stx == Some(Syntax::Simple)
        || el.data.is_extension()
}

/// Complete markup for elements generated as a unit.
pub fn atomic_markup(el: &Element) -> Option<String> {
    if is_transclusion(el) {
        return el
            .data
            .src
            .clone()
            .or_else(|| TransclusionInfo::from_attrs(&el.attrs).map(|info| info.to_wikitext()));
    }
    if is_placeholder(el) {
        return Some(el.data.src.clone().unwrap_or_default());
    }
    if el.data.is_extension() {
        return el.data.src.clone();
    }
    if is_image(el) {
        return Some(image_markup(el));
    }
    if is_nowiki(el) {
        let text = el.text_content();
        if text.is_empty() && el.data.self_close {
            return Some("<nowiki/>".to_string());
        }
        return Some(format!("<nowiki>{}</nowiki>", text));
    }
    None
}

fn is_transclusion(el: &Element) -> bool {
    el.data.is_transclusion() || el.attrs.has_type("mw:Transclusion")
}

fn is_placeholder(el: &Element) -> bool {
    matches!(el.data.kind, Some(ProvenanceKind::Placeholder)) || el.attrs.has_type("mw:Placeholder")
}

fn is_fragment(el: &Element) -> bool {
    matches!(el.data.kind, Some(ProvenanceKind::Fragment)) || el.attrs.has_type("mw:DOMFragment")
}

pub fn is_image(el: &Element) -> bool {
    el.attrs.has_type("mw:Image") || el.attrs.has_type("mw:Image/Thumb")
}

fn is_nowiki(el: &Element) -> bool {
    el.attrs.has_type("mw:Nowiki")
}

fn is_raw_text(el: &Element) -> bool {
    is_nowiki(el) || el.name == "figcaption"
}

fn is_wiki_link(el: &Element) -> bool {
    el.attrs.get("rel") == Some("mw:WikiLink")
}

fn is_html(el: &Element) -> bool {
    el.data.stx == Some(Syntax::Html)
}

fn is_list_item(el: &Element) -> bool {
    matches!(el.name.as_str(), "li" | "dt" | "dd")
}

fn item_bullet(el: &Element, parent: &Element) -> Option<char> {
    if is_html(el) {
        return None;
    }
    match el.name.as_str() {
        "li" if parent.name == "ol" => Some('#'),
        "li" => Some('*'),
        "dt" => Some(';'),
        "dd" => Some(':'),
        _ => None,
    }
}

fn heading_level(name: &str) -> usize {
    name[1..].parse().unwrap_or(1)
}

fn link_open(el: &Element) -> String {
    let href = el.attrs.get("href").unwrap_or_default();
    let target = href.strip_prefix("./").unwrap_or(href);
    let only_text = el.children.iter().all(|c| matches!(c, Node::Text(_)));
    if el.data.stx != Some(Syntax::Piped) && only_text && el.text_content() == target {
        "[[".to_string()
    } else {
        format!("[[{}|", target)
    }
}

/// `[[File|options|caption]]` for an image element.
pub fn image_markup(el: &Element) -> String {
    let mut out = String::from("[[");
    out.push_str(el.attrs.get("data-file").unwrap_or_default());
    if let Some(options) = el.attrs.get("data-options").filter(|o| !o.is_empty()) {
        out.push('|');
        out.push_str(options);
    }
    if let Some(caption) = el.child_elements().find(|c| c.name == "figcaption") {
        out.push('|');
        out.push_str(&caption.text_content());
    }
    out.push_str("]]");
    out
}

fn html_open(el: &Element) -> String {
    let attrs = format_attributes(&el.attrs);
    if el.data.self_close && el.children.is_empty() {
        format!("<{}{} />", el.name, attrs)
    } else {
        format!("<{}{}>", el.name, attrs)
    }
}

fn html_close(el: &Element) -> String {
    if (el.data.self_close || VOID_TAGS.contains(&el.name.as_str())) && el.children.is_empty() {
        String::new()
    } else {
        format!("</{}>", el.name)
    }
}

/// ` key="value"` pairs in attribute order.
pub fn format_attributes(attrs: &Attributes) -> String {
    let mut out = String::new();
    for (k, v) in attrs.iter() {
        out.push(' ');
        out.push_str(k);
        if !v.is_empty() {
            out.push_str("=\"");
            out.push_str(&v.replace('"', "&quot;"));
            out.push('"');
        }
    }
    out
}

/// Whether `text` would be read back as markup rather than literal text.
fn needs_nowiki(text: &str, at_line_start: bool, in_table: bool) -> bool {
    const INLINE: &[&str] = &["[[", "]]", "{{", "}}", "''", "<", "~~~"];
    if INLINE.iter().any(|m| text.contains(m)) || (in_table && text.contains("||")) {
        return true;
    }

    text.split('\n').enumerate().any(|(idx, line)| {
        if idx == 0 && !at_line_start {
            return false;
        }
        let trimmed = line.trim_end();
        line.starts_with(['*', '#', ':', ';'])
            || line.starts_with("----")
            || line.starts_with("{|")
            || (trimmed.len() > 1 && trimmed.starts_with('=') && trimmed.ends_with('='))
            || (in_table && line.starts_with(['|', '!']))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Text;

    fn doc_of(children: Vec<Node>) -> Document {
        let mut doc = Document::new();
        doc.body.children = children;
        doc
    }

    #[test]
    fn test_writer_separators() {
        let mut writer = MarkupWriter::new();
        writer.require_newlines(1);
        writer.write("a");
        writer.require_newlines(2);
        writer.write("\nb");
        assert_eq!(writer.finish().into_string(), "a\n\nb");
    }

    #[test]
    fn test_fresh_heading_and_paragraphs() {
        let heading = Element::new("h2").with_child(Node::text("Title"));
        let p1 = Element::new("p").with_child(Node::text("one"));
        let p2 = Element::new("p").with_child(Node::text("two"));
        let doc = doc_of(vec![
            Node::Element(heading),
            Node::Element(p1),
            Node::Element(p2),
        ]);
        assert_eq!(serialize(&doc), "== Title ==\none\n\ntwo");
    }

    #[test]
    fn test_fresh_lists() {
        let inner = Element::new("ol")
            .with_child(Node::Element(Element::new("li").with_child(Node::text(" b"))));
        let item = Element::new("li")
            .with_child(Node::text(" a"))
            .with_child(Node::Element(inner));
        let list = Element::new("ul").with_child(Node::Element(item));
        let doc = doc_of(vec![Node::Element(list), Node::text("after")]);
        assert_eq!(serialize(&doc), "* a\n*# b\nafter");
    }

    #[test]
    fn test_links() {
        let simple = Element::new("a")
            .with_attr("rel", "mw:WikiLink")
            .with_attr("href", "./Foo")
            .with_child(Node::text("Foo"));
        let piped = Element::new("a")
            .with_attr("rel", "mw:WikiLink")
            .with_attr("href", "./Foo")
            .with_child(Node::text("bar"));
        let doc = doc_of(vec![Node::Element(simple), Node::text(" "), Node::Element(piped)]);
        assert_eq!(serialize(&doc), "[[Foo]] [[Foo|bar]]");
    }

    #[test]
    fn test_text_escaping() {
        let doc = doc_of(vec![Node::Text(Text {
            value: "* not a list [[x]]".to_string(),
            range: None,
        })]);
        assert_eq!(serialize(&doc), "<nowiki>* not a list [[x]]</nowiki>");

        let doc = doc_of(vec![Node::text("a * b")]);
        assert_eq!(serialize(&doc), "a * b");
    }

    #[test]
    fn test_fresh_table() {
        let cell = Element::new("td").with_child(Node::text(" x"));
        let row = Element::new("tr").with_child(Node::Element(cell));
        let table = Element::new("table")
            .with_attr("class", "wikitable")
            .with_child(Node::Element(row));
        let doc = doc_of(vec![Node::Element(table)]);
        assert_eq!(serialize(&doc), "{| class=\"wikitable\"\n|-\n| x\n|}");
    }

    #[test]
    fn test_transclusion_from_data_mw() {
        let info = TransclusionInfo::parse("Foo|x");
        let el = Element::new("span")
            .with_attr("typeof", "mw:Transclusion")
            .with_attr("data-mw", info.to_json());
        assert_eq!(serialize(&doc_of(vec![Node::Element(el)])), "{{Foo|x}}");
    }
}
