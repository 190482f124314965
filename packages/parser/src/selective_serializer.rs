use crate::dom::{Document, Element, Node};
use crate::error::{SerializeError, SerializeResult};
use crate::provenance::SourceRange;
use crate::serializer::{is_atomic, ExtensionSerializer, Markup, Serializer, SerializerHooks};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Source text of the previous revision together with the tree parsed from it.
#[derive(Debug, Clone, Copy)]
pub struct OriginalPage<'a> {
    pub source: &'a str,
    pub document: &'a Document,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializeStats {
    pub reused_nodes: usize,
    pub reused_bytes: usize,
    pub regenerated_nodes: usize,
}

#[derive(Debug, Clone)]
pub struct SelectiveOutput {
    pub markup: Markup,
    pub stats: SerializeStats,
}

/// Serializer that reuses original markup for unmodified subtrees.
///
/// A node counts as unmodified when the original tree holds a node with the
/// same source range that is structurally equal to it: same name, same ordered
/// attributes, same provenance record and equal children. Such nodes are copied
/// from the original source verbatim. A node that differs only in its children
/// keeps its original delimiters and recurses. Everything else is regenerated
/// by the plain serializer.
pub struct SelectiveSerializer<'a> {
    original: Option<OriginalPage<'a>>,
    index: HashMap<SourceRange, Vec<&'a Node>>,
    hooks: &'a SerializerHooks,
}

impl<'a> SelectiveSerializer<'a> {
    pub fn new(original: Option<OriginalPage<'a>>, hooks: &'a SerializerHooks) -> Self {
        let mut index = HashMap::new();
        if let Some(page) = &original {
            for child in &page.document.body.children {
                index_node(child, &mut index);
            }
        }
        Self {
            original,
            index,
            hooks,
        }
    }

    #[instrument(skip_all, fields(nodes = doc.body.children.len()))]
    pub fn serialize(&self, doc: &Document) -> SerializeResult<SelectiveOutput> {
        let mut run = Run {
            selser: self,
            out: Serializer::new(self.hooks),
            stats: SerializeStats::default(),
        };
        let matched: Vec<Matched<'a>> = doc.body.children.iter().map(|c| self.matched(c)).collect();
        run.children(&doc.body, &matched, None)?;

        debug!(
            reused = run.stats.reused_nodes,
            reused_bytes = run.stats.reused_bytes,
            regenerated = run.stats.regenerated_nodes,
            "selective serialization finished"
        );
        Ok(SelectiveOutput {
            stats: run.stats,
            markup: run.out.finish(),
        })
    }

    fn source(&self, range: SourceRange) -> SerializeResult<&'a str> {
        let page = self
            .original
            .ok_or_else(|| SerializeError::missing_source(range.start, range.end))?;
        range
            .slice(page.source)
            .ok_or_else(|| SerializeError::invalid_range(range.start, range.end, page.source.len()))
    }

    fn candidates<'n>(&'n self, range: SourceRange, name: &'n str) -> impl Iterator<Item = &'a Node> + 'n {
        self.index
            .get(&range)
            .into_iter()
            .flatten()
            .copied()
            .filter(move |n| n.node_name() == name)
    }

    /// Match every node of an edited subtree against the original in one
    /// bottom-up pass. An element matches an original element that is shallow
    /// equal and whose children are, in order, the originals its own children
    /// matched.
    fn matched(&self, node: &Node) -> Matched<'a> {
        let Node::Element(el) = node else {
            let original = node
                .range()
                .and_then(|range| self.candidates(range, node.node_name()).find(|o| *o == node));
            return Matched {
                original,
                children: Vec::new(),
            };
        };

        let children: Vec<Matched<'a>> = el.children.iter().map(|c| self.matched(c)).collect();
        let original = el.data.source_range.and_then(|range| {
            self.candidates(range, &el.name).find(|o| match o {
                Node::Element(orig) => {
                    orig.shallow_eq(el)
                        && orig.children.len() == children.len()
                        && orig
                            .children
                            .iter()
                            .zip(&children)
                            .all(|(oc, m)| m.original.is_some_and(|p| std::ptr::eq(p, oc)))
                }
                _ => false,
            })
        });
        Matched { original, children }
    }

    /// Original element with the same range whose own markup is unchanged.
    fn shallow_match(&self, el: &Element) -> Option<&'a Element> {
        let range = el.data.source_range?;
        self.candidates(range, &el.name)
            .filter_map(Node::as_element)
            .find(|o| o.shallow_eq(el))
    }
}

/// Original node an edited node is equal to, if any, mirrored over the tree.
struct Matched<'a> {
    original: Option<&'a Node>,
    children: Vec<Matched<'a>>,
}

impl Matched<'_> {
    fn is_unmodified(&self) -> bool {
        self.original.is_some()
    }
}

/// For each child, the index of the outermost sibling whose source range
/// encloses it. Content fostered out of a table is the usual case.
fn enclosing(children: &[Node]) -> Vec<Option<usize>> {
    let mut order: Vec<(SourceRange, usize)> = children
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.range().map(|r| (r, i)))
        .collect();
    order.sort_by_key(|(r, _)| (r.start, Reverse(r.end)));

    let mut out = vec![None; children.len()];
    let mut outer: Option<(SourceRange, usize)> = None;
    for (range, i) in order {
        match outer {
            Some((o, oi)) if o != range && o.contains(&range) => out[i] = Some(oi),
            _ => outer = Some((range, i)),
        }
    }
    out
}

fn is_separator(node: &Node) -> bool {
    matches!(node, Node::Text(t) if !t.value.is_empty() && t.value.chars().all(|c| c == '\n'))
}

fn index_node<'a>(node: &'a Node, index: &mut HashMap<SourceRange, Vec<&'a Node>>) {
    if let Some(range) = node.range() {
        index.entry(range).or_default().push(node);
    }
    if let Node::Element(el) = node {
        for child in &el.children {
            index_node(child, index);
        }
    }
}

struct Run<'s, 'a> {
    selser: &'s SelectiveSerializer<'a>,
    out: Serializer<'a>,
    stats: SerializeStats,
}

impl<'a> Run<'_, 'a> {
    fn reuse(&mut self, src: &str) {
        self.stats.reused_nodes += 1;
        self.stats.reused_bytes += src.len();
        self.out.write(src);
    }

    fn regenerate(&mut self, node: &Node, parent: &Element) {
        self.stats.regenerated_nodes += 1;
        self.out.node(node, parent);
    }

    /// `verbatim` marks a node whose original source can be copied as is.
    fn node(
        &mut self,
        node: &Node,
        parent: &Element,
        matched: &Matched<'a>,
        verbatim: bool,
    ) -> SerializeResult<()> {
        let Some(range) = node.range() else {
            self.regenerate(node, parent);
            return Ok(());
        };
        let src = self.selser.source(range)?;

        match node {
            Node::Element(el) => self.element(node, el, parent, src, matched, verbatim),
            _ if verbatim => {
                self.reuse(src);
                Ok(())
            }
            _ => {
                self.regenerate(node, parent);
                Ok(())
            }
        }
    }

    fn element(
        &mut self,
        node: &Node,
        el: &Element,
        parent: &Element,
        src: &str,
        matched: &Matched<'a>,
        verbatim: bool,
    ) -> SerializeResult<()> {
        if verbatim {
            self.out.before_open(el, src);
            self.reuse(src);
            self.out.after_close(el);
            return Ok(());
        }

        let original = self.selser.shallow_match(el);
        let delimiters = match original {
            Some(_) => self.delimiters(el)?,
            None => None,
        };

        if let Some(hook) = self.out.hooks().for_element(el).cloned() {
            return self.extension(el, hook, delimiters, &matched.children);
        }

        if is_atomic(el) {
            self.regenerate(node, parent);
            return Ok(());
        }

        let (open, close) = match delimiters {
            Some((open, close)) => (open.to_string(), close.to_string()),
            None => (self.out.open_delimiter(el, parent), self.out.close_delimiter(el)),
        };
        if original.is_none() {
            self.stats.regenerated_nodes += 1;
        }

        self.out.before_open(el, &open);
        self.out.write(&open);
        self.out.enter(el, parent);
        self.children(el, &matched.children, None)?;
        self.out.leave(el);
        self.out.before_close(el, &close);
        self.out.write(&close);
        self.out.after_close(el);
        Ok(())
    }

    fn delimiters(&self, el: &Element) -> SerializeResult<Option<(&'a str, &'a str)>> {
        let Some((open, close)) = el.data.delimiter_ranges() else {
            return Ok(None);
        };
        Ok(Some((self.selser.source(open)?, self.selser.source(close)?)))
    }

    fn extension(
        &mut self,
        el: &Element,
        hook: Arc<dyn ExtensionSerializer>,
        delimiters: Option<(&str, &str)>,
        matched: &[Matched<'a>],
    ) -> SerializeResult<()> {
        let (open, close) = match delimiters {
            Some((open, close)) => (open.to_string(), close.to_string()),
            None => (hook.open_tag(el), hook.close_tag(el)),
        };
        self.out.before_open(el, &open);
        self.out.write(&open);
        self.children(el, matched, Some(hook.as_ref()))?;
        self.out.write(&close);
        self.out.after_close(el);
        Ok(())
    }

    fn children(
        &mut self,
        el: &Element,
        matched: &[Matched<'a>],
        hook: Option<&dyn ExtensionSerializer>,
    ) -> SerializeResult<()> {
        // A sibling whose source encloses other siblings (a table with
        // fostered content) is only copied verbatim when all of them are
        // unmodified, and then the enclosed ones are not written again.
        let enclosing = enclosing(&el.children);
        let mut verbatim: Vec<bool> = matched.iter().map(Matched::is_unmodified).collect();
        for (i, outer) in enclosing.iter().enumerate() {
            if let Some(outer) = *outer {
                if !matched[i].is_unmodified() {
                    verbatim[outer] = false;
                }
            }
        }

        // Separators between list items outlive the items themselves; once
        // an item is deleted only one may remain between its neighbours.
        let list = matches!(el.name.as_str(), "ul" | "ol" | "dl");
        let last_item = el.children.iter().rposition(|c| !is_separator(c));
        let mut after_separator = true;

        let mut first = true;
        for (i, (child, m)) in el.children.iter().zip(matched).enumerate() {
            if let Some(outer) = enclosing[i] {
                if verbatim[outer] && m.is_unmodified() {
                    continue;
                }
            }
            if list {
                let separator = is_separator(child);
                if separator && (after_separator || last_item.map_or(true, |last| i > last)) {
                    continue;
                }
                after_separator = separator;
            }

            if let Some(hook) = hook {
                if !first {
                    self.out.write(hook.child_separator());
                }
                first = false;
                if !m.is_unmodified() {
                    if let Some(markup) = hook.serialize_child(child) {
                        self.stats.regenerated_nodes += 1;
                        self.out.write(&markup);
                        continue;
                    }
                }
            }
            self.node(child, el, m, verbatim[i])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Text;
    use crate::parse;

    fn selser(source: &str, edited: &Document) -> SerializeResult<String> {
        let original = parse(source);
        let hooks = SerializerHooks::new();
        let page = OriginalPage {
            source,
            document: &original,
        };
        SelectiveSerializer::new(Some(page), &hooks)
            .serialize(edited)
            .map(|out| out.markup.into_string())
    }

    fn set_text(node: &mut Node, value: &str) {
        if let Node::Text(t) = node {
            t.value = value.to_string();
        }
    }

    fn innermost(node: &mut Node) -> &mut Node {
        match node {
            Node::Element(el) => innermost(&mut el.children[0]),
            other => other,
        }
    }

    #[test]
    fn test_unmodified_is_byte_identical() {
        let source = "==  Odd   spacing==\n*  item <!-- c -->\n{|class=x\n|a||b\n|}\n<b  id='q'>x</b>";
        let doc = parse(source);
        assert_eq!(selser(source, &doc).unwrap(), source);
    }

    #[test]
    fn test_edit_inside_piped_link_keeps_delimiters() {
        let source = "see [[Foo bar|the  label]] here";
        let mut doc = parse(source);
        let link = doc.body.children[1].as_element_mut().unwrap();
        set_text(&mut link.children[0], "new label");
        assert_eq!(selser(source, &doc).unwrap(), "see [[Foo bar|new label]] here");
    }

    #[test]
    fn test_edit_simple_link_regenerates() {
        let source = "[[Foo]]";
        let mut doc = parse(source);
        let link = doc.body.children[0].as_element_mut().unwrap();
        set_text(&mut link.children[0], "Bar");
        assert_eq!(selser(source, &doc).unwrap(), "[[Foo|Bar]]");
    }

    #[test]
    fn test_inserted_content_uses_plain_serializer() {
        let source = "== A ==\ntext";
        let mut doc = parse(source);
        let heading = Element::new("h2").with_child(Node::text("B"));
        doc.body.children.push(Node::Element(heading));
        assert_eq!(selser(source, &doc).unwrap(), "== A ==\ntext\n== B ==");
    }

    #[test]
    fn test_fostered_content_not_duplicated() {
        let source = "<table>stray<tr><td>x</td></tr></table>";
        let doc = parse(source);
        assert_eq!(doc.children().len(), 2);
        assert_eq!(selser(source, &doc).unwrap(), source);
    }

    #[test]
    fn test_edit_to_fostered_content_is_kept() {
        let source = "<table>stray<tr><td>x</td></tr></table>";
        let mut doc = parse(source);
        let stray = doc
            .body
            .children
            .iter_mut()
            .find(|n| matches!(n, Node::Text(_)))
            .expect("fostered text");
        set_text(stray, "EDITED");

        let out = selser(source, &doc).unwrap();
        assert!(out.starts_with("EDITED"), "{out}");
        assert!(out.ends_with("<table><tr><td>x</td></tr></table>"), "{out}");
        assert!(!out.contains("stray"));
        assert_eq!(out.matches("<td>x</td>").count(), 1);
    }

    #[test]
    fn test_deeply_nested_edit() {
        let depth = 200;
        let source = format!("{}x{}", "<span>".repeat(depth), "</span>".repeat(depth));
        let original = parse(&source);
        let mut edited = original.clone();
        set_text(innermost(&mut edited.body.children[0]), "y");

        let hooks = SerializerHooks::new();
        let page = OriginalPage {
            source: &source,
            document: &original,
        };
        let out = SelectiveSerializer::new(Some(page), &hooks)
            .serialize(&edited)
            .unwrap();
        assert_eq!(out.markup.to_string(), source.replace('x', "y"));
        assert_eq!(out.stats.reused_nodes, 0);
        assert_eq!(out.stats.regenerated_nodes, 1);
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let doc = parse("[[Foo]]");
        let hooks = SerializerHooks::new();
        let err = SelectiveSerializer::new(None, &hooks).serialize(&doc).unwrap_err();
        assert_eq!(err, SerializeError::missing_source(0, 7));
    }

    #[test]
    fn test_range_outside_source_is_an_error() {
        let mut doc = Document::new();
        doc.body.children.push(Node::Text(Text {
            value: "x".to_string(),
            range: Some(SourceRange::new(5, 50)),
        }));
        assert!(matches!(
            selser("short", &doc),
            Err(SerializeError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_stats() {
        let source = "a ''b'' c";
        let original = parse(source);
        let mut edited = original.clone();
        set_text(&mut edited.body.children[2], " d");
        let hooks = SerializerHooks::new();
        let page = OriginalPage {
            source,
            document: &original,
        };
        let out = SelectiveSerializer::new(Some(page), &hooks)
            .serialize(&edited)
            .unwrap();
        assert_eq!(out.markup.to_string(), "a ''b'' d");
        assert_eq!(out.stats.reused_nodes, 2);
        assert_eq!(out.stats.regenerated_nodes, 1);
    }
}
