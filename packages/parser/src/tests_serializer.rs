//! Serializer behaviour around extension hooks, across the plain and selective modes.

use crate::dom::{Document, Element, Node, Text};
use crate::provenance::{DataParsoid, ProvenanceKind, SourceRange};
use crate::selective_serializer::{OriginalPage, SelectiveSerializer};
use crate::serializer::{ExtensionSerializer, Serializer, SerializerHooks};
use std::sync::Arc;

const SOURCE: &str = "<demo>ab\ncd</demo>";

struct Shout;

impl ExtensionSerializer for Shout {
    fn child_separator(&self) -> &str {
        "\n"
    }

    fn serialize_child(&self, child: &Node) -> Option<String> {
        match child {
            Node::Text(t) => Some(t.value.to_uppercase()),
            _ => None,
        }
    }
}

fn hooks() -> SerializerHooks {
    let mut hooks = SerializerHooks::new();
    hooks.register("demo", Arc::new(Shout));
    hooks
}

fn text(value: &str, start: usize, end: usize) -> Node {
    Node::Text(Text {
        value: value.to_string(),
        range: Some(SourceRange::new(start, end)),
    })
}

fn demo_document() -> Document {
    let mut wrapper = Element::new("div");
    wrapper.data = DataParsoid::with_range(0, SOURCE.len())
        .widths(6, 7)
        .src(SOURCE)
        .kind(ProvenanceKind::Extension {
            name: "demo".to_string(),
        });
    wrapper.children = vec![text("ab", 6, 8), text("cd", 9, 11)];

    let mut doc = Document::new();
    doc.body.children.push(Node::Element(wrapper));
    doc
}

fn selective(edited: &Document) -> String {
    let original = demo_document();
    let hooks = hooks();
    let page = OriginalPage {
        source: SOURCE,
        document: &original,
    };
    SelectiveSerializer::new(Some(page), &hooks)
        .serialize(edited)
        .map(|out| out.markup.into_string())
        .unwrap()
}

#[test]
fn test_plain_serializer_uses_hook() {
    let hooks = hooks();
    let markup = Serializer::new(&hooks).serialize(&demo_document()).into_string();
    assert_eq!(markup, "<demo>AB\nCD</demo>");
}

#[test]
fn test_selective_copies_unmodified_extension() {
    assert_eq!(selective(&demo_document()), SOURCE);
}

#[test]
fn test_selective_regenerates_only_edited_child() {
    let mut doc = demo_document();
    if let Some(Node::Text(t)) = doc.body.children[0]
        .as_element_mut()
        .and_then(|el| el.children.get_mut(1))
    {
        t.value = "xy".to_string();
    }
    assert_eq!(selective(&doc), "<demo>ab\nXY</demo>");
}

#[test]
fn test_extension_without_hook_is_atomic() {
    let mut doc = demo_document();
    if let Some(el) = doc.body.children[0].as_element_mut() {
        el.children.clear();
    }
    let hooks = SerializerHooks::new();
    let markup = Serializer::new(&hooks).serialize(&doc).into_string();
    assert_eq!(markup, SOURCE);
}
