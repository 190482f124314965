//! Round-trip behaviour of the serializers over whole pages.

use wikitext_parser::{
    parse, serialize, Document, Node, OriginalPage, SelectiveSerializer, SerializeError,
    SerializerHooks,
};

const PAGES: &[&str] = &[
    "",
    "plain text only",
    "== Heading ==\nBody with ''italic'' and '''bold'''.\n",
    "=Level one=\n\n\n   \n===  spaced  ===   \ntrailing",
    "* one\n** two\n# three\n: indent\n; term\n",
    "[[Simple]] [[Target|label with ''style'']] [[Broken",
    "{{Infobox|name=Foo|size=12}} after {{Unclosed",
    "<!-- note --> <b class=x>tag</b> <i>unclosed",
    "{|\n|a||b\n|-\n!h!!k\n|}\n",
    "<table>stray<tr><td>cell</td></tr></table>",
    "<nowiki>[[not a link]]</nowiki>",
    "[[File:Foo.png|thumb|left|A caption]]",
    "mis]]matched }} brackets || and !! bars",
    "----\n<div>\nblock\n</div>\n",
];

fn selser(source: &str, doc: &Document) -> Result<String, SerializeError> {
    let original = parse(source);
    let hooks = SerializerHooks::new();
    let page = OriginalPage {
        source,
        document: &original,
    };
    SelectiveSerializer::new(Some(page), &hooks)
        .serialize(doc)
        .map(|out| out.markup.into_string())
}

#[test]
fn test_unmodified_pages_are_reproduced_exactly() {
    for source in PAGES {
        let doc = parse(source);
        assert_eq!(&selser(source, &doc).unwrap(), source, "page {source:?}");
    }
}

#[test]
fn test_parse_never_fails_and_ranges_fit() {
    for source in PAGES {
        let doc = parse(source);
        assert!(
            doc.validate_provenance(0, source.len()).is_ok(),
            "page {source:?}"
        );
    }
}

#[test]
fn test_plain_serializer_on_canonical_markup() {
    for source in [
        "== Heading ==",
        "[[Foo]] and [[Foo|bar]]",
        "text <!-- c --> more",
        "{{Foo|x}}",
    ] {
        assert_eq!(serialize(&parse(source)), source);
    }
}

#[test]
fn test_plain_output_reparses_to_same_structure() {
    for source in ["== A ==\nbody", "[[X|y]] z", "<b>bold</b> text"] {
        let mut first = parse(source);
        first.strip_provenance();
        let mut second = parse(&serialize(&first));
        second.strip_provenance();
        assert_eq!(first, second, "page {source:?}");
    }
}

#[test]
fn test_edit_outside_untouched_region_preserves_it() {
    let source = "==  Keep   me==\nchange this\n<b  id = 'q' >also kept</b>";
    let mut doc = parse(source);

    for child in &mut doc.body.children {
        if let Node::Text(t) = child {
            if t.value.contains("change") {
                t.value = t.value.replace("change this", "changed");
            }
        }
    }

    let out = selser(source, &doc).unwrap();
    assert!(out.starts_with("==  Keep   me=="));
    assert!(out.contains("changed"));
    assert!(out.ends_with("<b  id = 'q' >also kept</b>"));
}

#[test]
fn test_removed_node_is_dropped() {
    let source = "first [[Link]] last";
    let mut doc = parse(source);
    doc.body.children.remove(1);
    assert_eq!(selser(source, &doc).unwrap(), "first  last");
}

#[test]
fn test_provenance_free_tree_needs_no_source() {
    let mut doc = parse("== A ==\n[[B|c]]");
    doc.strip_provenance();
    let hooks = SerializerHooks::new();
    let out = SelectiveSerializer::new(None, &hooks).serialize(&doc).unwrap();
    assert_eq!(out.markup.into_string(), serialize(&doc));
}
