use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wikitext_parser::{
    build_tree, parse, serialize, tokenize, OriginalPage, SelectiveSerializer, SerializerHooks,
};

const ARTICLE: &str = r#"== History ==
The '''city''' was founded in [[1850|the year 1850]] by settlers from the [[Coast]].
It grew quickly after the {{convert|12|km}} railway opened.<!-- citation needed -->

=== Districts ===
* Old town
** Market square
* Harbour
# First
# Second

{| class="wikitable"
! Name !! Population
|-
| North || 12,000
|-
| South || 9,500
|}

<div class="note">See also <b>related</b> pages.</div>
[[File:Skyline.jpg|thumb|The skyline at dusk]]
"#;

fn tokenize_article(c: &mut Criterion) {
    c.bench_function("tokenize_article", |b| b.iter(|| tokenize(black_box(ARTICLE))));
}

fn build_article(c: &mut Criterion) {
    let tokens = tokenize(ARTICLE);
    c.bench_function("build_tree_article", |b| {
        b.iter(|| build_tree(black_box(tokens.clone())))
    });
}

fn serialize_article(c: &mut Criterion) {
    let doc = parse(ARTICLE);
    c.bench_function("plain_serialize_article", |b| b.iter(|| serialize(black_box(&doc))));

    let hooks = SerializerHooks::new();
    let page = OriginalPage {
        source: ARTICLE,
        document: &doc,
    };
    let selser = SelectiveSerializer::new(Some(page), &hooks);
    c.bench_function("selective_serialize_article", |b| {
        b.iter(|| selser.serialize(black_box(&doc)))
    });
}

fn parse_large(c: &mut Criterion) {
    let source = ARTICLE.repeat(50);
    c.bench_function("parse_large_page", |b| b.iter(|| parse(black_box(&source))));
}

criterion_group!(
    benches,
    tokenize_article,
    build_article,
    serialize_article,
    parse_large
);
criterion_main!(benches);
