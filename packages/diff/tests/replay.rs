use wikitext_diff::{apply, diff, diff_lines, diff_words, DiffRecord, Segment};

const PAIRS: &[(&str, &str)] = &[
    ("", ""),
    ("", "new\n"),
    ("old\n", ""),
    ("a\nb\nc\n", "a\nc\n"),
    ("no trailing newline", "no trailing newline\n"),
    ("== H ==\n* one\n* two\n", "== H ==\n* one\n* 2\n* three\n"),
    ("[[Foo|bar]] baz", "[[Foo|qux]] baz"),
    ("ünïcödé line\n", "unicode line\n"),
];

#[test]
fn test_every_record_replays() {
    for (a, b) in PAIRS {
        for record in [diff_lines(a, b), diff_words(a, b), diff(a, b, 64), diff(a, b, 0)] {
            assert_eq!(&apply(a, &record).unwrap(), b, "{a:?} -> {b:?}");
        }
    }
}

#[test]
fn test_required_example() {
    let record = diff_lines("a\nb\n", "a\nc\n");
    let expected: DiffRecord = vec![
        Segment::Kept("a\n".into()),
        Segment::Removed("b\n".into()),
        Segment::Added("c\n".into()),
    ]
    .into_iter()
    .collect();
    assert_eq!(record, expected);
    assert_eq!(
        serde_json::to_value(&record).unwrap(),
        serde_json::json!([{"kept": "a\n"}, {"removed": "b\n"}, {"added": "c\n"}])
    );
}
