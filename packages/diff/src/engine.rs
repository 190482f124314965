use crate::record::{DiffRecord, Segment};
use similar::{ChangeTag, TextDiff};
use tracing::debug;

/// Removed/added pairs larger than this are left at line granularity.
pub const DEFAULT_WORD_DIFF_MAX_BYTES: usize = 4096;

/// Kept runs shorter than this (in chars) between two changes are folded into them.
const NOISE_MAX_CHARS: usize = 4;

pub fn diff_lines(a: &str, b: &str) -> DiffRecord {
    collect(&TextDiff::from_lines(a, b))
}

pub fn diff_words(a: &str, b: &str) -> DiffRecord {
    collect(&TextDiff::from_words(a, b))
}

/// Line diff refined to words for small changes, then denoised.
pub fn diff(a: &str, b: &str, word_diff_max_bytes: usize) -> DiffRecord {
    refine(diff_lines(a, b), word_diff_max_bytes)
}

fn collect<'a>(diff: &TextDiff<'a, 'a, 'a, str>) -> DiffRecord {
    diff.iter_all_changes()
        .map(|change| {
            let text = change.value().to_string();
            match change.tag() {
                ChangeTag::Equal => Segment::Kept(text),
                ChangeTag::Delete => Segment::Removed(text),
                ChangeTag::Insert => Segment::Added(text),
            }
        })
        .collect()
}

/// Re-diff each removed/added pair at word level when the pair is at most
/// `max_bytes` long, then merge changes separated by short non-whitespace runs.
pub fn refine(record: DiffRecord, max_bytes: usize) -> DiffRecord {
    let mut refined = DiffRecord::new();
    let mut segments = record.segments.into_iter().peekable();

    while let Some(segment) = segments.next() {
        if let Segment::Removed(removed) = &segment {
            if let Some(Segment::Added(added)) = segments.peek() {
                if removed.len() + added.len() <= max_bytes {
                    let words = diff_words(removed, added);
                    for word in words.segments {
                        refined.push(word);
                    }
                    segments.next();
                    continue;
                }
                debug!(bytes = removed.len() + added.len(), "change too large for word diff");
            }
        }
        refined.push(segment);
    }

    merge_noise(refined)
}

fn is_noise(text: &str) -> bool {
    text.chars().count() < NOISE_MAX_CHARS && !text.chars().any(char::is_whitespace)
}

fn merge_noise(record: DiffRecord) -> DiffRecord {
    let mut out = DiffRecord::new();
    let mut removed = String::new();
    let mut added = String::new();
    let segments = record.segments;

    for (idx, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Removed(text) => removed.push_str(text),
            Segment::Added(text) => added.push_str(text),
            Segment::Kept(text) => {
                let pending = !removed.is_empty() || !added.is_empty();
                let change_follows = segments.get(idx + 1).is_some_and(|s| !s.is_kept());
                if pending && change_follows && is_noise(text) {
                    removed.push_str(text);
                    added.push_str(text);
                    continue;
                }
                flush(&mut out, &mut removed, &mut added);
                out.push(segment.clone());
            }
        }
    }
    flush(&mut out, &mut removed, &mut added);
    out
}

fn flush(out: &mut DiffRecord, removed: &mut String, added: &mut String) {
    out.push(Segment::Removed(std::mem::take(removed)));
    out.push(Segment::Added(std::mem::take(added)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::apply;

    fn kept(t: &str) -> Segment {
        Segment::Kept(t.to_string())
    }
    fn added(t: &str) -> Segment {
        Segment::Added(t.to_string())
    }
    fn removed(t: &str) -> Segment {
        Segment::Removed(t.to_string())
    }

    #[test]
    fn test_line_diff() {
        let record = diff_lines("a\nb\n", "a\nc\n");
        assert_eq!(record.segments, vec![kept("a\n"), removed("b\n"), added("c\n")]);
    }

    #[test]
    fn test_identical() {
        let record = diff_lines("same\ntext", "same\ntext");
        assert!(record.is_identical());
        assert_eq!(record.segments, vec![kept("same\ntext")]);
    }

    #[test]
    fn test_word_refinement() {
        let record = diff("the quick fox\n", "the slow fox\n", 100);
        assert_eq!(
            record.segments,
            vec![kept("the "), removed("quick"), added("slow"), kept(" fox\n")]
        );
    }

    #[test]
    fn test_large_changes_stay_line_level() {
        let record = diff("the quick fox\n", "the slow fox\n", 10);
        assert_eq!(
            record.segments,
            vec![removed("the quick fox\n"), added("the slow fox\n")]
        );
    }

    #[test]
    fn test_short_kept_run_is_merged() {
        let record = merge_noise(
            vec![removed("ab"), added("xy"), kept("-"), removed("cd"), added("zw")]
                .into_iter()
                .collect(),
        );
        assert_eq!(record.segments, vec![removed("ab-cd"), added("xy-zw")]);
    }

    #[test]
    fn test_whitespace_run_is_not_merged() {
        let input: DiffRecord = vec![removed("ab"), added("xy"), kept(" "), removed("cd"), added("zw")]
            .into_iter()
            .collect();
        assert_eq!(merge_noise(input.clone()), input);
    }

    #[test]
    fn test_refined_diff_replays() {
        let a = "== Title ==\nSome [[link]] text.\nUnchanged line\nlast bit\n";
        let b = "== Title ==\nSome [[other link]] words.\nUnchanged line\nnew tail\n";
        let record = diff(a, b, DEFAULT_WORD_DIFF_MAX_BYTES);
        assert_eq!(apply(a, &record).unwrap(), b);
        assert_eq!(record.before(), a);
        assert_eq!(record.after(), b);
    }
}
