use crate::record::{DiffRecord, Segment};

/// Render a diff as HTML-escaped text with `<ins>`/`<del>` around changes.
pub fn render_markup(record: &DiffRecord) -> String {
    let mut out = String::new();
    for segment in &record.segments {
        let text = escape(segment.text());
        match segment {
            Segment::Kept(_) => out.push_str(&text),
            Segment::Added(_) => {
                out.push_str("<ins>");
                out.push_str(&text);
                out.push_str("</ins>");
            }
            Segment::Removed(_) => {
                out.push_str("<del>");
                out.push_str(&text);
                out.push_str("</del>");
            }
        }
    }
    out
}

/// Counts of bytes kept, added and removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DiffSummary {
    pub kept: usize,
    pub added: usize,
    pub removed: usize,
}

impl DiffSummary {
    pub fn of(record: &DiffRecord) -> Self {
        record
            .segments
            .iter()
            .fold(Self::default(), |mut acc, segment| {
                match segment {
                    Segment::Kept(t) => acc.kept += t.len(),
                    Segment::Added(t) => acc.added += t.len(),
                    Segment::Removed(t) => acc.removed += t.len(),
                }
                acc
            })
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff_lines;

    #[test]
    fn test_render_markup() {
        let record = diff_lines("a\n<b>\n", "a\nc&d\n");
        assert_eq!(
            render_markup(&record),
            "a\n<del>&lt;b&gt;\n</del><ins>c&amp;d\n</ins>"
        );
    }

    #[test]
    fn test_summary() {
        let record = diff_lines("a\nb\n", "a\ncc\n");
        assert_eq!(
            DiffSummary::of(&record),
            DiffSummary {
                kept: 2,
                added: 3,
                removed: 2
            }
        );
    }
}
