use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Half-open byte range `[start, end)` into the source text of a parse.
///
/// Serialized as a two element array so the wire format stays compact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct SourceRange {
    pub start: usize,
    pub end: usize,
}

impl SourceRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn empty_at(pos: usize) -> Self {
        Self { start: pos, end: pos }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, other: &SourceRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Slice this range out of `source`, checking bounds and char boundaries.
    pub fn slice<'a>(&self, source: &'a str) -> Option<&'a str> {
        if self.start > self.end {
            return None;
        }
        source.get(self.start..self.end)
    }
}

impl From<(usize, usize)> for SourceRange {
    fn from((start, end): (usize, usize)) -> Self {
        Self { start, end }
    }
}

impl From<SourceRange> for (usize, usize) {
    fn from(range: SourceRange) -> Self {
        (range.start, range.end)
    }
}

/// Widths of the opening and closing delimiters inside a node's source range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct TagWidths {
    pub open: usize,
    pub close: usize,
}

impl TagWidths {
    pub fn new(open: usize, close: usize) -> Self {
        Self { open, close }
    }
}

impl From<(usize, usize)> for TagWidths {
    fn from((open, close): (usize, usize)) -> Self {
        Self { open, close }
    }
}

impl From<TagWidths> for (usize, usize) {
    fn from(widths: TagWidths) -> Self {
        (widths.open, widths.close)
    }
}

/// Which surface syntax produced a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Syntax {
    /// Literal HTML tag markup, e.g. `<b>`.
    Html,
    /// Link without a pipe: `[[Target]]`.
    Simple,
    /// Link with display text: `[[Target|text]]`.
    Piped,
    /// Table cell written on the same line as its sibling (`||`, `!!`).
    Row,
}

/// Whitespace recorded inside a node's delimiters, e.g. the padding in `== Title ==`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitespaceHints {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub leading: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trailing: String,
}

/// Known provenance annotations attached by pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProvenanceKind {
    /// Node replaced an extension block (e.g. `<gallery>`).
    Extension { name: String },
    /// Node replaced a template invocation.
    Transclusion { target: String },
    /// Content that could not be represented; `src` is emitted verbatim.
    Placeholder,
    /// Wrapper around the output of a nested pipeline.
    Fragment,
}

/// Per-node provenance record, serialized as the `data-parsoid` attribute.
///
/// The typed fields cover what the serializers rely on; anything else a stage
/// wants to persist goes into `extra` and survives a JSON round trip untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataParsoid {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_range: Option<SourceRange>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_widths: Option<TagWidths>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stx: Option<Syntax>,

    /// Original source text for atomic constructs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_inserted_start: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_inserted_end: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub self_close: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub fostered: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws: Option<WhitespaceHints>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ProvenanceKind>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl DataParsoid {
    pub fn with_range(start: usize, end: usize) -> Self {
        Self {
            source_range: Some(SourceRange::new(start, end)),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == DataParsoid::default()
    }

    pub fn has_range(&self) -> bool {
        self.source_range.is_some()
    }

    pub fn stx(mut self, stx: Syntax) -> Self {
        self.stx = Some(stx);
        self
    }

    pub fn kind(mut self, kind: ProvenanceKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }

    pub fn widths(mut self, open: usize, close: usize) -> Self {
        self.tag_widths = Some(TagWidths::new(open, close));
        self
    }

    pub fn is_extension(&self) -> bool {
        matches!(self.kind, Some(ProvenanceKind::Extension { .. }))
    }

    pub fn is_transclusion(&self) -> bool {
        matches!(self.kind, Some(ProvenanceKind::Transclusion { .. }))
    }

    /// Drop everything that ties this record to a particular source text.
    pub fn strip_source(&mut self) {
        self.source_range = None;
        self.tag_widths = None;
    }

    /// Source slices of the opening and closing delimiters, when widths are known.
    pub fn delimiter_ranges(&self) -> Option<(SourceRange, SourceRange)> {
        let range = self.source_range?;
        let widths = self.tag_widths?;
        if widths.open + widths.close > range.len() {
            return None;
        }
        Some((
            SourceRange::new(range.start, range.start + widths.open),
            SourceRange::new(range.end - widths.close, range.end),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let mut dp = DataParsoid::with_range(3, 10).widths(2, 2).stx(Syntax::Piped);
        dp.extra.insert("hasNamespace".to_string(), Value::Bool(false));

        let json = serde_json::to_value(&dp).unwrap();
        assert_eq!(json["sourceRange"], serde_json::json!([3, 10]));
        assert_eq!(json["tagWidths"], serde_json::json!([2, 2]));
        assert_eq!(json["stx"], "piped");
        assert_eq!(json["hasNamespace"], false);
        assert!(json.get("autoInsertedEnd").is_none());

        let back: DataParsoid = serde_json::from_value(json).unwrap();
        assert_eq!(back, dp);
    }

    #[test]
    fn test_kind_is_tagged() {
        let dp = DataParsoid::default().kind(ProvenanceKind::Extension {
            name: "gallery".to_string(),
        });
        let json = serde_json::to_string(&dp).unwrap();
        assert_eq!(json, r#"{"kind":{"type":"extension","name":"gallery"}}"#);
    }

    #[test]
    fn test_delimiter_ranges() {
        let dp = DataParsoid::with_range(10, 30).widths(9, 10);
        let (open, close) = dp.delimiter_ranges().unwrap();
        assert_eq!(open, SourceRange::new(10, 19));
        assert_eq!(close, SourceRange::new(20, 30));

        let bad = DataParsoid::with_range(0, 3).widths(2, 2);
        assert!(bad.delimiter_ranges().is_none());
    }

    #[test]
    fn test_strip_source() {
        let mut dp = DataParsoid::with_range(0, 4).widths(2, 2).src("[[a]]");
        dp.strip_source();
        assert!(!dp.has_range());
        assert_eq!(dp.src.as_deref(), Some("[[a]]"));
    }
}
