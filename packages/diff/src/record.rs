use crate::error::{DiffError, DiffResult};
use serde::{Deserialize, Serialize};

/// One run of text in a diff, serialized as `{"kept": "..."}` and so on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    Kept(String),
    Added(String),
    Removed(String),
}

impl Segment {
    pub fn text(&self) -> &str {
        match self {
            Segment::Kept(t) | Segment::Added(t) | Segment::Removed(t) => t,
        }
    }

    pub fn is_kept(&self) -> bool {
        matches!(self, Segment::Kept(_))
    }

    fn same_kind(&self, other: &Segment) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Ordered kept/added/removed segments turning one text into another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiffRecord {
    pub segments: Vec<Segment>,
}

impl DiffRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment, merging it into the previous one when both are the same kind.
    pub fn push(&mut self, segment: Segment) {
        if segment.text().is_empty() {
            return;
        }
        if let Some(last) = self.segments.last_mut() {
            if last.same_kind(&segment) {
                match last {
                    Segment::Kept(t) | Segment::Added(t) | Segment::Removed(t) => {
                        t.push_str(segment.text())
                    }
                }
                return;
            }
        }
        self.segments.push(segment);
    }

    pub fn is_identical(&self) -> bool {
        self.segments.iter().all(Segment::is_kept)
    }

    pub fn changes(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|s| !s.is_kept())
    }

    /// Text on the left-hand side of the diff.
    pub fn before(&self) -> String {
        self.segments
            .iter()
            .filter(|s| !matches!(s, Segment::Added(_)))
            .map(Segment::text)
            .collect()
    }

    /// Text on the right-hand side of the diff.
    pub fn after(&self) -> String {
        self.segments
            .iter()
            .filter(|s| !matches!(s, Segment::Removed(_)))
            .map(Segment::text)
            .collect()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl FromIterator<Segment> for DiffRecord {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        let mut record = DiffRecord::new();
        for segment in iter {
            record.push(segment);
        }
        record
    }
}

/// Replay `record` over `base`, reconstructing the right-hand text.
///
/// Kept and removed segments must match `base` in order.
pub fn apply(base: &str, record: &DiffRecord) -> DiffResult<String> {
    let mut rest = base;
    let mut out = String::with_capacity(base.len());

    for segment in &record.segments {
        let offset = base.len() - rest.len();
        match segment {
            Segment::Kept(text) => {
                rest = rest
                    .strip_prefix(text.as_str())
                    .ok_or_else(|| DiffError::mismatch(offset))?;
                out.push_str(text);
            }
            Segment::Removed(text) => {
                rest = rest
                    .strip_prefix(text.as_str())
                    .ok_or_else(|| DiffError::mismatch(offset))?;
            }
            Segment::Added(text) => out.push_str(text),
        }
    }

    if !rest.is_empty() {
        return Err(DiffError::mismatch(base.len() - rest.len()));
    }
    Ok(out)
}
