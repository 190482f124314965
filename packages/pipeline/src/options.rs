use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

/// Per-pipeline options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineOptions {
    /// Content is a nested inclusion. Its provenance does not describe the
    /// top-level source and is dropped from the resulting tree.
    pub is_include: bool,

    /// Mark template expansions with wrapper metadata
    pub wrap_templates: bool,

    /// Content sits inside a block token; paragraphs are not inserted
    pub in_block_token: bool,

    /// Absolute offset of the first byte of the source text
    pub source_offset_base: usize,

    #[serde(skip)]
    pub(crate) expansion_depth: usize,

    #[serde(skip)]
    pub(crate) nested: bool,
}

impl PipelineOptions {
    pub fn top_level() -> Self {
        Self {
            wrap_templates: true,
            ..Default::default()
        }
    }

    /// Options for a nested pipeline over a fragment of the same source.
    pub fn fragment(&self, source_offset_base: usize) -> Self {
        Self {
            is_include: false,
            wrap_templates: false,
            in_block_token: true,
            source_offset_base,
            expansion_depth: self.expansion_depth,
            nested: true,
        }
    }

    /// Options for a nested pipeline over fetched template content.
    pub fn inclusion(&self) -> Self {
        Self {
            is_include: true,
            wrap_templates: false,
            in_block_token: true,
            source_offset_base: 0,
            expansion_depth: self.expansion_depth + 1,
            nested: true,
        }
    }

    pub fn expansion_depth(&self) -> usize {
        self.expansion_depth
    }

    /// Whether this run parses a whole page rather than a fragment or inclusion.
    pub fn is_top_level(&self) -> bool {
        !self.nested
    }

    pub fn validate(&self, source_len: usize) -> PipelineResult<()> {
        if self.is_include && self.wrap_templates {
            return Err(PipelineError::config(
                "wrapTemplates cannot be combined with isInclude",
            ));
        }
        if self.source_offset_base.checked_add(source_len).is_none() {
            return Err(PipelineError::config(format!(
                "sourceOffsetBase {} overflows with a source of {} bytes",
                self.source_offset_base, source_len
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(PipelineOptions::top_level().validate(10).is_ok());

        let opts = PipelineOptions {
            is_include: true,
            wrap_templates: true,
            ..Default::default()
        };
        assert!(opts.validate(0).is_err());

        let opts = PipelineOptions {
            source_offset_base: usize::MAX,
            ..Default::default()
        };
        assert!(opts.validate(1).is_err());
    }

    #[test]
    fn test_nested_options() {
        let top = PipelineOptions::top_level();
        let fragment = top.fragment(42);
        assert!(fragment.in_block_token);
        assert_eq!(fragment.source_offset_base, 42);
        assert!(fragment.validate(5).is_ok());

        let include = top.inclusion().inclusion();
        assert!(include.is_include);
        assert_eq!(include.expansion_depth(), 2);
        assert!(top.is_top_level());
        assert!(!include.is_top_level());
    }

    #[test]
    fn test_wire_names() {
        let opts: PipelineOptions =
            serde_json::from_str(r#"{"isInclude": true, "sourceOffsetBase": 7}"#).unwrap();
        assert!(opts.is_include);
        assert_eq!(opts.source_offset_base, 7);
    }
}
