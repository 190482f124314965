//! Typed payloads for the `data-mw` attribute.

use crate::token::Attributes;
use serde::{Deserialize, Serialize};

pub const DATA_MW: &str = "data-mw";

/// Parameters of a template invocation, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransclusionInfo {
    pub target: String,
    #[serde(default)]
    pub params: Vec<TemplateParam>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateParam {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub positional: bool,
}

impl TransclusionInfo {
    /// Parse the text between `{{` and `}}`.
    pub fn parse(inner: &str) -> Self {
        let mut parts = split_top_level(inner, '|').into_iter();
        let target = parts.next().unwrap_or_default().trim().to_string();
        let mut params = Vec::new();
        let mut index = 0;

        for part in parts {
            match named_param(part) {
                Some((name, value)) => params.push(TemplateParam {
                    name: name.to_string(),
                    value: value.to_string(),
                    positional: false,
                }),
                None => {
                    index += 1;
                    params.push(TemplateParam {
                        name: index.to_string(),
                        value: part.to_string(),
                        positional: true,
                    });
                }
            }
        }

        Self { target, params }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    pub fn to_wikitext(&self) -> String {
        let mut out = String::from("{{");
        out.push_str(&self.target);
        for param in &self.params {
            out.push('|');
            if !param.positional {
                out.push_str(&param.name);
                out.push('=');
            }
            out.push_str(&param.value);
        }
        out.push_str("}}");
        out
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_attrs(attrs: &Attributes) -> Option<Self> {
        serde_json::from_str(attrs.get(DATA_MW)?).ok()
    }
}

fn named_param(part: &str) -> Option<(&str, &str)> {
    let eq = part.find('=')?;
    let name = part[..eq].trim();
    if name.is_empty() || name.contains(['[', '{', '<']) {
        return None;
    }
    Some((name, &part[eq + 1..]))
}

/// Name and attributes of an extension block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionInfo {
    pub name: String,
    #[serde(default)]
    pub attrs: Attributes,
}

impl ExtensionInfo {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_attrs(attrs: &Attributes) -> Option<Self> {
        serde_json::from_str(attrs.get(DATA_MW)?).ok()
    }
}

/// Split on `sep` where it is not nested inside `[[ ]]` or `{{ }}`.
pub fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut last = 0;
    let mut i = 0;

    while i < bytes.len() {
        let pair = &bytes[i..bytes.len().min(i + 2)];
        if pair == b"[[" || pair == b"{{" {
            depth += 1;
            i += 2;
            continue;
        }
        if (pair == b"]]" || pair == b"}}") && depth > 0 {
            depth -= 1;
            i += 2;
            continue;
        }
        if depth == 0 && bytes[i] == sep as u8 {
            parts.push(&text[last..i]);
            last = i + 1;
        }
        i += 1;
    }

    parts.push(&text[last..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transclusion() {
        let info = TransclusionInfo::parse("Infobox |a| name = x |[[L|y]]");
        assert_eq!(info.target, "Infobox");
        assert_eq!(info.params.len(), 3);
        assert_eq!(info.param("1"), Some("a"));
        assert_eq!(info.param("name"), Some(" x "));
        assert_eq!(info.param("2"), Some("[[L|y]]"));
    }

    #[test]
    fn test_to_wikitext() {
        let info = TransclusionInfo::parse("Foo|x|k=v");
        assert_eq!(info.to_wikitext(), "{{Foo|x|k=v}}");
    }

    #[test]
    fn test_split_respects_nesting() {
        assert_eq!(split_top_level("a|{{b|c}}|d", '|'), vec!["a", "{{b|c}}", "d"]);
        assert_eq!(split_top_level("", '|'), vec![""]);
    }
}
