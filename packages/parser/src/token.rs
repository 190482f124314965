use crate::provenance::{DataParsoid, SourceRange};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Ordered attribute mapping with unique keys.
///
/// Insertion order is preserved so that regenerated markup lists attributes the
/// way the author wrote them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Insert or replace `key`. Replacing keeps the original position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Insert `key` only if it is not present yet. Returns whether it was inserted.
    pub fn insert_first(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.contains(&key) {
            return false;
        }
        self.entries.push((key, value.into()));
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// True when the `typeof` attribute contains `ty` as one of its words.
    pub fn has_type(&self, ty: &str) -> bool {
        self.get("typeof")
            .map(|v| v.split_whitespace().any(|t| t == ty))
            .unwrap_or(false)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (k, v) in iter {
            attrs.insert_first(k, v);
        }
        attrs
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct AttributesVisitor;

impl<'de> Visitor<'de> for AttributesVisitor {
    type Value = Attributes;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of string attributes")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Attributes, A::Error> {
        let mut attrs = Attributes::new();
        while let Some((k, v)) = access.next_entry::<String, String>()? {
            attrs.insert_first(k, v);
        }
        Ok(attrs)
    }
}

impl<'de> Deserialize<'de> for Attributes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(AttributesVisitor)
    }
}

/// Start, end or self-closing tag flowing through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TagToken {
    pub name: String,
    pub attrs: Attributes,
    pub data: DataParsoid,
}

impl TagToken {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Attributes::new(),
            data: DataParsoid::default(),
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.set(key, value);
        self
    }

    pub fn data(mut self, data: DataParsoid) -> Self {
        self.data = data;
        self
    }

    pub fn range(&self) -> Option<SourceRange> {
        self.data.source_range
    }
}

/// Text or comment chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct TextToken {
    pub value: String,
    pub range: Option<SourceRange>,
}

impl TextToken {
    pub fn new(value: impl Into<String>, range: Option<SourceRange>) -> Self {
        Self {
            value: value.into(),
            range,
        }
    }
}

/// Token vocabulary shared by every stage.
///
/// Tag ranges cover the tag's own delimiter in the source, not the element it
/// eventually becomes; the tree builder widens them once the end tag is seen.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    StartTag(TagToken),
    EndTag(TagToken),
    SelfClosingTag(TagToken),
    Text(TextToken),
    Comment(TextToken),
    Newline(Option<SourceRange>),
    EndOfInput(usize),
}

impl Token {
    pub fn text(value: impl Into<String>, range: Option<SourceRange>) -> Self {
        Token::Text(TextToken::new(value, range))
    }

    pub fn range(&self) -> Option<SourceRange> {
        match self {
            Token::StartTag(t) | Token::EndTag(t) | Token::SelfClosingTag(t) => t.range(),
            Token::Text(t) | Token::Comment(t) => t.range,
            Token::Newline(range) => *range,
            Token::EndOfInput(pos) => Some(SourceRange::empty_at(*pos)),
        }
    }

    pub fn start(&self) -> Option<usize> {
        self.range().map(|r| r.start)
    }

    pub fn end(&self) -> Option<usize> {
        self.range().map(|r| r.end)
    }

    pub fn tag(&self) -> Option<&TagToken> {
        match self {
            Token::StartTag(t) | Token::EndTag(t) | Token::SelfClosingTag(t) => Some(t),
            _ => None,
        }
    }

    pub fn tag_name(&self) -> Option<&str> {
        self.tag().map(|t| t.name.as_str())
    }

    pub fn is_whitespace_text(&self) -> bool {
        matches!(self, Token::Text(t) if t.value.chars().all(char::is_whitespace))
    }

    /// Drop source ranges, keeping everything else.
    pub fn strip_source(&mut self) {
        match self {
            Token::StartTag(t) | Token::EndTag(t) | Token::SelfClosingTag(t) => {
                t.data.strip_source()
            }
            Token::Text(t) | Token::Comment(t) => t.range = None,
            Token::Newline(range) => *range = None,
            Token::EndOfInput(_) => {}
        }
    }
}
