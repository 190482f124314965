use super::ExtensionHandler;
use crate::error::PipelineResult;
use crate::manager::TransformManager;
use crate::options::PipelineOptions;
use crate::stages::Expansion;
use futures::future::{join_all, FutureExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use wikitext_parser::data_mw::{ExtensionInfo, DATA_MW};
use wikitext_parser::serializer::is_image;
use wikitext_parser::{
    DataParsoid, Element, ExtensionSerializer, Node, ProvenanceKind, TagToken, Token,
};

const NAME: &str = "gallery";
const IMAGE_OPTIONS: &str = "thumb|none";
const HAS_NAMESPACE: &str = "hasNamespace";

/// `<gallery>`: one image per line.
///
/// Each non-blank line is parsed as a thumbnail image in a nested pipeline.
/// Lines that are blank or do not produce exactly one image become
/// placeholders that keep their text.
#[derive(Debug, Default)]
pub struct GalleryHandler;

impl ExtensionHandler for GalleryHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn handle(
        &self,
        manager: &TransformManager,
        opts: &PipelineOptions,
        token: TagToken,
    ) -> PipelineResult<Expansion> {
        let lines = gallery_lines(&token);
        let manager = manager.clone();
        let opts = opts.clone();

        Ok(Expansion::Pending(
            async move {
                let entries = lines
                    .into_iter()
                    .map(|(start, line)| gallery_entry(manager.clone(), opts.clone(), start, line));
                let mut content = Vec::new();
                for entry in join_all(entries).await {
                    content.extend(entry?);
                }
                Ok(wrap(token, content))
            }
            .boxed(),
        ))
    }

    fn serializer(&self) -> Option<Arc<dyn ExtensionSerializer>> {
        Some(Arc::new(GallerySerializer))
    }
}

/// Content lines with their absolute start offsets.
fn gallery_lines(token: &TagToken) -> Vec<(usize, String)> {
    let (Some(range), Some(widths), Some(src)) =
        (token.data.source_range, token.data.tag_widths, token.data.src.as_deref())
    else {
        return Vec::new();
    };
    if widths.close == 0 {
        return Vec::new();
    }
    let Some(inner) = src.get(widths.open..src.len().saturating_sub(widths.close)) else {
        return Vec::new();
    };

    let mut start = range.start + widths.open;
    let mut lines = Vec::new();
    for line in inner.split('\n') {
        lines.push((start, line.to_string()));
        start += line.len() + 1;
    }
    lines
}

async fn gallery_entry(
    manager: TransformManager,
    opts: PipelineOptions,
    start: usize,
    line: String,
) -> PipelineResult<Vec<Token>> {
    if line.trim().is_empty() {
        return Ok(placeholder(start, &line));
    }

    let head = line.split('|').next().unwrap_or_default();
    let has_namespace = head.contains(':');
    let (markup, base) = if has_namespace {
        (format!("[[{}|{}]]", line, IMAGE_OPTIONS), start.saturating_sub(2))
    } else {
        (format!("[[Image:{}|{}]]", line, IMAGE_OPTIONS), start.saturating_sub(8))
    };

    let doc = manager.process(markup, opts.fragment(base)).await?;
    let mut figure = match doc.children() {
        [node @ Node::Element(el)] if el.attrs.has_type("mw:Image/Thumb") => node.clone(),
        other => {
            debug!(line = %line, nodes = other.len(), "gallery line is not a single image");
            return Ok(placeholder(start, &line));
        }
    };
    // The base lines the nested parse up with the real line, but its ranges
    // still cover the synthetic `[[`, prefix and options. Only the fragment
    // wrapper's range, which is exactly the line, is kept.
    figure.strip_provenance();
    if let Some(el) = figure.as_element_mut() {
        el.data
            .extra
            .insert(HAS_NAMESPACE.to_string(), Value::Bool(has_namespace));
    }

    let data = DataParsoid::with_range(start, start + line.len())
        .widths(0, 0)
        .src(line)
        .kind(ProvenanceKind::Fragment);
    let mut tokens = vec![Token::StartTag(
        TagToken::new("div").attr("typeof", "mw:DOMFragment").data(data),
    )];
    figure.to_tokens(&mut tokens);
    tokens.push(Token::EndTag(TagToken::new("div")));
    Ok(tokens)
}

fn placeholder(start: usize, line: &str) -> Vec<Token> {
    let data = DataParsoid::with_range(start, start + line.len())
        .widths(line.len(), 0)
        .src(line)
        .kind(ProvenanceKind::Placeholder);
    vec![Token::SelfClosingTag(
        TagToken::new("meta").attr("typeof", "mw:Placeholder").data(data),
    )]
}

fn wrap(token: TagToken, content: Vec<Token>) -> Vec<Token> {
    let info = ExtensionInfo {
        name: NAME.to_string(),
        attrs: token.attrs,
    };
    let open = TagToken::new("div")
        .attr("typeof", "mw:Extension/gallery")
        .attr(DATA_MW, info.to_json())
        .data(token.data);

    let mut out = Vec::with_capacity(content.len() + 2);
    out.push(Token::StartTag(open));
    out.extend(content);
    out.push(Token::EndTag(TagToken::new("div")));
    out
}

/// Writes gallery children back as one line each.
#[derive(Debug, Default)]
pub struct GallerySerializer;

impl ExtensionSerializer for GallerySerializer {
    fn child_separator(&self) -> &str {
        "\n"
    }

    fn serialize_child(&self, child: &Node) -> Option<String> {
        let el = child.as_element()?;
        if matches!(el.data.kind, Some(ProvenanceKind::Placeholder)) || el.attrs.has_type("mw:Placeholder") {
            return Some(el.data.src.clone().unwrap_or_default());
        }
        let image = if is_image(el) {
            el
        } else {
            el.child_elements().find(|c| is_image(c))?
        };
        Some(image_line(image))
    }
}

fn image_line(image: &Element) -> String {
    let has_namespace = image
        .data
        .extra
        .get(HAS_NAMESPACE)
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let file = image.attrs.get("data-file").unwrap_or_default();
    let file = if has_namespace {
        file
    } else {
        file.strip_prefix("Image:").unwrap_or(file)
    };

    let mut parts = vec![file.to_string()];
    let options = image.attrs.get("data-options").unwrap_or_default();
    let options = options
        .strip_suffix(IMAGE_OPTIONS)
        .map(|o| o.trim_end_matches('|'))
        .unwrap_or(options);
    parts.extend(options.split('|').filter(|o| !o.is_empty()).map(str::to_string));
    if let Some(caption) = image.child_elements().find(|c| c.name == "figcaption") {
        parts.push(caption.text_content());
    }
    parts.join("|")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gallery_token(src: &str) -> TagToken {
        let open = src.find('>').map_or(0, |i| i + 1);
        let close = if src.ends_with("</gallery>") { "</gallery>".len() } else { 0 };
        TagToken::new("gallery").data(
            DataParsoid::with_range(10, 10 + src.len())
                .widths(open, close)
                .src(src)
                .kind(ProvenanceKind::Extension {
                    name: "gallery".into(),
                }),
        )
    }

    #[test]
    fn test_gallery_lines() {
        let token = gallery_token("<gallery>A.png\n\nFile:B.png|cap\n</gallery>");
        let lines = gallery_lines(&token);
        let texts: Vec<&str> = lines.iter().map(|(_, l)| l.as_str()).collect();
        assert_eq!(texts, vec!["A.png", "", "File:B.png|cap", ""]);
        assert_eq!(lines[0].0, 19);
        assert_eq!(lines[2].0, 26);
    }

    #[test]
    fn test_self_closed_gallery_has_no_lines() {
        let token = gallery_token("<gallery/>");
        assert!(gallery_lines(&token).is_empty());
    }

    #[test]
    fn test_image_line() {
        let mut figure = Element::new("figure")
            .with_attr("typeof", "mw:Image/Thumb")
            .with_attr("data-file", "Image:Foo.png")
            .with_attr("data-options", "left|thumb|none")
            .with_child(Node::Element(
                Element::new("figcaption").with_child(Node::text("A cat")),
            ));
        figure
            .data
            .extra
            .insert(HAS_NAMESPACE.to_string(), Value::Bool(false));
        assert_eq!(image_line(&figure), "Foo.png|left|A cat");

        figure.data.extra.clear();
        assert_eq!(image_line(&figure), "Image:Foo.png|left|A cat");
    }

    #[test]
    fn test_placeholder_keeps_text() {
        let tokens = placeholder(5, "  ");
        let Token::SelfClosingTag(tag) = &tokens[0] else {
            panic!("expected placeholder tag");
        };
        assert_eq!(tag.data.src.as_deref(), Some("  "));
        assert_eq!(tag.data.source_range.map(|r| (r.start, r.end)), Some((5, 7)));
    }
}
