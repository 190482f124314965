use super::{is_block_tag, AsyncStage, Expansion};
use crate::error::{PipelineError, PipelineResult};
use crate::fetch::FetchError;
use crate::manager::TransformManager;
use crate::options::PipelineOptions;
use futures::FutureExt;
use tracing::{debug, trace};
use wikitext_parser::data_mw::{TransclusionInfo, DATA_MW};
use wikitext_parser::{ProvenanceKind, TagToken, Token};

/// Replaces `{{...}}` transclusions with the parsed content of the template.
///
/// Template source is fetched, parameters are substituted, and the result runs
/// through a nested inclusion pipeline. Expansions are cached per request by
/// their invocation text.
#[derive(Debug, Default)]
pub struct TemplateExpander;

impl AsyncStage for TemplateExpander {
    fn name(&self) -> &'static str {
        "templates"
    }

    fn expand(
        &self,
        manager: &TransformManager,
        opts: &PipelineOptions,
        token: Token,
    ) -> PipelineResult<Expansion> {
        let tag = match token {
            Token::SelfClosingTag(tag) if is_transclusion(&tag) => tag,
            other => return Ok(Expansion::keep(other)),
        };
        let Some(info) = TransclusionInfo::from_attrs(&tag.attrs) else {
            return Ok(Expansion::keep(Token::SelfClosingTag(tag)));
        };

        let env = manager.env();
        let config = env.config();
        // Ids follow source order, not completion order.
        let about = env.next_about_id();
        if !config.expand_templates || env.fetcher().is_none() {
            return Ok(Expansion::Ready(wrap(opts, tag, about, Vec::new())));
        }

        let depth = opts.expansion_depth();
        if depth >= config.max_expansion_depth {
            return Err(PipelineError::ExpansionLoop {
                target: info.target,
                depth,
            });
        }

        let manager = manager.clone();
        let opts = opts.clone();
        Ok(Expansion::Pending(
            async move {
                let content = expand_transclusion(&manager, &opts, &tag, &info).await?;
                Ok(wrap(&opts, tag, about, content))
            }
            .boxed(),
        ))
    }
}

fn is_transclusion(tag: &TagToken) -> bool {
    tag.name == "template" && matches!(tag.data.kind, Some(ProvenanceKind::Transclusion { .. }))
}

async fn expand_transclusion(
    manager: &TransformManager,
    opts: &PipelineOptions,
    tag: &TagToken,
    info: &TransclusionInfo,
) -> PipelineResult<Vec<Token>> {
    let signature = tag.data.src.clone().unwrap_or_else(|| info.to_wikitext());
    if let Some(tokens) = manager.env().cache().get(&signature) {
        trace!(%signature, "transclusion cache hit");
        return Ok(tokens);
    }

    let title = format!("{}:{}", manager.env().config().template_namespace, info.target);
    let fetcher = manager
        .env()
        .fetcher()
        .cloned()
        .ok_or_else(|| PipelineError::config("template expansion needs a fetcher"))?;

    let source = match fetcher.fetch(&title, None).await {
        Ok(result) => result.source_text,
        Err(FetchError::NotFound(_)) => {
            debug!(%title, "template not found, linking to it instead");
            return Ok(red_link(&title));
        }
        Err(err) => return Err(err.into()),
    };

    let expanded = substitute_params(&source, info);
    let doc = manager.process(expanded, opts.inclusion()).await?;

    let mut tokens = Vec::new();
    for child in doc.children() {
        child.to_tokens(&mut tokens);
    }
    manager.env().cache().insert(signature, tokens.clone());
    Ok(tokens)
}

/// Surround expanded content with the transclusion's wrapper element, which
/// carries the invocation's provenance and `data-mw`.
fn wrap(opts: &PipelineOptions, tag: TagToken, about: String, content: Vec<Token>) -> Vec<Token> {
    if !opts.wrap_templates && !content.is_empty() {
        return content;
    }

    let name = if content.iter().any(is_block_start) { "div" } else { "span" };
    let data_mw = tag.attrs.get(DATA_MW).unwrap_or_default().to_string();
    let open = TagToken::new(name)
        .attr("typeof", "mw:Transclusion")
        .attr("about", about)
        .attr(DATA_MW, data_mw)
        .data(tag.data);

    let mut out = Vec::with_capacity(content.len() + 2);
    out.push(Token::StartTag(open));
    out.extend(content);
    out.push(Token::EndTag(TagToken::new(name)));
    out
}

fn is_block_start(token: &Token) -> bool {
    match token {
        Token::StartTag(tag) | Token::SelfClosingTag(tag) => is_block_tag(&tag.name),
        _ => false,
    }
}

fn red_link(title: &str) -> Vec<Token> {
    vec![
        Token::StartTag(
            TagToken::new("a")
                .attr("rel", "mw:WikiLink")
                .attr("href", format!("./{}", title))
                .attr("class", "new"),
        ),
        Token::text(title, None),
        Token::EndTag(TagToken::new("a")),
    ]
}

/// Replace `{{{name}}}` and `{{{name|default}}}` in template source with the
/// invocation's arguments. Named values are trimmed, positional ones are not.
/// References without an argument or default are left as written.
pub fn substitute_params(source: &str, info: &TransclusionInfo) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(open) = rest.find("{{{") {
        out.push_str(&rest[..open]);
        let body = &rest[open + 3..];
        let Some(close) = body.find("}}}") else {
            out.push_str(&rest[open..]);
            return out;
        };

        let inner = &body[..close];
        let (name, default) = match inner.split_once('|') {
            Some((name, default)) => (name.trim(), Some(default)),
            None => (inner.trim(), None),
        };
        let value = info
            .params
            .iter()
            .find(|p| p.name == name)
            .map(|p| if p.positional { p.value.as_str() } else { p.value.trim() });

        match value.or(default) {
            Some(value) => out.push_str(value),
            None => {
                out.push_str("{{{");
                out.push_str(inner);
                out.push_str("}}}");
            }
        }
        rest = &body[close + 3..];
    }

    out.push_str(rest);
    out
}
