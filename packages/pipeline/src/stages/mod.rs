//! Transform stages run between the tokenizer and the tree builder.

pub mod lists;
pub mod paragraphs;
pub mod templates;

use crate::error::PipelineResult;
use crate::manager::TransformManager;
use crate::options::PipelineOptions;
use futures::future::BoxFuture;
use std::sync::Arc;
use wikitext_parser::Token;

pub use lists::ListHandler;
pub use paragraphs::ParagraphWrapper;
pub use templates::TemplateExpander;

const BLOCK_TAGS: &[&str] = &[
    "blockquote", "center", "div", "dl", "figure", "h1", "h2", "h3", "h4", "h5", "h6", "hr",
    "ol", "p", "pre", "table", "ul",
];

pub(crate) fn is_block_tag(name: &str) -> bool {
    BLOCK_TAGS.contains(&name)
}

/// Replacement for one input token.
pub enum Expansion {
    /// Replacement tokens are known now.
    Ready(Vec<Token>),
    /// Replacement tokens arrive later; the manager keeps the token's position.
    Pending(BoxFuture<'static, PipelineResult<Vec<Token>>>),
}

impl Expansion {
    pub fn keep(token: Token) -> Self {
        Expansion::Ready(vec![token])
    }
}

/// Stage that may expand individual tokens asynchronously.
pub trait AsyncStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn expand(
        &self,
        manager: &TransformManager,
        opts: &PipelineOptions,
        token: Token,
    ) -> PipelineResult<Expansion>;
}

/// Stage that rewrites the stream token by token, holding state for one run.
pub trait SyncStage: Send {
    fn name(&self) -> &'static str;

    fn process(&mut self, token: Token, out: &mut Vec<Token>) -> PipelineResult<()>;

    fn finish(&mut self, _out: &mut Vec<Token>) -> PipelineResult<()> {
        Ok(())
    }

    fn run(&mut self, tokens: Vec<Token>) -> PipelineResult<Vec<Token>> {
        let mut out = Vec::with_capacity(tokens.len());
        for token in tokens {
            self.process(token, &mut out)?;
        }
        self.finish(&mut out)?;
        Ok(out)
    }
}

/// Creates fresh stage state for a run, or `None` when the stage does not apply.
pub type SyncStageFactory = fn(&PipelineOptions) -> Option<Box<dyn SyncStage>>;

/// One entry in a pipeline's declared stage order.
#[derive(Clone)]
pub enum Stage {
    Async(Arc<dyn AsyncStage>),
    Sync(SyncStageFactory),
}
