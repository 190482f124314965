use crate::env::ParserEnv;
use crate::error::{ErrorReport, PipelineError, PipelineResult};
use crate::extensions::{ExtensionRegistry, ExtensionStage};
use crate::options::PipelineOptions;
use crate::stages::{AsyncStage, Expansion, ListHandler, ParagraphWrapper, Stage, TemplateExpander};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use wikitext_parser::{build_tree, Document, Token, Tokenizer};

/// Outcome of a spawned pipeline run.
#[derive(Debug)]
pub enum PipelineEvent {
    Document(Document),
    Error(ErrorReport),
}

/// Runs markup through the tokenizer, the declared stages and the tree builder.
///
/// Cloning is cheap; nested pipelines (template inclusions, extension content)
/// are clones of the manager that started them and share its environment.
#[derive(Clone)]
pub struct TransformManager {
    env: Arc<ParserEnv>,
    extensions: Arc<ExtensionRegistry>,
    stages: Arc<Vec<Stage>>,
}

impl TransformManager {
    pub fn new(env: Arc<ParserEnv>, extensions: Arc<ExtensionRegistry>) -> Self {
        let stages = vec![
            Stage::Async(Arc::new(TemplateExpander)),
            Stage::Async(Arc::new(ExtensionStage::new(extensions.clone()))),
            Stage::Sync(ListHandler::for_options),
            Stage::Sync(ParagraphWrapper::for_options),
        ];
        Self {
            env,
            extensions,
            stages: Arc::new(stages),
        }
    }

    /// Replace the stage list, keeping the declared order.
    pub fn with_stages(mut self, stages: Vec<Stage>) -> Self {
        self.stages = Arc::new(stages);
        self
    }

    pub fn env(&self) -> &Arc<ParserEnv> {
        &self.env
    }

    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    pub fn tokenize(&self, source: &str, opts: &PipelineOptions) -> Vec<Token> {
        let config = self.env.config();
        let tags = self
            .extensions
            .names()
            .filter(|name| config.extension_enabled(name));
        Tokenizer::new(source)
            .with_offset(opts.source_offset_base)
            .with_extension_tags(tags)
            .collect()
    }

    /// Build a document from `source`. The returned future owns everything it
    /// needs, so stages can start nested runs and hold them as pending work.
    pub fn process(
        &self,
        source: impl Into<String>,
        opts: PipelineOptions,
    ) -> BoxFuture<'static, PipelineResult<Document>> {
        let manager = self.clone();
        let source = source.into();
        async move { manager.run(&source, &opts).await }.boxed()
    }

    /// [`process`](Self::process) bounded by the configured request timeout.
    pub async fn process_with_timeout(
        &self,
        source: impl Into<String>,
        opts: PipelineOptions,
    ) -> PipelineResult<Document> {
        let ms = self.env.config().request_timeout_ms;
        let run = self.process(source, opts);
        if ms == 0 {
            return run.await;
        }
        match tokio::time::timeout(Duration::from_millis(ms), run).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = ms, page = %self.env.page().title, "pipeline run timed out");
                Err(PipelineError::Timeout(ms))
            }
        }
    }

    /// Run in the background and deliver exactly one event.
    pub fn spawn(
        &self,
        source: impl Into<String>,
        opts: PipelineOptions,
    ) -> mpsc::Receiver<PipelineEvent> {
        let (tx, rx) = mpsc::channel(1);
        let manager = self.clone();
        let source = source.into();

        tokio::spawn(async move {
            let event = match manager.process_with_timeout(source, opts).await {
                Ok(doc) => PipelineEvent::Document(doc),
                Err(err) => {
                    warn!(code = err.code(), error = %err, "pipeline run failed");
                    let context = format!("parsing page '{}'", manager.env.page().title);
                    PipelineEvent::Error(err.report(context))
                }
            };
            // The receiver may have gone away; nobody is left to tell.
            let _ = tx.send(event).await;
        });
        rx
    }

    /// Source text of the request's page, fetched when it was not supplied.
    pub async fn page_source(&self) -> PipelineResult<String> {
        let page = self.env.page();
        if let Some(source) = &page.source {
            return Ok(source.clone());
        }
        let fetcher = self.env.fetcher().ok_or_else(|| {
            PipelineError::config(format!("page '{}' has no source and no fetcher", page.title))
        })?;
        Ok(fetcher.fetch(&page.title, page.oldid).await?.source_text)
    }

    /// Parse the request's page and remember the tree as the original revision.
    pub async fn parse_page(&self) -> PipelineResult<Document> {
        let source = self.page_source().await?;
        let doc = self
            .process_with_timeout(source, PipelineOptions::top_level())
            .await?;
        self.env.cache().set_original(Arc::new(doc.clone()));
        Ok(doc)
    }

    #[instrument(skip_all, fields(bytes = source.len(), base = opts.source_offset_base, depth = opts.expansion_depth()))]
    async fn run(&self, source: &str, opts: &PipelineOptions) -> PipelineResult<Document> {
        opts.validate(source.len())?;
        let started = Instant::now();
        let mut tokens = self.tokenize(source, opts);

        for stage in self.stages.iter() {
            let stage_started = Instant::now();
            let name = match stage {
                Stage::Async(stage) => {
                    tokens = self.run_async_stage(stage.as_ref(), tokens, opts).await?;
                    stage.name()
                }
                Stage::Sync(factory) => match factory(opts) {
                    Some(mut stage) => {
                        let name = stage.name();
                        tokens = stage.run(tokens).map_err(|err| {
                            warn!(stage = name, error = %err, "stage failed");
                            err.in_stage(name)
                        })?;
                        name
                    }
                    None => continue,
                },
            };
            if opts.is_top_level() {
                self.env.record_timing(name, stage_started);
            }
        }

        let mut doc = build_tree(tokens);
        if opts.is_include {
            doc.strip_provenance();
        } else {
            doc.validate_provenance(opts.source_offset_base, source.len())?;
        }

        if opts.is_top_level() {
            self.env.record_timing("parse", started);
            info!(
                page = %self.env.page().title,
                nodes = doc.children().len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "parsed page"
            );
        }
        Ok(doc)
    }

    /// Expand tokens through `stage`. Pending expansions run concurrently and
    /// are spliced back at the position of the token they replace, whatever
    /// order they finish in.
    async fn run_async_stage(
        &self,
        stage: &dyn AsyncStage,
        tokens: Vec<Token>,
        opts: &PipelineOptions,
    ) -> PipelineResult<Vec<Token>> {
        let mut slots: Vec<Option<Vec<Token>>> = Vec::with_capacity(tokens.len());
        let mut pending = FuturesUnordered::new();

        for token in tokens {
            match stage.expand(self, opts, token)? {
                Expansion::Ready(out) => slots.push(Some(out)),
                Expansion::Pending(future) => {
                    let idx = slots.len();
                    slots.push(None);
                    pending.push(future.map(move |result| (idx, result)));
                }
            }
        }

        if !pending.is_empty() {
            debug!(stage = stage.name(), pending = pending.len(), "awaiting expansions");
        }
        while let Some((idx, result)) = pending.next().await {
            slots[idx] = Some(result?);
        }

        Ok(slots.into_iter().flatten().flatten().collect())
    }
}

impl std::fmt::Debug for TransformManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformManager")
            .field("env", &self.env)
            .field("stages", &self.stages.len())
            .finish()
    }
}
