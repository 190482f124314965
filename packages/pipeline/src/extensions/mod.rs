//! Handlers for extension tags such as `<gallery>`.

pub mod gallery;

use crate::error::PipelineResult;
use crate::manager::TransformManager;
use crate::options::PipelineOptions;
use crate::stages::{AsyncStage, Expansion};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;
use wikitext_parser::{ExtensionSerializer, ProvenanceKind, SerializerHooks, TagToken, Token};

pub use gallery::{GalleryHandler, GallerySerializer};

/// Turns the content of one extension tag into tokens.
pub trait ExtensionHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Expand the tag token covering the whole `<name>...</name>` block.
    fn handle(
        &self,
        manager: &TransformManager,
        opts: &PipelineOptions,
        token: TagToken,
    ) -> PipelineResult<Expansion>;

    /// Markup generation for the wrapper element this handler produces.
    fn serializer(&self) -> Option<Arc<dyn ExtensionSerializer>> {
        None
    }
}

/// Extension handlers keyed by lowercase tag name.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    handlers: HashMap<String, Arc<dyn ExtensionHandler>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in handler.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GalleryHandler));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn ExtensionHandler>) {
        self.handlers.insert(handler.name().to_lowercase(), handler);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ExtensionHandler>> {
        self.handlers.get(&name.to_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Serializer hooks for every handler that provides one.
    pub fn serializer_hooks(&self) -> SerializerHooks {
        let mut hooks = SerializerHooks::new();
        for (name, handler) in &self.handlers {
            if let Some(hook) = handler.serializer() {
                hooks.register(name.clone(), hook);
            }
        }
        hooks
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

/// Dispatches extension tag tokens to their registered handler.
#[derive(Debug)]
pub struct ExtensionStage {
    registry: Arc<ExtensionRegistry>,
}

impl ExtensionStage {
    pub fn new(registry: Arc<ExtensionRegistry>) -> Self {
        Self { registry }
    }
}

impl AsyncStage for ExtensionStage {
    fn name(&self) -> &'static str {
        "extensions"
    }

    fn expand(
        &self,
        manager: &TransformManager,
        opts: &PipelineOptions,
        token: Token,
    ) -> PipelineResult<Expansion> {
        let tag = match token {
            Token::SelfClosingTag(tag) => tag,
            other => return Ok(Expansion::keep(other)),
        };
        let handler = match &tag.data.kind {
            Some(ProvenanceKind::Extension { name }) => self.registry.get(name),
            _ => None,
        };
        match handler {
            Some(handler) => {
                trace!(extension = handler.name(), "dispatching extension tag");
                handler.handle(manager, opts, tag)
            }
            None => Ok(Expansion::keep(Token::SelfClosingTag(tag))),
        }
    }
}
