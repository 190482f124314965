//! Asynchronous parse and serialize pipeline for wiki markup.
//!
//! A [`TransformManager`] tokenizes markup, runs the token stream through its
//! declared stages (template expansion, extensions, lists, paragraphs) and
//! builds the annotated tree. [`serialize_document`] turns a possibly edited
//! tree back into markup, reusing original source where nothing changed.

pub mod config;
pub mod env;
pub mod error;
pub mod extensions;
pub mod fetch;
pub mod manager;
pub mod options;
pub mod serialize;
pub mod stages;

pub use config::{ParserConfig, DEFAULT_CONFIG_NAME};
pub use env::{ExpansionCache, PageInfo, ParserEnv, Timings};
pub use error::{ErrorReport, PipelineError, PipelineResult};
pub use extensions::{ExtensionHandler, ExtensionRegistry, ExtensionStage, GalleryHandler};
pub use fetch::{ContentFetcher, DirectoryFetcher, FetchError, FetchResult, MemoryFetcher, RevisionInfo};
pub use manager::{PipelineEvent, TransformManager};
pub use options::PipelineOptions;
pub use serialize::{round_trip, serialize_document, RoundTripReport, SerializeOutput};
pub use stages::{AsyncStage, Expansion, Stage, SyncStage};

use std::sync::Arc;

/// Manager with the built-in extensions for one request.
pub fn manager_for(config: Arc<ParserConfig>, page: PageInfo, fetcher: Option<Arc<dyn ContentFetcher>>) -> TransformManager {
    let mut env = ParserEnv::new(config, page);
    if let Some(fetcher) = fetcher {
        env = env.with_fetcher(fetcher);
    }
    TransformManager::new(Arc::new(env), Arc::new(ExtensionRegistry::with_defaults()))
}
