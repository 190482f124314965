//! Content fetch collaborator.
//!
//! The pipeline only needs `title -> {source text, revision}`; how the content
//! is stored or transported is up to the implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Page not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl FetchError {
    pub fn not_found(title: impl Into<String>) -> Self {
        Self::NotFound(title.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldid: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    pub source_text: String,
    pub revision: RevisionInfo,
}

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch a page by title, optionally at a specific revision.
    async fn fetch(&self, title: &str, oldid: Option<u64>) -> Result<FetchResult, FetchError>;
}

/// Pages held in memory; revisions other than the latest are not kept.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    pages: HashMap<String, String>,
    delays: HashMap<String, Duration>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, title: impl Into<String>, source: impl Into<String>) -> Self {
        self.pages.insert(title.into(), source.into());
        self
    }

    /// Delay responses for `title`.
    pub fn with_delay(mut self, title: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(title.into(), delay);
        self
    }
}

#[async_trait]
impl ContentFetcher for MemoryFetcher {
    async fn fetch(&self, title: &str, oldid: Option<u64>) -> Result<FetchResult, FetchError> {
        if let Some(delay) = self.delays.get(title) {
            tokio::time::sleep(*delay).await;
        }
        let source_text = self
            .pages
            .get(title)
            .cloned()
            .ok_or_else(|| FetchError::not_found(title))?;
        Ok(FetchResult {
            source_text,
            revision: RevisionInfo {
                title: title.to_string(),
                oldid,
            },
        })
    }
}

/// Pages stored as `<root>/<title>.wiki`, with `:` and `/` in titles mapped to
/// subdirectories. `oldid` selects `<title>.<oldid>.wiki` when present.
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, title: &str, oldid: Option<u64>) -> PathBuf {
        let mut path = self.root.clone();
        let parts: Vec<&str> = title.split([':', '/']).collect();
        let (file, dirs) = match parts.split_last() {
            Some((file, dirs)) => (*file, dirs),
            None => ("", &[][..]),
        };
        for dir in dirs {
            path.push(dir);
        }
        let name = file.replace(' ', "_");
        match oldid {
            Some(id) => path.push(format!("{}.{}.wiki", name, id)),
            None => path.push(format!("{}.wiki", name)),
        }
        path
    }
}

#[async_trait]
impl ContentFetcher for DirectoryFetcher {
    async fn fetch(&self, title: &str, oldid: Option<u64>) -> Result<FetchResult, FetchError> {
        if title.split([':', '/']).any(|part| part == ".." || part == ".") {
            return Err(FetchError::not_found(title));
        }
        let path = self.path_for(title, oldid);
        debug!(title, path = %path.display(), "fetching page from disk");

        match tokio::fs::read_to_string(&path).await {
            Ok(source_text) => Ok(FetchResult {
                source_text,
                revision: RevisionInfo {
                    title: title.to_string(),
                    oldid,
                },
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(FetchError::not_found(title))
            }
            Err(err) => Err(FetchError::transport(err.to_string())),
        }
    }
}
