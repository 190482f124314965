use crate::config::ParserConfig;
use crate::fetch::ContentFetcher;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use wikitext_parser::{Document, Token};

/// Identity of the page a request is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub title: String,
    /// Source text of the revision the tree was parsed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldid: Option<u64>,
}

impl PageInfo {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_oldid(mut self, oldid: u64) -> Self {
        self.oldid = Some(oldid);
        self
    }
}

/// Expanded transclusions keyed by their invocation text, plus the tree parsed
/// from the page's original source. Lives as long as one request.
#[derive(Debug, Default)]
pub struct ExpansionCache {
    expansions: HashMap<String, Vec<Token>>,
    original: Option<Arc<Document>>,
    hits: usize,
}

impl ExpansionCache {
    pub fn get(&mut self, signature: &str) -> Option<Vec<Token>> {
        let tokens = self.expansions.get(signature).cloned();
        if tokens.is_some() {
            self.hits += 1;
        }
        tokens
    }

    pub fn insert(&mut self, signature: impl Into<String>, tokens: Vec<Token>) {
        self.expansions.insert(signature.into(), tokens);
    }

    pub fn original(&self) -> Option<Arc<Document>> {
        self.original.clone()
    }

    pub fn set_original(&mut self, doc: Arc<Document>) {
        self.original = Some(doc);
    }

    pub fn len(&self) -> usize {
        self.expansions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expansions.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }
}

/// Named durations collected while a request runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timings {
    entries: Vec<(String, Duration)>,
}

impl Timings {
    pub fn record(&mut self, name: impl Into<String>, duration: Duration) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, total)) => *total += duration,
            None => self.entries.push((name, duration)),
        }
    }

    pub fn get(&self, name: &str) -> Option<Duration> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, d)| *d)
    }

    pub fn entries(&self) -> &[(String, Duration)] {
        &self.entries
    }

    /// One-line summary, e.g. `parse=12; serialize=3` (milliseconds).
    pub fn header(&self) -> String {
        self.entries
            .iter()
            .map(|(name, d)| format!("{}={}", name, d.as_millis()))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Request-scoped environment shared by every stage of one parse or serialize run.
///
/// Locks are only taken for short synchronous sections and never held across an
/// await point.
pub struct ParserEnv {
    config: Arc<ParserConfig>,
    page: PageInfo,
    fetcher: Option<Arc<dyn ContentFetcher>>,
    cache: Mutex<ExpansionCache>,
    timings: Mutex<Timings>,
    next_about: AtomicUsize,
}

impl ParserEnv {
    pub fn new(config: Arc<ParserConfig>, page: PageInfo) -> Self {
        Self {
            config,
            page,
            fetcher: None,
            cache: Mutex::new(ExpansionCache::default()),
            timings: Mutex::new(Timings::default()),
            next_about: AtomicUsize::new(0),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn page(&self) -> &PageInfo {
        &self.page
    }

    pub fn fetcher(&self) -> Option<&Arc<dyn ContentFetcher>> {
        self.fetcher.as_ref()
    }

    pub fn cache(&self) -> MutexGuard<'_, ExpansionCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sequential `about` id for the next template wrapper, e.g. `#mwt0`.
    pub fn next_about_id(&self) -> String {
        format!("#mwt{}", self.next_about.fetch_add(1, Ordering::Relaxed))
    }

    pub fn record_timing(&self, name: &str, started: Instant) {
        self.timings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .record(name, started.elapsed());
    }

    pub fn timings(&self) -> Timings {
        self.timings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Performance summary for everything recorded so far.
    pub fn performance_header(&self) -> String {
        self.timings().header()
    }
}

impl std::fmt::Debug for ParserEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserEnv")
            .field("page", &self.page)
            .field("has_fetcher", &self.fetcher.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timings_header() {
        let mut timings = Timings::default();
        timings.record("parse", Duration::from_millis(12));
        timings.record("serialize", Duration::from_millis(3));
        timings.record("parse", Duration::from_millis(1));
        assert_eq!(timings.header(), "parse=13; serialize=3");
        assert_eq!(timings.get("serialize"), Some(Duration::from_millis(3)));
    }

    #[test]
    fn test_cache() {
        let env = ParserEnv::new(Arc::new(ParserConfig::default()), PageInfo::new("Main"));
        assert!(env.cache().get("{{Foo}}").is_none());
        env.cache().insert("{{Foo}}", vec![Token::text("x", None)]);
        assert_eq!(env.cache().get("{{Foo}}").map(|t| t.len()), Some(1));
        assert_eq!(env.cache().hits(), 1);
    }

    #[test]
    fn test_about_ids_are_sequential() {
        let env = ParserEnv::new(Arc::new(ParserConfig::default()), PageInfo::new("Main"));
        assert_eq!(env.next_about_id(), "#mwt0");
        assert_eq!(env.next_about_id(), "#mwt1");
    }
}
