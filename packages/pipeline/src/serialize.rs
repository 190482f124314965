use crate::error::PipelineResult;
use crate::manager::TransformManager;
use crate::options::PipelineOptions;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};
use wikitext_diff::{diff, DiffRecord, DiffSummary};
use wikitext_parser::{Document, OriginalPage, SelectiveSerializer, SerializeStats, Serializer};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializeOutput {
    pub markup: String,
    /// Present when the selective serializer ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<SerializeStats>,
}

/// Serialize an (edited) document back to markup.
///
/// With `useSelser` on, the page's original source is taken from the request
/// or fetched by revision id, and unmodified subtrees are copied from it. A
/// tree with provenance but no original source is rejected with
/// `MissingProvenanceSource`.
pub async fn serialize_document(
    manager: &TransformManager,
    doc: &Document,
) -> PipelineResult<SerializeOutput> {
    let env = manager.env();
    let source = if !env.config().use_selser {
        None
    } else if env.page().source.is_some() || env.page().oldid.is_some() {
        Some(manager.page_source().await?)
    } else {
        None
    };
    serialize_with_source(manager, doc, source.as_deref()).await
}

#[instrument(skip_all, fields(page = %manager.env().page().title, selser = manager.env().config().use_selser))]
async fn serialize_with_source(
    manager: &TransformManager,
    doc: &Document,
    source: Option<&str>,
) -> PipelineResult<SerializeOutput> {
    let started = Instant::now();
    let env = manager.env();
    let hooks = manager.extensions().serializer_hooks();

    let output = if env.config().use_selser {
        let original = match source {
            Some(source) => Some(original_document(manager, source).await?),
            None => None,
        };
        let page = match (source, &original) {
            (Some(source), Some(document)) => Some(OriginalPage {
                source,
                document: document.as_ref(),
            }),
            _ => None,
        };
        let result = SelectiveSerializer::new(page, &hooks).serialize(doc)?;
        SerializeOutput {
            markup: result.markup.into_string(),
            stats: Some(result.stats),
        }
    } else {
        SerializeOutput {
            markup: Serializer::new(&hooks).serialize(doc).into_string(),
            stats: None,
        }
    };

    env.record_timing("serialize", started);
    info!(
        bytes = output.markup.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "serialized page"
    );
    Ok(output)
}

/// Tree of the original revision, parsed once per request.
async fn original_document(manager: &TransformManager, source: &str) -> PipelineResult<Arc<Document>> {
    let cached = manager.env().cache().original();
    if let Some(doc) = cached {
        return Ok(doc);
    }
    debug!("parsing original revision for selective serialization");
    let doc = Arc::new(
        manager
            .process_with_timeout(source, PipelineOptions::top_level())
            .await?,
    );
    manager.env().cache().set_original(doc.clone());
    Ok(doc)
}

/// Result of parsing a page and serializing it straight back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundTripReport {
    pub original: String,
    pub serialized: String,
    pub diff: DiffRecord,
    pub summary: DiffSummary,
    pub identical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<SerializeStats>,
    /// Stage timings, e.g. `templates=1; parse=4; serialize=1`
    pub performance: String,
}

/// Parse the request's page, serialize the tree without edits and diff the
/// result against the source.
pub async fn round_trip(manager: &TransformManager) -> PipelineResult<RoundTripReport> {
    let source = manager.page_source().await?;
    let doc = manager
        .process_with_timeout(source.as_str(), PipelineOptions::top_level())
        .await?;
    manager.env().cache().set_original(Arc::new(doc.clone()));

    let output = serialize_with_source(manager, &doc, Some(&source)).await?;
    let record = diff(
        &source,
        &output.markup,
        manager.env().config().word_diff_max_bytes,
    );
    let summary = DiffSummary::of(&record);
    if !record.is_identical() {
        debug!(added = summary.added, removed = summary.removed, "round trip changed the markup");
    }

    Ok(RoundTripReport {
        identical: record.is_identical(),
        original: source,
        serialized: output.markup,
        diff: record,
        summary,
        stats: output.stats,
        performance: manager.env().performance_header(),
    })
}
