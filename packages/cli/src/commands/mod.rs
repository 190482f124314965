pub mod diff;
pub mod parse;
pub mod roundtrip;
pub mod serialize;

pub use diff::{diff, DiffArgs};
pub use parse::{parse, ParseArgs};
pub use roundtrip::{roundtrip, RoundTripArgs};
pub use serialize::{serialize, SerializeArgs};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wikitext_diff::{DiffRecord, Segment};
use wikitext_pipeline::{
    manager_for, ContentFetcher, DirectoryFetcher, PageInfo, ParserConfig, TransformManager,
};

/// Options shared by every command that runs the pipeline.
#[derive(Debug, Args)]
pub struct PipelineArgs {
    /// Page title used in diagnostics
    #[arg(long, default_value = "Main Page")]
    pub title: String,

    /// Directory holding template pages, e.g. `Template/Infobox.wiki`
    #[arg(long)]
    pub templates: Option<PathBuf>,

    /// Leave `{{...}}` transclusions unexpanded
    #[arg(long)]
    pub no_expand: bool,
}

impl PipelineArgs {
    /// `wikitext.config.json` from `cwd`, with command line overrides applied.
    pub fn config(&self, cwd: &Path) -> Result<ParserConfig> {
        let mut config = ParserConfig::load(cwd)?;
        if self.no_expand {
            config.expand_templates = false;
        }
        Ok(config)
    }

    pub fn manager(&self, config: ParserConfig, source: Option<String>) -> TransformManager {
        let mut page = PageInfo::new(self.title.as_str());
        if let Some(source) = source {
            page = page.with_source(source);
        }
        let fetcher = self
            .templates
            .as_ref()
            .map(|dir| Arc::new(DirectoryFetcher::new(dir)) as Arc<dyn ContentFetcher>);
        manager_for(Arc::new(config), page, fetcher)
    }
}

/// Read a file, or stdin when the path is `-`.
pub fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))
}

/// Write a diff to stdout with insertions in green and deletions in red.
pub fn print_diff(record: &DiffRecord) {
    let mut out = String::new();
    for segment in &record.segments {
        let text = match segment {
            Segment::Kept(text) => text.normal(),
            Segment::Added(text) => text.green().underline(),
            Segment::Removed(text) => text.red().strikethrough(),
        };
        out.push_str(&text.to_string());
    }
    print!("{}", out);
    if !out.ends_with('\n') {
        println!();
    }
}
