use super::{read_input, PipelineArgs};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};
use wikitext_parser::Document;
use wikitext_pipeline::serialize_document;

#[derive(Debug, Args)]
pub struct SerializeArgs {
    /// Edited document as JSON, as printed by `parse --format json`
    pub input: PathBuf,

    /// Markup the document was originally parsed from
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Regenerate all markup instead of reusing the original source
    #[arg(long)]
    pub plain: bool,

    /// Print reuse statistics to stderr
    #[arg(long)]
    pub stats: bool,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

pub async fn serialize(args: SerializeArgs, cwd: &Path) -> Result<()> {
    let json = read_input(&args.input)?;
    let doc: Document = serde_json::from_str(&json)
        .with_context(|| format!("{} is not a parsed document", args.input.display()))?;
    let source = args.source.as_deref().map(read_input).transpose()?;

    let mut config = args.pipeline.config(cwd)?;
    if args.plain {
        config.use_selser = false;
    }
    let manager = args.pipeline.manager(config, source);
    let output = serialize_document(&manager, &doc).await?;
    print!("{}", output.markup);

    if args.stats {
        match output.stats {
            Some(stats) => eprintln!(
                "{} reused {} nodes ({} bytes), regenerated {}",
                "Stats:".dimmed(),
                stats.reused_nodes,
                stats.reused_bytes,
                stats.regenerated_nodes
            ),
            None => eprintln!("{} plain serialization", "Stats:".dimmed()),
        }
    }
    Ok(())
}
