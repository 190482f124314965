use super::{read_input, PipelineArgs};
use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct ParseArgs {
    /// Markup file to parse (`-` reads stdin)
    pub input: PathBuf,

    /// Output format (html, json)
    #[arg(short, long, default_value = "html")]
    pub format: String,

    /// Print stage timings to stderr
    #[arg(long)]
    pub timings: bool,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

pub async fn parse(args: ParseArgs, cwd: &Path) -> Result<()> {
    if !matches!(args.format.as_str(), "html" | "json") {
        bail!("Unknown format: {}", args.format);
    }

    let source = read_input(&args.input)?;
    let config = args.pipeline.config(cwd)?;
    let manager = args.pipeline.manager(config, Some(source));
    let doc = manager.parse_page().await?;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        println!("{}", doc.to_html());
    }

    if args.timings {
        eprintln!("{} {}", "Timings:".dimmed(), manager.env().performance_header());
    }
    Ok(())
}
