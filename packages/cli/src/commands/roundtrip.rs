use super::{print_diff, read_input, PipelineArgs};
use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};
use wikitext_diff::render_markup;
use wikitext_pipeline::round_trip;

#[derive(Debug, Args)]
pub struct RoundTripArgs {
    /// Markup file to parse and serialize back (`-` reads stdin)
    pub input: PathBuf,

    /// Print the diff as markup with `<ins>`/`<del>` elements
    #[arg(long)]
    pub xml: bool,

    /// Print the full report as JSON
    #[arg(long)]
    pub json: bool,

    /// Exit with an error when the output differs from the input
    #[arg(long)]
    pub check: bool,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

pub async fn roundtrip(args: RoundTripArgs, cwd: &Path) -> Result<()> {
    let source = read_input(&args.input)?;
    let config = args.pipeline.config(cwd)?;
    let manager = args.pipeline.manager(config, Some(source));
    let report = round_trip(&manager).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if args.xml {
        println!("{}", render_markup(&report.diff));
    } else if report.identical {
        println!("{} {}", "✓".green(), "Round trip reproduced the input".green());
    } else {
        print_diff(&report.diff);
        println!(
            "{} {} bytes added, {} bytes removed",
            "✗".red(),
            report.summary.added,
            report.summary.removed
        );
    }
    eprintln!("{} {}", "Timings:".dimmed(), report.performance);

    if args.check && !report.identical {
        bail!("Round trip changed {}", args.input.display());
    }
    Ok(())
}
