use super::{print_diff, read_input};
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use wikitext_diff::{diff_words, render_markup, DEFAULT_WORD_DIFF_MAX_BYTES};

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Original text
    pub before: PathBuf,

    /// Changed text
    pub after: PathBuf,

    /// Compare word by word instead of line by line
    #[arg(short, long)]
    pub words: bool,

    /// Largest changed region refined to word level
    #[arg(long, default_value_t = DEFAULT_WORD_DIFF_MAX_BYTES)]
    pub max_word_bytes: usize,

    /// Output format (color, json, xml)
    #[arg(short, long, default_value = "color")]
    pub format: String,
}

pub fn diff(args: DiffArgs) -> Result<()> {
    let before = read_input(&args.before)?;
    let after = read_input(&args.after)?;

    let record = if args.words {
        diff_words(&before, &after)
    } else {
        wikitext_diff::diff(&before, &after, args.max_word_bytes)
    };

    match args.format.as_str() {
        "json" => println!("{}", record.to_json()),
        "xml" => println!("{}", render_markup(&record)),
        "color" => print_diff(&record),
        other => anyhow::bail!("Unknown format: {}", other),
    }
    Ok(())
}
