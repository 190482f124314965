mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{
    diff, parse, roundtrip, serialize, DiffArgs, ParseArgs, RoundTripArgs, SerializeArgs,
};

/// Wikitext CLI - parse wiki markup to annotated HTML and back
#[derive(Parser, Debug)]
#[command(name = "wikitext")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse markup into an annotated tree
    Parse(ParseArgs),

    /// Turn an (edited) tree back into markup
    Serialize(SerializeArgs),

    /// Parse and serialize a page, then diff the result against the input
    Roundtrip(RoundTripArgs),

    /// Diff two texts
    Diff(DiffArgs),
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    match cli.command {
        Command::Parse(args) => parse(args, &cwd).await,
        Command::Serialize(args) => serialize(args, &cwd).await,
        Command::Roundtrip(args) => roundtrip(args, &cwd).await,
        Command::Diff(args) => diff(args),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
