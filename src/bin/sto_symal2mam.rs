//! Word-alignment ingester: reads `i-j` pairs per line from stdin and appends one
//! sentence of links per line to a fresh alignment corpus (spec.md 6, "CLI —
//! word-alignment ingester").

use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokidex::core::types::AlignmentLink;
use tokidex::corpus::AlignmentCorpus;

/// Reads symal-style `i-j` alignment lines from stdin and writes them to a `.mam`
/// alignment corpus.
#[derive(Parser)]
#[command(name = "sto-symal2mam")]
struct Args {
    /// Output `.mam` track path; the offset index is written alongside it with a
    /// `.six` suffix.
    output: PathBuf,

    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    let filter = if args.verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .try_init();

    if let Err(err) = run(args) {
        tracing::error!(%err, "sto-symal2mam failed");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let index_path = with_six_suffix(&args.output);
    let corpus = AlignmentCorpus::create(&args.output, &index_path).context("creating alignment corpus")?;

    let stdin = io::stdin();
    let mut count = 0usize;
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        let links = parse_links(&line)?;
        corpus.append(&links)?;
        count += 1;
    }
    tracing::info!(sentences = count, "alignment ingest complete");
    Ok(())
}

fn with_six_suffix(path: &std::path::Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".six");
    PathBuf::from(os)
}

fn parse_links(line: &str) -> Result<Vec<AlignmentLink>> {
    line.split_whitespace()
        .map(|pair| {
            let (i, j) = pair
                .split_once('-')
                .with_context(|| format!("malformed alignment pair {pair:?}"))?;
            let src: u32 = i.parse().with_context(|| format!("malformed source offset in {pair:?}"))?;
            let trg: u32 = j.parse().with_context(|| format!("malformed target offset in {pair:?}"))?;
            Ok(AlignmentLink::new(src, trg))
        })
        .collect()
}
