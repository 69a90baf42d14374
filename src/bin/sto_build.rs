//! Build tool: constructs one language side's corpus, offset index, and (unless
//! told otherwise) global token index from whitespace-tokenized numeric-id input
//! (spec.md 6, "CLI — build tool").

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokidex::core::config::Config;
use tokidex::core::types::Vid;
use tokidex::corpus::TokenCorpus;
use tokidex::docmap::DocumentMap;
use tokidex::index::TokenIndex;
use tokidex::storage::kv::KvStore;
use tokidex::storage::layout::StorageLayout;

/// Builds a token corpus and (optionally) its global suffix index from numeric
/// token ids, one sentence per line.
#[derive(Parser)]
#[command(name = "sto-build")]
struct Args {
    /// Output base name of the form `<prefix>.<lang>`.
    output_base: String,

    /// Suppress informational logging.
    #[arg(short, long)]
    quiet: bool,

    /// Input file of whitespace-tokenized numeric token ids (defaults to stdin).
    #[arg(short = 'f', long = "input-file")]
    input_file: Option<PathBuf>,

    /// Optional doc-map file recording one domain id per input line.
    #[arg(short = 'm', long = "doc-map")]
    doc_map: Option<PathBuf>,

    /// Force-build the global index even when a doc-map is supplied.
    #[arg(short = 'g', long = "global-index")]
    global_index: bool,
}

fn main() {
    let args = Args::parse();
    init_logging(args.quiet);

    if let Err(err) = run(args) {
        tracing::error!(%err, "sto-build failed");
        std::process::exit(1);
    }
}

fn init_logging(quiet: bool) {
    let filter = if quiet { "warn" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .try_init();
}

fn run(args: Args) -> Result<()> {
    let (prefix, lang) = split_output_base(&args.output_base)?;
    let layout = StorageLayout::new(format!("{prefix}."));
    std::fs::create_dir_all(layout.kv_dir().parent().unwrap_or(std::path::Path::new(".")))
        .context("creating output directory")?;

    let corpus = TokenCorpus::create(layout.track_path(&lang), layout.sentence_index_path(&lang))
        .context("creating token corpus")?;

    let lines = read_lines(args.input_file.as_deref())?;
    let build_global = args.global_index || args.doc_map.is_none();
    let config = Config::default();
    let index = TokenIndex::new();

    let mut count = 0usize;
    for line in lines {
        let line = line.context("reading input line")?;
        let tokens = parse_token_line(&line)?;
        let sid = corpus.append(&tokens)?;
        if build_global {
            index.add_sentence(sid, tokens.len(), &corpus, config.index.leaf_budget);
        }
        count += 1;
    }
    tracing::info!(sentences = count, "corpus build complete");

    let kv = KvStore::open(layout.kv_dir())?;
    if build_global {
        index.write(&kv.namespace(format!("{lang}.global|").into_bytes()))?;
    }

    let sentinfo = tokidex::corpus::SentInfoCorpus::create(layout.docmap_path(), layout.docmap_index_path())?;
    let docmap = DocumentMap::new(sentinfo);
    docmap.persist(&kv.namespace(b"docmap|".to_vec()))?;
    kv.flush()?;

    Ok(())
}

fn split_output_base(base: &str) -> Result<(String, String)> {
    match base.rsplit_once('.') {
        Some((prefix, lang)) if !prefix.is_empty() && !lang.is_empty() => Ok((prefix.to_string(), lang.to_string())),
        _ => bail!("output base must look like <prefix>.<lang>, got {base:?}"),
    }
}

fn read_lines(path: Option<&std::path::Path>) -> Result<Box<dyn Iterator<Item = io::Result<String>>>> {
    match path {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            Ok(Box::new(BufReader::new(file).lines()))
        }
        None => Ok(Box::new(BufReader::new(io::stdin()).lines())),
    }
}

fn parse_token_line(line: &str) -> Result<Vec<Vid>> {
    line.split_whitespace()
        .map(|tok| tok.parse::<u32>().map(Vid).with_context(|| format!("malformed token id {tok:?}")))
        .collect()
}
