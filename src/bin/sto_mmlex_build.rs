//! Lexical count tool: reads an existing bitext and writes a packed
//! coalignment-count table (spec.md 6, "CLI — lexical count tool").

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use tokidex::core::config::Config;
use tokidex::core::types::{AlignmentLink, Vid};
use tokidex::bitext::Bitext;

/// Counts per-token coalignment frequencies across a bitext's word alignment and
/// writes a packed lexical table.
#[derive(Parser)]
#[command(name = "sto-mmlex-build")]
struct Args {
    /// Base prefix of the bitext, e.g. `model/bitext.`.
    prefix: String,

    /// Source language tag.
    source_lang: String,

    /// Target language tag.
    target_lang: String,

    /// Output file path.
    #[arg(short = 'o')]
    output: PathBuf,

    /// Number of worker partitions.
    #[arg(short = 't', long = "threads", default_value_t = 1)]
    threads: usize,

    /// Truncate to the first N sentences (0 = all).
    #[arg(short = 'n', long = "num-sentences", default_value_t = 0)]
    truncate: usize,

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
        tracing::error!(%err, "sto-mmlex-build failed");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = Config::default();
    config.storage_path = PathBuf::from(&args.prefix);
    config.bulk_load_threads = args.threads.max(1);

    let bitext = Bitext::open(config, &args.source_lang, &args.target_lang).context("opening bitext")?;

    let total = bitext.source().corpus().size() as usize;
    let limit = if args.truncate == 0 { total } else { args.truncate.min(total) };
    tracing::info!(sentences = limit, threads = args.threads.max(1), "counting coalignments");

    let partitions = partition_ranges(limit, args.threads.max(1));
    let partial: Vec<HashMap<(Vid, Vid), u32>> = partitions
        .into_par_iter()
        .map(|range| count_partition(&bitext, range))
        .collect();

    let mut counts: HashMap<(Vid, Vid), u32> = HashMap::new();
    for part in partial {
        for (pair, c) in part {
            *counts.entry(pair).or_insert(0) += c;
        }
    }

    write_table(&args.output, &bitext, counts)?;
    Ok(())
}

fn partition_ranges(total: usize, threads: usize) -> Vec<std::ops::Range<usize>> {
    if total == 0 {
        return Vec::new();
    }
    let chunk = total.div_ceil(threads);
    (0..total)
        .step_by(chunk)
        .map(|start| start..(start + chunk).min(total))
        .collect()
}

fn count_partition(bitext: &Bitext, range: std::ops::Range<usize>) -> HashMap<(Vid, Vid), u32> {
    let mut counts = HashMap::new();
    for sid in range {
        let sid = sid as u32;
        let Ok(source) = bitext.source().corpus().sentence(sid) else { continue };
        let Ok(target) = bitext.target().corpus().sentence(sid) else { continue };
        let Ok(links) = bitext.alignment().sentence(sid) else { continue };
        for link in links.as_slice() {
            let AlignmentLink { src, trg } = *link;
            if let (Some(s), Some(t)) = (source.get(src as usize), target.get(trg as usize)) {
                *counts.entry((s, t)).or_insert(0) += 1;
            }
        }
    }
    counts
}

fn write_table(path: &std::path::Path, bitext: &Bitext, counts: HashMap<(Vid, Vid), u32>) -> Result<()> {
    let src_vocab_size = bitext.source().vocab().len() as u32;
    let trg_vocab_size = bitext.target().vocab().len() as u32;

    let mut rows: HashMap<u32, Vec<(u32, u32)>> = HashMap::new();
    let mut src_marginal = vec![0u64; src_vocab_size as usize + 1];
    let mut trg_marginal = vec![0u64; trg_vocab_size as usize + 1];
    for ((src, trg), count) in counts {
        rows.entry(src.0).or_default().push((trg.0, count));
        src_marginal[src.0 as usize] += count as u64;
        trg_marginal[trg.0 as usize] += count as u64;
    }
    for row in rows.values_mut() {
        row.sort_unstable_by_key(|&(t, _)| t);
    }

    let mut body = Vec::new();
    let mut row_offsets = Vec::with_capacity(src_vocab_size as usize + 1);
    for src_id in 0..=src_vocab_size {
        row_offsets.push(body.len() as u64);
        if let Some(row) = rows.get(&src_id) {
            for &(trg_id, count) in row {
                body.extend_from_slice(&trg_id.to_le_bytes());
                body.extend_from_slice(&count.to_le_bytes());
            }
        }
    }
    let index_offset = (16 + body.len()) as u64;

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    out.write_all(&index_offset.to_le_bytes())?;
    out.write_all(&src_vocab_size.to_le_bytes())?;
    out.write_all(&trg_vocab_size.to_le_bytes())?;
    out.write_all(&body)?;
    for offset in &row_offsets {
        out.write_all(&offset.to_le_bytes())?;
    }
    for total in &src_marginal {
        out.write_all(&total.to_le_bytes())?;
    }
    for total in &trg_marginal {
        out.write_all(&total.to_le_bytes())?;
    }
    out.flush()?;
    Ok(())
}
