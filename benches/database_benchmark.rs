use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use tempfile::tempdir;
use tokidex::bitext::Bitext;
use tokidex::core::config::Config;
use tokidex::core::types::{AlignmentLink, UpdateId};

fn random_sentence(rng: &mut impl Rng, vocab_size: u32, len: usize) -> Vec<String> {
    (0..len).map(|_| rng.gen_range(0..vocab_size).to_string()).collect()
}

fn bitext_config(dir: &std::path::Path) -> Config {
    let mut cfg = Config::default();
    cfg.storage_path = dir.join("bitext.");
    cfg
}

/// Single sentence-pair insertion into an otherwise-empty bitext.
fn bench_single_insert(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let bitext = Bitext::create(bitext_config(dir.path()), "en", "fr").unwrap();
    let mut rng = rand::thread_rng();
    let mut seq = 0u64;

    c.bench_function("bitext_add_sentence_pair", |b| {
        b.iter(|| {
            seq += 1;
            let source = random_sentence(&mut rng, 2000, 12);
            let target = random_sentence(&mut rng, 2000, 12);
            bitext
                .add_sentence_pair(
                    black_box(&source),
                    black_box(&target),
                    &[AlignmentLink::new(0, 0)],
                    "default",
                    UpdateId::new(1, seq),
                )
                .unwrap();
        });
    });
}

/// Batches of sentence-pair insertions at increasing size, with a flush after
/// each batch.
fn bench_batch_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_insert");

    for batch_size in [10usize, 50, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), batch_size, |b, &batch_size| {
            let dir = tempdir().unwrap();
            let bitext = Bitext::create(bitext_config(dir.path()), "en", "fr").unwrap();
            let mut rng = rand::thread_rng();
            let mut seq = 0u64;

            b.iter(|| {
                for _ in 0..batch_size {
                    seq += 1;
                    let source = random_sentence(&mut rng, 2000, 12);
                    let target = random_sentence(&mut rng, 2000, 12);
                    bitext
                        .add_sentence_pair(&source, &target, &[], "default", UpdateId::new(1, seq))
                        .unwrap();
                }
                bitext.flush().unwrap();
            });
        });
    }
    group.finish();
}

/// Narrow-query latency against a bitext pre-populated with a fixed corpus,
/// at increasing query depth.
fn bench_narrow_query(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let bitext = Bitext::create(bitext_config(dir.path()), "en", "fr").unwrap();
    let mut rng = rand::thread_rng();
    let mut sentences = Vec::new();
    for i in 0..2000u64 {
        let source = random_sentence(&mut rng, 500, 10);
        let target = random_sentence(&mut rng, 500, 10);
        bitext.add_sentence_pair(&source, &target, &[], "default", UpdateId::new(1, i + 1)).unwrap();
        sentences.push(source);
    }
    bitext.flush().unwrap();

    let mut group = c.benchmark_group("narrow_query");
    for depth in [1usize, 2, 4].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let sample = &sentences[sentences.len() / 2];
            let query: Vec<String> = sample.iter().take(depth).cloned().collect();
            b.iter(|| {
                let mut span = bitext.source().global().span(bitext.source().corpus());
                for token in &query {
                    let vid = match bitext.source().vocab().lookup_id(token) {
                        Ok(v) => v,
                        Err(_) => return,
                    };
                    span = match span.narrow(vid) {
                        Some(next) => next,
                        None => return,
                    };
                }
                black_box(span.size());
            });
        });
    }
    group.finish();
}

/// Reopen latency for a flushed persistent bitext of varying size.
fn bench_reopen(c: &mut Criterion) {
    let mut group = c.benchmark_group("reopen");
    for size in [100usize, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let dir = tempdir().unwrap();
            {
                let bitext = Bitext::create(bitext_config(dir.path()), "en", "fr").unwrap();
                let mut rng = rand::thread_rng();
                for i in 0..size as u64 {
                    let source = random_sentence(&mut rng, 1000, 10);
                    let target = random_sentence(&mut rng, 1000, 10);
                    bitext.add_sentence_pair(&source, &target, &[], "default", UpdateId::new(1, i + 1)).unwrap();
                }
                bitext.flush().unwrap();
            }
            b.iter(|| {
                let bitext = Bitext::open(bitext_config(dir.path()), "en", "fr").unwrap();
                black_box(bitext.source().corpus().size());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_single_insert, bench_batch_insert, bench_narrow_query, bench_reopen);
criterion_main!(benches);
