use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use tempfile::tempdir;
use tokidex::core::types::{Position, Sid, Vid};
use tokidex::index::position_order::PositionSource;
use tokidex::index::token_index::TokenIndex;
use tokidex::storage::kv::KvStore;

struct RandomCorpus {
    sentences: Vec<Vec<Vid>>,
}

impl RandomCorpus {
    fn generate(count: usize, vocab_size: u32, max_len: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let sentences = (0..count)
            .map(|_| {
                let len = rng.gen_range(4..=max_len);
                (0..len).map(|_| Vid(rng.gen_range(4..4 + vocab_size))).collect()
            })
            .collect();
        RandomCorpus { sentences }
    }

    fn all_suffixes(&self) -> Vec<Position> {
        let mut positions = Vec::new();
        for (sid, sentence) in self.sentences.iter().enumerate() {
            for offset in 0..=sentence.len() {
                positions.push(Position::new(sid as Sid, offset as u32));
            }
        }
        positions
    }
}

impl PositionSource for RandomCorpus {
    fn token_at(&self, pos: Position, depth: u32) -> Option<Vid> {
        let sentence = self.sentences.get(pos.sid as usize)?;
        let idx = pos.offset as usize + depth as usize;
        if idx < sentence.len() {
            Some(sentence[idx])
        } else if idx == sentence.len() {
            Some(Vid::EOS)
        } else {
            None
        }
    }

    fn sentence_len(&self, sid: Sid) -> usize {
        self.sentences[sid as usize].len()
    }
}

/// Incremental build: inserting sentences one at a time into a `TokenIndex`.
fn bench_incremental_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("incremental_build");
    for size in [200usize, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let corpus = RandomCorpus::generate(size, 3000, 14, 42);
            b.iter(|| {
                let index = TokenIndex::new();
                for sid in 0..corpus.sentences.len() as Sid {
                    index.add_sentence(sid, corpus.sentence_len(sid), &corpus, 100_000);
                }
                black_box(index.total_positions());
            });
        });
    }
    group.finish();
}

/// Bulk build: sorting a full set of positions once and building the tree
/// from the sorted run, the path a legacy-format upgrade takes.
fn bench_bulk_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_build");
    for size in [200usize, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let corpus = RandomCorpus::generate(size, 3000, 14, 7);
            let positions = corpus.all_suffixes();
            b.iter(|| {
                let index = TokenIndex::from_sorted_positions(black_box(positions.clone()), &corpus, 100_000);
                black_box(index.total_positions());
            });
        });
    }
    group.finish();
}

/// Write-then-load round trip through a `KvNamespace`, at increasing corpus
/// size.
fn bench_kv_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("kv_round_trip");
    for size in [200usize, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let corpus = RandomCorpus::generate(size, 3000, 14, 99);
            let index = TokenIndex::new();
            for sid in 0..corpus.sentences.len() as Sid {
                index.add_sentence(sid, corpus.sentence_len(sid), &corpus, 100_000);
            }

            let dir = tempdir().unwrap();
            let kv = KvStore::open(dir.path().join("db")).unwrap();
            let ns = kv.namespace(b"bench.global|".to_vec());
            index.write(&ns).unwrap();

            b.iter(|| {
                let loaded = TokenIndex::load(&ns).unwrap();
                black_box(loaded.total_positions());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_incremental_build, bench_bulk_build, bench_kv_round_trip);
criterion_main!(benches);
