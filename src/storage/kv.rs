use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::error::Result;

/// An ordered embedded key-value store shared by every namespace hanging off one
/// bitext (spec.md 6, "KV-store layout"). Namespaces are plain byte-string prefixes;
/// the namespace owner (vocabulary, index node, stream versions) decides its own key
/// shapes and calls `namespace()` to get a prefixed view.
#[derive(Clone)]
pub struct KvStore {
    db: sled::Db,
    stats: Arc<KvStatsInner>,
}

#[derive(Default)]
struct KvStatsInner {
    gets: AtomicU64,
    hits: AtomicU64,
    puts: AtomicU64,
    removes: AtomicU64,
    prefix_scans: AtomicU64,
    batch_writes: AtomicU64,
}

/// A point-in-time snapshot of KV-store activity counters, analogous to the
/// original's per-DB performance counters. Exposed for diagnostics, not correctness.
#[derive(Debug, Clone, Copy, Default)]
pub struct KvStats {
    pub gets: u64,
    pub hits: u64,
    pub puts: u64,
    pub removes: u64,
    pub prefix_scans: u64,
    pub batch_writes: u64,
}

impl KvStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        Ok(KvStore {
            db,
            stats: Arc::new(KvStatsInner::default()),
        })
    }

    pub fn namespace(&self, prefix: impl Into<Vec<u8>>) -> KvNamespace {
        KvNamespace {
            db: self.db.clone(),
            prefix: prefix.into(),
            stats: Arc::clone(&self.stats),
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    pub fn stats(&self) -> KvStats {
        KvStats {
            gets: self.stats.gets.load(Ordering::Relaxed),
            hits: self.stats.hits.load(Ordering::Relaxed),
            puts: self.stats.puts.load(Ordering::Relaxed),
            removes: self.stats.removes.load(Ordering::Relaxed),
            prefix_scans: self.stats.prefix_scans.load(Ordering::Relaxed),
            batch_writes: self.stats.batch_writes.load(Ordering::Relaxed),
        }
    }
}

/// A prefixed view over a `KvStore`. `vocab.<lang>|`, `<scope>|`, and similar scope
/// tags from spec.md 6 become the `prefix` here; callers pass only the key suffix.
#[derive(Clone)]
pub struct KvNamespace {
    db: sled::Db,
    prefix: Vec<u8>,
    stats: Arc<KvStatsInner>,
}

impl KvNamespace {
    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        full
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.stats.gets.fetch_add(1, Ordering::Relaxed);
        let value = self.db.get(self.full_key(key))?;
        if value.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value.map(|v| v.to_vec()))
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.stats.puts.fetch_add(1, Ordering::Relaxed);
        self.db.insert(self.full_key(key), value)?;
        Ok(())
    }

    pub fn remove(&self, key: &[u8]) -> Result<()> {
        self.stats.removes.fetch_add(1, Ordering::Relaxed);
        self.db.remove(self.full_key(key))?;
        Ok(())
    }

    /// Scans every key under `prefix + sub_prefix`, yielding the suffix past the
    /// namespace prefix alongside the value.
    pub fn scan_prefix(&self, sub_prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.stats.prefix_scans.fetch_add(1, Ordering::Relaxed);
        let full_prefix = self.full_key(sub_prefix);
        let mut out = Vec::new();
        for entry in self.db.scan_prefix(&full_prefix) {
            let (key, value) = entry?;
            let suffix = key[self.prefix.len()..].to_vec();
            out.push((suffix, value.to_vec()));
        }
        Ok(out)
    }

    pub fn new_batch(&self) -> KvBatch {
        KvBatch {
            prefix: self.prefix.clone(),
            batch: sled::Batch::default(),
        }
    }

    pub fn apply_batch(&self, batch: KvBatch) -> Result<()> {
        self.stats.batch_writes.fetch_add(1, Ordering::Relaxed);
        self.db.apply_batch(batch.batch)?;
        Ok(())
    }
}

/// A batch of writes against one namespace, applied atomically (spec.md 5,
/// "Persistence crash model" step 3: "write index node values via KV batch").
pub struct KvBatch {
    prefix: Vec<u8>,
    batch: sled::Batch,
}

impl KvBatch {
    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        full
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.batch.insert(self.full_key(key), value);
    }

    pub fn remove(&mut self, key: &[u8]) {
        self.batch.remove(self.full_key(key));
    }
}
