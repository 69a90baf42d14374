use std::collections::HashMap;

use crate::core::error::Result;
use crate::core::types::{SeqNum, StreamId, UpdateId};
use crate::storage::kv::KvNamespace;

/// A dictionary stream-id → highest-applied sequence number (spec.md 3, "Stream
/// Versions"; spec.md 4.8). An absent stream reads back as 0, meaning "never
/// applied" — consistent with `UpdateId` reserving sequence 0 for that purpose.
#[derive(Debug, Clone, Default)]
pub struct StreamVersions {
    seen: HashMap<StreamId, SeqNum>,
}

impl StreamVersions {
    pub fn new() -> Self {
        StreamVersions::default()
    }

    pub fn at(&self, stream: StreamId) -> SeqNum {
        self.seen.get(&stream).copied().unwrap_or(0)
    }

    /// Monotonic max: advances the stream's watermark if `update.seq` is newer.
    /// Returns `true` if it advanced (i.e. `update` was not a stale replay).
    pub fn update(&mut self, update: UpdateId) -> bool {
        let current = self.at(update.stream);
        if update.seq > current {
            self.seen.insert(update.stream, update.seq);
            true
        } else {
            false
        }
    }

    /// `true` when `update` is at or below the stored watermark for its stream,
    /// i.e. a replay that must be silently dropped (spec.md 4.7 step 2).
    pub fn is_stale(&self, update: UpdateId) -> bool {
        update.seq <= self.at(update.stream)
    }

    /// Elementwise minimum over every stream mentioned in either side.
    pub fn min(&self, other: &StreamVersions) -> StreamVersions {
        let mut out = StreamVersions::new();
        let mut streams: Vec<StreamId> = self.seen.keys().chain(other.seen.keys()).copied().collect();
        streams.sort_unstable();
        streams.dedup();
        for stream in streams {
            out.seen.insert(stream, self.at(stream).min(other.at(stream)));
        }
        out
    }

    pub fn persist(&self, ns: &KvNamespace) -> Result<()> {
        let mut batch = ns.new_batch();
        for (&stream, &seq) in self.seen.iter() {
            batch.put(&seqn_key(stream), &seq.to_le_bytes());
        }
        ns.apply_batch(batch)
    }

    pub fn load(ns: &KvNamespace) -> Result<Self> {
        let entries = ns.scan_prefix(b"seqn")?;
        let mut seen = HashMap::new();
        for (key, value) in entries {
            let stream_bytes: [u8; 2] = key[b"seqn".len()..].try_into().map_err(|_| {
                crate::core::error::Error::corruption("malformed stream-version key")
            })?;
            let stream = StreamId::from_le_bytes(stream_bytes);
            let seq_bytes: [u8; 8] = value
                .try_into()
                .map_err(|_| crate::core::error::Error::corruption("malformed stream-version value"))?;
            seen.insert(stream, SeqNum::from_le_bytes(seq_bytes));
        }
        Ok(StreamVersions { seen })
    }

    pub fn debug_str(&self) -> String {
        let mut entries: Vec<(StreamId, SeqNum)> = self.seen.iter().map(|(&s, &v)| (s, v)).collect();
        entries.sort_unstable();
        entries
            .iter()
            .map(|(stream, seq)| format!("{stream}:{seq}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn seqn_key(stream: StreamId) -> Vec<u8> {
    let mut key = b"seqn".to_vec();
    key.extend_from_slice(&stream.to_le_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::KvStore;

    #[test]
    fn update_is_monotonic() {
        let mut versions = StreamVersions::new();
        assert!(versions.update(UpdateId::new(1, 5)));
        assert_eq!(versions.at(1), 5);
        assert!(!versions.update(UpdateId::new(1, 3)));
        assert_eq!(versions.at(1), 5);
        assert!(versions.update(UpdateId::new(1, 6)));
    }

    #[test]
    fn stale_replay_is_rejected() {
        let mut versions = StreamVersions::new();
        versions.update(UpdateId::new(2, 10));
        assert!(versions.is_stale(UpdateId::new(2, 10)));
        assert!(versions.is_stale(UpdateId::new(2, 5)));
        assert!(!versions.is_stale(UpdateId::new(2, 11)));
    }

    #[test]
    fn min_is_elementwise() {
        let mut a = StreamVersions::new();
        a.update(UpdateId::new(1, 10));
        a.update(UpdateId::new(2, 3));

        let mut b = StreamVersions::new();
        b.update(UpdateId::new(1, 4));
        b.update(UpdateId::new(3, 7));

        let m = a.min(&b);
        assert_eq!(m.at(1), 4);
        assert_eq!(m.at(2), 0);
        assert_eq!(m.at(3), 0);
    }

    #[test]
    fn persist_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path()).unwrap();
        let ns = store.namespace(b"scope|".to_vec());

        let mut versions = StreamVersions::new();
        versions.update(UpdateId::new(1, 42));
        versions.persist(&ns).unwrap();

        let loaded = StreamVersions::load(&ns).unwrap();
        assert_eq!(loaded.at(1), 42);
    }
}
