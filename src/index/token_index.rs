use std::sync::Arc;

use crate::core::error::Result;
use crate::core::types::{Position, Sid, Vid};
use crate::index::node::IndexNode;
use crate::index::ordered_sum_map::OrderedSumMap;
use crate::index::position_order::PositionSource;
use crate::index::span::IndexSpan;
use crate::storage::kv::KvNamespace;

/// The persistent half of the hybrid suffix trie/array for one token stream and
/// scope (spec.md 3, "Index Tree" / 4.3). Wraps a single root `IndexNode`; every
/// other operation is expressed in terms of the node's own insert/merge.
pub struct TokenIndex {
    root: Arc<IndexNode>,
}

impl TokenIndex {
    pub fn new() -> Self {
        TokenIndex {
            root: Arc::new(IndexNode::new_root()),
        }
    }

    pub fn span<'a>(&self, source: &'a dyn PositionSource) -> IndexSpan<'a> {
        IndexSpan::root(&self.root, source)
    }

    pub fn total_positions(&self) -> usize {
        self.root.total_positions()
    }

    /// Inserts one entry per suffix start of `sid`, including the implicit EOS
    /// position at `offset == len` (spec.md 4.4, "add_sentence").
    pub fn add_sentence(&self, sid: Sid, len: usize, source: &dyn PositionSource, budget: usize) {
        for offset in 0..=len as u32 {
            self.root.insert(Position::new(sid, offset), 0, source, budget);
        }
    }

    /// Merges `other` into `self` in place (spec.md 4.3, "Merge"). Used to fold a
    /// write buffer's secondary index into the persistent one, and to combine
    /// per-domain indexes during bulk legacy loads.
    pub fn merge(&self, other: &TokenIndex, source: &dyn PositionSource, budget: usize) {
        self.root.merge(&other.root, 0, source, budget);
    }

    /// Serializes every non-empty node to its `arr_<path>` / `int_<path>` key
    /// (spec.md 6, "KV-store layout").
    pub fn write(&self, ns: &KvNamespace) -> Result<()> {
        let mut batch = ns.new_batch();
        let mut path = Vec::new();
        write_node(&self.root, &mut path, &mut batch)?;
        ns.apply_batch(batch)
    }

    pub fn load(ns: &KvNamespace) -> Result<Self> {
        let root = load_node(ns, &[])?;
        Ok(TokenIndex { root: Arc::new(root) })
    }

    /// Builds an index directly from an already position-order-sorted array, as
    /// produced by reading a legacy flat suffix-array dump (spec.md 6).
    pub fn from_sorted_positions(positions: Vec<Position>, source: &dyn PositionSource, budget: usize) -> Self {
        TokenIndex {
            root: Arc::new(IndexNode::bulk_build(positions, false, 0, source, budget)),
        }
    }
}

impl Default for TokenIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_path(path: &[Vid]) -> String {
    path.iter().map(|v| v.0.to_string()).collect::<Vec<_>>().join("-")
}

fn arr_key(path: &[Vid]) -> Vec<u8> {
    format!("arr_{}", encode_path(path)).into_bytes()
}

fn int_key(path: &[Vid]) -> Vec<u8> {
    format!("int_{}", encode_path(path)).into_bytes()
}

fn write_node(node: &IndexNode, path: &mut Vec<Vid>, batch: &mut crate::storage::kv::KvBatch) -> Result<()> {
    if let Some(positions) = node.leaf_positions() {
        if !positions.is_empty() {
            let bytes = bincode::serialize(&positions)?;
            batch.put(&arr_key(path), &bytes);
        }
        return Ok(());
    }
    let keys = node.child_keys().unwrap_or_default();
    if keys.is_empty() {
        return Ok(());
    }
    let entries: Vec<(u32, usize)> = keys
        .iter()
        .map(|&k| (k.0, node.child_size(k).unwrap_or(0)))
        .collect();
    let bytes = bincode::serialize(&entries)?;
    batch.put(&int_key(path), &bytes);
    for key in keys {
        let child = node.child(key).expect("child key came from this node's own map");
        path.push(key);
        write_node(&child, path, batch)?;
        path.pop();
    }
    Ok(())
}

fn load_node(ns: &KvNamespace, path: &[Vid]) -> Result<IndexNode> {
    let ends_in_eos = path.last().map(|v| v.is_eos()).unwrap_or(false);

    if let Some(bytes) = ns.get(&arr_key(path))? {
        let positions: Vec<Position> = bincode::deserialize(&bytes)?;
        let node = IndexNode::new_leaf(ends_in_eos);
        node.restore_leaf(positions);
        return Ok(node);
    }

    if let Some(bytes) = ns.get(&int_key(path))? {
        let entries: Vec<(u32, usize)> = bincode::deserialize(&bytes)?;
        let mut map: OrderedSumMap<Vid, Arc<IndexNode>> = OrderedSumMap::new();
        for (raw_key, size) in entries {
            let key = Vid(raw_key);
            let mut child_path = path.to_vec();
            child_path.push(key);
            let child = load_node(ns, &child_path)?;
            map.get_or_insert_with(key, || Arc::new(child));
            map.add_size(key, size as isize);
        }
        let node = IndexNode::new_leaf(ends_in_eos);
        node.restore_internal(map);
        return Ok(node);
    }

    Ok(IndexNode::new_leaf(ends_in_eos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::KvStore;

    struct FixedSource {
        sentences: Vec<Vec<Vid>>,
    }

    impl PositionSource for FixedSource {
        fn token_at(&self, pos: Position, depth: u32) -> Option<Vid> {
            let sent = &self.sentences[pos.sid as usize];
            let idx = pos.offset as usize + depth as usize;
            if idx < sent.len() {
                Some(sent[idx])
            } else if idx == sent.len() {
                Some(Vid::EOS)
            } else {
                None
            }
        }

        fn sentence_len(&self, sid: Sid) -> usize {
            self.sentences[sid as usize].len()
        }
    }

    fn tok(v: u32) -> Vid {
        Vid(v)
    }

    #[test]
    fn add_sentence_then_narrow_finds_position() {
        let source = FixedSource {
            sentences: vec![vec![tok(7), tok(4), tok(2)]],
        };
        let index = TokenIndex::new();
        index.add_sentence(0, 3, &source, 100);

        let span = index.span(&source);
        let narrowed = span.narrow(tok(7)).unwrap().narrow(tok(4)).unwrap();
        assert_eq!(narrowed.size(), 1);
        assert_eq!(narrowed.at(0).unwrap(), Position::new(0, 0));
    }

    #[test]
    fn merge_combines_two_indexes() {
        let source = FixedSource {
            sentences: vec![vec![tok(7), tok(4)], vec![tok(7), tok(2)]],
        };
        let a = TokenIndex::new();
        a.add_sentence(0, 2, &source, 1);
        let b = TokenIndex::new();
        b.add_sentence(1, 2, &source, 1);

        a.merge(&b, &source, 1);
        let span = a.span(&source);
        let the = span.narrow(tok(7)).unwrap();
        assert_eq!(the.size(), 2);
    }

    #[test]
    fn write_then_load_round_trip() {
        let source = FixedSource {
            sentences: vec![vec![tok(7), tok(4), tok(2)], vec![tok(7), tok(3)]],
        };
        let index = TokenIndex::new();
        index.add_sentence(0, 3, &source, 1);
        index.add_sentence(1, 2, &source, 1);

        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path()).unwrap();
        let ns = store.namespace(b"idx|".to_vec());
        index.write(&ns).unwrap();

        let loaded = TokenIndex::load(&ns).unwrap();
        assert_eq!(loaded.total_positions(), index.total_positions());

        let span = loaded.span(&source);
        let the = span.narrow(tok(7)).unwrap();
        assert_eq!(the.size(), 2);
    }

    #[test]
    fn empty_index_writes_nothing_and_loads_empty() {
        let index = TokenIndex::new();
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path()).unwrap();
        let ns = store.namespace(b"idx|".to_vec());
        index.write(&ns).unwrap();

        let loaded = TokenIndex::load(&ns).unwrap();
        assert_eq!(loaded.total_positions(), 0);
    }
}
