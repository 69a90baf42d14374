use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::types::{Position, Vid};
use crate::index::ordered_sum_map::OrderedSumMap;
use crate::index::position_order::{compare_positions, PositionSource};

struct LeafState {
    positions: Vec<Position>,
    /// Set once, at creation, from the token that selected this child. A leaf whose
    /// path ends in EOS is never split (spec.md 4.3, "Split gate").
    ends_in_eos: bool,
}

enum NodeState {
    Leaf(LeafState),
    Internal(OrderedSumMap<Vid, Arc<IndexNode>>),
}

/// One node of the hybrid suffix trie/array (spec.md 3, "Index Tree Node"). The
/// leaf/internal transition and all size bookkeeping live behind one `RwLock`, so
/// a reader that acquires the lock always observes a fully consistent node —
/// the spec's release-store/acquire-load discipline on `is_leaf`, the position
/// array pointer, and the partial sums collapses into one guarded read here.
pub struct IndexNode {
    state: RwLock<NodeState>,
}

impl IndexNode {
    pub fn new_leaf(ends_in_eos: bool) -> Self {
        IndexNode {
            state: RwLock::new(NodeState::Leaf(LeafState {
                positions: Vec::new(),
                ends_in_eos,
            })),
        }
    }

    pub fn new_root() -> Self {
        Self::new_leaf(false)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(&*self.state.read(), NodeState::Leaf(_))
    }

    /// Rehydrates a leaf's position array from storage (spec.md 6, "load").
    pub fn restore_leaf(&self, positions: Vec<Position>) {
        if let NodeState::Leaf(leaf) = &mut *self.state.write() {
            leaf.positions = positions;
        }
    }

    /// Rehydrates an internal node's child map from storage (spec.md 6, "load").
    pub fn restore_internal(&self, children: OrderedSumMap<Vid, Arc<IndexNode>>) {
        *self.state.write() = NodeState::Internal(children);
    }

    pub fn total_positions(&self) -> usize {
        match &*self.state.read() {
            NodeState::Leaf(l) => l.positions.len(),
            NodeState::Internal(m) => m.total_size(),
        }
    }

    /// Snapshot of a leaf's position array, or `None` if this node is internal.
    pub fn leaf_positions(&self) -> Option<Vec<Position>> {
        match &*self.state.read() {
            NodeState::Leaf(l) => Some(l.positions.clone()),
            NodeState::Internal(_) => None,
        }
    }

    /// Snapshot of an internal node's child keys, or `None` if this node is a leaf.
    pub fn child_keys(&self) -> Option<Vec<Vid>> {
        match &*self.state.read() {
            NodeState::Leaf(_) => None,
            NodeState::Internal(m) => Some(m.keys().to_vec()),
        }
    }

    pub fn child(&self, key: Vid) -> Option<Arc<IndexNode>> {
        match &*self.state.read() {
            NodeState::Internal(m) => m.get(key).map(Arc::clone),
            NodeState::Leaf(_) => None,
        }
    }

    pub fn child_size(&self, key: Vid) -> Option<usize> {
        match &*self.state.read() {
            NodeState::Internal(m) => m.get_index(key).map(|i| m.size_at(i)),
            NodeState::Leaf(_) => None,
        }
    }

    /// Random access by cumulative offset (spec.md 4.3 / 4.5). `None` if `offset`
    /// is out of range for this node.
    pub fn at_offset(&self, offset: usize, source: &dyn PositionSource) -> Option<Position> {
        enum Found {
            Position(Option<Position>),
            Child(Arc<IndexNode>, usize),
        }

        let found = match &*self.state.read() {
            NodeState::Leaf(l) => Found::Position(l.positions.get(offset).copied()),
            NodeState::Internal(m) => {
                let (idx, rel) = m.locate(offset)?;
                Found::Child(Arc::clone(m.value_at(idx)), rel)
            }
        };

        // The match above borrows `self.state`; the guard is dropped here, before
        // any recursive call, so a queued writer on an ancestor can never deadlock
        // against a reader still descending through this node.
        match found {
            Found::Position(p) => p,
            Found::Child(child, rel) => child.at_offset(rel, source),
        }
    }

    /// Inserts one position starting at `depth` tokens past the node's own prefix
    /// (spec.md 4.4, "add_sentence").
    pub fn insert(&self, pos: Position, depth: u32, source: &dyn PositionSource, budget: usize) {
        enum Action {
            Recurse(Vid, Arc<IndexNode>),
            Done,
        }

        let action = {
            let mut guard = self.state.write();
            match &mut *guard {
                NodeState::Internal(map) => {
                    let key = source
                        .token_at(pos, depth)
                        .expect("internal node reached below an exhausted suffix");
                    let ends_in_eos = key.is_eos();
                    let idx = map.get_or_insert_with(key, || Arc::new(IndexNode::new_leaf(ends_in_eos)));
                    Action::Recurse(key, Arc::clone(map.value_at(idx)))
                }
                NodeState::Leaf(leaf) => {
                    let point = leaf
                        .positions
                        .partition_point(|&p| compare_positions(p, pos, source) == Ordering::Less);
                    leaf.positions.insert(point, pos);
                    Action::Done
                }
            }
        };

        match action {
            Action::Recurse(key, child) => {
                child.insert(pos, depth + 1, source, budget);
                if let NodeState::Internal(map) = &mut *self.state.write() {
                    map.add_size(key, 1);
                }
            }
            Action::Done => self.maybe_split(depth, source, budget),
        }
    }

    fn maybe_split(&self, depth: u32, source: &dyn PositionSource, budget: usize) {
        let mut guard = self.state.write();
        let over_budget = match &*guard {
            NodeState::Leaf(l) => l.positions.len() > budget && !l.ends_in_eos,
            NodeState::Internal(_) => false,
        };
        if !over_budget {
            return;
        }
        if let NodeState::Leaf(leaf) = &*guard {
            let new_map = Self::build_children(&leaf.positions, depth, source);
            *guard = NodeState::Internal(new_map);
        }
    }

    /// Groups `positions` (already sorted under the same comparator) by the token
    /// at `depth`, forming one new leaf child per distinct key (spec.md 4.3, "Split").
    fn build_children(positions: &[Position], depth: u32, source: &dyn PositionSource) -> OrderedSumMap<Vid, Arc<IndexNode>> {
        let mut map: OrderedSumMap<Vid, Arc<IndexNode>> = OrderedSumMap::new();
        for &pos in positions {
            let key = source
                .token_at(pos, depth)
                .expect("split below an exhausted suffix");
            let ends_in_eos = key.is_eos();
            let idx = map.get_or_insert_with(key, || Arc::new(IndexNode::new_leaf(ends_in_eos)));
            let child = map.value_at(idx);
            if let NodeState::Leaf(leaf) = &mut *child.state.write() {
                leaf.positions.push(pos);
            }
            map.add_size(key, 1);
        }
        map
    }

    /// Merges `incoming` source-ordered positions into this node, set-union with
    /// duplicate-dropping at leaves (spec.md 4.3, "Merge").
    fn merge_positions(&self, incoming: &[Position], depth: u32, source: &dyn PositionSource, budget: usize) {
        let is_internal = matches!(&*self.state.read(), NodeState::Internal(_));
        if is_internal {
            let mut groups: Vec<(Vid, Vec<Position>)> = Vec::new();
            for &pos in incoming {
                let key = source.token_at(pos, depth).expect("merge below an exhausted suffix");
                match groups.iter_mut().find(|(k, _)| *k == key) {
                    Some(g) => g.1.push(pos),
                    None => groups.push((key, vec![pos])),
                }
            }
            for (key, group) in groups {
                let child = {
                    let mut guard = self.state.write();
                    if let NodeState::Internal(map) = &mut *guard {
                        let ends_in_eos = key.is_eos();
                        let idx = map.get_or_insert_with(key, || Arc::new(IndexNode::new_leaf(ends_in_eos)));
                        Arc::clone(map.value_at(idx))
                    } else {
                        unreachable!()
                    }
                };
                let before = child.total_positions();
                child.merge_positions(&group, depth + 1, source, budget);
                let after = child.total_positions();
                if let NodeState::Internal(map) = &mut *self.state.write() {
                    map.add_size(key, after as isize - before as isize);
                }
            }
        } else {
            let mut guard = self.state.write();
            if let NodeState::Leaf(leaf) = &mut *guard {
                for &pos in incoming {
                    if !leaf.positions.contains(&pos) {
                        let point = leaf
                            .positions
                            .partition_point(|&p| compare_positions(p, pos, source) == Ordering::Less);
                        leaf.positions.insert(point, pos);
                    }
                }
                if leaf.positions.len() > budget && !leaf.ends_in_eos {
                    let new_map = Self::build_children(&leaf.positions, depth, source);
                    *guard = NodeState::Internal(new_map);
                }
            }
        }
    }

    /// Builds a node from an already-sorted position array, recursively splitting
    /// past `budget` without needing per-position insertion (spec.md 5, "bulk
    /// load"). Used to rehydrate a legacy flat suffix-array dump.
    pub fn bulk_build(positions: Vec<Position>, ends_in_eos: bool, depth: u32, source: &dyn PositionSource, budget: usize) -> IndexNode {
        let node = IndexNode::new_leaf(ends_in_eos);
        node.restore_leaf(positions);
        node.bulk_split(depth, source, budget);
        node
    }

    fn bulk_split(&self, depth: u32, source: &dyn PositionSource, budget: usize) {
        let over_budget = match &*self.state.read() {
            NodeState::Leaf(l) => l.positions.len() > budget && !l.ends_in_eos,
            NodeState::Internal(_) => false,
        };
        if !over_budget {
            return;
        }
        let positions = self.leaf_positions().expect("just checked this node is a leaf");
        let map = Self::build_children(&positions, depth, source);
        *self.state.write() = NodeState::Internal(map);
        let keys = self.child_keys().unwrap_or_default();
        for key in keys {
            let child = self.child(key).expect("child key came from this node's own map");
            child.bulk_split(depth + 1, source, budget);
        }
    }

    /// Merges `other`, a node sharing this node's prefix, into `self`
    /// (spec.md 4.3, "Merge"). Used by write-buffer flush and bulk legacy load.
    pub fn merge(&self, other: &IndexNode, depth: u32, source: &dyn PositionSource, budget: usize) {
        let other_is_internal = matches!(&*other.state.read(), NodeState::Internal(_));
        if !other_is_internal {
            let positions = match &*other.state.read() {
                NodeState::Leaf(l) => l.positions.clone(),
                NodeState::Internal(_) => unreachable!(),
            };
            self.merge_positions(&positions, depth, source, budget);
            return;
        }

        // Promote self to internal first if needed, preserving its existing
        // positions exactly (no budget check: merge must never drop positions).
        {
            let mut guard = self.state.write();
            if let NodeState::Leaf(leaf) = &*guard {
                let new_map = Self::build_children(&leaf.positions, depth, source);
                *guard = NodeState::Internal(new_map);
            }
        }

        let other_children: Vec<(Vid, Arc<IndexNode>)> = match &*other.state.read() {
            NodeState::Internal(m) => m.keys().iter().map(|&k| (k, Arc::clone(m.get(k).unwrap()))).collect(),
            NodeState::Leaf(_) => unreachable!(),
        };

        for (key, other_child) in other_children {
            let target_child = {
                let mut guard = self.state.write();
                if let NodeState::Internal(map) = &mut *guard {
                    let ends_in_eos = key.is_eos();
                    let idx = map.get_or_insert_with(key, || Arc::new(IndexNode::new_leaf(ends_in_eos)));
                    Arc::clone(map.value_at(idx))
                } else {
                    unreachable!()
                }
            };
            let before = target_child.total_positions();
            target_child.merge(&other_child, depth + 1, source, budget);
            let after = target_child.total_positions();
            if let NodeState::Internal(map) = &mut *self.state.write() {
                map.add_size(key, after as isize - before as isize);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Sid;

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

    fn the_dog_bit_the_cat_on_the_mat() -> FixedSource {
        // </s>=1, bit=2, cat=3, dog=4, mat=5, on=6, the=7
        FixedSource {
            sentences: vec![vec![tok(7), tok(4), tok(2), tok(7), tok(3), tok(6), tok(7), tok(5)]],
        }
    }

    fn insert_all_suffixes(root: &IndexNode, source: &FixedSource, sid: Sid, budget: usize) {
        let len = source.sentence_len(sid);
        for offset in 0..=len {
            root.insert(Position::new(sid, offset as u32), 0, source, budget);
        }
    }

    #[test]
    fn e1_empty_span_position_order() {
        let source = the_dog_bit_the_cat_on_the_mat();
        let root = IndexNode::new_root();
        insert_all_suffixes(&root, &source, 0, 100);

        let positions = root.leaf_positions().unwrap();
        // (0, 8) is the implicit-EOS suffix: at depth 0 its token is EOS, which
        // collides with "bit"'s vid, but it has no depth-1 token at all, so the
        // exhausted suffix sorts ahead of "bit ...".
        let expected = vec![(0, 8), (0, 2), (0, 4), (0, 1), (0, 7), (0, 5), (0, 3), (0, 0), (0, 6)];
        let got: Vec<(Sid, u32)> = positions.iter().map(|p| (p.sid, p.offset)).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn e2_split_with_budget_seven() {
        let source = the_dog_bit_the_cat_on_the_mat();
        let root = IndexNode::new_root();
        insert_all_suffixes(&root, &source, 0, 7);

        let mut keys = root.child_keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec![tok(2), tok(3), tok(4), tok(5), tok(6), tok(7)]);

        let the_child = root.child(tok(7)).unwrap();
        let the_positions = the_child.leaf_positions().unwrap();
        let got: Vec<(Sid, u32)> = the_positions.iter().map(|p| (p.sid, p.offset)).collect();
        assert_eq!(got, vec![(0, 3), (0, 0), (0, 6)]);
    }

    #[test]
    fn e9_eos_leaf_never_splits() {
        let source = FixedSource {
            sentences: vec![vec![tok(7)]; 1],
        };
        let root = IndexNode::new_root();
        // Force everything down the EOS branch by inserting only the implicit-EOS
        // suffix position repeatedly across many one-token sentences sharing a key.
        let many = FixedSource {
            sentences: (0..20).map(|_| vec![tok(7)]).collect(),
        };
        let _ = source;
        for sid in 0..20 {
            root.insert(Position::new(sid, 1), 0, &many, 2);
        }
        // depth-0 token at offset=len is EOS for every sentence: all 20 positions
        // collapse into one child keyed by EOS, which must not split even though
        // it holds far more than the budget of 2.
        let eos_child = root.child(Vid::EOS).unwrap();
        assert!(eos_child.is_leaf());
        assert_eq!(eos_child.total_positions(), 20);
    }
}
