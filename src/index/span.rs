use std::cmp::Ordering;
use std::sync::Arc;

use crate::core::types::{Position, Vid};
use crate::index::node::IndexNode;
use crate::index::position_order::PositionSource;

enum Frontier {
    /// Still sitting on a tree node; could turn out to be a leaf or internal
    /// the moment it's narrowed, since splits happen concurrently with reads.
    Node(Arc<IndexNode>),
    /// Flattened into a snapshot of one leaf's positions, narrowed to `[lo, hi)`.
    Leaf { positions: Arc<Vec<Position>>, lo: usize, hi: usize },
}

/// A read cursor over the suffix index: the set of corpus positions whose
/// token sequence starts with the phrase narrowed so far (spec.md 4.3, "Span").
/// Snapshots the leaf it lands on, so a span's view is stable even if a writer
/// splits or merges nodes underneath it afterward.
pub struct IndexSpan<'a> {
    source: &'a dyn PositionSource,
    frontier: Frontier,
    depth: u32,
    size: usize,
}

impl<'a> IndexSpan<'a> {
    pub fn root(root: &Arc<IndexNode>, source: &'a dyn PositionSource) -> Self {
        let size = root.total_positions();
        IndexSpan {
            source,
            frontier: Frontier::Node(Arc::clone(root)),
            depth: 0,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn in_leaf(&self) -> bool {
        match &self.frontier {
            Frontier::Leaf { .. } => true,
            Frontier::Node(node) => node.is_leaf(),
        }
    }

    /// Narrows the span to positions whose token at the current depth equals
    /// `token`. Returns `None` if no position matches (spec.md 4.5, "narrow").
    pub fn narrow(&self, token: Vid) -> Option<IndexSpan<'a>> {
        match &self.frontier {
            Frontier::Node(node) => match node.leaf_positions() {
                Some(positions) => {
                    let arc = Arc::new(positions);
                    let (lo, hi) = equal_range(&arc, 0, arc.len(), self.depth, token, self.source);
                    if lo == hi {
                        return None;
                    }
                    Some(IndexSpan {
                        source: self.source,
                        frontier: Frontier::Leaf { positions: arc, lo, hi },
                        depth: self.depth + 1,
                        size: hi - lo,
                    })
                }
                None => {
                    let child = node.child(token)?;
                    let size = node.child_size(token).unwrap_or(0);
                    Some(IndexSpan {
                        source: self.source,
                        frontier: Frontier::Node(child),
                        depth: self.depth + 1,
                        size,
                    })
                }
            },
            Frontier::Leaf { positions, lo, hi } => {
                let (new_lo, new_hi) = equal_range(positions, *lo, *hi, self.depth, token, self.source);
                if new_lo == new_hi {
                    return None;
                }
                Some(IndexSpan {
                    source: self.source,
                    frontier: Frontier::Leaf {
                        positions: Arc::clone(positions),
                        lo: new_lo,
                        hi: new_hi,
                    },
                    depth: self.depth + 1,
                    size: new_hi - new_lo,
                })
            }
        }
    }

    /// Random access by offset within the span, `0 <= index < size()`.
    pub fn at(&self, index: usize) -> Option<Position> {
        if index >= self.size {
            return None;
        }
        match &self.frontier {
            Frontier::Node(node) => node.at_offset(index, self.source),
            Frontier::Leaf { positions, lo, .. } => positions.get(lo + index).copied(),
        }
    }

    /// Distinct tokens immediately reachable from this span's frontier, in
    /// ascending order (spec.md 4.5, "child tokens").
    pub fn child_tokens(&self) -> Vec<Vid> {
        match &self.frontier {
            Frontier::Node(node) => match node.child_keys() {
                Some(keys) => keys,
                None => {
                    let positions = node.leaf_positions().unwrap_or_default();
                    distinct_tokens_at(&positions, 0, positions.len(), self.depth, self.source)
                }
            },
            Frontier::Leaf { positions, lo, hi } => distinct_tokens_at(positions, *lo, *hi, self.depth, self.source),
        }
    }
}

fn token_order(a: Option<Vid>, b: Vid) -> Ordering {
    match a {
        None => Ordering::Less,
        Some(x) => x.cmp(&b),
    }
}

fn equal_range(
    positions: &[Position],
    lo: usize,
    hi: usize,
    depth: u32,
    token: Vid,
    source: &dyn PositionSource,
) -> (usize, usize) {
    let slice = &positions[lo..hi];
    let start = slice.partition_point(|&p| token_order(source.token_at(p, depth), token) == Ordering::Less);
    let end = start + slice[start..].partition_point(|&p| token_order(source.token_at(p, depth), token) != Ordering::Greater);
    (lo + start, lo + end)
}

fn distinct_tokens_at(positions: &[Position], lo: usize, hi: usize, depth: u32, source: &dyn PositionSource) -> Vec<Vid> {
    let mut out = Vec::new();
    for &pos in &positions[lo..hi] {
        if let Some(tok) = source.token_at(pos, depth) {
            if out.last() != Some(&tok) {
                out.push(tok);
            }
        }
    }
    out
}
