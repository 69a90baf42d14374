use std::cmp::Ordering;

use crate::core::types::{Position, Sid, Vid};

/// Resolves the token at a given depth past a `Position`'s start, so the suffix
/// array can compare positions by the token sequences they name (spec.md 3,
/// "Position"). Depth `sentence_len(sid)` resolves to the implicit EOS sentinel;
/// depth past that resolves to `None`, meaning the suffix is exhausted.
pub trait PositionSource: Send + Sync {
    fn token_at(&self, pos: Position, depth: u32) -> Option<Vid>;
    fn sentence_len(&self, sid: Sid) -> usize;
}

/// Lexicographic order over the token sequences starting at `a` and `b`, extended
/// with "a position whose remaining length is less than the current depth sorts
/// before any longer candidate" (spec.md 4.5). Ties fall back to `(sid, offset)`.
pub fn compare_positions(a: Position, b: Position, source: &dyn PositionSource) -> Ordering {
    compare_positions_from(a, b, 0, source)
}

pub fn compare_positions_from(a: Position, b: Position, start_depth: u32, source: &dyn PositionSource) -> Ordering {
    let mut depth = start_depth;
    loop {
        let ta = source.token_at(a, depth);
        let tb = source.token_at(b, depth);
        match (ta, tb) {
            (None, None) => return a.cmp(&b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x != y => return x.cmp(&y),
            _ => depth += 1,
        }
    }
}

/// `true` if the path reaching a node whose deepest matched token is EOS — such a
/// leaf is never split (spec.md 4.3, "Split gate").
pub fn path_ends_in_eos(path: &[Vid]) -> bool {
    path.last().map(|v| v.is_eos()).unwrap_or(false)
}
