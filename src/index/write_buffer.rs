use parking_lot::Mutex;

use crate::core::types::{Sid, UpdateId};
use crate::index::position_order::PositionSource;
use crate::index::token_index::TokenIndex;

struct Buffered {
    index: TokenIndex,
    pending: usize,
    highest_update: Option<UpdateId>,
}

/// Wraps a persistent `TokenIndex` with an in-memory secondary index that absorbs
/// `add_sentence` calls and periodically merges into the persistent one
/// (spec.md 4.6, "Write Buffer"). Folding K sentences per merge amortizes the
/// persistent index's per-append KV-store cost.
pub struct WriteBuffer {
    persistent: TokenIndex,
    buffered: Mutex<Buffered>,
    batch_size: usize,
    budget: usize,
}

impl WriteBuffer {
    pub fn new(persistent: TokenIndex, batch_size: usize, budget: usize) -> Self {
        WriteBuffer {
            persistent,
            buffered: Mutex::new(Buffered {
                index: TokenIndex::new(),
                pending: 0,
                highest_update: None,
            }),
            batch_size: batch_size.max(1),
            budget,
        }
    }

    pub fn add_sentence(&self, sid: Sid, len: usize, update: UpdateId, source: &dyn PositionSource) {
        let mut buffered = self.buffered.lock();
        buffered.index.add_sentence(sid, len, source, self.budget);
        buffered.pending += 1;
        buffered.highest_update = Some(match buffered.highest_update {
            Some(current) if current.seq >= update.seq => current,
            _ => update,
        });
        if buffered.pending >= self.batch_size {
            self.flush_locked(&mut buffered, source);
        }
    }

    pub fn flush(&self, source: &dyn PositionSource) {
        let mut buffered = self.buffered.lock();
        if buffered.pending > 0 {
            self.flush_locked(&mut buffered, source);
        }
    }

    fn flush_locked(&self, buffered: &mut Buffered, source: &dyn PositionSource) {
        self.persistent.merge(&buffered.index, source, self.budget);
        buffered.index = TokenIndex::new();
        buffered.pending = 0;
    }

    pub fn highest_update(&self) -> Option<UpdateId> {
        self.buffered.lock().highest_update
    }

    pub fn persistent(&self) -> &TokenIndex {
        &self.persistent
    }
}
