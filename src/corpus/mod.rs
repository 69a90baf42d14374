pub mod element;
pub mod track;

pub use element::CorpusElement;
pub use track::{Corpus, Sentence};

use crate::core::error::Result;
use crate::core::types::{AlignmentLink, Position, Sid, SentInfo, Vid};
use crate::index::position_order::PositionSource;

/// A token corpus: one language side's append-only sentence store.
pub type TokenCorpus = Corpus<Vid>;

/// Word-alignment links, one sentence of `(src-offset, trg-offset)` pairs per entry.
pub type AlignmentCorpus = Corpus<AlignmentLink>;

/// Per-sentence domain and update-id metadata, one record per sentence.
pub type SentInfoCorpus = Corpus<SentInfo>;

/// A flat packed array of corpus positions (spec.md 6, "Legacy suffix-array file").
pub type LegacySuffixArray = Corpus<Position>;

impl LegacySuffixArray {
    /// Reads back the whole sorted position array. The legacy format's "index"
    /// section is a degenerate one-sentence corpus spanning every record.
    pub fn read_all_positions(&self) -> Result<Vec<Position>> {
        let mut out = Vec::with_capacity(self.num_elements());
        for sid in 0..self.size() {
            out.extend_from_slice(self.sentence(sid)?.as_slice());
        }
        Ok(out)
    }
}

impl PositionSource for TokenCorpus {
    fn token_at(&self, pos: Position, depth: u32) -> Option<Vid> {
        let sentence = self.sentence(pos.sid).ok()?;
        let idx = pos.offset as usize + depth as usize;
        if idx < sentence.size() {
            sentence.get(idx)
        } else if idx == sentence.size() {
            Some(Vid::EOS)
        } else {
            None
        }
    }

    fn sentence_len(&self, sid: Sid) -> usize {
        self.sentence(sid).map(|s| s.size()).unwrap_or(0)
    }
}
