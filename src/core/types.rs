//! Vocabulary-id-level types shared by the corpus, index and bitext layers.

use serde::{Deserialize, Serialize};

/// Reserved vocabulary id values (spec.md 3, "Token").
pub const INVALID_VID: u32 = 0;
pub const EOS_VID: u32 = 2;
pub const UNK_VID: u32 = 3;

/// A language-tagged vocabulary id. Equality and order are by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Vid(pub u32);

impl Vid {
    pub const INVALID: Vid = Vid(INVALID_VID);
    pub const EOS: Vid = Vid(EOS_VID);
    pub const UNK: Vid = Vid(UNK_VID);

    pub fn is_eos(self) -> bool {
        self.0 == EOS_VID
    }
}

impl From<u32> for Vid {
    fn from(v: u32) -> Self {
        Vid(v)
    }
}

/// Sentence id: append order within a corpus.
pub type Sid = u32;

/// Token offset within a sentence.
pub type Offset = u32;

/// Domain id. `u32::MAX` is reserved for the global scope (spec.md 6, "Scope encoding").
pub type DomainId = u32;
pub const GLOBAL_DOMAIN: DomainId = u32::MAX;

/// 16-bit tag identifying an update source. `LEGACY_DISK_STREAM` marks updates that
/// originated from a bulk legacy-format load rather than a live append.
pub type StreamId = u16;
pub const LEGACY_DISK_STREAM: StreamId = 0;

/// Monotonic sequence number within a stream. 0 means "never applied".
pub type SeqNum = u64;

/// (stream, sequence) pair identifying one update (spec.md 3, "Update Id").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpdateId {
    pub stream: StreamId,
    pub seq: SeqNum,
}

impl UpdateId {
    pub fn new(stream: StreamId, seq: SeqNum) -> Self {
        UpdateId { stream, seq }
    }
}

/// A pair (sentence-id, offset) naming a starting point into a corpus (spec.md 3, "Position").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub sid: Sid,
    pub offset: Offset,
}

impl Position {
    pub fn new(sid: Sid, offset: Offset) -> Self {
        Position { sid, offset }
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Position {
    /// Tie-break order only; the lexicographic token-sequence order used by the suffix
    /// array lives in `index::node` because it needs the corpus to resolve token ids.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.sid, self.offset).cmp(&(other.sid, other.offset))
    }
}

/// A word-alignment link: (src-offset, trg-offset), stored as an `Alignment` corpus element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlignmentLink {
    pub src: Offset,
    pub trg: Offset,
}

impl AlignmentLink {
    pub fn new(src: Offset, trg: Offset) -> Self {
        AlignmentLink { src, trg }
    }
}

/// Per-sentence metadata: domain id and originating update id (spec.md 3, "Sentence-info Corpus").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentInfo {
    pub domain: DomainId,
    pub update: UpdateId,
}

impl SentInfo {
    pub fn new(domain: DomainId, update: UpdateId) -> Self {
        SentInfo { domain, update }
    }
}
