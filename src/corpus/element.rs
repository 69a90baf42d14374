use crate::core::types::{AlignmentLink, Position, SentInfo, StreamId, UpdateId, Vid};

/// A fixed-size record stored in a `Corpus` track (spec.md 3, "Token Corpus" /
/// "Alignment Corpus"). `ACCOUNTING_UNIT` is the number of bytes one offset-index
/// step represents: 1 for corpora that count in *entries* (tokens), `BYTE_SIZE` for
/// corpora that count in *bytes* (word alignment), per spec.md 3's "Offsets are
/// counted in bytes, not entries" rule.
pub trait CorpusElement: Copy + Send + Sync + 'static {
    const BYTE_SIZE: usize;
    const ACCOUNTING_UNIT: usize;

    fn write_le(&self, out: &mut [u8]);
    fn read_le(bytes: &[u8]) -> Self;
}

impl CorpusElement for Vid {
    const BYTE_SIZE: usize = 4;
    const ACCOUNTING_UNIT: usize = 1;

    fn write_le(&self, out: &mut [u8]) {
        out[..4].copy_from_slice(&self.0.to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Self {
        Vid(u32::from_le_bytes(bytes[..4].try_into().unwrap()))
    }
}

impl CorpusElement for AlignmentLink {
    const BYTE_SIZE: usize = 8;
    const ACCOUNTING_UNIT: usize = 8;

    fn write_le(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.src.to_le_bytes());
        out[4..8].copy_from_slice(&self.trg.to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Self {
        AlignmentLink {
            src: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            trg: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
        }
    }
}

/// Lets the generic `Corpus<E>` machinery double as the legacy flat suffix-array
/// loader (spec.md 6, "Legacy suffix-array file"): that format is byte-for-byte
/// a `Corpus<Position>` with a single "sentence" spanning every packed record.
impl CorpusElement for Position {
    const BYTE_SIZE: usize = 8;
    const ACCOUNTING_UNIT: usize = 1;

    fn write_le(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.sid.to_le_bytes());
        out[4..8].copy_from_slice(&self.offset.to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Self {
        Position {
            sid: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            offset: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
        }
    }
}

impl CorpusElement for SentInfo {
    const BYTE_SIZE: usize = 16;
    const ACCOUNTING_UNIT: usize = 1;

    fn write_le(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.domain.to_le_bytes());
        out[4..6].copy_from_slice(&self.update.stream.to_le_bytes());
        out[6..8].copy_from_slice(&[0, 0]);
        out[8..16].copy_from_slice(&self.update.seq.to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Self {
        let domain = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let stream = StreamId::from_le_bytes(bytes[4..6].try_into().unwrap());
        let seq = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        SentInfo {
            domain,
            update: UpdateId { stream, seq },
        }
    }
}
