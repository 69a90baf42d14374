use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::core::error::{Error, Result};
use crate::core::types::Sid;
use crate::corpus::element::CorpusElement;
use crate::mmap::segment::MappedSegment;

const TRACK_MAGIC_CURRENT: &[u8; 8] = b"SaptIDX3";
const TRACK_MAGIC_LEGACY: &[u8; 8] = b"SaptIDX2";
const TRACK_HEADER_LEN: usize = 24;
const INDEX_HEADER_LEN: usize = 12;

/// A lightweight view into one sentence of a `Corpus` (spec.md 3, "Sentence").
/// Index `size()` is the implicit `</s>` and is never materialized here.
pub struct Sentence<'a, E: CorpusElement> {
    elements: Vec<E>,
    sid: Sid,
    _marker: PhantomData<&'a ()>,
}

impl<'a, E: CorpusElement> Sentence<'a, E> {
    pub fn sid(&self) -> Sid {
        self.sid
    }

    pub fn size(&self) -> usize {
        self.elements.len()
    }

    pub fn get(&self, i: usize) -> Option<E> {
        self.elements.get(i).copied()
    }

    pub fn as_slice(&self) -> &[E] {
        &self.elements
    }
}

struct DynTail<E: CorpusElement> {
    elements: Vec<E>,
    /// Accounting-unit offsets; `offsets[0]` restates the static trailing sentinel,
    /// every later entry is one appended sentence's boundary.
    offsets: Vec<u32>,
}

struct WriteHandles {
    track_file: File,
    index_file: File,
}

/// Append-only corpus: a static memory-mapped prefix plus a dynamic in-memory tail
/// (spec.md 3, "Token Corpus"). Generic over the element kind so the same code
/// serves token tracks, the alignment corpus, and the sentence-info corpus.
pub struct Corpus<E: CorpusElement> {
    static_track: MappedSegment,
    static_index: MappedSegment,
    static_sentence_count: u32,
    static_element_count: u32,
    dyn_tail: RwLock<DynTail<E>>,
    writer: Option<RwLock<WriteHandles>>,
    track_path: PathBuf,
    index_path: PathBuf,
}

impl<E: CorpusElement> Corpus<E> {
    /// Creates a fresh, empty, writable corpus at `track_path`/`index_path`.
    pub fn create(track_path: impl Into<PathBuf>, index_path: impl Into<PathBuf>) -> Result<Self> {
        let track_path = track_path.into();
        let index_path = index_path.into();

        write_track_header(&track_path, 0)?;
        write_index_header_with_sentinel(&index_path, 0, 0)?;

        Self::open(track_path, index_path, true)
    }

    /// Opens an existing corpus. Auto-detects the legacy single-file format
    /// (`SaptIDX2`) versus the current split track/index format (`SaptIDX3`); only
    /// the current format may be opened `writable`.
    pub fn open(track_path: impl Into<PathBuf>, index_path: impl Into<PathBuf>, writable: bool) -> Result<Self> {
        let track_path = track_path.into();
        let index_path = index_path.into();

        if !index_path.exists() {
            return Self::open_legacy(track_path);
        }

        let mut track_header = [0u8; TRACK_HEADER_LEN];
        {
            let mut f = File::open(&track_path)?;
            f.read_exact(&mut track_header)?;
        }
        if &track_header[0..8] != TRACK_MAGIC_CURRENT {
            return Err(Error::corruption("unrecognized track file magic"));
        }

        let mut index_header = [0u8; INDEX_HEADER_LEN];
        {
            let mut f = File::open(&index_path)?;
            f.read_exact(&mut index_header)?;
        }
        if &index_header[0..8] != TRACK_MAGIC_CURRENT {
            return Err(Error::corruption("unrecognized index file magic"));
        }
        let sentence_count = u32::from_le_bytes(index_header[8..12].try_into().unwrap());

        // Read the trailing sentinel to learn the committed element count, then
        // truncate away anything written past it (an interrupted append).
        let committed_index_len = INDEX_HEADER_LEN + (sentence_count as usize + 1) * 4;
        let sentinel = read_u32_at(&index_path, committed_index_len - 4)?;
        if sentinel as usize % E::ACCOUNTING_UNIT != 0 {
            return Err(Error::corruption("index sentinel is not aligned to the element accounting unit"));
        }
        let element_count = sentinel / E::ACCOUNTING_UNIT as u32;
        let committed_track_len = TRACK_HEADER_LEN + element_count as usize * E::BYTE_SIZE;

        if writable {
            truncate_to(&track_path, committed_track_len)?;
            truncate_to(&index_path, committed_index_len)?;
        }

        let static_track = MappedSegment::open(&track_path)?;
        let static_index = MappedSegment::open(&index_path)?;

        let writer = if writable {
            let track_file = OpenOptions::new().write(true).open(&track_path)?;
            let index_file = OpenOptions::new().write(true).open(&index_path)?;
            Some(RwLock::new(WriteHandles { track_file, index_file }))
        } else {
            None
        };

        Ok(Corpus {
            static_track,
            static_index,
            static_sentence_count: sentence_count,
            static_element_count: element_count,
            dyn_tail: RwLock::new(DynTail {
                elements: Vec::new(),
                offsets: vec![sentinel],
            }),
            writer,
            track_path,
            index_path,
        })
    }

    /// Loads the legacy concatenated format (v2 `.mct`-style single file), read-only.
    fn open_legacy(track_path: PathBuf) -> Result<Self> {
        let mut header = [0u8; TRACK_HEADER_LEN];
        {
            let mut f = File::open(&track_path)?;
            f.read_exact(&mut header)?;
        }
        if &header[0..8] != TRACK_MAGIC_LEGACY {
            return Err(Error::corruption("unrecognized legacy corpus magic"));
        }
        let legacy_start_idx = u64::from_le_bytes(header[8..16].try_into().unwrap());
        let legacy_idx_size = u32::from_le_bytes(header[16..20].try_into().unwrap());

        let mapped = MappedSegment::open(&track_path)?;
        let data = mapped.data();
        let idx_start = legacy_start_idx as usize;
        let entries = legacy_idx_size as usize + 1;
        if idx_start + entries * 4 > data.len() {
            return Err(Error::corruption("legacy corpus index section out of bounds"));
        }
        let sentinel = u32::from_le_bytes(data[idx_start + entries * 4 - 4..idx_start + entries * 4].try_into().unwrap());
        let element_count = sentinel / E::ACCOUNTING_UNIT as u32;

        Ok(Corpus {
            static_track: mapped,
            static_index: MappedSegment::open(&track_path)?,
            static_sentence_count: legacy_idx_size,
            static_element_count: element_count,
            dyn_tail: RwLock::new(DynTail {
                elements: Vec::new(),
                offsets: vec![sentinel],
            }),
            writer: None,
            track_path,
            index_path: PathBuf::new(),
        })
    }

    fn is_legacy(&self) -> bool {
        self.index_path.as_os_str().is_empty()
    }

    pub fn size(&self) -> Sid {
        self.static_sentence_count + (self.dyn_tail.read().offsets.len() as u32 - 1)
    }

    pub fn num_elements(&self) -> usize {
        self.static_element_count as usize + self.dyn_tail.read().elements.len()
    }

    /// Appends one sentence to the dynamic tail; if writable, also durably appends
    /// to the track and index files (spec.md 4.2).
    pub fn append(&self, elements: &[E]) -> Result<Sid> {
        let sid = self.size();

        if let Some(writer) = &self.writer {
            let mut handles = writer.write();
            let mut bytes = vec![0u8; elements.len() * E::BYTE_SIZE];
            for (i, e) in elements.iter().enumerate() {
                e.write_le(&mut bytes[i * E::BYTE_SIZE..(i + 1) * E::BYTE_SIZE]);
            }
            handles.track_file.seek(SeekFrom::End(0))?;
            handles.track_file.write_all(&bytes)?;
            handles.track_file.sync_data()?;

            let mut tail = self.dyn_tail.write();
            let new_element_count = self.static_element_count as usize + tail.elements.len() + elements.len();
            let new_offset = (new_element_count * E::ACCOUNTING_UNIT) as u32;

            handles.index_file.seek(SeekFrom::End(0))?;
            handles.index_file.write_all(&new_offset.to_le_bytes())?;
            handles.index_file.sync_data()?;

            let new_sentence_count = self.static_sentence_count + tail.offsets.len() as u32;
            write_index_sentence_count(&mut handles.index_file, new_sentence_count)?;

            tail.elements.extend_from_slice(elements);
            tail.offsets.push(new_offset);
        } else {
            let mut tail = self.dyn_tail.write();
            let new_element_count = self.static_element_count as usize + tail.elements.len() + elements.len();
            let new_offset = (new_element_count * E::ACCOUNTING_UNIT) as u32;
            tail.elements.extend_from_slice(elements);
            tail.offsets.push(new_offset);
        }

        Ok(sid)
    }

    pub fn sentence(&self, sid: Sid) -> Result<Sentence<'_, E>> {
        if sid >= self.size() {
            return Err(Error::not_found(format!("sentence {sid} out of range")));
        }

        let (start_offset, end_offset) = if sid < self.static_sentence_count {
            (self.static_offset(sid), self.static_offset(sid + 1))
        } else {
            let tail = self.dyn_tail.read();
            let local = (sid - self.static_sentence_count) as usize;
            (tail.offsets[local], tail.offsets[local + 1])
        };

        let start = start_offset as usize / E::ACCOUNTING_UNIT;
        let end = end_offset as usize / E::ACCOUNTING_UNIT;
        let mut elements = Vec::with_capacity(end - start);
        for i in start..end {
            elements.push(self.element_at(i)?);
        }

        Ok(Sentence {
            elements,
            sid,
            _marker: PhantomData,
        })
    }

    fn static_offset(&self, idx: u32) -> u32 {
        if self.is_legacy() {
            let data = self.static_track.data();
            let track_header = unsafe {
                std::slice::from_raw_parts(data.as_ptr(), TRACK_HEADER_LEN)
            };
            let legacy_start_idx = u64::from_le_bytes(track_header[8..16].try_into().unwrap()) as usize;
            let off = legacy_start_idx + idx as usize * 4;
            u32::from_le_bytes(data[off..off + 4].try_into().unwrap())
        } else {
            let data = self.static_index.data();
            let off = INDEX_HEADER_LEN + idx as usize * 4;
            u32::from_le_bytes(data[off..off + 4].try_into().unwrap())
        }
    }

    fn element_at(&self, index: usize) -> Result<E> {
        if index < self.static_element_count as usize {
            let data = self.static_track.data();
            let off = TRACK_HEADER_LEN + index * E::BYTE_SIZE;
            Ok(E::read_le(&data[off..off + E::BYTE_SIZE]))
        } else {
            let tail = self.dyn_tail.read();
            tail.elements
                .get(index - self.static_element_count as usize)
                .copied()
                .ok_or_else(|| Error::corruption("element index past end of dynamic tail"))
        }
    }

    /// Serializes the full logical corpus (static prefix + dynamic tail) to a fresh
    /// pair of files in the current split format.
    pub fn write(&self, track_path: impl AsRef<Path>, index_path: impl AsRef<Path>) -> Result<()> {
        let total_sentences = self.size();
        let total_elements = self.num_elements();

        let mut track_bytes = vec![0u8; TRACK_HEADER_LEN + total_elements * E::BYTE_SIZE];
        track_bytes[0..8].copy_from_slice(TRACK_MAGIC_CURRENT);
        track_bytes[20..24].copy_from_slice(&(total_elements as u32).to_le_bytes());
        for i in 0..total_elements {
            let e = self.element_at(i)?;
            let off = TRACK_HEADER_LEN + i * E::BYTE_SIZE;
            e.write_le(&mut track_bytes[off..off + E::BYTE_SIZE]);
        }
        std::fs::write(track_path, &track_bytes)?;

        let mut index_bytes = vec![0u8; INDEX_HEADER_LEN + (total_sentences as usize + 1) * 4];
        index_bytes[0..8].copy_from_slice(TRACK_MAGIC_CURRENT);
        index_bytes[8..12].copy_from_slice(&total_sentences.to_le_bytes());
        for sid in 0..=total_sentences {
            let off = self.static_offset_or_dyn(sid);
            let out_off = INDEX_HEADER_LEN + sid as usize * 4;
            index_bytes[out_off..out_off + 4].copy_from_slice(&off.to_le_bytes());
        }
        std::fs::write(index_path, &index_bytes)?;

        Ok(())
    }

    fn static_offset_or_dyn(&self, sid: Sid) -> u32 {
        if sid < self.static_sentence_count {
            self.static_offset(sid)
        } else {
            let tail = self.dyn_tail.read();
            tail.offsets[(sid - self.static_sentence_count) as usize]
        }
    }
}

fn write_track_header(path: &Path, total_count: u32) -> Result<()> {
    let mut bytes = [0u8; TRACK_HEADER_LEN];
    bytes[0..8].copy_from_slice(TRACK_MAGIC_CURRENT);
    bytes[20..24].copy_from_slice(&total_count.to_le_bytes());
    std::fs::write(path, bytes)?;
    Ok(())
}

fn write_index_header_with_sentinel(path: &Path, sentence_count: u32, sentinel: u32) -> Result<()> {
    let mut bytes = [0u8; INDEX_HEADER_LEN + 4];
    bytes[0..8].copy_from_slice(TRACK_MAGIC_CURRENT);
    bytes[8..12].copy_from_slice(&sentence_count.to_le_bytes());
    bytes[12..16].copy_from_slice(&sentinel.to_le_bytes());
    std::fs::write(path, bytes)?;
    Ok(())
}

fn write_index_sentence_count(file: &mut File, sentence_count: u32) -> Result<()> {
    file.seek(SeekFrom::Start(8))?;
    file.write_all(&sentence_count.to_le_bytes())?;
    file.sync_data()?;
    file.seek(SeekFrom::End(0))?;
    Ok(())
}

fn read_u32_at(path: &Path, offset: usize) -> Result<u32> {
    let mut f = File::open(path)?;
    f.seek(SeekFrom::Start(offset as u64))?;
    let mut buf = [0u8; 4];
    f.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn truncate_to(path: &Path, len: usize) -> Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len as u64)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vid;

    fn token_corpus(dir: &Path) -> Corpus<Vid> {
        Corpus::create(dir.join("c.trk"), dir.join("c.six")).unwrap()
    }

    #[test]
    fn append_and_read_back_a_sentence() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = token_corpus(dir.path());

        let sent: Vec<Vid> = vec![Vid(7), Vid(4), Vid(2)];
        let sid = corpus.append(&sent).unwrap();
        assert_eq!(sid, 0);
        assert_eq!(corpus.size(), 1);

        let read = corpus.sentence(0).unwrap();
        assert_eq!(read.size(), 3);
        assert_eq!(read.as_slice(), sent.as_slice());
    }

    #[test]
    fn reopen_after_append_preserves_sentences() {
        let dir = tempfile::tempdir().unwrap();
        let track_path = dir.path().join("c.trk");
        let index_path = dir.path().join("c.six");

        {
            let corpus: Corpus<Vid> = Corpus::create(&track_path, &index_path).unwrap();
            corpus.append(&[Vid(7), Vid(4), Vid(2), Vid(7), Vid(3), Vid(6), Vid(7), Vid(5)]).unwrap();
        }

        let corpus: Corpus<Vid> = Corpus::open(&track_path, &index_path, true).unwrap();
        assert_eq!(corpus.size(), 1);
        corpus
            .append(&[Vid(10), Vid(11), Vid(12), Vid(13), Vid(14), Vid(15), Vid(16), Vid(17), Vid(18)])
            .unwrap();

        let reopened: Corpus<Vid> = Corpus::open(&track_path, &index_path, true).unwrap();
        assert_eq!(reopened.size(), 2);
        assert_eq!(reopened.sentence(1).unwrap().size(), 9);
    }

    #[test]
    fn open_truncates_garbage_past_the_committed_index_header() {
        let dir = tempfile::tempdir().unwrap();
        let track_path = dir.path().join("c.trk");
        let index_path = dir.path().join("c.six");

        {
            let corpus: Corpus<Vid> = Corpus::create(&track_path, &index_path).unwrap();
            corpus.append(&[Vid(7), Vid(4)]).unwrap();
        }

        // Simulate a crash between the track append and the index header advance:
        // extra track bytes and an extra index offset entry exist, but the index
        // header's sentence_count was never bumped for them.
        {
            let mut f = OpenOptions::new().append(true).open(&track_path).unwrap();
            f.write_all(&Vid(99).0.to_le_bytes()).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&index_path).unwrap();
            f.write_all(&3u32.to_le_bytes()).unwrap();
        }

        let corpus: Corpus<Vid> = Corpus::open(&track_path, &index_path, true).unwrap();
        assert_eq!(corpus.size(), 1);
        assert_eq!(corpus.sentence(0).unwrap().size(), 2);

        corpus.append(&[Vid(5)]).unwrap();
        assert_eq!(corpus.size(), 2);
        assert_eq!(corpus.sentence(1).unwrap().size(), 1);
    }
}
