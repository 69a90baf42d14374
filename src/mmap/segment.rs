use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::Path;

use crate::core::error::Result;

/// A read-only memory view over a file region (spec.md 2, "Mapped Segment").
///
/// `mmap()` rejects a zero-length mapping, so an empty or zero-length region maps to
/// an empty slice instead of touching the OS mapping call at all.
pub struct MappedSegment {
    mmap: Option<Mmap>,
    len: usize,
}

impl MappedSegment {
    /// Maps the whole file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len() as usize;
        Self::from_file(&file, 0, len)
    }

    /// Maps `len` bytes starting at `offset` of an already-open file.
    pub fn open_at(path: impl AsRef<Path>, offset: usize, len: usize) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_file(&file, offset, len)
    }

    fn from_file(file: &File, offset: usize, len: usize) -> Result<Self> {
        if len == 0 {
            return Ok(MappedSegment { mmap: None, len: 0 });
        }
        let mmap = unsafe {
            MmapOptions::new()
                .offset(offset as u64)
                .len(len)
                .map(file)?
        };
        Ok(MappedSegment {
            mmap: Some(mmap),
            len,
        })
    }

    pub fn data(&self) -> &[u8] {
        match &self.mmap {
            Some(m) => &m[..],
            None => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_maps_to_empty_slice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        File::create(&path).unwrap();

        let seg = MappedSegment::open(&path).unwrap();
        assert_eq!(seg.len(), 0);
        assert!(seg.is_empty());
        assert!(seg.data().is_empty());
    }

    #[test]
    fn maps_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"hello mapped world").unwrap();
        drop(f);

        let seg = MappedSegment::open(&path).unwrap();
        assert_eq!(seg.data(), b"hello mapped world");
    }

    #[test]
    fn maps_file_region() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"0123456789").unwrap();
        drop(f);

        let seg = MappedSegment::open_at(&path, 3, 4).unwrap();
        assert_eq!(seg.data(), b"3456");
    }
}
