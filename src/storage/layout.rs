use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Resolves the on-disk paths that hang off a bitext's `<prefix>` (spec.md 6).
///
/// The prefix is not itself a directory: `<prefix>.<lang>.trk`, `<prefix>db/` and friends
/// are all siblings formed by string concatenation, mirroring the CLI's positional
/// `<prefix>.<lang>` argument.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    prefix: PathBuf,
}

impl StorageLayout {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        StorageLayout {
            prefix: prefix.into(),
        }
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut os: OsString = self.prefix.clone().into_os_string();
        os.push(suffix);
        PathBuf::from(os)
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// The shared key-value store directory, `<prefix>db/`.
    pub fn kv_dir(&self) -> PathBuf {
        self.with_suffix("db")
    }

    /// Track (token id) file for one language side, `<prefix><lang>.trk`.
    pub fn track_path(&self, lang: &str) -> PathBuf {
        self.with_suffix(&format!("{lang}.trk"))
    }

    /// Offset index file for one language side, `<prefix><lang>.six`.
    pub fn sentence_index_path(&self, lang: &str) -> PathBuf {
        self.with_suffix(&format!("{lang}.six"))
    }

    /// Legacy single-file suffix array, `<prefix><lang>.sfa`.
    pub fn legacy_suffix_array_path(&self, lang: &str) -> PathBuf {
        self.with_suffix(&format!("{lang}.sfa"))
    }

    /// Word-alignment track, `<prefix><src>-<trg>.mam`.
    pub fn alignment_path(&self, src_lang: &str, trg_lang: &str) -> PathBuf {
        self.with_suffix(&format!("{src_lang}-{trg_lang}.mam"))
    }

    /// Word-alignment offset index, `<prefix><src>-<trg>.mam.six`.
    pub fn alignment_index_path(&self, src_lang: &str, trg_lang: &str) -> PathBuf {
        self.with_suffix(&format!("{src_lang}-{trg_lang}.mam.six"))
    }

    /// Document-map track, `<prefix>docmap.trk`.
    pub fn docmap_path(&self) -> PathBuf {
        self.with_suffix("docmap.trk")
    }

    /// Document-map offset index, `<prefix>docmap.six`.
    pub fn docmap_index_path(&self) -> PathBuf {
        self.with_suffix("docmap.six")
    }

    /// The process-wide single-writer lock file, `<prefix>.lock`.
    pub fn lock_path(&self) -> PathBuf {
        self.with_suffix(".lock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_concatenate_onto_prefix() {
        let layout = StorageLayout::new("model/bitext.");
        assert_eq!(layout.kv_dir(), PathBuf::from("model/bitext.db"));
        assert_eq!(layout.track_path("en"), PathBuf::from("model/bitext.en.trk"));
        assert_eq!(
            layout.sentence_index_path("en"),
            PathBuf::from("model/bitext.en.six")
        );
        assert_eq!(layout.docmap_path(), PathBuf::from("model/bitext.docmap.trk"));
    }
}
