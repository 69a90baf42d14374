use std::path::PathBuf;

use parking_lot::RwLock;

use crate::bitext::bitext_side::BitextSide;
use crate::bitext::stream_versions::StreamVersions;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::types::{AlignmentLink, DomainId, UpdateId};
use crate::corpus::{AlignmentCorpus, LegacySuffixArray, SentInfoCorpus};
use crate::docmap::DocumentMap;
use crate::storage::file_lock::FileLock;
use crate::storage::kv::KvStore;
use crate::storage::layout::StorageLayout;

/// Source side, target side, word-alignment corpus, and document map of one
/// parallel corpus (spec.md 4.7, "Bitext"). The single entry point for mutation
/// is `add_sentence_pair`; everything else is read access or persistence.
pub struct Bitext {
    _lock: FileLock,
    kv: KvStore,
    config: Config,
    source: BitextSide,
    target: BitextSide,
    alignment: AlignmentCorpus,
    docmap: DocumentMap,
    source_versions: RwLock<StreamVersions>,
    target_versions: RwLock<StreamVersions>,
}

impl std::fmt::Debug for Bitext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitext").finish_non_exhaustive()
    }
}

impl Bitext {
    /// Creates a fresh, empty bitext at `config.storage_path` (used as a path
    /// prefix, per `StorageLayout`).
    pub fn create(config: Config, source_lang: &str, target_lang: &str) -> Result<Self> {
        if source_lang == target_lang {
            return Err(Error::usage("source and target language tags must differ"));
        }
        let layout = StorageLayout::new(config.storage_path.clone());
        ensure_parent_dir(&layout)?;
        let lock = FileLock::acquire(&layout.lock_path(), true)?;

        let kv = KvStore::open(layout.kv_dir())?;
        let source = BitextSide::create(&layout, source_lang)?;
        let target = BitextSide::create(&layout, target_lang)?;
        let alignment = AlignmentCorpus::create(
            layout.alignment_path(source_lang, target_lang),
            layout.alignment_index_path(source_lang, target_lang),
        )?;
        let sentinfo = SentInfoCorpus::create(layout.docmap_path(), layout.docmap_index_path())?;
        let docmap = DocumentMap::new(sentinfo);

        Ok(Bitext {
            _lock: lock,
            kv,
            config,
            source,
            target,
            alignment,
            docmap,
            source_versions: RwLock::new(StreamVersions::new()),
            target_versions: RwLock::new(StreamVersions::new()),
        })
    }

    /// Opens a bitext at `config.storage_path`. Auto-detects the on-disk format:
    /// if the KV-store directory exists, opens read/append (persistent);
    /// otherwise attempts the legacy single-file format, read-only (spec.md 4.7).
    pub fn open(config: Config, source_lang: &str, target_lang: &str) -> Result<Self> {
        if source_lang == target_lang {
            return Err(Error::usage("source and target language tags must differ"));
        }
        let layout = StorageLayout::new(config.storage_path.clone());
        if layout.kv_dir().exists() {
            Self::open_persistent(config, layout, source_lang, target_lang)
        } else {
            Self::open_legacy(config, layout, source_lang, target_lang)
        }
    }

    fn open_persistent(config: Config, layout: StorageLayout, source_lang: &str, target_lang: &str) -> Result<Self> {
        let lock = FileLock::acquire(&layout.lock_path(), true)?;
        let kv = KvStore::open(layout.kv_dir())?;
        let source = BitextSide::open(&layout, source_lang, &kv)?;
        let target = BitextSide::open(&layout, target_lang, &kv)?;
        let alignment = AlignmentCorpus::open(
            layout.alignment_path(source_lang, target_lang),
            layout.alignment_index_path(source_lang, target_lang),
            true,
        )?;
        let sentinfo = SentInfoCorpus::open(layout.docmap_path(), layout.docmap_index_path(), true)?;
        let docmap = DocumentMap::load(&kv.namespace(b"docmap|".to_vec()), sentinfo)?;
        let source_versions = StreamVersions::load(&kv.namespace(b"ver.src|".to_vec()))?;
        let target_versions = StreamVersions::load(&kv.namespace(b"ver.trg|".to_vec()))?;

        Ok(Bitext {
            _lock: lock,
            kv,
            config,
            source,
            target,
            alignment,
            docmap,
            source_versions: RwLock::new(source_versions),
            target_versions: RwLock::new(target_versions),
        })
    }

    /// Reads the legacy single-file format, read-only: corpus tracks via the
    /// `Corpus` legacy loader, and the global index per side via the legacy flat
    /// suffix-array file when present. Per-domain indexes and vocabularies are
    /// not part of the legacy format and start out empty; the intended upgrade
    /// path is `write_out` into the persistent layout before further writes.
    fn open_legacy(config: Config, layout: StorageLayout, source_lang: &str, target_lang: &str) -> Result<Self> {
        tracing::info!(prefix = %layout.prefix().display(), "opening legacy single-file bitext format");
        let lock = FileLock::acquire(&layout.lock_path(), false)?;
        let budget = config.index.leaf_budget;

        let source_positions = read_legacy_suffix_array(&layout, source_lang)?;
        let target_positions = read_legacy_suffix_array(&layout, target_lang)?;
        let source = BitextSide::open_legacy(&layout, source_lang, budget, source_positions)?;
        let target = BitextSide::open_legacy(&layout, target_lang, budget, target_positions)?;

        let alignment = AlignmentCorpus::open(
            layout.alignment_path(source_lang, target_lang),
            layout.alignment_index_path(source_lang, target_lang),
            false,
        )?;
        let sentinfo = SentInfoCorpus::open(layout.docmap_path(), layout.docmap_index_path(), false)?;
        let docmap = DocumentMap::new(sentinfo);

        let kv = KvStore::open(layout.kv_dir())?;

        Ok(Bitext {
            _lock: lock,
            kv,
            config,
            source,
            target,
            alignment,
            docmap,
            source_versions: RwLock::new(StreamVersions::new()),
            target_versions: RwLock::new(StreamVersions::new()),
        })
    }

    pub fn source(&self) -> &BitextSide {
        &self.source
    }

    pub fn target(&self) -> &BitextSide {
        &self.target
    }

    pub fn docmap(&self) -> &DocumentMap {
        &self.docmap
    }

    pub fn alignment(&self) -> &AlignmentCorpus {
        &self.alignment
    }

    pub fn domains(&self) -> Vec<DomainId> {
        self.docmap.domains()
    }

    /// The elementwise-minimum stream version across every tracked component
    /// (spec.md 4.8): a future replay at or below this per-stream watermark is
    /// guaranteed already reflected everywhere.
    pub fn effective_version(&self) -> StreamVersions {
        self.docmap
            .stream_versions()
            .min(&self.source_versions.read())
            .min(&self.target_versions.read())
    }

    /// Adds one aligned sentence pair (spec.md 4.7, steps 1-6). Returns `false`
    /// without side effects if `update` is a stale replay.
    pub fn add_sentence_pair(
        &self,
        source_tokens: &[String],
        target_tokens: &[String],
        alignment: &[AlignmentLink],
        domain_name: &str,
        update: UpdateId,
    ) -> Result<bool> {
        if self.docmap.stream_versions().is_stale(update) {
            return Ok(false);
        }

        let (src_sid, _) = self.source.add_sentence(source_tokens)?;
        let (trg_sid, _) = self.target.add_sentence(target_tokens)?;
        self.alignment.append(alignment)?;

        let domain = self.docmap.find_or_insert_domain(domain_name);
        self.docmap.ack(domain, update)?;

        let budget = self.config.index.leaf_budget;
        self.target.index_into_domain(trg_sid, target_tokens.len(), domain, &self.kv, budget)?;
        self.source.index_into_domain(src_sid, source_tokens.len(), domain, &self.kv, budget)?;
        self.target.index_into_global(trg_sid, target_tokens.len(), budget);
        self.source.index_into_global(src_sid, source_tokens.len(), budget);

        self.source_versions.write().update(update);
        self.target_versions.write().update(update);

        Ok(true)
    }

    /// Flushes every in-memory structure to the KV store and fsyncs it.
    pub fn flush(&self) -> Result<()> {
        self.source.persist(&self.kv)?;
        self.target.persist(&self.kv)?;
        self.docmap.persist(&self.kv.namespace(b"docmap|".to_vec()))?;
        self.source_versions.read().persist(&self.kv.namespace(b"ver.src|".to_vec()))?;
        self.target_versions.read().persist(&self.kv.namespace(b"ver.trg|".to_vec()))?;
        self.kv.flush()?;

        let stats = self.kv.stats();
        tracing::debug!(
            gets = stats.gets, hits = stats.hits, puts = stats.puts,
            removes = stats.removes, prefix_scans = stats.prefix_scans, batch_writes = stats.batch_writes,
            "kv store flushed",
        );
        Ok(())
    }

    /// Serializes an in-memory (typically legacy-loaded) bitext into the
    /// persistent layout rooted at `base` (spec.md 4.7, "write_out").
    pub fn write_out(&self, base: impl Into<PathBuf>) -> Result<()> {
        let layout = StorageLayout::new(base.into());
        ensure_parent_dir(&layout)?;
        let _dest_lock = FileLock::acquire(&layout.lock_path(), true)?;

        self.source
            .corpus()
            .write(layout.track_path(self.source.lang()), layout.sentence_index_path(self.source.lang()))?;
        self.target
            .corpus()
            .write(layout.track_path(self.target.lang()), layout.sentence_index_path(self.target.lang()))?;
        self.alignment.write(
            layout.alignment_path(self.source.lang(), self.target.lang()),
            layout.alignment_index_path(self.source.lang(), self.target.lang()),
        )?;
        self.docmap.write_sentinfo(layout.docmap_path(), layout.docmap_index_path())?;

        let kv = KvStore::open(layout.kv_dir())?;
        self.source.persist(&kv)?;
        self.target.persist(&kv)?;
        self.docmap.persist(&kv.namespace(b"docmap|".to_vec()))?;
        self.source_versions.read().persist(&kv.namespace(b"ver.src|".to_vec()))?;
        self.target_versions.read().persist(&kv.namespace(b"ver.trg|".to_vec()))?;
        kv.flush()
    }
}

fn ensure_parent_dir(layout: &StorageLayout) -> Result<()> {
    if let Some(parent) = layout.kv_dir().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn read_legacy_suffix_array(layout: &StorageLayout, lang: &str) -> Result<Option<Vec<crate::core::types::Position>>> {
    let path = layout.legacy_suffix_array_path(lang);
    if !path.exists() {
        return Ok(None);
    }
    let array = LegacySuffixArray::open(path, PathBuf::new(), false)?;
    Ok(Some(array.read_all_positions()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.storage_path = dir.join("bitext.");
        config.index.leaf_budget = 2;
        config
    }

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn rejects_equal_language_tags() {
        let dir = tempfile::tempdir().unwrap();
        let err = Bitext::create(cfg(dir.path()), "en", "en").unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::UsageError);
    }

    #[test]
    fn add_sentence_pair_updates_both_sides_and_domain() {
        let dir = tempfile::tempdir().unwrap();
        let bitext = Bitext::create(cfg(dir.path()), "en", "de").unwrap();

        let applied = bitext
            .add_sentence_pair(
                &words("the dog"),
                &words("der hund"),
                &[AlignmentLink::new(0, 0), AlignmentLink::new(1, 1)],
                "news",
                UpdateId::new(1, 1),
            )
            .unwrap();
        assert!(applied);

        assert_eq!(bitext.source().corpus().size(), 1);
        assert_eq!(bitext.target().corpus().size(), 1);
        assert_eq!(bitext.domains(), vec![0]);

        let dog = bitext.source().vocab().lookup_id("dog").unwrap();
        let span = bitext.source().global().span(bitext.source().corpus());
        assert!(span.narrow(dog).is_some());
    }

    #[test]
    fn stale_replay_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let bitext = Bitext::create(cfg(dir.path()), "en", "de").unwrap();

        bitext
            .add_sentence_pair(&words("a"), &words("b"), &[], "news", UpdateId::new(1, 5))
            .unwrap();
        let applied = bitext
            .add_sentence_pair(&words("c"), &words("d"), &[], "news", UpdateId::new(1, 5))
            .unwrap();
        assert!(!applied);
        assert_eq!(bitext.source().corpus().size(), 1);
    }

    #[test]
    fn flush_then_reopen_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = cfg(dir.path());

        {
            let bitext = Bitext::create(config.clone(), "en", "de").unwrap();
            bitext
                .add_sentence_pair(&words("the dog"), &words("der hund"), &[], "news", UpdateId::new(1, 1))
                .unwrap();
            bitext.flush().unwrap();
        }

        let reopened = Bitext::open(config, "en", "de").unwrap();
        assert_eq!(reopened.source().corpus().size(), 1);
        let dog = reopened.source().vocab().lookup_id("dog").unwrap();
        let span = reopened.source().global().span(reopened.source().corpus());
        assert!(span.narrow(dog).is_some());
        assert_eq!(reopened.effective_version().at(1), 1);
    }
}
