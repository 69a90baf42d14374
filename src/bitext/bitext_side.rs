use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::error::Result;
use crate::core::types::{DomainId, Sid, Vid};
use crate::corpus::TokenCorpus;
use crate::index::TokenIndex;
use crate::storage::kv::KvStore;
use crate::storage::layout::StorageLayout;
use crate::vocab::Vocabulary;

/// One language side of a `Bitext` (spec.md 4.7): its corpus, vocabulary, a global
/// token index over every sentence, and a lazily-loaded index per domain.
pub struct BitextSide {
    lang: String,
    corpus: TokenCorpus,
    vocab: Vocabulary,
    global: TokenIndex,
    by_domain: RwLock<HashMap<DomainId, Arc<TokenIndex>>>,
}

impl BitextSide {
    pub fn create(layout: &StorageLayout, lang: &str) -> Result<Self> {
        let corpus = TokenCorpus::create(layout.track_path(lang), layout.sentence_index_path(lang))?;
        Ok(BitextSide {
            lang: lang.to_string(),
            corpus,
            vocab: Vocabulary::new(),
            global: TokenIndex::new(),
            by_domain: RwLock::new(HashMap::new()),
        })
    }

    pub fn open(layout: &StorageLayout, lang: &str, kv: &KvStore) -> Result<Self> {
        let corpus = TokenCorpus::open(layout.track_path(lang), layout.sentence_index_path(lang), true)?;
        let vocab = Vocabulary::load(&kv.namespace(vocab_namespace(lang)))?;
        let global = TokenIndex::load(&kv.namespace(global_namespace(lang)))?;
        Ok(BitextSide {
            lang: lang.to_string(),
            corpus,
            vocab,
            global,
            by_domain: RwLock::new(HashMap::new()),
        })
    }

    /// Reopens a side backed by an already position-order-sorted legacy dump
    /// (spec.md 6, "Legacy suffix-array file"). Per-domain indexes are not part
    /// of the legacy format and start empty.
    pub fn open_legacy(layout: &StorageLayout, lang: &str, budget: usize, legacy_positions: Option<Vec<crate::core::types::Position>>) -> Result<Self> {
        let corpus = TokenCorpus::open(layout.track_path(lang), layout.sentence_index_path(lang), false)?;
        let global = match legacy_positions {
            Some(positions) => TokenIndex::from_sorted_positions(positions, &corpus, budget),
            None => TokenIndex::new(),
        };
        Ok(BitextSide {
            lang: lang.to_string(),
            corpus,
            vocab: Vocabulary::new(),
            global,
            by_domain: RwLock::new(HashMap::new()),
        })
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    pub fn corpus(&self) -> &TokenCorpus {
        &self.corpus
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn global(&self) -> &TokenIndex {
        &self.global
    }

    /// Tokenizes (via `insert_or_lookup`) and appends one sentence, returning its
    /// sentence id and the resolved token ids (used to drive index updates).
    pub fn add_sentence(&self, surfaces: &[String]) -> Result<(Sid, Vec<Vid>)> {
        let tokens: Vec<Vid> = surfaces.iter().map(|s| self.vocab.insert_or_lookup(s)).collect();
        let sid = self.corpus.append(&tokens)?;
        Ok((sid, tokens))
    }

    /// Inserts `sid` into this side's per-domain index (spec.md 4.7 step 5). Kept
    /// separate from `index_into_global` so a `Bitext` can interleave the two
    /// halves of a sentence pair in the exact order the spec requires.
    pub fn index_into_domain(&self, sid: Sid, len: usize, domain: DomainId, kv: &KvStore, budget: usize) -> Result<()> {
        let per_domain = self.domain_index(domain, kv)?;
        per_domain.add_sentence(sid, len, &self.corpus, budget);
        Ok(())
    }

    /// Inserts `sid` into this side's global index (spec.md 4.7 step 5).
    pub fn index_into_global(&self, sid: Sid, len: usize, budget: usize) {
        self.global.add_sentence(sid, len, &self.corpus, budget);
    }

    /// Returns the in-memory per-domain index, loading it from the KV store on
    /// first use (spec.md 4.7: "a map domain-id -> per-domain token index").
    pub fn domain_index(&self, domain: DomainId, kv: &KvStore) -> Result<Arc<TokenIndex>> {
        if let Some(idx) = self.by_domain.read().get(&domain) {
            return Ok(Arc::clone(idx));
        }
        let mut map = self.by_domain.write();
        if let Some(idx) = map.get(&domain) {
            return Ok(Arc::clone(idx));
        }
        let idx = Arc::new(TokenIndex::load(&kv.namespace(domain_namespace(&self.lang, domain)))?);
        map.insert(domain, Arc::clone(&idx));
        Ok(idx)
    }

    pub fn persist(&self, kv: &KvStore) -> Result<()> {
        self.vocab.persist(&kv.namespace(vocab_namespace(&self.lang)))?;
        self.global.write(&kv.namespace(global_namespace(&self.lang)))?;
        for (&domain, idx) in self.by_domain.read().iter() {
            idx.write(&kv.namespace(domain_namespace(&self.lang, domain)))?;
        }
        Ok(())
    }
}

fn vocab_namespace(lang: &str) -> Vec<u8> {
    format!("vocab.{lang}|").into_bytes()
}

fn global_namespace(lang: &str) -> Vec<u8> {
    format!("{lang}.global|").into_bytes()
}

fn domain_namespace(lang: &str, domain: DomainId) -> Vec<u8> {
    format!("{lang}.dom{domain}|").into_bytes()
}
