use std::collections::HashMap;

use parking_lot::RwLock;

use crate::bitext::stream_versions::StreamVersions;
use crate::core::error::{Error, Result};
use crate::core::types::{DomainId, Sid, UpdateId};
use crate::corpus::SentInfoCorpus;
use crate::storage::kv::KvNamespace;

struct DomainVocab {
    name_to_id: HashMap<String, DomainId>,
    id_to_name: HashMap<DomainId, String>,
    next_id: DomainId,
}

impl DomainVocab {
    fn new() -> Self {
        DomainVocab {
            name_to_id: HashMap::new(),
            id_to_name: HashMap::new(),
            next_id: 0,
        }
    }

    fn find_or_insert(&mut self, name: &str) -> DomainId {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.name_to_id.insert(name.to_string(), id);
        self.id_to_name.insert(id, name.to_string());
        id
    }

    fn name(&self, id: DomainId) -> Option<&str> {
        self.id_to_name.get(&id).map(|s| s.as_str())
    }
}

/// Domain-name ↔ domain-id vocabulary plus per-sentence domain/update-id metadata
/// (spec.md 3, "Document Map"). Invariant: every sentence id below the sentence-info
/// corpus's size has exactly one domain-id entry.
pub struct DocumentMap {
    domains: RwLock<DomainVocab>,
    sentinfo: SentInfoCorpus,
    stream_versions: RwLock<StreamVersions>,
}

impl DocumentMap {
    pub fn new(sentinfo: SentInfoCorpus) -> Self {
        DocumentMap {
            domains: RwLock::new(DomainVocab::new()),
            sentinfo,
            stream_versions: RwLock::new(StreamVersions::new()),
        }
    }

    pub fn find_or_insert_domain(&self, name: &str) -> DomainId {
        self.domains.write().find_or_insert(name)
    }

    pub fn domain_name(&self, id: DomainId) -> Option<String> {
        self.domains.read().name(id).map(str::to_string)
    }

    /// Iterates every known domain id in insertion order.
    pub fn domains(&self) -> Vec<DomainId> {
        let guard = self.domains.read();
        let mut ids: Vec<DomainId> = guard.id_to_name.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn sid2did(&self, sid: Sid) -> Result<DomainId> {
        Ok(self.sentinfo.sentence(sid)?.get(0).ok_or_else(|| {
            Error::corruption(format!("sentence-info entry {sid} is empty"))
        })?.domain)
    }

    /// Records one sentence's domain and update id, advancing the stream version.
    /// Returns the stored sentence id.
    pub fn ack(&self, domain: DomainId, update: UpdateId) -> Result<Sid> {
        let info = crate::core::types::SentInfo::new(domain, update);
        let sid = self.sentinfo.append(&[info])?;
        self.stream_versions.write().update(update);
        Ok(sid)
    }

    pub fn stream_versions(&self) -> StreamVersions {
        self.stream_versions.read().clone()
    }

    pub fn size(&self) -> Sid {
        self.sentinfo.size()
    }

    /// Serializes the underlying sentence-info corpus to a fresh pair of files
    /// (used by `Bitext::write_out` to upgrade a legacy bitext).
    pub fn write_sentinfo(&self, track_path: impl AsRef<std::path::Path>, index_path: impl AsRef<std::path::Path>) -> Result<()> {
        self.sentinfo.write(track_path, index_path)
    }

    pub fn persist(&self, ns: &KvNamespace) -> Result<()> {
        let domains = self.domains.read();
        let mut batch = ns.new_batch();
        for (&id, name) in domains.id_to_name.iter() {
            batch.put(did_key(id).as_bytes(), name.as_bytes());
        }
        ns.apply_batch(batch)?;
        self.stream_versions.read().persist(ns)
    }

    pub fn load(ns: &KvNamespace, sentinfo: SentInfoCorpus) -> Result<Self> {
        let entries = ns.scan_prefix(b"did_")?;
        let mut name_to_id = HashMap::new();
        let mut id_to_name = HashMap::new();
        let mut max_id: Option<DomainId> = None;

        for (key, value) in entries {
            let id_str = std::str::from_utf8(&key[b"did_".len()..])
                .map_err(|_| Error::corruption("non-utf8 domain id key"))?;
            let id: DomainId = id_str
                .parse()
                .map_err(|_| Error::corruption(format!("malformed domain id key {id_str:?}")))?;
            let name = String::from_utf8(value).map_err(|_| Error::corruption("non-utf8 domain name"))?;
            max_id = Some(max_id.map_or(id, |m| m.max(id)));
            id_to_name.insert(id, name.clone());
            name_to_id.insert(name, id);
        }

        let stream_versions = StreamVersions::load(ns)?;

        Ok(DocumentMap {
            domains: RwLock::new(DomainVocab {
                name_to_id,
                id_to_name,
                next_id: max_id.map_or(0, |m| m + 1),
            }),
            sentinfo,
            stream_versions: RwLock::new(stream_versions),
        })
    }
}

fn did_key(id: DomainId) -> String {
    format!("did_{id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::KvStore;

    fn fresh_sentinfo(dir: &std::path::Path) -> SentInfoCorpus {
        SentInfoCorpus::create(dir.join("d.trk"), dir.join("d.six")).unwrap()
    }

    #[test]
    fn find_or_insert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let docmap = DocumentMap::new(fresh_sentinfo(dir.path()));

        let a = docmap.find_or_insert_domain("news");
        let b = docmap.find_or_insert_domain("news");
        assert_eq!(a, b);
        let c = docmap.find_or_insert_domain("medical");
        assert_ne!(a, c);
    }

    #[test]
    fn ack_records_sentence_info_and_advances_stream_version() {
        let dir = tempfile::tempdir().unwrap();
        let docmap = DocumentMap::new(fresh_sentinfo(dir.path()));

        let domain = docmap.find_or_insert_domain("news");
        let sid = docmap.ack(domain, UpdateId::new(1, 1)).unwrap();
        assert_eq!(sid, 0);
        assert_eq!(docmap.sid2did(0).unwrap(), domain);
        assert_eq!(docmap.stream_versions().at(1), 1);
    }

    #[test]
    fn persist_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path()).unwrap();
        let ns = store.namespace(b"docmap|".to_vec());

        let docmap = DocumentMap::new(fresh_sentinfo(dir.path()));
        let domain = docmap.find_or_insert_domain("news");
        docmap.ack(domain, UpdateId::new(1, 1)).unwrap();
        docmap.persist(&ns).unwrap();

        let sentinfo = SentInfoCorpus::open(dir.path().join("d.trk"), dir.path().join("d.six"), true).unwrap();
        let loaded = DocumentMap::load(&ns, sentinfo).unwrap();
        assert_eq!(loaded.domain_name(domain).unwrap(), "news");
        assert_eq!(loaded.stream_versions().at(1), 1);
    }
}
