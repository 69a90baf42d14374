use std::collections::HashMap;

use parking_lot::RwLock;

use crate::core::error::{Error, Result};
use crate::core::types::{Vid, EOS_VID, INVALID_VID};
use crate::storage::kv::KvNamespace;

const EOS_SURFACE: &str = "</s>";

struct Inner {
    surface_to_id: HashMap<String, Vid>,
    id_to_surface: HashMap<Vid, String>,
    next_id: u32,
}

/// A persistable bidirectional mapping between surface strings and token ids
/// (spec.md 4.1). Ids are dense and monotonic from 1 upward; id 2 is reserved for
/// `</s>` and is inserted eagerly so it always exists.
pub struct Vocabulary {
    inner: RwLock<Inner>,
}

impl Vocabulary {
    pub fn new() -> Self {
        let mut inner = Inner {
            surface_to_id: HashMap::new(),
            id_to_surface: HashMap::new(),
            next_id: 1,
        };
        // `</s>` is forced into EOS_VID so its id never depends on insertion order;
        // ids below it are simply skipped, never assigned to anything else.
        let eos = Vid(EOS_VID);
        inner.surface_to_id.insert(EOS_SURFACE.to_string(), eos);
        inner.id_to_surface.insert(eos, EOS_SURFACE.to_string());
        inner.next_id = EOS_VID + 1;
        Vocabulary {
            inner: RwLock::new(inner),
        }
    }

    /// Inserts `surface` if absent and returns its id either way.
    pub fn insert_or_lookup(&self, surface: &str) -> Vid {
        {
            let inner = self.inner.read();
            if let Some(&id) = inner.surface_to_id.get(surface) {
                return id;
            }
        }
        let mut inner = self.inner.write();
        if let Some(&id) = inner.surface_to_id.get(surface) {
            return id;
        }
        let id = Vid(inner.next_id);
        inner.next_id += 1;
        inner.surface_to_id.insert(surface.to_string(), id);
        inner.id_to_surface.insert(id, surface.to_string());
        id
    }

    pub fn lookup_id(&self, surface: &str) -> Result<Vid> {
        self.inner
            .read()
            .surface_to_id
            .get(surface)
            .copied()
            .ok_or_else(|| Error::not_found(format!("no vocabulary entry for surface {surface:?}")))
    }

    pub fn lookup_surface(&self, id: Vid) -> Result<String> {
        if id.0 == INVALID_VID {
            return Err(Error::not_found("vocabulary id 0 is reserved as invalid"));
        }
        self.inner
            .read()
            .id_to_surface
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no vocabulary entry for id {}", id.0)))
    }

    pub fn len(&self) -> usize {
        self.inner.read().id_to_surface.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes every (id, surface) pair under `vid_<id>` and `srf_<surface>` keys in
    /// `ns` (spec.md 6, "KV-store layout").
    pub fn persist(&self, ns: &KvNamespace) -> Result<()> {
        let inner = self.inner.read();
        let mut batch = ns.new_batch();
        for (&id, surface) in inner.id_to_surface.iter() {
            batch.put(vid_key(id).as_bytes(), surface.as_bytes());
            batch.put(srf_key(surface).as_bytes(), &id.0.to_le_bytes());
        }
        ns.apply_batch(batch)
    }

    /// Reconstructs both directions by scanning the `vid_` prefix.
    pub fn load(ns: &KvNamespace) -> Result<Self> {
        let entries = ns.scan_prefix(b"vid_")?;
        let mut surface_to_id = HashMap::new();
        let mut id_to_surface = HashMap::new();
        let mut max_id = 0u32;

        for (key, value) in entries {
            let id_str = std::str::from_utf8(&key[b"vid_".len()..])
                .map_err(|_| Error::corruption("non-utf8 vid key"))?;
            let id: u32 = id_str
                .parse()
                .map_err(|_| Error::corruption(format!("malformed vid key {id_str:?}")))?;
            let surface = String::from_utf8(value).map_err(|_| Error::corruption("non-utf8 surface value"))?;
            max_id = max_id.max(id);
            id_to_surface.insert(Vid(id), surface.clone());
            surface_to_id.insert(surface, Vid(id));
        }

        if !id_to_surface.contains_key(&Vid(EOS_VID)) {
            return Err(Error::corruption("loaded vocabulary is missing the EOS entry"));
        }

        Ok(Vocabulary {
            inner: RwLock::new(Inner {
                surface_to_id,
                id_to_surface,
                next_id: max_id + 1,
            }),
        })
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}

fn vid_key(id: Vid) -> String {
    format!("vid_{}", id.0)
}

fn srf_key(surface: &str) -> String {
    format!("srf_{surface}")
}
