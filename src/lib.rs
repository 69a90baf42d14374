//! A persistent, parallel-corpus suffix index: for each side of a bitext, a
//! hybrid suffix trie/array over that side's token corpus, kept in sync with
//! a word-alignment corpus and a document map.
//!
//! ```text
//! Bitext
//!  ├── BitextSide (source)          ├── BitextSide (target)
//!  │    ├── corpus: TokenCorpus     │    ├── corpus: TokenCorpus
//!  │    ├── vocab: Vocabulary       │    ├── vocab: Vocabulary
//!  │    ├── global: TokenIndex      │    ├── global: TokenIndex
//!  │    └── by_domain: HashMap<DomainId, TokenIndex>
//!  ├── alignment: AlignmentCorpus
//!  └── docmap: DocumentMap (domain vocabulary + SentInfoCorpus + StreamVersions)
//!
//! TokenIndex
//!  └── root: IndexNode = Leaf{positions: Vec<Position>} | Internal{children: OrderedSumMap<Vid, IndexNode>}
//! ```
//!
//! Every on-disk array is memory-mapped (`mmap::MappedSegment`); every write
//! path follows data-before-metadata ordering so a crash mid-append leaves the
//! file reopenable by truncating back to the last committed header.

pub mod bitext;
pub mod core;
pub mod corpus;
pub mod docmap;
pub mod index;
pub mod mmap;
pub mod storage;
pub mod vocab;
