use std::path::PathBuf;

/// Knobs for one `TokenIndex` (spec.md 3, "Index Tree Node" and 4.6 "Write Buffer").
#[derive(Debug, Clone, Copy)]
pub struct IndexConfig {
    /// Maximum size of a suffix-array leaf before it is split (the `K` of spec.md 3).
    pub leaf_budget: usize,
    /// Number of sentences the write buffer accumulates before merging into the
    /// persistent index (spec.md 4.6, default 1).
    pub batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            leaf_budget: 100_000,
            batch_size: 1,
        }
    }
}

/// Top-level configuration for a `Bitext`. Passed explicitly; no global state (spec.md 9).
#[derive(Debug, Clone)]
pub struct Config {
    pub storage_path: PathBuf,
    pub index: IndexConfig,
    /// Worker count for bulk-load parallel sorting (spec.md 5). Defaults to the host's
    /// logical core count.
    pub bulk_load_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("./data"),
            index: IndexConfig::default(),
            bulk_load_threads: num_cpus::get(),
        }
    }
}
