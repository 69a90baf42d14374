pub mod file_lock;
pub mod kv;
pub mod layout;

pub use file_lock::FileLock;
pub use kv::{KvBatch, KvNamespace, KvStats, KvStore};
pub use layout::StorageLayout;
