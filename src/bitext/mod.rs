pub mod bitext;
pub mod bitext_side;
pub mod stream_versions;

pub use bitext::Bitext;
pub use bitext_side::BitextSide;
pub use stream_versions::StreamVersions;
