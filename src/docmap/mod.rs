mod document_map;

pub use document_map::DocumentMap;
