pub mod node;
pub mod ordered_sum_map;
pub mod position_order;
pub mod span;
pub mod token_index;
pub mod write_buffer;

pub use ordered_sum_map::OrderedSumMap;
pub use position_order::{compare_positions, compare_positions_from, path_ends_in_eos, PositionSource};
pub use span::IndexSpan;
pub use token_index::TokenIndex;
pub use write_buffer::WriteBuffer;
