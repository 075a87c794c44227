//! high-level operations

mod concat;
mod extract;

pub use concat::{concat, ConcatReport};
pub use extract::{extract, ExtractOptions, ExtractReport, LayerOutcome, LayerReport};
