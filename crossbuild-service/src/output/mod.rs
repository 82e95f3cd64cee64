// Output Module
// Accumulates per-cell build outputs and writes them to the host

pub mod export;
pub mod tree;

pub use export::{write_tree, Exporter};
pub use tree::OutputTree;
