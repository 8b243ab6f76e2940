// All conversion logic is in alto2tei-core
// This CLI acts as a thin wrapper: config lookup, file discovery, output naming

// CLI-specific modules
pub mod batch;

// Re-export core types for convenience
pub use alto2tei_core::*;

pub use batch::{BatchSummary, OutputFormat};
