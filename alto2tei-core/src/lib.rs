// alto2tei Core Library
//
// Rule-driven conversion of ALTO layout pages into TEI: line and block rules
// from a YAML table drive a per-page state machine, pages are stitched into
// books across page breaks, and facsimile zones are projected onto the result.

pub mod config;
pub mod convert;
pub mod error;
pub mod facsimile;
pub mod processor;
pub mod rules;
pub mod sources;
pub mod tei;
pub mod types;

// Re-export main types and functions for easy use
pub use config::ConversionConfig;
pub use convert::{ContinuationPolicy, LowercaseContinuation, MergeDecision};
pub use error::{ConversionError, PolicyNote};
pub use processor::{ConversionReport, DocumentProcessor, PageFailure, StepProfiler};
pub use rules::{RuleTable, Tag, TagResolver};
pub use sources::{AltoFileSource, InMemorySource, PageSource};
pub use types::*;
