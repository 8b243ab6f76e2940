// Conversion layer - source pages in, output trees out:
// - state_machine.rs: line rules applied against one open container
// - page.rs: block dispatch for a single page
// - continuation.rs: ContinuationPolicy and the default lowercase heuristic
// - merger.rs: stitches page trees into one book body
// - text.rs: word-break and joining helpers

pub mod continuation;
pub mod merger;
pub mod page;
pub mod state_machine;
pub mod text;

pub use continuation::{ContinuationPolicy, LowercaseContinuation, MergeDecision};
pub use merger::{CrossPageMerger, MergedBook};
pub use page::{convert_page, PageOptions};
pub use state_machine::ConversionStateMachine;
pub use text::{join_pair, text_content};
