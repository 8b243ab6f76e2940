// Rule layer - turns the YAML mapping into typed, immutable lookups:
// - tag.rs: Tag parsing and TagResolver (full tag -> category -> default)
// - table.rs: BlockRule / LineRule / RuleTable
// - footnote.rs: ordered footnote marker patterns
// - validation.rs: configuration warnings

pub mod footnote;
pub mod table;
pub mod tag;
pub mod validation;

pub use footnote::{FootnoteMatch, FootnoteMatcher, FootnotePattern};
pub use table::{
    BlockRule, ContainerSpec, ElementSpec, LineAction, LineRule, RuleTable, StructuralElements,
    TextJoin,
};
pub use tag::{Resolved, Tag, TagResolver};
pub use validation::{validate_config, ValidationIssue, ValidationReport};
