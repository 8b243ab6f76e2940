//! Page sources
//!
//! The converter never reads files itself. A [`PageSource`] hands it one
//! [`SourcePage`] at a time in book order:
//!
//! ```text
//! ALTO files (folder order or METS order)
//!     ↓
//! [PageSource::load_page]
//!     ↓
//! SourcePage (blocks → lines → raw tags)
//!     ↓
//! [ConversionStateMachine]
//! ```
//!
//! ## Available sources
//!
//! - `AltoFileSource` - ALTO XML files on disk
//! - `InMemorySource` - pages built in code, mostly for tests

pub mod alto;
pub mod mets;

pub use alto::{is_alto_document, parse_alto, AltoFileSource};
pub use mets::read_page_order;

use crate::types::SourcePage;
use anyhow::Result;

/// Provides pages in final book order; page numbers are 1-based positions
/// in that order.
pub trait PageSource: Send + Sync {
    fn page_count(&self) -> usize;

    /// Load the page at `index` (0-based). Failures are per page; the book
    /// pipeline records them and moves on.
    fn load_page(&self, index: usize) -> Result<SourcePage>;

    /// Source name for logging and the header title
    fn name(&self) -> &str;
}

/// Pages already in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    name: String,
    pages: Vec<SourcePage>,
}

impl InMemorySource {
    /// Page numbers are reassigned from the vector order
    pub fn new(name: impl Into<String>, pages: Vec<SourcePage>) -> Self {
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(i, mut page)| {
                page.page_number = i as u32 + 1;
                page
            })
            .collect();
        Self {
            name: name.into(),
            pages,
        }
    }
}

impl PageSource for InMemorySource {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn load_page(&self, index: usize) -> Result<SourcePage> {
        self.pages
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("page index {index} out of range ({} pages)", self.pages.len()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
