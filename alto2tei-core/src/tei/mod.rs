// TEI output - quick-xml writer for converted documents:
// header, optional facsimile section, then the body tree with mixed content.

pub mod serialization;

pub use serialization::TeiSerializer;
