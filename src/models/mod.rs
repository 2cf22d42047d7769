mod document;

pub use document::{Document, DocumentField, FieldCounts, FIELD_COUNT};
