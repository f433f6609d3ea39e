//! pkr-schema
//!
//! Expected primary-key schema and the identifier rules every statement
//! builder relies on.
//!
//! - [`Ident`] / [`TableName`] are the only way a name reaches SQL text.
//!   Names are interpolated (backtick-quoted), never bound, so validation is
//!   a hard gate rather than a lint.
//! - [`SchemaCatalog`] is built once from the declarative schema source and
//!   is read-only for the rest of a run.
//!
//! Pure logic. No IO except reading the catalog file.

mod catalog;
mod ident;

pub use catalog::{
    CatalogError, CatalogLookup, CatalogRecord, ExpectedKeyColumn, SchemaCatalog,
    AUTO_INCREMENT_MARKER,
};
pub use ident::{
    GenerationTag, Ident, IdentifierError, TableName, IDENT_RULE, MAX_IDENT_LEN,
    MAX_TAG_LEN,
};
