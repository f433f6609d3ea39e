//! Safe SQL identifiers.
//!
//! Grammar: ASCII `[A-Za-z_][A-Za-z0-9_]*`, at most [`MAX_IDENT_LEN`] bytes.
//! This is deliberately narrower than what MySQL accepts inside backticks:
//! anything outside it is refused before a statement is assembled.

use serde::{Deserialize, Serialize};
use std::fmt;

/// MySQL identifier length limit (tables and columns).
pub const MAX_IDENT_LEN: usize = 64;

/// Operator-facing statement of the grammar, printed next to refused entries.
/// MySQL itself accepts more (accented letters, a leading digit); such tables
/// are reported `failed` and must be repaired by hand.
pub const IDENT_RULE: &str = "names must be ASCII letters, digits or '_', not start with a digit, \
     at most 64 bytes; other names (accented letters included) are reported failed";

/// Upper bound for a generation tag, leaving room for the table name in
/// `{table}_{tag}`.
pub const MAX_TAG_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier {ident:?} is {len} bytes, limit is 64")]
    TooLong { ident: String, len: usize },

    #[error("identifier {ident:?} must start with an ASCII letter or '_'")]
    InvalidStart { ident: String },

    #[error("identifier {ident:?} contains disallowed character {ch:?}")]
    InvalidChar { ident: String, ch: char },

    #[error("generation tag {tag:?} must be 1 to 32 ASCII letters, digits or '_'")]
    InvalidGenerationTag { tag: String },
}

/// A validated identifier (table or column name).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ident(String);

impl Ident {
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let mut chars = raw.chars();
        let first = chars.next().ok_or(IdentifierError::Empty)?;

        if raw.len() > MAX_IDENT_LEN {
            return Err(IdentifierError::TooLong {
                ident: raw.to_string(),
                len: raw.len(),
            });
        }
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(IdentifierError::InvalidStart {
                ident: raw.to_string(),
            });
        }
        if let Some(ch) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
            return Err(IdentifierError::InvalidChar {
                ident: raw.to_string(),
                ch,
            });
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Backtick-quoted form for statement text. Safe because the grammar
    /// excludes the backtick itself.
    pub fn quoted(&self) -> String {
        format!("`{}`", self.0)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Ident {
    type Error = IdentifierError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Ident::parse(&raw)
    }
}

impl From<Ident> for String {
    fn from(id: Ident) -> Self {
        id.0
    }
}

impl PartialEq<str> for Ident {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Ident {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Name of a table the reconciler is allowed to touch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableName(Ident);

impl TableName {
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        Ident::parse(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn ident(&self) -> &Ident {
        &self.0
    }

    pub fn quoted(&self) -> String {
        self.0.quoted()
    }

    /// `{table}_{tag}`. Re-validated so an overlong combination is refused
    /// instead of being truncated by the server.
    pub fn backup_name(&self, tag: &GenerationTag) -> Result<TableName, IdentifierError> {
        TableName::parse(&format!("{}_{}", self.0, tag))
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Ident> for TableName {
    fn from(id: Ident) -> Self {
        Self(id)
    }
}

/// Opaque run identifier shared by every backup table of one run
/// (e.g. a date stamp such as `0124` or `20250123`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GenerationTag(String);

impl GenerationTag {
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let ok = !raw.is_empty()
            && raw.len() <= MAX_TAG_LEN
            && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !ok {
            return Err(IdentifierError::InvalidGenerationTag {
                tag: raw.to_string(),
            });
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenerationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GenerationTag {
    type Error = IdentifierError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        GenerationTag::parse(&raw)
    }
}

impl From<GenerationTag> for String {
    fn from(tag: GenerationTag) -> Self {
        tag.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        for raw in ["Foo", "_tmp", "Registro_comportamental4", "a1"] {
            assert_eq!(Ident::parse(raw).unwrap().as_str(), raw);
        }
    }

    #[test]
    fn rejects_injection_shapes() {
        assert_eq!(Ident::parse(""), Err(IdentifierError::Empty));
        assert!(matches!(
            Ident::parse("1abc"),
            Err(IdentifierError::InvalidStart { .. })
        ));
        assert!(matches!(
            Ident::parse("Foo`; DROP TABLE x; --"),
            Err(IdentifierError::InvalidChar { ch: '`', .. })
        ));
        assert!(matches!(
            Ident::parse("my-table"),
            Err(IdentifierError::InvalidChar { ch: '-', .. })
        ));
        assert!(matches!(
            Ident::parse("tábla"),
            Err(IdentifierError::InvalidChar { .. })
        ));
    }

    #[test]
    fn enforces_length_limit() {
        let at_limit = "a".repeat(MAX_IDENT_LEN);
        assert!(Ident::parse(&at_limit).is_ok());
        let over = "a".repeat(MAX_IDENT_LEN + 1);
        assert!(matches!(
            Ident::parse(&over),
            Err(IdentifierError::TooLong { len, .. }) if len == MAX_IDENT_LEN + 1
        ));
    }

    #[test]
    fn backup_name_is_table_underscore_tag() {
        let t = TableName::parse("Baz").unwrap();
        let g = GenerationTag::parse("0124").unwrap();
        assert_eq!(t.backup_name(&g).unwrap().as_str(), "Baz_0124");
    }

    #[test]
    fn backup_name_overflow_is_refused() {
        let t = TableName::parse(&"t".repeat(MAX_IDENT_LEN - 2)).unwrap();
        let g = GenerationTag::parse("0124").unwrap();
        assert!(matches!(
            t.backup_name(&g),
            Err(IdentifierError::TooLong { .. })
        ));
    }

    #[test]
    fn generation_tag_grammar() {
        assert!(GenerationTag::parse("20250123").is_ok());
        assert!(GenerationTag::parse("run_7").is_ok());
        assert!(GenerationTag::parse("").is_err());
        assert!(GenerationTag::parse("01-24").is_err());
        assert!(GenerationTag::parse(&"9".repeat(MAX_TAG_LEN + 1)).is_err());
    }

    #[test]
    fn deserialize_validates() {
        let ok: Ident = serde_json::from_str("\"id\"").unwrap();
        assert_eq!(ok, "id");
        assert!(serde_json::from_str::<Ident>("\"bad name\"").is_err());
    }
}
