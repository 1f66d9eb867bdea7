use std::fmt;
use std::str::FromStr;

use crate::error::{MapperError, Result};

/// Native column storage types emitted in generated SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    Integer,
    Text,
    Real,
}

impl StorageType {
    pub const fn as_sql(self) -> &'static str {
        match self {
            StorageType::Integer => "INTEGER",
            StorageType::Text => "TEXT",
            StorageType::Real => "REAL",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Kind of value a field holds, as declared by the entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticType {
    Text,
    /// Stored as REAL; the bound field must read back from a real (`f64`).
    Number,
    Boolean,
    TextList,
    /// Any other kind a host declares (dates, nested objects, ...). These have
    /// no storage mapping and are rejected when the column is declared.
    Other(String),
}

impl FromStr for SemanticType {
    type Err = std::convert::Infallible;

    /// Parses the loose kind names hosts tend to use. Unknown names become
    /// [`SemanticType::Other`] so the mapping step can reject them.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "text" | "string" => SemanticType::Text,
            "number" | "real" | "float" => SemanticType::Number,
            "boolean" | "bool" => SemanticType::Boolean,
            "text[]" | "string[]" | "array" | "list" => SemanticType::TextList,
            _ => SemanticType::Other(s.to_string()),
        })
    }
}

/// Maps a semantic kind onto its storage type.
///
/// List columns always store TEXT (a JSON array), whatever `kind` says.
pub fn map_semantic_type(kind: &SemanticType, is_list: bool) -> Result<StorageType> {
    if is_list {
        return Ok(StorageType::Text);
    }
    match kind {
        SemanticType::Text | SemanticType::TextList => Ok(StorageType::Text),
        SemanticType::Number => Ok(StorageType::Real),
        SemanticType::Boolean => Ok(StorageType::Integer),
        SemanticType::Other(name) => Err(MapperError::invalid(format!(
            "`{name}` is not a valid column type"
        ))),
    }
}
