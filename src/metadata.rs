//! Column and table metadata.
//!
//! Entities describe their persisted fields once through a [`TableBuilder`].
//! The result is an immutable [`EntityMetadata`] holding the column
//! descriptors together with the typed accessors that move values between
//! the struct fields and SQL rows.

use std::fmt;

use crate::error::{MapperError, Result};
use crate::types::{map_semantic_type, SemanticType, StorageType};
use crate::value::Value;

/// A type persisted in exactly one table.
pub trait Entity: Default + Send + Sync + 'static {
    /// Declares the persisted columns, one builder call per field.
    fn declare(table: &mut TableBuilder<Self>) -> Result<()>;
}

pub type Getter<E> = fn(&E) -> Value;
pub type Setter<E> = fn(&mut E, Value) -> Result<()>;

/// Getter/setter pair binding a column to a struct field.
pub struct FieldAccess<E> {
    pub get: Getter<E>,
    pub set: Setter<E>,
}

impl<E> FieldAccess<E> {
    pub fn new(get: Getter<E>, set: Setter<E>) -> Self {
        Self { get, set }
    }
}

impl<E> Clone for FieldAccess<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for FieldAccess<E> {}

impl<E> fmt::Debug for FieldAccess<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldAccess")
    }
}

/// Builds the [`FieldAccess`] for a struct field.
///
/// ```ignore
/// table.column("name", ColumnOptions::semantic(SemanticType::Text), field!(Clinic, name))?;
/// ```
#[macro_export]
macro_rules! field {
    ($entity:ty, $field:ident) => {
        $crate::FieldAccess::<$entity>::new(
            |entity: &$entity| $crate::Value::from(::std::clone::Clone::clone(&entity.$field)),
            |entity: &mut $entity, value: $crate::Value| -> $crate::Result<()> {
                entity.$field = $crate::FromValue::from_value(value)?;
                ::std::result::Result::Ok(())
            },
        )
    };
}

/// Options accepted when declaring a column.
///
/// Exactly one of `storage_type` and `semantic_type` must be set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnOptions {
    /// Column name used in SQL; defaults to the property key.
    pub name: Option<String>,
    pub storage_type: Option<StorageType>,
    pub semantic_type: Option<SemanticType>,
    pub nullable: bool,
    pub unique: bool,
    pub primary: bool,
}

impl ColumnOptions {
    pub fn semantic(kind: SemanticType) -> Self {
        Self {
            semantic_type: Some(kind),
            ..Self::default()
        }
    }

    pub fn storage(storage_type: StorageType) -> Self {
        Self {
            storage_type: Some(storage_type),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }
}

/// One persisted field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub property_key: String,
    pub storage_name: String,
    pub storage_type: StorageType,
    pub is_list: bool,
    pub is_primary: bool,
    pub is_nullable: bool,
    pub is_unique: bool,
}

/// Per-entity registration options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityOptions {
    /// Table name; defaults to the lower-cased type name.
    pub name: Option<String>,
    /// Treat the declared schema as authoritative: an existing table whose
    /// live schema differs is dropped and recreated.
    pub immutable: bool,
}

impl EntityOptions {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }
}

/// SQLite keywords; none of them can appear unquoted as a table or column.
const SQLITE_KEYWORDS: &[&str] = &[
    "ABORT", "ACTION", "ADD", "AFTER", "ALL", "ALTER", "ALWAYS", "ANALYZE", "AND", "AS", "ASC",
    "ATTACH", "AUTOINCREMENT", "BEFORE", "BEGIN", "BETWEEN", "BY", "CASCADE", "CASE", "CAST",
    "CHECK", "COLLATE", "COLUMN", "COMMIT", "CONFLICT", "CONSTRAINT", "CREATE", "CROSS",
    "CURRENT", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "DATABASE", "DEFAULT",
    "DEFERRABLE", "DEFERRED", "DELETE", "DESC", "DETACH", "DISTINCT", "DO", "DROP", "EACH",
    "ELSE", "END", "ESCAPE", "EXCEPT", "EXCLUDE", "EXCLUSIVE", "EXISTS", "EXPLAIN", "FAIL",
    "FILTER", "FIRST", "FOLLOWING", "FOR", "FOREIGN", "FROM", "FULL", "GENERATED", "GLOB",
    "GROUP", "GROUPS", "HAVING", "IF", "IGNORE", "IMMEDIATE", "IN", "INDEX", "INDEXED",
    "INITIALLY", "INNER", "INSERT", "INSTEAD", "INTERSECT", "INTO", "IS", "ISNULL", "JOIN", "KEY",
    "LAST", "LEFT", "LIKE", "LIMIT", "MATCH", "MATERIALIZED", "NATURAL", "NO", "NOT", "NOTHING",
    "NOTNULL", "NULL", "NULLS", "OF", "OFFSET", "ON", "OR", "ORDER", "OTHERS", "OUTER", "OVER",
    "PARTITION", "PLAN", "PRAGMA", "PRECEDING", "PRIMARY", "QUERY", "RAISE", "RANGE",
    "RECURSIVE", "REFERENCES", "REGEXP", "REINDEX", "RELEASE", "RENAME", "REPLACE", "RESTRICT",
    "RETURNING", "RIGHT", "ROLLBACK", "ROW", "ROWS", "SAVEPOINT", "SELECT", "SET", "TABLE",
    "TEMP", "TEMPORARY", "THEN", "TIES", "TO", "TRANSACTION", "TRIGGER", "UNBOUNDED", "UNION",
    "UNIQUE", "UPDATE", "USING", "VACUUM", "VALUES", "VIEW", "VIRTUAL", "WHEN", "WHERE",
    "WINDOW", "WITH", "WITHOUT",
];

/// Rejects anything that is not a plain SQL identifier. Table and column
/// names are spliced into statements, never bound.
pub(crate) fn validate_identifier(what: &str, name: &str) -> Result<()> {
    if SQLITE_KEYWORDS
        .iter()
        .any(|keyword| keyword.eq_ignore_ascii_case(name))
    {
        return Err(MapperError::invalid(format!(
            "{what} `{name}` is an SQL keyword"
        )));
    }
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(MapperError::invalid(format!(
            "{what} `{name}` is not a valid SQL identifier"
        )))
    }
}

/// Unqualified type name with generic arguments removed.
pub(crate) fn short_type_name<E: ?Sized>() -> &'static str {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Collects column declarations for one entity type.
pub struct TableBuilder<E> {
    type_name: &'static str,
    columns: Vec<ColumnDescriptor>,
    accessors: Vec<FieldAccess<E>>,
    primary: Option<usize>,
}

impl<E: Entity> TableBuilder<E> {
    pub fn new() -> Self {
        Self::with_type_name(short_type_name::<E>())
    }

    /// Resolves the table name and freezes the declarations.
    pub fn finish(self, options: &EntityOptions) -> Result<EntityMetadata<E>> {
        let table_name = options
            .name
            .clone()
            .unwrap_or_else(|| self.type_name.to_lowercase());
        if table_name.is_empty() {
            return Err(MapperError::invalid(format!(
                "`{}` has no table name",
                self.type_name
            )));
        }
        validate_identifier("table", &table_name)?;
        if self.columns.is_empty() {
            return Err(MapperError::invalid(format!(
                "`{}` declares no columns",
                self.type_name
            )));
        }
        let primary = self.primary.ok_or_else(|| {
            MapperError::invalid(format!("`{}` declares no primary column", self.type_name))
        })?;
        self.check_accessors(primary)?;

        Ok(EntityMetadata {
            type_name: self.type_name,
            table_name,
            columns: self.columns,
            accessors: self.accessors,
            primary,
        })
    }

    /// Exercises every accessor on a default instance.
    ///
    /// The primary field must read back as NULL so that a fresh entity gets
    /// a generated identity, and every setter must accept a value of its
    /// column's storage type.
    fn check_accessors(&self, primary: usize) -> Result<()> {
        let mut blank = E::default();
        let key = (self.accessors[primary].get)(&blank);
        if !key.is_null() {
            return Err(MapperError::invalid(format!(
                "primary field `{}.{}` must be optional; a new instance reads {} instead of null",
                self.type_name,
                self.columns[primary].property_key,
                key.kind()
            )));
        }
        for (column, access) in self.columns.iter().zip(&self.accessors) {
            let sample = if column.is_list {
                Value::TextList(Vec::new())
            } else {
                match column.storage_type {
                    StorageType::Integer => Value::Integer(0),
                    StorageType::Real => Value::Real(0.5),
                    StorageType::Text => Value::Text(String::new()),
                }
            };
            (access.set)(&mut blank, sample).map_err(|err| {
                MapperError::invalid(format!(
                    "field `{}.{}` cannot hold its {} column: {err}",
                    self.type_name, column.property_key, column.storage_type
                ))
            })?;
        }
        Ok(())
    }
}

impl<E: Entity> Default for TableBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for TableBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableBuilder")
            .field("type_name", &self.type_name)
            .field("columns", &self.columns)
            .field("primary", &self.primary)
            .finish()
    }
}

impl<E> TableBuilder<E> {
    pub fn with_type_name(type_name: &'static str) -> Self {
        Self {
            type_name,
            columns: Vec::new(),
            accessors: Vec::new(),
            primary: None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Declares a column bound to `access`.
    pub fn column(
        &mut self,
        property_key: &str,
        options: ColumnOptions,
        access: FieldAccess<E>,
    ) -> Result<&mut Self> {
        let storage_name = options.name.clone().unwrap_or_else(|| property_key.to_string());
        validate_identifier("column", &storage_name)?;

        let (storage_type, is_list) = match (options.storage_type, &options.semantic_type) {
            (Some(storage_type), None) => (storage_type, false),
            (None, Some(kind)) => {
                let is_list = *kind == SemanticType::TextList;
                (map_semantic_type(kind, is_list)?, is_list)
            }
            _ => {
                return Err(MapperError::invalid(format!(
                    "column `{}.{property_key}` must declare exactly one of a storage type or a semantic type",
                    self.type_name
                )))
            }
        };

        if self.columns.iter().any(|c| c.property_key == property_key) {
            return Err(MapperError::invalid(format!(
                "property `{}.{property_key}` is declared twice",
                self.type_name
            )));
        }
        if self.columns.iter().any(|c| c.storage_name == storage_name) {
            return Err(MapperError::invalid(format!(
                "column `{storage_name}` is declared twice on `{}`",
                self.type_name
            )));
        }

        if options.primary {
            if let Some(existing) = self.primary {
                return Err(MapperError::invalid(format!(
                    "`{}` already has primary column `{}`; `{property_key}` cannot be a second one",
                    self.type_name, self.columns[existing].property_key
                )));
            }
            if storage_type != StorageType::Integer {
                return Err(MapperError::invalid(format!(
                    "primary column `{}.{property_key}` must be INTEGER, not {storage_type}",
                    self.type_name
                )));
            }
        } else if options.nullable && options.unique {
            tracing::warn!(
                entity = self.type_name,
                column = %storage_name,
                "column is both nullable and unique; the UNIQUE constraint is not emitted"
            );
        }

        if options.primary {
            self.primary = Some(self.columns.len());
        }
        self.columns.push(ColumnDescriptor {
            property_key: property_key.to_string(),
            storage_name,
            storage_type,
            is_list,
            is_primary: options.primary,
            is_nullable: options.nullable,
            is_unique: options.unique,
        });
        self.accessors.push(access);
        Ok(self)
    }

    /// Declares the auto-generated integer identity column.
    pub fn primary_generated_column(
        &mut self,
        property_key: &str,
        mut options: ColumnOptions,
        access: FieldAccess<E>,
    ) -> Result<&mut Self> {
        options.primary = true;
        if options.storage_type.is_none() && options.semantic_type.is_none() {
            options.storage_type = Some(StorageType::Integer);
        }
        self.column(property_key, options, access)
    }
}

/// Immutable mapping between an entity type and its table.
#[derive(Debug)]
pub struct EntityMetadata<E> {
    type_name: &'static str,
    table_name: String,
    columns: Vec<ColumnDescriptor>,
    accessors: Vec<FieldAccess<E>>,
    primary: usize,
}

impl<E: Entity> EntityMetadata<E> {
    /// Runs the entity's declarations and finishes them with `options`.
    pub fn build(options: &EntityOptions) -> Result<Self> {
        let mut table = TableBuilder::<E>::new();
        E::declare(&mut table)?;
        table.finish(options)
    }
}

impl<E> EntityMetadata<E> {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn primary_key(&self) -> &ColumnDescriptor {
        &self.columns[self.primary]
    }

    pub(crate) fn primary_access(&self) -> FieldAccess<E> {
        self.accessors[self.primary]
    }

    /// Descriptor and accessor for every column, in declaration order.
    pub(crate) fn bindings(&self) -> impl Iterator<Item = (&ColumnDescriptor, FieldAccess<E>)> {
        self.columns.iter().zip(self.accessors.iter().copied())
    }

    /// Checks the metadata is complete before any statement is issued.
    pub fn verify(&self) -> Result<()> {
        if self.table_name.is_empty() {
            return Err(MapperError::invalid(format!("`{}` has no table name", self.type_name)));
        }
        if self.columns.is_empty() || self.columns.len() != self.accessors.len() {
            return Err(MapperError::invalid(format!("`{}` has no usable columns", self.type_name)));
        }
        match self.columns.get(self.primary) {
            Some(column) if column.is_primary => Ok(()),
            _ => Err(MapperError::invalid(format!("`{}` has no primary column", self.type_name))),
        }
    }
}
