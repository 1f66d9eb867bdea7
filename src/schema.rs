//! Table schema generation and reconciliation.

use crate::datastore::Datastore;
use crate::error::{MapperError, Result};
use crate::metadata::{ColumnDescriptor, EntityMetadata};
use crate::value::{Row, SqlQuery, Value};

/// Builds the `CREATE TABLE IF NOT EXISTS` statement for a table.
///
/// The primary column comes first and is always an autoincrementing
/// integer. Every other column carries exactly one of `NULL`, `UNIQUE` or
/// `NOT NULL`, checked in that order.
pub fn create_table_sql(table: &str, columns: &[ColumnDescriptor]) -> Result<String> {
    let mut primaries = columns.iter().filter(|c| c.is_primary);
    let primary = primaries
        .next()
        .ok_or_else(|| MapperError::invalid(format!("table `{table}` has no primary column")))?;
    if let Some(extra) = primaries.next() {
        return Err(MapperError::invalid(format!(
            "table `{table}` has more than one primary column (`{}`, `{}`)",
            primary.storage_name, extra.storage_name
        )));
    }

    let mut sql = format!("CREATE TABLE IF NOT EXISTS {table} (\n");
    sql.push_str(&format!(
        "  {} INTEGER PRIMARY KEY AUTOINCREMENT,\n",
        primary.storage_name
    ));
    for column in columns.iter().filter(|c| !c.is_primary) {
        let constraint = if column.is_nullable {
            "NULL"
        } else if column.is_unique {
            "UNIQUE"
        } else {
            "NOT NULL"
        };
        sql.push_str(&format!(
            "  {} {} {},\n",
            column.storage_name, column.storage_type, constraint
        ));
    }
    sql.truncate(sql.trim_end_matches(['\n', ',']).len());
    sql.push_str("\n);");
    Ok(sql)
}

/// Column shape shared by declared and live schemas for comparison.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SchemaColumn {
    pub name: String,
    pub storage_type: String,
    pub not_null: bool,
    pub primary: bool,
}

/// Shape the generated `CREATE TABLE` gives each declared column.
pub fn declared_schema(columns: &[ColumnDescriptor]) -> Vec<SchemaColumn> {
    let mut schema: Vec<SchemaColumn> = columns
        .iter()
        .map(|column| SchemaColumn {
            name: column.storage_name.clone(),
            storage_type: if column.is_primary {
                "INTEGER".to_string()
            } else {
                column.storage_type.as_sql().to_string()
            },
            not_null: !column.is_primary && !column.is_nullable && !column.is_unique,
            primary: column.is_primary,
        })
        .collect();
    schema.sort();
    schema
}

/// Normalizes `PRAGMA table_info` rows. An empty result means the table does
/// not exist.
pub fn live_schema(rows: &[Row]) -> Result<Vec<SchemaColumn>> {
    let mut schema = Vec::with_capacity(rows.len());
    for row in rows {
        let name = match row.get("name") {
            Some(Value::Text(name)) => name.clone(),
            _ => return Err(MapperError::invalid("table_info row without a name")),
        };
        let storage_type = match row.get("type") {
            Some(Value::Text(kind)) => kind.to_uppercase(),
            _ => String::new(),
        };
        let primary = row.get("pk").and_then(Value::as_i64).unwrap_or(0) > 0;
        let not_null = !primary && row.get("notnull").and_then(Value::as_i64).unwrap_or(0) != 0;
        schema.push(SchemaColumn {
            name,
            storage_type,
            not_null,
            primary,
        });
    }
    schema.sort();
    Ok(schema)
}

/// Creates the entity's table, first dropping a mismatched one when
/// `immutable` is set. Returns whether a table was dropped.
pub async fn ensure_table<D, E>(
    datastore: &D,
    metadata: &EntityMetadata<E>,
    immutable: bool,
) -> Result<bool>
where
    D: Datastore + ?Sized,
{
    let table = metadata.table_name();
    let create = create_table_sql(table, metadata.columns())?;

    let mut dropped = false;
    if immutable {
        let rows = datastore
            .query(&SqlQuery::new(format!("PRAGMA table_info({table})")))
            .await?;
        let live = live_schema(&rows)?;
        if !live.is_empty() && live != declared_schema(metadata.columns()) {
            tracing::warn!(table, "live schema differs from declaration; dropping table");
            datastore
                .execute(&SqlQuery::new(format!("DROP TABLE IF EXISTS {table}")))
                .await?;
            dropped = true;
        }
    }

    datastore.execute(&SqlQuery::new(create)).await?;
    tracing::info!(table, entity = metadata.type_name(), "table ensured");
    Ok(dropped)
}
