//! The entity runtime: registration plus CRUD over any registered type.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::convert::{convert_row, to_storage};
use crate::datastore::Datastore;
use crate::error::{MapperError, Result};
use crate::metadata::{short_type_name, ColumnDescriptor, Entity, EntityMetadata, EntityOptions};
use crate::schema;
use crate::sqlite::SqliteStore;
use crate::value::{Row, SqlQuery, Value};

/// Token replaced by the entity's table name in query templates.
pub const TABLE_TOKEN: &str = "$table";

/// Substitutes every `$table` in `template` with `table`.
pub fn render_template(template: &str, table: &str) -> String {
    template.replace(TABLE_TOKEN, table)
}

/// Application context owning the datastore and the metadata of every
/// registered entity type.
///
/// Register entities at startup, then share the mapper (it is `Sync` when
/// the datastore is). Statements are issued one at a time per call; callers
/// sequence their own calls.
pub struct Mapper<D = SqliteStore> {
    datastore: D,
    registry: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl<D: Datastore> Mapper<D> {
    pub fn new(datastore: D) -> Self {
        Self {
            datastore,
            registry: HashMap::new(),
        }
    }

    pub fn datastore(&self) -> &D {
        &self.datastore
    }

    /// Builds `E`'s metadata and makes sure its table exists.
    ///
    /// With `options.immutable` a live table whose schema differs from the
    /// declaration is dropped first, losing its rows. Registering a type a
    /// second time replaces its metadata.
    pub async fn register<E: Entity>(&mut self, options: EntityOptions) -> Result<()> {
        let metadata = EntityMetadata::<E>::build(&options)?;
        metadata.verify()?;
        schema::ensure_table(&self.datastore, &metadata, options.immutable).await?;
        let replaced = self
            .registry
            .insert(TypeId::of::<E>(), Box::new(metadata))
            .is_some();
        if replaced {
            tracing::info!(entity = short_type_name::<E>(), "entity re-registered");
        }
        Ok(())
    }

    pub fn is_registered<E: Entity>(&self) -> bool {
        self.registry.contains_key(&TypeId::of::<E>())
    }

    /// Verified metadata for `E`.
    pub fn metadata<E: Entity>(&self) -> Result<&EntityMetadata<E>> {
        let metadata = self
            .registry
            .get(&TypeId::of::<E>())
            .and_then(|entry| entry.downcast_ref::<EntityMetadata<E>>())
            .ok_or(MapperError::NotRegistered(short_type_name::<E>()))?;
        metadata.verify()?;
        Ok(metadata)
    }

    pub fn columns<E: Entity>(&self) -> Result<&[ColumnDescriptor]> {
        Ok(self.metadata::<E>()?.columns())
    }

    pub fn table_name<E: Entity>(&self) -> Result<&str> {
        Ok(self.metadata::<E>()?.table_name())
    }

    /// Inserts `entity`, or updates it when a row with its primary key exists.
    ///
    /// Non-nullable fields are checked before anything is sent. After an
    /// insert the generated identity is written back to the primary field.
    pub async fn save<E: Entity>(&self, entity: &mut E) -> Result<()> {
        let metadata = self.metadata::<E>()?;
        let table = metadata.table_name();
        let primary = metadata.primary_key();

        let mut columns = Vec::new();
        let mut values = Vec::new();
        for (column, access) in metadata.bindings().filter(|(column, _)| !column.is_primary) {
            let value = to_storage(column, (access.get)(&*entity))?;
            if value.is_null() && !column.is_nullable {
                return Err(MapperError::invalid(format!(
                    "`{}.{}` is not nullable but has no value",
                    metadata.type_name(),
                    column.property_key
                )));
            }
            columns.push(column.storage_name.as_str());
            values.push(value);
        }
        let key = to_storage(primary, (metadata.primary_access().get)(&*entity))?;

        if !key.is_null() && self.exists(table, &primary.storage_name, &key).await? {
            if columns.is_empty() {
                return Ok(());
            }
            let assignments: Vec<String> =
                columns.iter().map(|column| format!("{column} = ?")).collect();
            values.push(key);
            let update = SqlQuery::new(format!(
                "UPDATE {table} SET {} WHERE {} = ?",
                assignments.join(", "),
                primary.storage_name
            ))
            .with_params(values);
            self.datastore.execute(&update).await?;
            return Ok(());
        }

        if !key.is_null() {
            columns.push(primary.storage_name.as_str());
            values.push(key);
        }
        let statement = if columns.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES")
        } else {
            format!(
                "INSERT INTO {table} ( {} ) VALUES ( {} )",
                columns.join(", "),
                vec!["?"; columns.len()].join(", ")
            )
        };
        let execution = self
            .datastore
            .execute(&SqlQuery::new(statement).with_params(values))
            .await?;
        (metadata.primary_access().set)(entity, Value::Integer(execution.last_insert_rowid))
    }

    async fn exists(&self, table: &str, primary: &str, key: &Value) -> Result<bool> {
        let lookup = SqlQuery::new(format!(
            "SELECT {primary} FROM {table} WHERE {primary} = ? LIMIT 1"
        ))
        .bind(key.clone());
        Ok(!self.datastore.query(&lookup).await?.is_empty())
    }

    /// Every row of `E`'s table.
    pub async fn find<E: Entity>(&self) -> Result<Vec<E>> {
        let metadata = self.metadata::<E>()?;
        let rows = self
            .datastore
            .query(&SqlQuery::new(format!("SELECT * FROM {}", metadata.table_name())))
            .await?;
        rows.iter().map(|row| convert_row(metadata, row)).collect()
    }

    pub async fn find_by_key<E: Entity>(&self, key: i64) -> Result<Option<E>> {
        let metadata = self.metadata::<E>()?;
        let query = SqlQuery::new(format!(
            "SELECT * FROM {} WHERE {} = ?",
            metadata.table_name(),
            metadata.primary_key().storage_name
        ))
        .bind(key);
        let rows = self.datastore.query(&query).await?;
        rows.first().map(|row| convert_row(metadata, row)).transpose()
    }

    /// Runs a `$table` template and returns the raw rows.
    pub async fn query<E: Entity>(&self, template: &str, params: &[Value]) -> Result<Vec<Row>> {
        let metadata = self.metadata::<E>()?;
        let query = SqlQuery::new(render_template(template, metadata.table_name()))
            .with_params(params.to_vec());
        self.datastore.query(&query).await
    }

    /// Runs a `$table` template and converts every row into `E`. The
    /// template must project all of `E`'s columns.
    pub async fn query_objs<E: Entity>(&self, template: &str, params: &[Value]) -> Result<Vec<E>> {
        let metadata = self.metadata::<E>()?;
        let rows = self.query::<E>(template, params).await?;
        rows.iter().map(|row| convert_row(metadata, row)).collect()
    }

    pub async fn count<E: Entity>(&self) -> Result<i64> {
        let rows = self
            .query::<E>("SELECT COUNT(*) AS count FROM $table", &[])
            .await?;
        rows.first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_i64)
            .ok_or_else(|| MapperError::Datastore("count query returned no count".to_string()))
    }

    /// Deletes every row of `E`'s table, returning how many went.
    pub async fn clear<E: Entity>(&self) -> Result<usize> {
        let metadata = self.metadata::<E>()?;
        let execution = self
            .datastore
            .execute(&SqlQuery::new(format!("DELETE FROM {}", metadata.table_name())))
            .await?;
        Ok(execution.changes)
    }

    /// Deletes the row with primary key `key`; false when there was none.
    pub async fn delete<E: Entity>(&self, key: i64) -> Result<bool> {
        let metadata = self.metadata::<E>()?;
        let statement = SqlQuery::new(format!(
            "DELETE FROM {} WHERE {} = ?",
            metadata.table_name(),
            metadata.primary_key().storage_name
        ))
        .bind(key);
        Ok(self.datastore.execute(&statement).await?.changes > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_replaces_every_token() {
        assert_eq!(
            render_template("SELECT * FROM $table WHERE id > ?", "widgets"),
            "SELECT * FROM widgets WHERE id > ?"
        );
        assert_eq!(
            render_template("SELECT a.* FROM $table a JOIN $table b ON a.id = b.id", "t"),
            "SELECT a.* FROM t a JOIN t b ON a.id = b.id"
        );
        assert_eq!(render_template("SELECT * FROM $TABLE", "t"), "SELECT * FROM $TABLE");
    }
}
