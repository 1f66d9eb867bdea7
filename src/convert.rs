//! Moving values between entities and SQL rows.

use crate::error::{MapperError, Result};
use crate::metadata::{ColumnDescriptor, Entity, EntityMetadata};
use crate::value::{Row, Value};

pub fn encode_list(items: &[String]) -> Result<String> {
    Ok(serde_json::to_string(items)?)
}

pub fn decode_list(text: &str) -> Result<Vec<String>> {
    Ok(serde_json::from_str(text)?)
}

/// Converts a field value into the value bound for its column.
pub(crate) fn to_storage(column: &ColumnDescriptor, value: Value) -> Result<Value> {
    Ok(match value {
        Value::TextList(items) if column.is_list => Value::Text(encode_list(&items)?),
        Value::Boolean(flag) => Value::Integer(i64::from(flag)),
        other => other,
    })
}

fn from_storage(column: &ColumnDescriptor, value: Value) -> Result<Value> {
    if !column.is_list {
        return Ok(value);
    }
    match value {
        Value::Text(text) => Ok(Value::TextList(decode_list(&text)?)),
        Value::Null => Ok(Value::Null),
        other => Err(MapperError::invalid(format!(
            "list column `{}` holds {}, expected JSON text",
            column.storage_name,
            other.kind()
        ))),
    }
}

/// Storage values of every column of `entity`, in declaration order.
pub fn serialize_row<E>(metadata: &EntityMetadata<E>, entity: &E) -> Result<Vec<(String, Value)>> {
    metadata
        .bindings()
        .map(|(column, access)| -> Result<(String, Value)> {
            let value = to_storage(column, (access.get)(entity))?;
            Ok((column.storage_name.clone(), value))
        })
        .collect()
}

/// Builds an entity from a result row.
///
/// Every declared column must be present in the row; missing ones are all
/// named in the error. List columns are JSON-decoded, everything else is
/// handed to the field setter as is.
pub fn convert_row<E: Entity>(metadata: &EntityMetadata<E>, row: &Row) -> Result<E> {
    let missing: Vec<&str> = metadata
        .columns()
        .iter()
        .filter(|column| !row.contains_key(&column.storage_name))
        .map(|column| column.storage_name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(MapperError::invalid(format!(
            "row for `{}` is missing column(s) {}",
            metadata.type_name(),
            missing
                .iter()
                .map(|name| format!("`{name}`"))
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    let mut entity = E::default();
    for (column, access) in metadata.bindings() {
        let raw = row.get(&column.storage_name).cloned().unwrap_or(Value::Null);
        let value = from_storage(column, raw)?;
        (access.set)(&mut entity, value).map_err(|err| match err {
            MapperError::InvalidEntity(message) => MapperError::invalid(format!(
                "column `{}.{}`: {message}",
                metadata.type_name(),
                column.storage_name
            )),
            other => other,
        })?;
    }
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field;
    use crate::metadata::{ColumnOptions, EntityOptions, TableBuilder};
    use crate::types::SemanticType;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Pharmacy {
        id: Option<i64>,
        name: String,
        rating: Option<f64>,
        open_now: bool,
        services: Vec<String>,
    }

    impl Entity for Pharmacy {
        fn declare(table: &mut TableBuilder<Self>) -> crate::Result<()> {
            table
                .primary_generated_column("id", ColumnOptions::default(), field!(Pharmacy, id))?
                .column("name", ColumnOptions::semantic(SemanticType::Text), field!(Pharmacy, name))?
                .column(
                    "rating",
                    ColumnOptions::semantic(SemanticType::Number).nullable(),
                    field!(Pharmacy, rating),
                )?
                .column(
                    "open_now",
                    ColumnOptions::semantic(SemanticType::Boolean),
                    field!(Pharmacy, open_now),
                )?
                .column(
                    "services",
                    ColumnOptions::semantic(SemanticType::TextList),
                    field!(Pharmacy, services),
                )?;
            Ok(())
        }
    }

    fn metadata() -> EntityMetadata<Pharmacy> {
        EntityMetadata::build(&EntityOptions::default()).unwrap()
    }

    fn sample() -> Pharmacy {
        Pharmacy {
            id: Some(4),
            name: "Central".into(),
            rating: Some(4.5),
            open_now: true,
            services: vec!["vaccines".into(), "blood pressure, glucose".into()],
        }
    }

    #[test]
    fn list_encoding_round_trips() {
        for list in [
            vec![],
            vec!["one".to_string()],
            vec!["a,b".to_string(), "c".to_string(), "\"quoted\"".to_string()],
        ] {
            assert_eq!(decode_list(&encode_list(&list).unwrap()).unwrap(), list);
        }
    }

    #[test]
    fn serialized_row_converts_back() {
        let metadata = metadata();
        let entity = sample();
        let row: Row = serialize_row(&metadata, &entity).unwrap().into_iter().collect();
        assert_eq!(row["open_now"], Value::Integer(1));
        assert_eq!(
            row["services"],
            Value::Text(r#"["vaccines","blood pressure, glucose"]"#.into())
        );
        assert_eq!(convert_row(&metadata, &row).unwrap(), entity);
    }

    #[test]
    fn every_missing_column_is_reported() {
        let metadata = metadata();
        let full: Row = serialize_row(&metadata, &sample()).unwrap().into_iter().collect();
        for column in metadata.columns() {
            let mut row = full.clone();
            row.remove(&column.storage_name);
            let err = convert_row(&metadata, &row).unwrap_err();
            assert!(err.is_configuration());
            assert!(
                err.to_string().contains(&format!("`{}`", column.storage_name)),
                "{err}"
            );
        }
    }

    #[test]
    fn type_mismatch_names_the_column() {
        let metadata = metadata();
        let mut row: Row = serialize_row(&metadata, &sample()).unwrap().into_iter().collect();
        row.insert("name".into(), Value::Integer(9));
        let err = convert_row(&metadata, &row).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid entity: column `Pharmacy.name`: expected text, found integer"
        );
    }

    #[test]
    fn malformed_list_text_is_a_json_error() {
        let metadata = metadata();
        let mut row: Row = serialize_row(&metadata, &sample()).unwrap().into_iter().collect();
        row.insert("services".into(), Value::Text("vaccines".into()));
        assert!(matches!(
            convert_row(&metadata, &row),
            Err(MapperError::Json(_))
        ));
    }
}
