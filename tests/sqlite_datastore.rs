use anyhow::Result;
use rust_sqlite_mapper::{Datastore, MapperError, SqlQuery, SqliteConfig, SqliteStore, Value};
use tempfile::NamedTempFile;

// Helper function to create an in-memory database for testing
async fn create_test_db() -> Result<SqliteStore> {
    let store = SqliteStore::open_in_memory()?;
    initialize_schema(&store).await?;
    Ok(store)
}

// Initialize the database schema
async fn initialize_schema(store: &SqliteStore) -> Result<()> {
    store
        .execute(&SqlQuery::new(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                age INTEGER,
                tags TEXT
            )",
        ))
        .await?;
    Ok(())
}

fn insert_user(name: &str, email: &str, age: Option<i64>) -> SqlQuery {
    SqlQuery::new("INSERT INTO users (name, email, age) VALUES (?1, ?2, ?3)")
        .bind(name)
        .bind(email)
        .bind(age)
}

#[tokio::test]
async fn test_basic_operations() -> Result<()> {
    let store = create_test_db().await?;

    let inserted = store.execute(&insert_user("John Doe", "john@example.com", Some(30))).await?;
    assert_eq!(inserted.changes, 1);
    assert_eq!(inserted.last_insert_rowid, 1);

    let rows = store
        .query(&SqlQuery::new("SELECT id, name, email, age FROM users WHERE id = ?").bind(1_i64))
        .await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], Value::Text("John Doe".into()));
    assert_eq!(rows[0]["age"], Value::Integer(30));

    let updated = store
        .execute(&SqlQuery::new("UPDATE users SET age = ? WHERE id = ?").bind(31_i64).bind(1_i64))
        .await?;
    assert_eq!(updated.changes, 1);

    store
        .execute(&SqlQuery::new("DELETE FROM users WHERE id = ?").bind(1_i64))
        .await?;
    let rows = store
        .query(&SqlQuery::new("SELECT id FROM users WHERE id = ?").bind(1_i64))
        .await?;
    assert!(rows.is_empty());
    Ok(())
}

#[tokio::test]
async fn nulls_booleans_and_lists_bind() -> Result<()> {
    let store = create_test_db().await?;
    store.execute(&insert_user("Ann", "ann@example.com", None)).await?;
    store
        .execute(
            &SqlQuery::new("UPDATE users SET tags = ?, age = ? WHERE email = ?")
                .bind(vec!["a".to_string(), "b, c".to_string()])
                .bind(true)
                .bind("ann@example.com"),
        )
        .await?;

    let rows = store
        .query(&SqlQuery::new("SELECT age, tags FROM users"))
        .await?;
    assert_eq!(rows[0]["age"], Value::Integer(1));
    assert_eq!(rows[0]["tags"], Value::Text(r#"["a","b, c"]"#.into()));
    Ok(())
}

#[tokio::test]
async fn constraint_violations_surface_as_sqlite_errors() -> Result<()> {
    let store = create_test_db().await?;
    store.execute(&insert_user("Ann", "ann@example.com", None)).await?;
    let err = store
        .execute(&insert_user("Other Ann", "ann@example.com", None))
        .await
        .unwrap_err();
    assert!(matches!(err, MapperError::Sqlite(_)));

    let err = store
        .query(&SqlQuery::new("SELECT * FROM missing_table"))
        .await
        .unwrap_err();
    assert!(matches!(err, MapperError::Sqlite(_)));
    Ok(())
}

#[tokio::test]
async fn file_database_persists_between_opens() -> Result<()> {
    let temp_file = NamedTempFile::new()?;
    let config = SqliteConfig::new(temp_file.path().to_str().unwrap()).with_busy_timeout_ms(250);

    {
        let store = SqliteStore::open(config.clone())?;
        assert_eq!(store.path(), config.db_path);
        initialize_schema(&store).await?;
        store.execute(&insert_user("Ann", "ann@example.com", Some(40))).await?;
    }

    let store = SqliteStore::open(config)?;
    let rows = store
        .query(&SqlQuery::new("SELECT COUNT(*) AS count FROM users"))
        .await?;
    assert_eq!(rows[0]["count"], Value::Integer(1));
    Ok(())
}

#[tokio::test]
async fn invalid_utf8_text_is_an_error() -> Result<()> {
    let store = create_test_db().await?;
    let err = store
        .query(&SqlQuery::new("SELECT CAST(X'66FF' AS TEXT) AS broken"))
        .await
        .unwrap_err();
    assert!(matches!(err, MapperError::Sqlite(rusqlite::Error::Utf8Error(_))), "{err}");
    Ok(())
}
