use async_trait::async_trait;
use futures::lock::Mutex;
use rusqlite::{params_from_iter, Connection};
use serde::Deserialize;
use std::time::Duration;

use crate::datastore::{Datastore, Execution};
use crate::error::Result;
use crate::value::{Row, SqlQuery, Value};

/// Path that selects a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// SQLite store configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file
    pub db_path: String,
    /// How long a statement waits on a locked database, in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl SqliteConfig {
    /// Create a new SQLite config for a database file
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MEMORY_PATH)
    }

    pub fn with_busy_timeout_ms(mut self, busy_timeout_ms: u64) -> Self {
        self.busy_timeout_ms = busy_timeout_ms;
        self
    }
}

/// The single connection to the embedded SQLite engine.
///
/// Open it once at startup and hand it to [`crate::Mapper::new`]. Statements
/// are serialized on the inner lock; there is no pooling.
pub struct SqliteStore {
    config: SqliteConfig,
    connection: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(config: SqliteConfig) -> Result<Self> {
        tracing::info!(path = %config.db_path, "opening sqlite store");
        let connection = if config.db_path == MEMORY_PATH {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.db_path)?
        };
        connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        Ok(Self {
            config,
            connection: Mutex::new(connection),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(SqliteConfig::in_memory())
    }

    pub fn path(&self) -> &str {
        &self.config.db_path
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }
}

fn run_execute(connection: &Connection, query: &SqlQuery) -> Result<Execution> {
    let mut statement = connection.prepare(&query.statement)?;
    let changes = statement.execute(params_from_iter(query.params.iter()))?;
    Ok(Execution {
        changes,
        last_insert_rowid: connection.last_insert_rowid(),
    })
}

fn run_query(connection: &Connection, query: &SqlQuery) -> Result<Vec<Row>> {
    let mut statement = connection.prepare(&query.statement)?;
    let names: Vec<String> = statement
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let mut rows = statement.query(params_from_iter(query.params.iter()))?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let mut map = Row::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            map.insert(name.clone(), Value::try_from(row.get_ref(index)?)?);
        }
        result.push(map);
    }
    Ok(result)
}

#[async_trait]
impl Datastore for SqliteStore {
    async fn execute(&self, query: &SqlQuery) -> Result<Execution> {
        tracing::debug!(sql = %query.statement, params = query.params.len(), "execute");
        let connection = self.connection.lock().await;
        run_execute(&connection, query)
    }

    async fn query(&self, query: &SqlQuery) -> Result<Vec<Row>> {
        tracing::debug!(sql = %query.statement, params = query.params.len(), "query");
        let connection = self.connection.lock().await;
        run_query(&connection, query)
    }
}
