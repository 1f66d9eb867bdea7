use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::value::{Row, SqlQuery};

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Execution {
    /// Rows inserted, updated or deleted.
    pub changes: usize,
    /// Identity the engine generated for the most recent INSERT.
    pub last_insert_rowid: i64,
}

/// Connection to the embedded SQL engine.
///
/// Statements run one at a time in the order they are awaited. Engine errors
/// come back unchanged; implementations do not retry.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Runs a statement that returns no rows.
    async fn execute(&self, query: &SqlQuery) -> Result<Execution>;

    /// Runs a statement and returns every row it produces.
    async fn query(&self, query: &SqlQuery) -> Result<Vec<Row>>;
}

#[async_trait]
impl<D: Datastore + ?Sized> Datastore for Arc<D> {
    async fn execute(&self, query: &SqlQuery) -> Result<Execution> {
        (**self).execute(query).await
    }

    async fn query(&self, query: &SqlQuery) -> Result<Vec<Row>> {
        (**self).query(query).await
    }
}
