//! Entity to table mapping over an embedded SQLite store.
//!
//! # Intention
//!
//! - Turn entity declarations into table schemas, issue parameterized SQL for
//!   them and convert result rows back into typed values.
//! - Keep the mapping explicit: every persisted field is declared once through
//!   a [`TableBuilder`] and bound with typed accessors ([`field!`]).
//!
//! # Architectural Boundaries
//!
//! - Only mapping and SQLite code belongs here.
//! - One table per entity; no joins, migrations or multi-statement
//!   transactions. Schema changes are handled by drop-and-recreate.
//!
//! ```ignore
//! let store = SqliteStore::open(SqliteConfig::new("app.db"))?;
//! let mut mapper = Mapper::new(store);
//! mapper.register::<Clinic>(EntityOptions::default()).await?;
//! let mut clinic = Clinic { name: "Harbor".into(), ..Clinic::default() };
//! mapper.save(&mut clinic).await?;
//! let all: Vec<Clinic> = mapper.find().await?;
//! ```

pub mod convert;
pub mod datastore;
pub mod error;
pub mod mapper;
pub mod metadata;
pub mod schema;
pub mod sqlite;
pub mod types;
pub mod value;

pub use datastore::{Datastore, Execution};
pub use error::{MapperError, Result};
pub use mapper::{render_template, Mapper};
pub use metadata::{
    ColumnDescriptor, ColumnOptions, Entity, EntityMetadata, EntityOptions, FieldAccess,
    TableBuilder,
};
pub use sqlite::{SqliteConfig, SqliteStore};
pub use types::{map_semantic_type, SemanticType, StorageType};
pub use value::{FromValue, Row, SqlQuery, Value};
