//! ormlet - a small object-relational mapper.
//!
//! ormlet maps plain structs to tables and keeps track of them in a
//! [`Session`]:
//!
//! - `#[derive(Entity)]` describes the mapping at compile time
//! - the session's identity map returns one shared instance per row
//! - changes are found by snapshot comparison and written on close
//! - JQL queries name entity fields and relations instead of columns
//!
//! # Quick Start
//!
//! ```ignore
//! use ormlet::prelude::*;
//!
//! #[derive(Entity, Debug, Clone, Default)]
//! #[entity(table = "persons")]
//! struct Person {
//!     #[entity(id)]
//!     id: Option<i64>,
//!     name: String,
//!     age: i32,
//! }
//!
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_raw("create table persons (id integer primary key, name text, age integer)")?;
//!
//! let factory = SessionFactory::for_connection(conn, SessionConfig::default());
//! let mut session = factory.open_session();
//!
//! let ada = session.persist(Person { id: None, name: "Ada".into(), age: 36 })?;
//! ada.write().unwrap().age = 37;
//!
//! let adults = session.jql_query_all_by(
//!     &JqlQuery::<Person>::new("select p from Person p where p.age > :age").with_parameter("age", 18),
//! )?;
//!
//! // Writes the age change
//! session.close()?;
//! ```
//!
//! The derive expands to paths under `ormlet_core`, so crates deriving
//! `Entity` depend on `ormlet-core` next to `ormlet`.

pub use ormlet_core::{
    Connection, DataAccessError, DataAccessErrorKind, Entity, EntityDescriptor, EntityMetadata,
    Error, FieldDescriptor, FromValue, LazyList, MetadataRegistry, QueryTranslationError,
    RelationKind, RelationLoader, Result, Row, TransactionError, TransactionErrorKind, Value,
};
pub use ormlet_macros::Entity;
pub use ormlet_query::{JqlQuery, JqlTranslator, QueryKind, TranslatedQuery};
pub use ormlet_session::{
    Dao, EntityKey, EntityReadGuard, EntityRef, EntityWriteGuard, GenericDao, Session,
    SessionConfig, SessionFactory, TransactionManager,
};

#[cfg(feature = "sqlite")]
pub use ormlet_sqlite::{OpenFlags, SqliteConfig, SqliteConnection};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        Connection, Entity, EntityRef, Error, JqlQuery, LazyList, Result, Row, Session,
        SessionConfig, SessionFactory, TransactionManager, Value,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::SqliteConnection;
}

/// Open a session factory over a SQLite database.
#[cfg(feature = "sqlite")]
pub fn sqlite_factory(
    config: &SqliteConfig,
    session_config: SessionConfig,
) -> Result<SessionFactory<GenericDao<SqliteConnection>>> {
    let conn = SqliteConnection::open(config)?;
    tracing::info!(path = %conn.path(), "SQLite session factory ready");
    Ok(SessionFactory::for_connection(conn, session_config))
}
