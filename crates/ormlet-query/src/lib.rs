//! Query construction for ormlet.
//!
//! `ormlet-query` turns resolved entity metadata into executable SQL:
//!
//! - **Statement builders** (`builder`) emit the by-id SELECT, INSERT, UPDATE
//!   and DELETE statements the session flushes.
//! - **JQL** (`jql`) translates queries written against entity and field names
//!   into native SQL with positional parameters.
//!
//! The resulting SQL executes through the `Connection` trait from `ormlet-core`.

pub mod builder;
pub mod jql;

#[cfg(test)]
mod test_entities;

pub use builder::{DeleteBuilder, InsertBuilder, SelectBuilder, UpdateBuilder, UpdateStatement};
pub use jql::{JqlQuery, JqlTranslator, QueryKind, TranslatedQuery};
