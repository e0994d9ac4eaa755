//! Core types and traits for ormlet.
//!
//! This crate provides the foundations shared by every other ormlet crate:
//!
//! - `Value` and `Row` for parameters and results
//! - the `Entity` trait and its static `EntityDescriptor`
//! - `MetadataRegistry`, the memoizing metadata resolver
//! - `LazyList` for one-to-many associations
//! - the synchronous `Connection` trait
//! - the `Error` taxonomy

pub mod connection;
pub mod entity;
pub mod error;
pub mod lazy;
pub mod metadata;
pub mod row;
pub mod value;

pub use connection::Connection;
pub use entity::{
    DescriptorFn, DetachedLoader, Entity, EntityDescriptor, FieldDescriptor, RelationKind,
    RelationLoader,
};
pub use error::{
    DataAccessError, DataAccessErrorKind, Error, MappingError, QueryTranslationError, Result,
    TransactionError, TransactionErrorKind, TypeError,
};
pub use lazy::LazyList;
pub use metadata::{
    CollectionMeta, ColumnMeta, EntityMetadata, MetadataRegistry, PersistentField, ReferenceMeta,
};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
