//! Data access: statement execution and row hydration for one connection.
//!
//! [`GenericDao`] builds statements from resolved metadata, runs them on a
//! [`Connection`] and turns result rows into entities. It also serves as the
//! [`RelationLoader`] used while hydrating: owning references are loaded by
//! their join column value and inverse collections become [`LazyList`]s that
//! query the DAO on first access.

use crate::identity::{EntityEntry, EntityKey, ManagedEntity};
use ormlet_core::{
    Connection, DataAccessError, DataAccessErrorKind, Entity, EntityMetadata, Error,
    LazyList, MetadataRegistry, RelationLoader, Result, Row, Value,
};
use ormlet_query::{DeleteBuilder, InsertBuilder, SelectBuilder, UpdateBuilder};
use std::sync::Arc;

/// Entity-level access to the store.
pub trait Dao: Send + Sync {
    /// The metadata registry statements are built from.
    fn registry(&self) -> &Arc<MetadataRegistry>;

    /// INSERT `entity` and return the generated identifier.
    fn save(&self, entity: &dyn ManagedEntity) -> Result<Value>;

    /// Load the row identified by `key`, `None` when absent.
    fn load<E: Entity>(&self, key: &EntityKey) -> Result<Option<E>>;

    /// UPDATE the row of `entry` from its current state.
    ///
    /// For versioned entities the statement only matches the row while it
    /// still carries `expected_version`, and the next version is returned.
    fn update(&self, entry: &EntityEntry, expected_version: &Value) -> Result<Option<Value>>;

    /// DELETE the row identified by `key`.
    fn remove(&self, key: &EntityKey) -> Result<()>;

    /// Every `E` whose `field` equals `value`. An owning-reference field is
    /// matched on its join column.
    fn find_all_by<E: Entity>(&self, field: &str, value: &Value) -> Result<Vec<E>>;

    /// The single `E` whose `field` equals `value`; more than one is an error.
    fn find_by<E: Entity>(&self, field: &str, value: &Value) -> Result<Option<E>> {
        at_most_one::<E>(self.find_all_by(field, value)?)
    }

    /// Run native SQL and hydrate every row as an `E`.
    fn native_query_all_by<E: Entity>(&self, sql: &str, params: &[Value]) -> Result<Vec<E>>;

    /// Run native SQL expecting at most one row.
    fn native_query_by<E: Entity>(&self, sql: &str, params: &[Value]) -> Result<Option<E>> {
        at_most_one::<E>(self.native_query_all_by(sql, params)?)
    }

    fn begin(&self) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;
}

fn at_most_one<E: Entity>(mut found: Vec<E>) -> Result<Option<E>> {
    if found.len() > 1 {
        return Err(Error::data_access(
            DataAccessErrorKind::NonUniqueResult,
            format!(
                "query for entity {} returned {} rows, expected at most one",
                E::descriptor().name,
                found.len()
            ),
        ));
    }
    Ok(found.pop())
}

/// [`Dao`] over any [`Connection`].
pub struct GenericDao<C> {
    connection: Arc<C>,
    registry: Arc<MetadataRegistry>,
    show_sql: bool,
}

impl<C> Clone for GenericDao<C> {
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
            registry: Arc::clone(&self.registry),
            show_sql: self.show_sql,
        }
    }
}

impl<C: Connection + 'static> GenericDao<C> {
    pub fn new(connection: C, registry: Arc<MetadataRegistry>) -> Self {
        Self::from_shared(Arc::new(connection), registry)
    }

    pub fn from_shared(connection: Arc<C>, registry: Arc<MetadataRegistry>) -> Self {
        Self {
            connection,
            registry,
            show_sql: false,
        }
    }

    /// Log every statement at `info` instead of `debug`.
    pub fn show_sql(mut self, show_sql: bool) -> Self {
        self.show_sql = show_sql;
        self
    }

    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }

    fn log_sql(&self, sql: &str, params: &[Value]) {
        if self.show_sql {
            tracing::info!(sql = sql, params = params.len(), "Executing SQL");
        } else {
            tracing::debug!(sql = sql, params = params.len(), "Executing SQL");
        }
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.log_sql(sql, params);
        self.connection
            .query(sql, params)
            .map_err(|e| e.with_sql(sql))
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.log_sql(sql, params);
        self.connection
            .execute(sql, params)
            .map_err(|e| e.with_sql(sql))
    }

    fn hydrate<E: Entity>(&self, rows: &[Row]) -> Result<Vec<E>> {
        rows.iter()
            .map(|row| {
                E::from_row(row, self).map_err(|e| match e {
                    Error::Type(_) => hydration_error::<E>(e),
                    other => other,
                })
            })
            .collect()
    }

    fn metadata_of(&self, key: &EntityKey) -> Result<Arc<EntityMetadata>> {
        let descriptor = key.descriptor().ok_or_else(|| {
            Error::IllegalState(format!("no entity type for key {}", key))
        })?;
        self.registry.resolve_descriptor(descriptor)
    }
}

fn hydration_error<E: Entity>(cause: Error) -> Error {
    Error::DataAccess(DataAccessError {
        kind: DataAccessErrorKind::Hydration,
        message: format!(
            "cannot build entity {} from row: {}",
            E::descriptor().name,
            cause
        ),
        sql: None,
        source: Some(Box::new(cause)),
    })
}

impl<C: Connection + 'static> Dao for GenericDao<C> {
    fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    #[tracing::instrument(level = "debug", skip(self, entity), fields(entity = entity.descriptor().name))]
    fn save(&self, entity: &dyn ManagedEntity) -> Result<Value> {
        let meta = self.registry.resolve_descriptor(entity.descriptor())?;
        let (sql, params) = InsertBuilder::new(&meta).build(|field| entity.field_value(field));
        self.log_sql(&sql, &params);

        let key = self
            .connection
            .insert(&sql, &params)
            .map_err(|e| e.with_sql(&sql))?;
        if key.is_null() {
            return Err(Error::data_access(
                DataAccessErrorKind::GeneratedKey,
                format!("insert into {} returned no generated key", meta.table()),
            )
            .with_sql(&sql));
        }
        tracing::debug!(id = %key, "Inserted row");
        Ok(key)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(key = %key))]
    fn load<E: Entity>(&self, key: &EntityKey) -> Result<Option<E>> {
        let meta = self.registry.resolve::<E>()?;
        let sql = SelectBuilder::new(&meta).by_id();
        let rows = self.query(&sql, std::slice::from_ref(key.id()))?;
        at_most_one(self.hydrate(&rows)?)
    }

    #[tracing::instrument(level = "debug", skip(self, entry), fields(key = %entry.key()))]
    fn update(&self, entry: &EntityEntry, expected_version: &Value) -> Result<Option<Value>> {
        let meta = self.metadata_of(entry.key())?;
        let entity = entry.entity();
        let stmt = UpdateBuilder::new(&meta)
            .expected_version(expected_version.clone())
            .build(entry.key().id(), |field| entity.field_value(field))?;

        let affected = self.execute(&stmt.sql, &stmt.params)?;
        if affected == 0 {
            let (kind, message) = if meta.version().is_some() {
                (
                    DataAccessErrorKind::OptimisticLock,
                    format!(
                        "{} was updated or deleted by another transaction (expected version {})",
                        entry.key(),
                        expected_version
                    ),
                )
            } else {
                (
                    DataAccessErrorKind::NoRowsAffected,
                    format!("update of {} affected no rows", entry.key()),
                )
            };
            return Err(Error::data_access(kind, message).with_sql(&stmt.sql));
        }
        Ok(stmt.next_version)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(key = %key))]
    fn remove(&self, key: &EntityKey) -> Result<()> {
        let meta = self.metadata_of(key)?;
        let sql = DeleteBuilder::new(&meta).by_id();
        let affected = self.execute(&sql, std::slice::from_ref(key.id()))?;
        if affected == 0 {
            return Err(Error::data_access(
                DataAccessErrorKind::NoRowsAffected,
                format!("delete of {} affected no rows", key),
            )
            .with_sql(&sql));
        }
        Ok(())
    }

    fn find_all_by<E: Entity>(&self, field: &str, value: &Value) -> Result<Vec<E>> {
        let meta = self.registry.resolve::<E>()?;
        let column = meta.filter_column(field).ok_or_else(|| {
            Error::mapping(
                meta.name(),
                format!("'{}' is not a column or owning reference", field),
            )
        })?;
        let sql = SelectBuilder::new(&meta).by_column(column);
        let rows = self.query(&sql, std::slice::from_ref(value))?;
        self.hydrate(&rows)
    }

    fn native_query_all_by<E: Entity>(&self, sql: &str, params: &[Value]) -> Result<Vec<E>> {
        self.registry.resolve::<E>()?;
        let rows = self.query(sql, params)?;
        self.hydrate(&rows)
    }

    fn begin(&self) -> Result<()> {
        self.log_sql("BEGIN", &[]);
        self.connection.begin()
    }

    fn commit(&self) -> Result<()> {
        self.log_sql("COMMIT", &[]);
        self.connection.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.log_sql("ROLLBACK", &[]);
        self.connection.rollback()
    }
}

impl<C: Connection + 'static> RelationLoader for GenericDao<C> {
    fn load_reference<T: Entity>(&self, id: &Value) -> Result<Option<T>> {
        if id.is_null() {
            return Ok(None);
        }
        self.load::<T>(&EntityKey::of::<T>(id))
    }

    fn lazy_collection<O: Entity, T: Entity>(
        &self,
        field: &'static str,
        owner_id: &Value,
    ) -> Result<LazyList<T>> {
        let meta = self.registry.resolve::<O>()?;
        let collection = meta.collection(field).ok_or_else(|| {
            Error::mapping(
                meta.name(),
                format!("'{}' is not an inverse collection", field),
            )
        })?;
        if owner_id.is_null() {
            return Ok(LazyList::empty());
        }

        let dao = self.clone();
        let mapped_by = collection.mapped_by;
        let owner_id = owner_id.clone();
        Ok(LazyList::new(move || {
            tracing::debug!(field = field, owner = %owner_id, "Loading lazy collection");
            dao.find_all_by::<T>(mapped_by, &owner_id)
        }))
    }
}
