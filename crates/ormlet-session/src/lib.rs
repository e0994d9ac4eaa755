//! Persistence session for ormlet.
//!
//! `ormlet-session` is the **unit-of-work layer**. A [`Session`] owns an
//! identity map of the entities it has seen, a snapshot of each entity's
//! persistent fields, and a queue of pending writes. Changes made through
//! the shared [`EntityRef`] handles are found by comparing against the
//! snapshots when the session closes, and written back with one UPDATE per
//! changed entity.
//!
//! # Example
//!
//! ```ignore
//! let factory = SessionFactory::new(GenericDao::new(conn, registry));
//! let mut session = factory.open_session();
//!
//! let person = session.persist(Person { id: None, first_name: "Ada".into(), ..Default::default() })?;
//! person.write().unwrap().age = 36;
//!
//! // Dirty check, flush, clear
//! session.close()?;
//! ```

pub mod action;
pub mod action_queue;
pub mod config;
pub mod dao;
pub mod identity;
pub mod snapshot;
pub mod transaction;

#[cfg(test)]
mod test_support;

pub use action::{ActionPriority, EntityAction};
pub use action_queue::{ActionQueue, FlushOutcome};
pub use config::SessionConfig;
pub use dao::{Dao, GenericDao};
pub use identity::{
    EntityEntry, EntityKey, EntityReadGuard, EntityRef, EntityWriteGuard, IdentityMap,
    ManagedEntity,
};
pub use snapshot::Snapshot;
pub use transaction::TransactionManager;

use ormlet_core::{Entity, Error, Result, TransactionErrorKind, Value};
use ormlet_query::{JqlQuery, JqlTranslator};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

// ============================================================================
// Session
// ============================================================================

/// The unit-of-work manager.
///
/// Operations take `&mut self`; a session is used from one thread at a time.
/// Once closed, every operation fails with [`Error::SessionClosed`].
pub struct Session<D: Dao> {
    dao: D,
    translator: JqlTranslator,
    config: SessionConfig,
    identity_map: IdentityMap,
    snapshots: HashMap<EntityKey, Snapshot>,
    actions: ActionQueue,
    transaction_active: bool,
    closed: bool,
}

impl<D: Dao> Session<D> {
    pub fn new(dao: D) -> Self {
        Self::with_config(dao, SessionConfig::default())
    }

    pub fn with_config(dao: D, config: SessionConfig) -> Self {
        let translator = JqlTranslator::new(Arc::clone(dao.registry())).strict(config.strict_jql);
        Self {
            dao,
            translator,
            config,
            identity_map: IdentityMap::new(),
            snapshots: HashMap::new(),
            actions: ActionQueue::new(),
            transaction_active: false,
            closed: false,
        }
    }

    pub fn dao(&self) -> &D {
        &self.dao
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of entities in the identity map.
    pub fn len(&self) -> usize {
        self.identity_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identity_map.is_empty()
    }

    /// Number of queued actions awaiting a flush.
    pub fn pending_actions(&self) -> usize {
        self.actions.len()
    }

    /// Whether an `E` with this id is in the identity map.
    pub fn contains<E: Entity>(&self, id: impl Into<Value>) -> bool {
        self.identity_map
            .contains(&EntityKey::of::<E>(&id.into()))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::SessionClosed)
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// INSERT `entity` now, assign its generated id and start managing it.
    #[tracing::instrument(level = "debug", skip(self, entity), fields(entity = E::descriptor().name))]
    pub fn persist<E: Entity>(&mut self, entity: E) -> Result<EntityRef<E>> {
        self.ensure_open()?;
        let handle: EntityRef<E> = Arc::new(RwLock::new(entity));
        let action = EntityAction::Persist {
            entity: Arc::clone(&handle) as Arc<dyn ManagedEntity>,
            instant: true,
        };

        let mut outcome = FlushOutcome::default();
        action_queue::execute(&self.dao, &action, &mut outcome)?;
        self.reconcile(outcome)?;
        Ok(handle)
    }

    /// Queue an INSERT of `entity` for the next flush.
    ///
    /// The entity joins the identity map once the flush assigns its id.
    pub fn persist_deferred<E: Entity>(&mut self, entity: E) -> Result<EntityRef<E>> {
        self.ensure_open()?;
        let handle: EntityRef<E> = Arc::new(RwLock::new(entity));
        self.actions
            .add_persist_action(Arc::clone(&handle) as Arc<dyn ManagedEntity>);
        Ok(handle)
    }

    /// Attach the state of a detached `entity`.
    ///
    /// A cached instance with the same key is returned unchanged. Otherwise
    /// the row is loaded: if it is absent, `None` is returned and nothing is
    /// cached; if present, a copy of `entity` becomes the managed instance
    /// and the *loaded* state becomes its snapshot, so the next dirty check
    /// writes the copied values.
    #[tracing::instrument(level = "debug", skip(self, entity), fields(entity = E::descriptor().name))]
    pub fn merge<E: Entity + Clone>(&mut self, entity: &E) -> Result<Option<EntityRef<E>>> {
        self.ensure_open()?;
        let key = EntityKey::of::<E>(&entity.id_value());
        if let Some(cached) = self.identity_map.get_ref::<E>(&key) {
            return Ok(Some(cached));
        }

        let Some(loaded) = self.dao.load::<E>(&key)? else {
            tracing::debug!(key = %key, "Merge target not found");
            return Ok(None);
        };
        let meta = self.dao.registry().resolve::<E>()?;
        let snapshot = Snapshot::capture(&meta, &RwLock::new(loaded));

        let handle: EntityRef<E> = Arc::new(RwLock::new(entity.clone()));
        self.identity_map
            .insert(EntityEntry::new(Arc::clone(&handle) as Arc<dyn ManagedEntity>));
        self.snapshots.insert(key, snapshot);
        Ok(Some(handle))
    }

    /// Queue a DELETE of a managed entity.
    pub fn remove<E: Entity>(&mut self, entity: &EntityRef<E>) -> Result<()> {
        self.ensure_open()?;
        let id = entity.read().unwrap_or_else(PoisonError::into_inner).id_value();
        let key = EntityKey::of::<E>(&id);
        let entry = self.identity_map.get(&key).cloned().ok_or_else(|| {
            Error::IllegalState(format!("removing a detached entity {}", key))
        })?;
        if !self.actions.is_pending(ActionPriority::Remove, &key) {
            self.actions.add_remove_action(entry);
        }
        Ok(())
    }

    /// Queue an UPDATE for every managed entity that differs from its snapshot.
    ///
    /// Returns the number of updates queued.
    pub fn dirty_check(&mut self) -> Result<usize> {
        self.ensure_open()?;
        let mut dirty = Vec::new();
        for entry in self.identity_map.entries() {
            let key = entry.key();
            let Some(snapshot) = self.snapshots.get(key) else {
                continue;
            };
            if self.actions.is_pending(ActionPriority::Merge, key)
                || self.actions.is_pending(ActionPriority::Remove, key)
            {
                continue;
            }
            let meta = self
                .dao
                .registry()
                .resolve_descriptor(entry.entity().descriptor())?;
            let current = Snapshot::capture(&meta, entry.entity().as_ref());
            if *snapshot != current {
                tracing::debug!(
                    key = %key,
                    changed = ?snapshot.changed_fields(&meta, &current),
                    "Dirty entity"
                );
                dirty.push((entry.clone(), snapshot.version(&meta)));
            }
        }

        let count = dirty.len();
        for (entry, expected_version) in dirty {
            self.actions.add_merge_action(entry, expected_version);
        }
        Ok(count)
    }

    /// Execute every queued action.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.flush_actions()
    }

    #[tracing::instrument(level = "debug", skip(self), fields(pending = self.actions.len()))]
    fn flush_actions(&mut self) -> Result<()> {
        if self.actions.is_empty() {
            return Ok(());
        }
        let mut outcome = FlushOutcome::default();
        let result = self
            .actions
            .perform_accumulated_actions(&self.dao, &mut outcome);
        let written = outcome.len();
        self.reconcile(outcome)?;
        result?;
        tracing::info!(statements = written, "Flushed session");
        Ok(())
    }

    /// Bring the identity map and snapshots in line with executed actions.
    fn reconcile(&mut self, outcome: FlushOutcome) -> Result<()> {
        for entry in outcome.persisted.into_iter().chain(outcome.merged) {
            let meta = self
                .dao
                .registry()
                .resolve_descriptor(entry.entity().descriptor())?;
            let snapshot = Snapshot::capture(&meta, entry.entity().as_ref());
            self.snapshots.insert(entry.key().clone(), snapshot);
            self.identity_map.insert(entry);
        }
        for key in outcome.removed {
            self.identity_map.remove(&key);
            self.snapshots.remove(&key);
        }
        Ok(())
    }

    /// Dirty-check, flush and clear the session, then mark it closed.
    ///
    /// If the flush fails the session stays open with the failed actions queued.
    #[tracing::instrument(level = "debug", skip(self), fields(managed = self.identity_map.len()))]
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        let updates = self.dirty_check()?;
        self.flush_actions()?;
        if self.transaction_active {
            tracing::warn!("Closing session with an active transaction");
        }
        self.identity_map.clear();
        self.snapshots.clear();
        self.closed = true;
        tracing::info!(updates = updates, "Session closed");
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Make `entity` managed, or return the cached instance with its key.
    fn manage<E: Entity>(&mut self, entity: E) -> Result<EntityRef<E>> {
        let key = EntityKey::of::<E>(&entity.id_value());
        let (handle, inserted) = self.identity_map.get_or_insert(entity);
        if inserted {
            let meta = self.dao.registry().resolve::<E>()?;
            self.snapshots
                .insert(key, Snapshot::capture(&meta, handle.as_ref()));
        }
        Ok(handle)
    }

    fn manage_all<E: Entity>(&mut self, entities: Vec<E>) -> Result<Vec<EntityRef<E>>> {
        entities.into_iter().map(|e| self.manage(e)).collect()
    }

    /// Look up an `E` by id, loading it on a cache miss.
    ///
    /// A missing row yields `None` and caches nothing.
    #[tracing::instrument(level = "debug", skip(self, id), fields(entity = E::descriptor().name))]
    pub fn find_by_id<E: Entity>(&mut self, id: impl Into<Value>) -> Result<Option<EntityRef<E>>> {
        self.ensure_open()?;
        let key = EntityKey::of::<E>(&id.into());
        if let Some(cached) = self.identity_map.get_ref::<E>(&key) {
            tracing::trace!(key = %key, "Identity map hit");
            return Ok(Some(cached));
        }
        let loaded = self.dao.load::<E>(&key)?;
        loaded.map(|e| self.manage(e)).transpose()
    }

    /// The single `E` whose `field` equals `value`.
    pub fn find_by<E: Entity>(
        &mut self,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Option<EntityRef<E>>> {
        self.ensure_open()?;
        let found = self.dao.find_by::<E>(field, &value.into())?;
        found.map(|e| self.manage(e)).transpose()
    }

    /// Every `E` whose `field` equals `value`.
    pub fn find_all_by<E: Entity>(
        &mut self,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<EntityRef<E>>> {
        self.ensure_open()?;
        let found = self.dao.find_all_by::<E>(field, &value.into())?;
        self.manage_all(found)
    }

    /// Run native SQL expecting at most one `E`.
    pub fn native_query_by<E: Entity>(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<EntityRef<E>>> {
        self.ensure_open()?;
        let found = self.dao.native_query_by::<E>(sql, params)?;
        found.map(|e| self.manage(e)).transpose()
    }

    /// Run native SQL and manage every resulting `E`.
    pub fn native_query_all_by<E: Entity>(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<EntityRef<E>>> {
        self.ensure_open()?;
        let found = self.dao.native_query_all_by::<E>(sql, params)?;
        self.manage_all(found)
    }

    /// Translate and run a JQL query expecting at most one `E`.
    pub fn jql_query_by<E: Entity>(&mut self, query: &JqlQuery<E>) -> Result<Option<EntityRef<E>>> {
        self.ensure_open()?;
        let translated = self.translator.translate(query)?;
        self.native_query_by(&translated.sql, &translated.params)
    }

    /// Translate and run a JQL query.
    pub fn jql_query_all_by<E: Entity>(&mut self, query: &JqlQuery<E>) -> Result<Vec<EntityRef<E>>> {
        self.ensure_open()?;
        let translated = self.translator.translate(query)?;
        self.native_query_all_by(&translated.sql, &translated.params)
    }
}

impl<D: Dao> TransactionManager for Session<D> {
    fn begin(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.transaction_active {
            return Err(Error::transaction(
                TransactionErrorKind::AlreadyActive,
                "transaction was already started",
            ));
        }
        self.dao.begin().map_err(transaction_failed)?;
        self.transaction_active = true;
        tracing::info!("Transaction started");
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.transaction_active {
            return Err(Error::transaction(
                TransactionErrorKind::NotActive,
                "transaction is not started",
            ));
        }
        self.flush_actions()?;
        self.dao.commit().map_err(transaction_failed)?;
        self.transaction_active = false;
        tracing::info!("Transaction committed");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.transaction_active {
            return Err(Error::transaction(
                TransactionErrorKind::NotActive,
                "transaction is not started",
            ));
        }
        let discarded = self.actions.len();
        self.actions.clear();
        self.dao.rollback().map_err(transaction_failed)?;
        self.transaction_active = false;
        tracing::info!(discarded = discarded, "Transaction rolled back");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.transaction_active
    }
}

fn transaction_failed(cause: Error) -> Error {
    Error::transaction(TransactionErrorKind::Failed, cause.to_string())
}

// ============================================================================
// Session Factory
// ============================================================================

/// Opens sessions over a shared DAO and configuration.
#[derive(Clone)]
pub struct SessionFactory<D: Dao + Clone> {
    dao: D,
    config: SessionConfig,
}

impl<D: Dao + Clone> SessionFactory<D> {
    pub fn new(dao: D) -> Self {
        Self {
            dao,
            config: SessionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn dao(&self) -> &D {
        &self.dao
    }

    pub fn open_session(&self) -> Session<D> {
        tracing::debug!("Opening session");
        Session::with_config(self.dao.clone(), self.config)
    }
}

impl<C: ormlet_core::Connection + 'static> SessionFactory<GenericDao<C>> {
    /// A factory over `connection` with a fresh metadata registry.
    pub fn for_connection(connection: C, config: SessionConfig) -> Self {
        let registry = Arc::new(ormlet_core::MetadataRegistry::new());
        let dao = GenericDao::new(connection, registry).show_sql(config.show_sql);
        Self::new(dao).with_config(config)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
