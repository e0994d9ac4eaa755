//! Action queue: pending writes drained in priority order.
//!
//! Actions accumulate in three FIFO buckets and are executed persist first,
//! then merge, then remove:
//! - **Persist**: INSERT, then write the generated key into the id field
//! - **Merge**: UPDATE by id, with an optimistic-lock check for versioned entities
//! - **Remove**: DELETE by id
//!
//! A failing action stops the drain and every action behind it stays queued;
//! nothing already executed is undone. The failed action itself stays at the
//! head of its bucket unless its statement already ran.

use crate::action::{ActionPriority, EntityAction};
use crate::dao::Dao;
use crate::identity::{EntityEntry, EntityKey, ManagedEntity};
use ormlet_core::{Result, Value};
use std::collections::VecDeque;
use std::sync::Arc;

/// Entries written by a flush, for the session to reconcile.
#[derive(Debug, Default)]
pub struct FlushOutcome {
    /// Inserted entities, keyed by their generated id.
    pub persisted: Vec<EntityEntry>,
    pub merged: Vec<EntityEntry>,
    pub removed: Vec<EntityKey>,
}

impl FlushOutcome {
    pub fn is_empty(&self) -> bool {
        self.persisted.is_empty() && self.merged.is_empty() && self.removed.is_empty()
    }

    /// Number of statements executed.
    pub fn len(&self) -> usize {
        self.persisted.len() + self.merged.len() + self.removed.len()
    }
}

/// Pending writes of one session.
#[derive(Debug, Default)]
pub struct ActionQueue {
    persist: VecDeque<EntityAction>,
    merge: VecDeque<EntityAction>,
    remove: VecDeque<EntityAction>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an action in the bucket for its priority. Instant persists run
    /// outside the queue, so only the typed `add_*` methods reach this.
    fn add(&mut self, action: EntityAction) {
        debug_assert!(!action.is_instant(), "instant persist queued");
        tracing::trace!(action = ?action, "Queued action");
        self.bucket_mut(action.priority()).push_back(action);
    }

    pub fn add_persist_action(&mut self, entity: Arc<dyn ManagedEntity>) {
        self.add(EntityAction::Persist {
            entity,
            instant: false,
        });
    }

    pub fn add_merge_action(&mut self, entry: EntityEntry, expected_version: Value) {
        self.add(EntityAction::Merge {
            entry,
            expected_version,
        });
    }

    pub fn add_remove_action(&mut self, entry: EntityEntry) {
        self.add(EntityAction::Remove { entry });
    }

    /// Whether a Merge or Remove for `key` is waiting.
    pub fn is_pending(&self, priority: ActionPriority, key: &EntityKey) -> bool {
        self.bucket(priority).iter().any(|action| match action {
            EntityAction::Merge { entry, .. } | EntityAction::Remove { entry } => {
                entry.key() == key
            }
            EntityAction::Persist { .. } => false,
        })
    }

    pub fn len(&self) -> usize {
        self.persist.len() + self.merge.len() + self.remove.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every pending action.
    pub fn clear(&mut self) {
        self.persist.clear();
        self.merge.clear();
        self.remove.clear();
    }

    /// Execute every queued action against `dao`, recording each success in `outcome`.
    #[tracing::instrument(level = "debug", skip(self, dao, outcome), fields(pending = self.len()))]
    pub fn perform_accumulated_actions<D: Dao>(
        &mut self,
        dao: &D,
        outcome: &mut FlushOutcome,
    ) -> Result<()> {
        for priority in [
            ActionPriority::Persist,
            ActionPriority::Merge,
            ActionPriority::Remove,
        ] {
            while let Some(action) = self.bucket_mut(priority).pop_front() {
                let written = outcome.len();
                if let Err(e) = execute(dao, &action, outcome) {
                    tracing::warn!(
                        entity = action.entity_name(),
                        error = %e,
                        remaining = self.len(),
                        "Action failed; remaining actions stay queued"
                    );
                    if outcome.len() == written {
                        self.bucket_mut(priority).push_front(action);
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn bucket(&self, priority: ActionPriority) -> &VecDeque<EntityAction> {
        match priority {
            ActionPriority::Persist => &self.persist,
            ActionPriority::Merge => &self.merge,
            ActionPriority::Remove => &self.remove,
        }
    }

    fn bucket_mut(&mut self, priority: ActionPriority) -> &mut VecDeque<EntityAction> {
        match priority {
            ActionPriority::Persist => &mut self.persist,
            ActionPriority::Merge => &mut self.merge,
            ActionPriority::Remove => &mut self.remove,
        }
    }
}

/// Run one action and record what it wrote.
pub fn execute<D: Dao>(dao: &D, action: &EntityAction, outcome: &mut FlushOutcome) -> Result<()> {
    match action {
        EntityAction::Persist { entity, .. } => {
            let entry = persist(dao, entity)?;
            outcome.persisted.push(entry);
        }
        EntityAction::Merge {
            entry,
            expected_version,
        } => {
            let next = dao.update(entry, expected_version)?;
            outcome.merged.push(entry.clone());
            if let Some(next) = next {
                let descriptor = entry.entity().descriptor();
                if let Some(version) = descriptor.fields.iter().find(|f| f.version) {
                    entry.entity().set_field_value(version.name, &next)?;
                }
            }
        }
        EntityAction::Remove { entry } => {
            dao.remove(entry.key())?;
            outcome.removed.push(entry.key().clone());
        }
    }
    Ok(())
}

/// INSERT `entity`, write the generated key into its id field and return its entry.
pub fn persist<D: Dao>(dao: &D, entity: &Arc<dyn ManagedEntity>) -> Result<EntityEntry> {
    let id = dao.save(entity.as_ref())?;
    let meta = dao.registry().resolve_descriptor(entity.descriptor())?;
    entity.set_field_value(meta.id().field, &id)?;
    Ok(EntityEntry::new(Arc::clone(entity)))
}
