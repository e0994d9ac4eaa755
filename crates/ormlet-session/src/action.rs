//! Deferred write actions.

use crate::identity::{EntityEntry, ManagedEntity};
use ormlet_core::Value;
use std::fmt;
use std::sync::Arc;

/// Execution order of action kinds within a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionPriority {
    Persist,
    Merge,
    Remove,
}

/// A write queued against the store.
#[derive(Clone)]
pub enum EntityAction {
    /// INSERT a new entity. Instant actions run at once instead of at flush.
    Persist {
        entity: Arc<dyn ManagedEntity>,
        instant: bool,
    },
    /// UPDATE a cached entity that changed since its snapshot.
    Merge {
        entry: EntityEntry,
        /// Version recorded in the snapshot; `Null` for unversioned entities.
        expected_version: Value,
    },
    /// DELETE a cached entity.
    Remove { entry: EntityEntry },
}

impl EntityAction {
    pub fn priority(&self) -> ActionPriority {
        match self {
            EntityAction::Persist { .. } => ActionPriority::Persist,
            EntityAction::Merge { .. } => ActionPriority::Merge,
            EntityAction::Remove { .. } => ActionPriority::Remove,
        }
    }

    pub fn is_instant(&self) -> bool {
        matches!(self, EntityAction::Persist { instant: true, .. })
    }

    /// Simple name of the entity type the action writes.
    pub fn entity_name(&self) -> &'static str {
        match self {
            EntityAction::Persist { entity, .. } => entity.descriptor().name,
            EntityAction::Merge { entry, .. } | EntityAction::Remove { entry } => {
                entry.key().entity_name()
            }
        }
    }
}

impl fmt::Debug for EntityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityAction::Persist { entity, instant } => f
                .debug_struct("Persist")
                .field("entity", &entity.descriptor().name)
                .field("instant", instant)
                .finish(),
            EntityAction::Merge {
                entry,
                expected_version,
            } => f
                .debug_struct("Merge")
                .field("key", entry.key())
                .field("expected_version", expected_version)
                .finish(),
            EntityAction::Remove { entry } => {
                f.debug_struct("Remove").field("key", entry.key()).finish()
            }
        }
    }
}
