//! Identity map: one in-memory instance per (entity type, id) within a session.
//!
//! Entities live behind `Arc<RwLock<E>>` handles so that every lookup of the
//! same row yields the same instance, and modifications made through one
//! handle are visible through all of them. The map stores the handles
//! type-erased as [`ManagedEntity`] so dirty checking and flushing can work
//! over every cached type at once.
//!
//! # Example
//!
//! ```ignore
//! let person = session.find_by_id::<Person>(1)?.unwrap();
//! let again = session.find_by_id::<Person>(1)?.unwrap();
//!
//! // Both handles point to the same object
//! assert!(Arc::ptr_eq(&person, &again));
//!
//! // Modifications are visible through both handles
//! person.write().unwrap().age = 42;
//! assert_eq!(again.read().unwrap().age, 42);
//! ```

use ormlet_core::{Entity, EntityDescriptor, Result, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock};

/// A shared handle to an entity managed by a session.
pub type EntityRef<E> = Arc<RwLock<E>>;

/// A guard for reading a managed entity.
pub type EntityReadGuard<'a, E> = std::sync::RwLockReadGuard<'a, E>;

/// A guard for writing to a managed entity.
pub type EntityWriteGuard<'a, E> = std::sync::RwLockWriteGuard<'a, E>;

/// Type-erased access to a managed entity.
///
/// Implemented for `RwLock<E>` so an [`EntityRef<E>`] coerces to
/// `Arc<dyn ManagedEntity>`.
pub trait ManagedEntity: Send + Sync {
    fn descriptor(&self) -> &'static EntityDescriptor;

    fn field_value(&self, field: &str) -> Option<Value>;

    /// Overwrite a column field through the lock.
    fn set_field_value(&self, field: &str, value: &Value) -> Result<()>;

    fn id_value(&self) -> Value;

    /// Recover the concrete handle with [`Arc::downcast`].
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<E: Entity> ManagedEntity for RwLock<E> {
    fn descriptor(&self) -> &'static EntityDescriptor {
        E::descriptor()
    }

    fn field_value(&self, field: &str) -> Option<Value> {
        self.read()
            .unwrap_or_else(PoisonError::into_inner)
            .field_value(field)
    }

    fn set_field_value(&self, field: &str, value: &Value) -> Result<()> {
        self.write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_field_value(field, value)
    }

    fn id_value(&self) -> Value {
        self.read().unwrap_or_else(PoisonError::into_inner).id_value()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Identity of a managed entity: its type plus its normalized identifier.
///
/// Two keys are equal when they name the same entity type and their ids are
/// equal after [`Value::identity`] widening, so an `Int(1)` loaded from a row
/// and a `BigInt(1)` generated key address the same instance.
#[derive(Clone)]
pub struct EntityKey {
    descriptor: Option<&'static EntityDescriptor>,
    id: Value,
}

impl EntityKey {
    pub fn new(descriptor: &'static EntityDescriptor, id: &Value) -> Self {
        Self {
            descriptor: Some(descriptor),
            id: id.identity(),
        }
    }

    pub fn of<E: Entity>(id: &Value) -> Self {
        Self::new(E::descriptor(), id)
    }

    /// Key of the current state of `entity`.
    pub fn from_entity(entity: &dyn ManagedEntity) -> Self {
        Self::new(entity.descriptor(), &entity.id_value())
    }

    /// The key of nothing: no type and a null id.
    pub fn empty() -> Self {
        Self {
            descriptor: None,
            id: Value::Null,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.descriptor.is_none()
    }

    pub fn descriptor(&self) -> Option<&'static EntityDescriptor> {
        self.descriptor
    }

    pub fn id(&self) -> &Value {
        &self.id
    }

    /// Simple type name, or `"?"` for the empty key.
    pub fn entity_name(&self) -> &'static str {
        self.descriptor.map_or("?", |d| d.name)
    }

    fn path(&self) -> Option<&'static str> {
        self.descriptor.map(|d| d.path)
    }
}

impl PartialEq for EntityKey {
    fn eq(&self, other: &Self) -> bool {
        self.path() == other.path() && self.id == other.id
    }
}

// Ids are compared after normalization; a NaN id never equals itself.
impl Eq for EntityKey {}

impl Hash for EntityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path().hash(state);
        hash_value(&self.id, state);
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityKey")
            .field("entity", &self.entity_name())
            .field("id", &self.id)
            .finish()
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity_name(), self.id)
    }
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    std::mem::discriminant(value).hash(state);
    match value {
        Value::Null => {}
        Value::Bool(b) => b.hash(state),
        Value::TinyInt(i) => i.hash(state),
        Value::SmallInt(i) => i.hash(state),
        Value::Int(i) => i.hash(state),
        Value::BigInt(i) => i.hash(state),
        Value::Float(f) => f.to_bits().hash(state),
        Value::Double(f) => f.to_bits().hash(state),
        Value::Decimal(s) | Value::Text(s) => s.hash(state),
        Value::Bytes(b) => b.hash(state),
        Value::Json(j) => j.to_string().hash(state),
    }
}

/// A cached entity together with its key.
#[derive(Clone)]
pub struct EntityEntry {
    key: EntityKey,
    entity: Arc<dyn ManagedEntity>,
}

impl EntityEntry {
    /// Derive the key from the entity's current id.
    pub fn new(entity: Arc<dyn ManagedEntity>) -> Self {
        let key = EntityKey::from_entity(entity.as_ref());
        Self { key, entity }
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn entity(&self) -> &Arc<dyn ManagedEntity> {
        &self.entity
    }

    /// The typed handle, if the entry holds an `E`.
    pub fn downcast<E: Entity>(&self) -> Option<EntityRef<E>> {
        Arc::clone(&self.entity)
            .into_any()
            .downcast::<RwLock<E>>()
            .ok()
    }
}

impl fmt::Debug for EntityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityEntry").field("key", &self.key).finish()
    }
}

/// Map from [`EntityKey`] to the single cached instance.
#[derive(Default)]
pub struct IdentityMap {
    entries: HashMap<EntityKey, EntityEntry>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &EntityKey) -> Option<&EntityEntry> {
        self.entries.get(key)
    }

    /// The typed handle cached under `key`.
    pub fn get_ref<E: Entity>(&self, key: &EntityKey) -> Option<EntityRef<E>> {
        self.entries.get(key).and_then(EntityEntry::downcast::<E>)
    }

    /// Cache `entry`, replacing any previous entry for the same key.
    pub fn insert(&mut self, entry: EntityEntry) -> Option<EntityEntry> {
        self.entries.insert(entry.key.clone(), entry)
    }

    /// Return the cached handle for `entity`'s key, or cache `entity`.
    ///
    /// The flag is `true` when `entity` was newly cached; otherwise the passed
    /// instance is dropped.
    pub fn get_or_insert<E: Entity>(&mut self, entity: E) -> (EntityRef<E>, bool) {
        let key = EntityKey::of::<E>(&entity.id_value());
        if let Some(existing) = self.get_ref::<E>(&key) {
            return (existing, false);
        }
        let handle: EntityRef<E> = Arc::new(RwLock::new(entity));
        self.entries.insert(
            key.clone(),
            EntityEntry {
                key,
                entity: Arc::clone(&handle) as Arc<dyn ManagedEntity>,
            },
        );
        (handle, true)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &EntityKey) -> Option<EntityEntry> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &EntityEntry> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Note, Person};
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(key: &EntityKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn keys_normalize_integral_ids() {
        let narrow = EntityKey::of::<Person>(&Value::Int(7));
        let wide = EntityKey::of::<Person>(&Value::BigInt(7));
        assert_eq!(narrow, wide);
        assert_eq!(hash_of(&narrow), hash_of(&wide));
        assert_eq!(narrow.to_string(), "Person#7");
    }

    #[test]
    fn keys_distinguish_types() {
        let person = EntityKey::of::<Person>(&Value::Int(1));
        let note = EntityKey::of::<Note>(&Value::Int(1));
        assert_ne!(person, note);
        assert!(EntityKey::empty().is_empty());
        assert_ne!(EntityKey::empty(), person);
        assert_eq!(EntityKey::empty(), EntityKey::empty());
    }

    #[test]
    fn get_or_insert_returns_the_cached_instance() {
        let mut map = IdentityMap::new();
        let (first, inserted) = map.get_or_insert(Person::new(1, "Ada", 36));
        assert!(inserted);

        let (second, inserted) = map.get_or_insert(Person::new(1, "Someone else", 99));
        assert!(!inserted);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.read().unwrap().first_name, "Ada");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn entries_downcast_to_their_own_type_only() {
        let mut map = IdentityMap::new();
        let (person, _) = map.get_or_insert(Person::new(3, "Grace", 45));
        let key = EntityKey::of::<Person>(&Value::BigInt(3));

        let entry = map.get(&key).unwrap();
        assert!(entry.downcast::<Note>().is_none());
        let typed = entry.downcast::<Person>().unwrap();
        assert!(Arc::ptr_eq(&typed, &person));

        entry
            .entity()
            .set_field_value("age", &Value::Int(46))
            .unwrap();
        assert_eq!(person.read().unwrap().age, 46);
    }

    #[test]
    fn remove_and_clear() {
        let mut map = IdentityMap::new();
        map.get_or_insert(Person::new(1, "A", 1));
        map.get_or_insert(Person::new(2, "B", 2));
        assert!(map.remove(&EntityKey::of::<Person>(&Value::Int(1))).is_some());
        assert!(!map.contains(&EntityKey::of::<Person>(&Value::Int(1))));
        map.clear();
        assert!(map.is_empty());
    }
}
