//! Field snapshots for dirty checking.
//!
//! A snapshot is the array of an entity's persistent field values (columns and
//! owning-reference ids) in [`EntityMetadata::persistent_fields`] order, taken
//! when the entity enters the session and again after every flushed write.

use crate::identity::ManagedEntity;
use ormlet_core::{EntityMetadata, Value};

/// Persistent field values of one entity at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    values: Vec<Value>,
}

impl Snapshot {
    /// Capture the current field values of `entity`.
    pub fn capture(meta: &EntityMetadata, entity: &dyn ManagedEntity) -> Self {
        let values = meta
            .persistent_fields()
            .iter()
            .map(|f| entity.field_value(f.field).unwrap_or(Value::Null))
            .collect();
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// The captured value of `field`.
    pub fn value_of(&self, meta: &EntityMetadata, field: &str) -> Option<&Value> {
        meta.snapshot_index(field).and_then(|i| self.values.get(i))
    }

    /// The captured version, `Null` for unversioned entities.
    pub fn version(&self, meta: &EntityMetadata) -> Value {
        meta.version()
            .and_then(|v| self.value_of(meta, v.field))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Fields whose value differs between this snapshot and `current`.
    pub fn changed_fields(&self, meta: &EntityMetadata, current: &Snapshot) -> Vec<&'static str> {
        meta.persistent_fields()
            .iter()
            .zip(self.values.iter().zip(&current.values))
            .filter(|(_, (before, after))| before != after)
            .map(|(f, _)| f.field)
            .collect()
    }

    /// Whether `entity` has changed since this snapshot was taken.
    pub fn is_dirty(&self, meta: &EntityMetadata, entity: &dyn ManagedEntity) -> bool {
        *self != Snapshot::capture(meta, entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Note, Person, Versioned};
    use ormlet_core::MetadataRegistry;
    use std::sync::RwLock;

    #[test]
    fn captures_in_field_name_order() {
        let registry = MetadataRegistry::new();
        let meta = registry.resolve::<Person>().unwrap();
        let person = RwLock::new(Person::new(1, "Ada", 36));

        let snapshot = Snapshot::capture(&meta, &person);
        // age, first_name, id, last_name, male
        assert_eq!(
            snapshot.values(),
            &[
                Value::Int(36),
                Value::from("Ada"),
                Value::BigInt(1),
                Value::from("Lovelace"),
                Value::Null,
            ]
        );
        assert_eq!(snapshot.value_of(&meta, "age"), Some(&Value::Int(36)));
        assert_eq!(snapshot.version(&meta), Value::Null);
    }

    #[test]
    fn detects_changes_per_field() {
        let registry = MetadataRegistry::new();
        let meta = registry.resolve::<Person>().unwrap();
        let person = RwLock::new(Person::new(1, "Ada", 36));
        let before = Snapshot::capture(&meta, &person);
        assert!(!before.is_dirty(&meta, &person));

        person.write().unwrap().age = 37;
        person.write().unwrap().male = Some("F".to_string());
        let after = Snapshot::capture(&meta, &person);
        assert!(before.is_dirty(&meta, &person));
        assert_eq!(before.changed_fields(&meta, &after), vec!["age", "male"]);
    }

    #[test]
    fn reference_fields_snapshot_the_target_id() {
        let registry = MetadataRegistry::new();
        let meta = registry.resolve::<Note>().unwrap();
        let note = RwLock::new(Note {
            id: Some(5),
            title: "t".into(),
            body: None,
            person: Some(Person::new(9, "Ada", 36)),
        });
        let snapshot = Snapshot::capture(&meta, &note);
        assert_eq!(snapshot.value_of(&meta, "person"), Some(&Value::BigInt(9)));

        note.write().unwrap().person = None;
        assert!(snapshot.is_dirty(&meta, &note));
    }

    #[test]
    fn version_is_read_from_the_snapshot() {
        let registry = MetadataRegistry::new();
        let meta = registry.resolve::<Versioned>().unwrap();
        let entity = RwLock::new(Versioned {
            id: Some(1),
            name: "n".into(),
            version: Some(4),
        });
        let snapshot = Snapshot::capture(&meta, &entity);
        entity.write().unwrap().version = Some(5);
        assert_eq!(snapshot.version(&meta), Value::BigInt(4));
    }
}
