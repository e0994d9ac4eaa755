//! Entity metadata resolution.
//!
//! [`MetadataRegistry`] turns an [`EntityDescriptor`] into a validated
//! [`EntityMetadata`] once per type and caches the result. Every other layer
//! (SQL builder, query translator, DAO, session) asks the registry instead of
//! reading descriptors directly, so mapping errors surface at first use.

use crate::Result;
use crate::entity::{Entity, EntityDescriptor, FieldDescriptor, RelationKind};
use crate::error::Error;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A plain column field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMeta {
    pub field: &'static str,
    pub column: &'static str,
}

/// An owning-reference field backed by a join column on this table.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceMeta {
    pub field: &'static str,
    pub join_column: &'static str,
    pub kind: RelationKind,
    pub target: &'static EntityDescriptor,
}

/// An inverse collection field backed by a join column on the target table.
#[derive(Debug, Clone, Copy)]
pub struct CollectionMeta {
    pub field: &'static str,
    pub target: &'static EntityDescriptor,
    /// Owning-reference field on the target pointing back at this type.
    pub mapped_by: &'static str,
}

/// A field that takes part in snapshots and INSERT/UPDATE statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistentField {
    pub field: &'static str,
    /// Column name, or the join column for owning references.
    pub column: &'static str,
    pub is_reference: bool,
}

/// Validated, immutable mapping of one entity type.
#[derive(Debug)]
pub struct EntityMetadata {
    descriptor: &'static EntityDescriptor,
    table: &'static str,
    id: ColumnMeta,
    version: Option<ColumnMeta>,
    columns: Vec<ColumnMeta>,
    references: Vec<ReferenceMeta>,
    collections: Vec<CollectionMeta>,
    persistent: Vec<PersistentField>,
}

impl EntityMetadata {
    /// Validate a descriptor and derive its metadata.
    pub fn from_descriptor(descriptor: &'static EntityDescriptor) -> Result<Self> {
        let name = descriptor.name;
        if !descriptor.entity {
            return Err(Error::mapping(
                name,
                "not a managed type; the type must be marked as an entity",
            ));
        }

        let mut ids = descriptor.fields.iter().filter(|f| f.id);
        let id_field = ids
            .next()
            .ok_or_else(|| Error::mapping(name, "identifier is not specified"))?;
        if ids.next().is_some() {
            return Err(Error::mapping(name, "more than one identifier field declared"));
        }

        let mut versions = descriptor.fields.iter().filter(|f| f.version);
        let version_field = versions.next();
        if versions.next().is_some() {
            return Err(Error::mapping(name, "more than one version field declared"));
        }
        if let Some(version) = version_field.filter(|f| !f.integral) {
            return Err(Error::mapping(
                name,
                format!("version field '{}' must be an integral column", version.name),
            ));
        }

        let mut columns = Vec::new();
        let mut references = Vec::new();
        let mut collections = Vec::new();

        for field in descriptor.fields {
            match field.relation {
                None => {
                    if field.join_column.is_some() {
                        return Err(Error::mapping(
                            name,
                            format!(
                                "field '{}' declares a join column but is not an owning reference",
                                field.name
                            ),
                        ));
                    }
                    columns.push(ColumnMeta {
                        field: field.name,
                        column: field.column_name(),
                    });
                }
                Some(kind) => {
                    if field.id || field.version {
                        return Err(Error::mapping(
                            name,
                            format!(
                                "relationship field '{}' cannot be an identifier or version",
                                field.name
                            ),
                        ));
                    }
                    let target = field.target.map(|f| f()).ok_or_else(|| {
                        Error::mapping(
                            name,
                            format!("relationship field '{}' has no target type", field.name),
                        )
                    })?;
                    if kind.is_owning() {
                        let join_column = field.join_column.ok_or_else(|| {
                            Error::mapping(
                                name,
                                format!(
                                    "owning reference '{}' must declare a join column",
                                    field.name
                                ),
                            )
                        })?;
                        references.push(ReferenceMeta {
                            field: field.name,
                            join_column,
                            kind,
                            target,
                        });
                    } else {
                        if field.join_column.is_some() {
                            return Err(Error::mapping(
                                name,
                                format!(
                                    "collection field '{}' cannot declare a join column",
                                    field.name
                                ),
                            ));
                        }
                        let mapped_by = resolve_mapped_by(descriptor, field, target)?;
                        collections.push(CollectionMeta {
                            field: field.name,
                            target,
                            mapped_by,
                        });
                    }
                }
            }
        }

        columns.sort_by(|a, b| a.field.cmp(b.field));

        let mut persistent: Vec<PersistentField> = columns
            .iter()
            .map(|c| PersistentField {
                field: c.field,
                column: c.column,
                is_reference: false,
            })
            .chain(references.iter().map(|r| PersistentField {
                field: r.field,
                column: r.join_column,
                is_reference: true,
            }))
            .collect();
        persistent.sort_by(|a, b| a.field.cmp(b.field));

        Ok(Self {
            descriptor,
            table: descriptor.table_name(),
            id: ColumnMeta {
                field: id_field.name,
                column: id_field.column_name(),
            },
            version: version_field.map(|f| ColumnMeta {
                field: f.name,
                column: f.column_name(),
            }),
            columns,
            references,
            collections,
            persistent,
        })
    }

    pub fn descriptor(&self) -> &'static EntityDescriptor {
        self.descriptor
    }

    /// Simple type name.
    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// Qualified type path identifying the type.
    pub fn path(&self) -> &'static str {
        self.descriptor.path
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn id(&self) -> ColumnMeta {
        self.id
    }

    pub fn version(&self) -> Option<ColumnMeta> {
        self.version
    }

    /// Plain columns (identifier and version included), sorted by field name.
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Owning references in declaration order.
    pub fn references(&self) -> &[ReferenceMeta] {
        &self.references
    }

    pub fn collections(&self) -> &[CollectionMeta] {
        &self.collections
    }

    /// Columns and owning references sorted by field name: the snapshot order.
    pub fn persistent_fields(&self) -> &[PersistentField] {
        &self.persistent
    }

    /// Fields written by INSERT: every persistent field except the identifier.
    pub fn insertable_fields(&self) -> impl Iterator<Item = &PersistentField> {
        self.persistent.iter().filter(|f| f.field != self.id.field)
    }

    /// Fields written by UPDATE: every persistent field except the identifier.
    pub fn updatable_fields(&self) -> impl Iterator<Item = &PersistentField> {
        self.insertable_fields()
    }

    /// Position of a field within the snapshot array.
    pub fn snapshot_index(&self, field: &str) -> Option<usize> {
        self.persistent.iter().position(|f| f.field == field)
    }

    pub fn reference(&self, field: &str) -> Option<&ReferenceMeta> {
        self.references.iter().find(|r| r.field == field)
    }

    pub fn collection(&self, field: &str) -> Option<&CollectionMeta> {
        self.collections.iter().find(|c| c.field == field)
    }

    /// Column filtered on when querying by `field`: its column, or its join
    /// column for an owning reference.
    pub fn filter_column(&self, field: &str) -> Option<&'static str> {
        self.persistent
            .iter()
            .find(|f| f.field == field)
            .map(|f| f.column)
    }

    /// Case-insensitive lookup of a plain column field.
    pub fn column_ignore_case(&self, field: &str) -> Option<ColumnMeta> {
        self.columns
            .iter()
            .find(|c| c.field.eq_ignore_ascii_case(field))
            .copied()
    }

    /// Case-insensitive lookup of an owning reference by field name or target type name,
    /// with its ordinal among owning references.
    pub fn reference_ignore_case(&self, segment: &str) -> Option<(usize, &ReferenceMeta)> {
        self.references.iter().enumerate().find(|(_, r)| {
            r.field.eq_ignore_ascii_case(segment) || r.target.name.eq_ignore_ascii_case(segment)
        })
    }
}

/// Find the owning field on `target` that an inverse collection maps to.
fn resolve_mapped_by(
    owner: &'static EntityDescriptor,
    field: &FieldDescriptor,
    target: &'static EntityDescriptor,
) -> Result<&'static str> {
    let points_back = |f: &&FieldDescriptor| {
        f.relation.is_some_and(RelationKind::is_owning)
            && f.target.is_some_and(|t| t().path == owner.path)
    };

    if let Some(mapped_by) = field.mapped_by {
        let candidate = target.field(mapped_by).ok_or_else(|| {
            Error::mapping(
                owner.name,
                format!(
                    "collection '{}' is mapped by unknown field '{}.{}'",
                    field.name, target.name, mapped_by
                ),
            )
        })?;
        if !points_back(&candidate) {
            return Err(Error::mapping(
                owner.name,
                format!(
                    "collection '{}' is mapped by '{}.{}', which is not a reference to {}",
                    field.name, target.name, mapped_by, owner.name
                ),
            ));
        }
        return Ok(candidate.name);
    }

    let mut candidates = target.fields.iter().filter(points_back);
    match (candidates.next(), candidates.next()) {
        (Some(only), None) => Ok(only.name),
        (None, _) => Err(Error::mapping(
            owner.name,
            format!(
                "collection '{}' has no owning reference to {} on {}",
                field.name, owner.name, target.name
            ),
        )),
        (Some(_), Some(_)) => Err(Error::mapping(
            owner.name,
            format!(
                "collection '{}' is ambiguous: {} references {} more than once; set mapped_by",
                field.name, target.name, owner.name
            ),
        )),
    }
}

/// Memoizing resolver shared by sessions, DAOs and the query translator.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    cache: RwLock<HashMap<&'static str, Arc<EntityMetadata>>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata of `E`, resolved on first use.
    pub fn resolve<E: Entity>(&self) -> Result<Arc<EntityMetadata>> {
        self.resolve_descriptor(E::descriptor())
    }

    /// Metadata of the type described by `descriptor`, resolved on first use.
    pub fn resolve_descriptor(
        &self,
        descriptor: &'static EntityDescriptor,
    ) -> Result<Arc<EntityMetadata>> {
        if let Some(meta) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(descriptor.path)
        {
            return Ok(Arc::clone(meta));
        }

        let meta = Arc::new(EntityMetadata::from_descriptor(descriptor)?);
        tracing::debug!(
            entity = descriptor.name,
            table = meta.table(),
            columns = meta.columns().len(),
            references = meta.references().len(),
            "Resolved entity metadata"
        );

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(descriptor.path).or_insert(meta)))
    }

    /// Number of resolved types.
    pub fn len(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
