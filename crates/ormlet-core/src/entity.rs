//! Entity declaration: the per-type mapping description and field access.
//!
//! An entity type implements [`Entity`], usually through `#[derive(Entity)]`.
//! The derive emits a `'static` [`EntityDescriptor`] describing the table,
//! the identifier, the optional version column and every relationship.
//! [`crate::MetadataRegistry`] validates and caches the resolved form.

use crate::Result;
use crate::lazy::LazyList;
use crate::row::Row;
use crate::value::Value;

/// Function returning the descriptor of a related entity type.
///
/// Relationships store a function instead of the descriptor itself so that
/// two entities can reference each other from their `static` descriptors.
pub type DescriptorFn = fn() -> &'static EntityDescriptor;

/// The kind of relationship a field participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Many rows of this table reference one row of the target (owning side).
    ManyToOne,
    /// One row of this table references one row of the target (owning side).
    OneToOne,
    /// The target table references this one (inverse side, loaded lazily).
    OneToMany,
}

impl RelationKind {
    /// Whether this side stores the join column on its own table.
    pub const fn is_owning(self) -> bool {
        matches!(self, RelationKind::ManyToOne | RelationKind::OneToOne)
    }
}

/// Declared mapping of one struct field.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    /// Rust field name.
    pub name: &'static str,
    /// Explicit column name, if any.
    pub column: Option<&'static str>,
    pub id: bool,
    pub version: bool,
    /// Whether the field holds an integer; required of version fields.
    pub integral: bool,
    pub relation: Option<RelationKind>,
    pub join_column: Option<&'static str>,
    pub target: Option<DescriptorFn>,
    /// Owning field on the target type (inverse collections only).
    pub mapped_by: Option<&'static str>,
}

impl FieldDescriptor {
    /// A plain column field mapped to a column of the same name.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            column: None,
            id: false,
            version: false,
            integral: false,
            relation: None,
            join_column: None,
            target: None,
            mapped_by: None,
        }
    }

    pub const fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    pub const fn id(mut self) -> Self {
        self.id = true;
        self
    }

    pub const fn version(mut self) -> Self {
        self.version = true;
        self
    }

    /// Mark the field as holding an `i8`..`i64` (or an optional one).
    pub const fn integral(mut self) -> Self {
        self.integral = true;
        self
    }

    pub const fn many_to_one(mut self, target: DescriptorFn) -> Self {
        self.relation = Some(RelationKind::ManyToOne);
        self.target = Some(target);
        self
    }

    pub const fn one_to_one(mut self, target: DescriptorFn) -> Self {
        self.relation = Some(RelationKind::OneToOne);
        self.target = Some(target);
        self
    }

    pub const fn one_to_many(mut self, target: DescriptorFn) -> Self {
        self.relation = Some(RelationKind::OneToMany);
        self.target = Some(target);
        self
    }

    pub const fn join_column(mut self, column: &'static str) -> Self {
        self.join_column = Some(column);
        self
    }

    pub const fn mapped_by(mut self, field: &'static str) -> Self {
        self.mapped_by = Some(field);
        self
    }

    /// Resolved column name: the explicit name, else the field name.
    pub fn column_name(&self) -> &'static str {
        self.column.unwrap_or(self.name)
    }
}

/// Declared mapping of one entity type.
#[derive(Debug, Clone, Copy)]
pub struct EntityDescriptor {
    /// Fully qualified type path; unique per type and used as the identity of the type.
    pub path: &'static str,
    /// Simple type name, as written in JQL queries.
    pub name: &'static str,
    /// Whether the type is marked as a managed entity.
    pub entity: bool,
    pub table: Option<&'static str>,
    pub fields: &'static [FieldDescriptor],
}

impl EntityDescriptor {
    pub const fn new(path: &'static str, name: &'static str) -> Self {
        Self {
            path,
            name,
            entity: true,
            table: None,
            fields: &[],
        }
    }

    pub const fn table(mut self, table: &'static str) -> Self {
        self.table = Some(table);
        self
    }

    pub const fn fields(mut self, fields: &'static [FieldDescriptor]) -> Self {
        self.fields = fields;
        self
    }

    /// Mark the type as not managed; resolving it is a mapping error.
    pub const fn unmanaged(mut self) -> Self {
        self.entity = false;
        self
    }

    /// Resolved table name: the explicit name, else the simple type name.
    pub fn table_name(&self) -> &'static str {
        self.table.unwrap_or(self.name)
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The first field flagged as identifier.
    pub fn id_field(&self) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.id)
    }
}

/// A type persisted by the session.
///
/// Field access goes through [`Value`] so the session can snapshot, compare and
/// write back fields without knowing the concrete type.
pub trait Entity: Sized + Send + Sync + 'static {
    /// The static mapping description of this type.
    fn descriptor() -> &'static EntityDescriptor;

    /// Current value of a column or owning-reference field.
    ///
    /// An owning reference yields the identifier of the referenced entity
    /// (`Value::Null` when unset). Returns `None` for unknown fields and
    /// inverse collections.
    fn field_value(&self, field: &str) -> Option<Value>;

    /// Overwrite a column field from a value.
    fn set_field_value(&mut self, field: &str, value: &Value) -> Result<()>;

    /// Build an instance from a result row, resolving relationships through `loader`.
    fn from_row<L: RelationLoader>(row: &Row, loader: &L) -> Result<Self>;

    /// Current identifier value, `Value::Null` when unassigned.
    fn id_value(&self) -> Value {
        Self::descriptor()
            .id_field()
            .and_then(|f| self.field_value(f.name))
            .unwrap_or(Value::Null)
    }
}

/// Resolves relationship fields while an entity is built from a row.
pub trait RelationLoader {
    /// Load the entity referenced by an owning-reference join column value.
    fn load_reference<T: Entity>(&self, id: &Value) -> Result<Option<T>>;

    /// Build the lazy inverse collection `field` of `O` for the owner with id `owner_id`.
    fn lazy_collection<O: Entity, T: Entity>(
        &self,
        field: &'static str,
        owner_id: &Value,
    ) -> Result<LazyList<T>>;
}

/// Loader that leaves every relationship unresolved.
///
/// References come back as `None` and collections as empty loaded lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedLoader;

impl RelationLoader for DetachedLoader {
    fn load_reference<T: Entity>(&self, _id: &Value) -> Result<Option<T>> {
        Ok(None)
    }

    fn lazy_collection<O: Entity, T: Entity>(
        &self,
        _field: &'static str,
        _owner_id: &Value,
    ) -> Result<LazyList<T>> {
        Ok(LazyList::empty())
    }
}
