//! Statement builders for the CRUD operations the session issues.
//!
//! Every builder works from resolved [`EntityMetadata`] and emits lowercase SQL
//! with positional `?` placeholders. Column lists follow the metadata's
//! field-name order, so parameters line up with the snapshot order.

use ormlet_core::{EntityMetadata, Error, Result, Value};

/// SELECT builders.
#[derive(Debug, Clone, Copy)]
pub struct SelectBuilder<'a> {
    meta: &'a EntityMetadata,
}

impl<'a> SelectBuilder<'a> {
    pub fn new(meta: &'a EntityMetadata) -> Self {
        Self { meta }
    }

    /// `select * from <table> where <id> = ?`
    pub fn by_id(&self) -> String {
        self.by_column(self.meta.id().column)
    }

    /// `select * from <table> where <column> = ?`
    pub fn by_column(&self, column: &str) -> String {
        format!("select * from {} where {} = ?", self.meta.table(), column)
    }
}

/// INSERT builder.
#[derive(Debug, Clone, Copy)]
pub struct InsertBuilder<'a> {
    meta: &'a EntityMetadata,
}

impl<'a> InsertBuilder<'a> {
    pub fn new(meta: &'a EntityMetadata) -> Self {
        Self { meta }
    }

    /// Build the INSERT SQL and parameters.
    ///
    /// `value_of` reads a field of the entity being inserted; a missing field
    /// binds NULL. The identifier is left to the store to generate.
    pub fn build<F>(&self, value_of: F) -> (String, Vec<Value>)
    where
        F: Fn(&str) -> Option<Value>,
    {
        let fields: Vec<_> = self.meta.insertable_fields().collect();
        if fields.is_empty() {
            return (
                format!("insert into {} default values", self.meta.table()),
                Vec::new(),
            );
        }

        let columns: Vec<_> = fields.iter().map(|f| f.column).collect();
        let placeholders = vec!["?"; fields.len()];
        let params = fields
            .iter()
            .map(|f| value_of(f.field).unwrap_or(Value::Null))
            .collect();

        let sql = format!(
            "insert into {} ({}) values ({})",
            self.meta.table(),
            columns.join(", "),
            placeholders.join(", ")
        );
        (sql, params)
    }
}

/// A built UPDATE and the version value it writes.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub sql: String,
    pub params: Vec<Value>,
    /// Version written by this statement, for entities with a version field.
    pub next_version: Option<Value>,
}

/// UPDATE-by-id builder with optional optimistic-lock check.
#[derive(Debug, Clone)]
pub struct UpdateBuilder<'a> {
    meta: &'a EntityMetadata,
    expected_version: Option<Value>,
}

impl<'a> UpdateBuilder<'a> {
    pub fn new(meta: &'a EntityMetadata) -> Self {
        Self {
            meta,
            expected_version: None,
        }
    }

    /// Version the row must still carry for the update to apply.
    ///
    /// Defaults to the entity's current version value.
    pub fn expected_version(mut self, version: Value) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Build `update <table> set ... where <id> = ? [and <version> = ?]`.
    pub fn build<F>(&self, id: &Value, value_of: F) -> Result<UpdateStatement>
    where
        F: Fn(&str) -> Option<Value>,
    {
        let meta = self.meta;
        let version = meta.version();
        let mut next_version = None;
        let mut expected = None;

        if let Some(version) = version {
            let current = match &self.expected_version {
                Some(v) => v.clone(),
                None => value_of(version.field).unwrap_or(Value::Null),
            };
            let next = current.next_version().ok_or_else(|| {
                Error::mapping(
                    meta.name(),
                    format!(
                        "version field '{}' holds a non-integral value {}",
                        version.field, current
                    ),
                )
            })?;
            next_version = Some(next);
            expected = Some(current);
        }

        let mut assignments = Vec::new();
        let mut params = Vec::new();
        for field in meta.updatable_fields() {
            assignments.push(format!("{} = ?", field.column));
            if version.is_some_and(|v| v.field == field.field) {
                params.push(next_version.clone().unwrap_or(Value::Null));
            } else {
                params.push(value_of(field.field).unwrap_or(Value::Null));
            }
        }
        if assignments.is_empty() {
            return Err(Error::mapping(
                meta.name(),
                "entity has no updatable fields",
            ));
        }

        let mut sql = format!(
            "update {} set {} where {} = ?",
            meta.table(),
            assignments.join(", "),
            meta.id().column
        );
        params.push(id.clone());

        if let (Some(version), Some(expected)) = (version, expected) {
            if expected.is_null() {
                sql.push_str(&format!(" and {} is null", version.column));
            } else {
                sql.push_str(&format!(" and {} = ?", version.column));
                params.push(expected);
            }
        }

        Ok(UpdateStatement {
            sql,
            params,
            next_version,
        })
    }
}

/// DELETE-by-id builder.
#[derive(Debug, Clone, Copy)]
pub struct DeleteBuilder<'a> {
    meta: &'a EntityMetadata,
}

impl<'a> DeleteBuilder<'a> {
    pub fn new(meta: &'a EntityMetadata) -> Self {
        Self { meta }
    }

    /// `delete from <table> where <id> = ?`
    pub fn by_id(&self) -> String {
        format!(
            "delete from {} where {} = ?",
            self.meta.table(),
            self.meta.id().column
        )
    }
}
