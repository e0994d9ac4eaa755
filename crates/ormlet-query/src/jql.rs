//! JQL: an SQL-like query language over entity and field names.
//!
//! A JQL query names the entity type instead of its table and field names
//! instead of columns, and binds values through named `:parameters`:
//!
//! ```text
//! select p from Person p where p.firstName = :firstName and p.age = :age
//! ```
//!
//! [`JqlTranslator`] rewrites it token by token into native SQL with
//! positional placeholders:
//!
//! ```text
//! select * from persons p where p.first_name = ? and p.age = ?
//! ```
//!
//! Owning references can be navigated one hop deep (`n.Person.id`). SELECT
//! queries get a `left join` per owning reference of the root entity.
//! There is no SQL AST; anything the translator does not recognise is copied
//! through verbatim.

use ormlet_core::{
    Entity, EntityDescriptor, EntityMetadata, Error, MetadataRegistry, ReferenceMeta, Result,
    Value,
};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, LazyLock};

/// `:name` not preceded by another colon or identifier character.
static PARAMETER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^:\w]):([A-Za-z_]\w*)").unwrap_or_else(|e| unreachable!("{e}"))
});

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_]\w*$").unwrap_or_else(|e| unreachable!("{e}"))
});

/// Keywords that can follow the entity name instead of an alias.
const CLAUSE_KEYWORDS: &[&str] = &[
    "where", "set", "left", "right", "inner", "join", "order", "group", "limit", "values",
    "having", "on", "union",
];

/// Keywords a synthesized join may be placed in front of when there is no `where`.
const TRAILING_CLAUSES: &[&str] = &["group", "order", "limit", "having"];

/// The statement kind, taken from the first token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl QueryKind {
    fn parse(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_uppercase().as_str() {
            "SELECT" => Some(QueryKind::Select),
            "INSERT" => Some(QueryKind::Insert),
            "UPDATE" => Some(QueryKind::Update),
            "DELETE" => Some(QueryKind::Delete),
            _ => None,
        }
    }

    /// Keyword immediately preceding the entity name.
    fn table_keyword(self) -> &'static str {
        match self {
            QueryKind::Select | QueryKind::Delete => "from",
            QueryKind::Insert => "into",
            QueryKind::Update => "update",
        }
    }
}

/// A JQL query over entity `E` with its bound parameters.
pub struct JqlQuery<E> {
    query: String,
    parameters: HashMap<String, Value>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> JqlQuery<E> {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: HashMap::new(),
            _entity: PhantomData,
        }
    }

    /// Bind a named parameter. The name may be given with or without its leading colon.
    pub fn set_parameter(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        let name = name.strip_prefix(':').unwrap_or(name);
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    /// Builder-style [`set_parameter`](Self::set_parameter).
    pub fn with_parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set_parameter(name, value);
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Descriptor of the root entity.
    pub fn entity(&self) -> &'static EntityDescriptor {
        E::descriptor()
    }
}

impl<E> Clone for JqlQuery<E> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            parameters: self.parameters.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> fmt::Debug for JqlQuery<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JqlQuery")
            .field("query", &self.query)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// Native SQL produced from a JQL query.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedQuery {
    pub sql: String,
    /// Values in placeholder order.
    pub params: Vec<Value>,
}

/// Compiles JQL into native SQL using resolved entity metadata.
#[derive(Debug, Clone)]
pub struct JqlTranslator {
    registry: Arc<MetadataRegistry>,
    strict: bool,
}

impl JqlTranslator {
    pub fn new(registry: Arc<MetadataRegistry>) -> Self {
        Self {
            registry,
            strict: true,
        }
    }

    /// In strict mode (the default) an `alias.field` path that names nothing on
    /// the root entity, a path qualified by an undeclared name, or a table slot
    /// naming another entity, is an error.
    /// Otherwise such tokens pass through unchanged.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Translate a query and collect its parameters in placeholder order.
    #[tracing::instrument(level = "debug", skip(self, query), fields(jql = %query.query))]
    pub fn translate<E: Entity>(&self, query: &JqlQuery<E>) -> Result<TranslatedQuery> {
        let meta = self.registry.resolve::<E>()?;
        let plan = QueryPlan::parse(&query.query, &query.parameters)?;
        let translated = plan.compile(&meta, &self.registry, self.strict)?;
        tracing::debug!(sql = %translated.sql, params = translated.params.len(), "Translated JQL");
        Ok(translated)
    }

    /// The native SQL string only.
    pub fn to_sql_string<E: Entity>(&self, query: &JqlQuery<E>) -> Result<String> {
        self.translate(query).map(|t| t.sql)
    }

    /// The parameter values only, in placeholder order.
    pub fn parameters<E: Entity>(&self, query: &JqlQuery<E>) -> Result<Vec<Value>> {
        self.translate(query).map(|t| t.params)
    }
}

/// Token stream of one query plus everything the rewrite passes need.
#[derive(Debug)]
struct QueryPlan<'q> {
    source: &'q str,
    kind: QueryKind,
    tokens: Vec<String>,
    /// Index of the entity-name token.
    table_slot: usize,
    alias: Option<String>,
    /// Index of the alias token, if the alias is declared next to the entity name.
    alias_slot: Option<usize>,
    params: Vec<Value>,
}

impl<'q> QueryPlan<'q> {
    /// Tokenize and substitute parameters.
    fn parse(source: &'q str, bound: &HashMap<String, Value>) -> Result<Self> {
        let mut tokens: Vec<String> = source.split_whitespace().map(str::to_string).collect();
        let first = tokens
            .first()
            .ok_or_else(|| Error::query_translation(source, "empty query"))?;
        let kind = QueryKind::parse(first).ok_or_else(|| {
            Error::query_translation(
                source,
                format!("unresolvable query type keyword '{}'", first),
            )
        })?;

        let keyword = kind.table_keyword();
        let table_slot = tokens
            .iter()
            .position(|t| t.eq_ignore_ascii_case(keyword))
            .map(|i| i + 1)
            .filter(|&i| i < tokens.len())
            .ok_or_else(|| {
                Error::query_translation(
                    source,
                    format!("expected an entity name after '{}'", keyword),
                )
            })?;

        let (alias, alias_slot) = match tokens.get(table_slot + 1).map(String::as_str) {
            Some(t) if t.eq_ignore_ascii_case("as") => (
                tokens.get(table_slot + 2).filter(|a| is_alias(a)).cloned(),
                Some(table_slot + 2),
            ),
            Some(t) if is_alias(t) => (Some(t.to_string()), Some(table_slot + 1)),
            _ => (None, None),
        };

        let mut params = Vec::new();
        for token in &mut tokens {
            if token.contains(':') {
                *token = substitute_parameters(source, token, bound, &mut params)?;
            }
        }

        Ok(Self {
            source,
            kind,
            tokens,
            table_slot,
            alias,
            alias_slot,
            params,
        })
    }

    fn compile(
        mut self,
        meta: &EntityMetadata,
        registry: &MetadataRegistry,
        strict: bool,
    ) -> Result<TranslatedQuery> {
        let entity_token = strip_punctuation(&self.tokens[self.table_slot]).1;
        if strict
            && !entity_token.eq_ignore_ascii_case(meta.name())
            && !entity_token.eq_ignore_ascii_case(meta.table())
        {
            return Err(Error::query_translation(
                self.source,
                format!(
                    "expected entity '{}' after '{}', found '{}'",
                    meta.name(),
                    self.kind.table_keyword(),
                    entity_token
                ),
            ));
        }

        for index in 1..self.tokens.len() {
            if index == self.table_slot || Some(index) == self.alias_slot {
                continue;
            }
            if let Some(rewritten) = self.resolve_token(&self.tokens[index], meta, registry, strict)? {
                self.tokens[index] = rewritten;
            }
        }

        self.tokens[self.table_slot] = meta.table().to_string();

        if self.kind == QueryKind::Select {
            self.synthesize_joins(meta, registry)?;
            self.widen_select_list();
        }

        Ok(TranslatedQuery {
            sql: self.tokens.join(" "),
            params: self.params,
        })
    }

    /// Rewrite one token's field path, or `None` to leave it as is.
    fn resolve_token(
        &self,
        token: &str,
        meta: &EntityMetadata,
        registry: &MetadataRegistry,
        strict: bool,
    ) -> Result<Option<String>> {
        let (prefix, core, suffix) = strip_punctuation(token);
        if core.is_empty() {
            return Ok(None);
        }
        let segments: Vec<&str> = core.split('.').collect();
        let alias = self.alias.as_deref();

        let resolved = match segments.as_slice() {
            [field] => resolve_field(meta, field),
            [qualifier, field] if Some(*qualifier) == alias => {
                match resolve_field(meta, field) {
                    Some(column) => Some(format!("{}.{}", qualifier, column)),
                    None => return self.unknown_path(core, meta, strict),
                }
            }
            [relation, field] => match meta.reference_ignore_case(relation) {
                Some((ordinal, reference)) => {
                    self.resolve_navigation(None, ordinal, reference, field, registry)?
                }
                None if strict
                    && IDENTIFIER.is_match(relation)
                    && IDENTIFIER.is_match(field)
                    && !relation.eq_ignore_ascii_case(meta.name())
                    && !relation.eq_ignore_ascii_case(meta.table()) =>
                {
                    return Err(Error::query_translation(
                        self.source,
                        format!(
                            "'{}' is neither the query alias nor a relationship of entity '{}'",
                            relation,
                            meta.name()
                        ),
                    ));
                }
                None => None,
            },
            [qualifier, relation, field] if Some(*qualifier) == alias => {
                match meta.reference_ignore_case(relation) {
                    Some((ordinal, reference)) => self.resolve_navigation(
                        Some(*qualifier),
                        ordinal,
                        reference,
                        field,
                        registry,
                    )?,
                    None => return self.unknown_path(core, meta, strict),
                }
            }
            [qualifier, ..] if Some(*qualifier) == alias && strict => {
                return Err(Error::query_translation(
                    self.source,
                    format!(
                        "'{}' navigates more than one relationship; only one level is supported",
                        core
                    ),
                ));
            }
            _ => None,
        };

        Ok(resolved.map(|path| format!("{}{}{}", prefix, path, suffix)))
    }

    /// `[alias.]Related.field`: the join column when `field` is the target's
    /// identifier, else the joined table's column (SELECT only).
    fn resolve_navigation(
        &self,
        qualifier: Option<&str>,
        ordinal: usize,
        reference: &ReferenceMeta,
        field: &str,
        registry: &MetadataRegistry,
    ) -> Result<Option<String>> {
        let target = registry.resolve_descriptor(reference.target)?;
        let target_id = target.id();
        if field.eq_ignore_ascii_case(target_id.field) || field.eq_ignore_ascii_case(target_id.column)
        {
            return Ok(Some(match qualifier {
                Some(q) => format!("{}.{}", q, reference.join_column),
                None => reference.join_column.to_string(),
            }));
        }

        match (self.kind, target.column_ignore_case(field)) {
            (QueryKind::Select, Some(column)) => {
                Ok(Some(format!("{}.{}", join_alias(ordinal), column.column)))
            }
            (_, Some(_)) => Err(Error::query_translation(
                self.source,
                format!(
                    "'{}.{}' can only be navigated in a select query",
                    reference.field, field
                ),
            )),
            (_, None) => Err(Error::query_translation(
                self.source,
                format!("entity '{}' has no field '{}'", target.name(), field),
            )),
        }
    }

    fn unknown_path(&self, core: &str, meta: &EntityMetadata, strict: bool) -> Result<Option<String>> {
        if strict {
            return Err(Error::query_translation(
                self.source,
                format!("'{}' does not name a field of entity '{}'", core, meta.name()),
            ));
        }
        tracing::warn!(token = core, entity = meta.name(), "Unresolved JQL path passed through");
        Ok(None)
    }

    /// One `left join` per owning reference, placed before `where` (or the first
    /// trailing clause, or the end).
    fn synthesize_joins(&mut self, meta: &EntityMetadata, registry: &MetadataRegistry) -> Result<()> {
        let prefix = self
            .alias
            .as_deref()
            .map(|a| format!("{}.", a))
            .unwrap_or_default();

        let mut joins = Vec::with_capacity(meta.references().len());
        for (ordinal, reference) in meta.references().iter().enumerate() {
            let target = registry.resolve_descriptor(reference.target)?;
            let alias = join_alias(ordinal);
            joins.push(format!(
                "left join {} {} on {}.{} = {}{}",
                target.table(),
                alias,
                alias,
                target.id().column,
                prefix,
                reference.join_column
            ));
        }
        if joins.is_empty() {
            return Ok(());
        }

        let after_table = self.table_slot + 1;
        let position = self.tokens[after_table..]
            .iter()
            .position(|t| t.eq_ignore_ascii_case("where"))
            .or_else(|| {
                self.tokens[after_table..].iter().position(|t| {
                    TRAILING_CLAUSES
                        .iter()
                        .any(|clause| t.eq_ignore_ascii_case(clause))
                })
            })
            .map_or(self.tokens.len(), |i| i + after_table);

        self.tokens.splice(position..position, joins);
        Ok(())
    }

    /// Replace everything between `select` and `from` with `*`.
    fn widen_select_list(&mut self) {
        let from = self.table_slot - 1;
        self.tokens.splice(1..from, std::iter::once("*".to_string()));
    }
}

fn join_alias(ordinal: usize) -> String {
    format!("join_{}", ordinal)
}

fn is_alias(token: &str) -> bool {
    IDENTIFIER.is_match(token)
        && !CLAUSE_KEYWORDS
            .iter()
            .any(|k| token.eq_ignore_ascii_case(k))
}

/// Column (or join column) of a root-entity field named case-insensitively.
fn resolve_field(meta: &EntityMetadata, field: &str) -> Option<String> {
    if let Some(column) = meta.column_ignore_case(field) {
        return Some(column.column.to_string());
    }
    meta.references()
        .iter()
        .find(|r| r.field.eq_ignore_ascii_case(field))
        .map(|r| r.join_column.to_string())
}

/// Split a token into leading `(`, the core, and trailing `,` / `)`.
fn strip_punctuation(token: &str) -> (&str, &str, &str) {
    let body_start = token.len() - token.trim_start_matches('(').len();
    let (prefix, rest) = token.split_at(body_start);
    let core = rest.trim_end_matches([',', ')']);
    let suffix = &rest[core.len()..];
    (prefix, core, suffix)
}

/// Replace each bound `:name` in `token` with `?`, appending its value to `params`.
fn substitute_parameters(
    source: &str,
    token: &str,
    bound: &HashMap<String, Value>,
    params: &mut Vec<Value>,
) -> Result<String> {
    let mut out = String::with_capacity(token.len());
    let mut last = 0;
    for captures in PARAMETER.captures_iter(token) {
        let (Some(whole), Some(lead), Some(name)) = (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };
        let value = bound.get(name.as_str()).ok_or_else(|| {
            Error::query_translation(
                source,
                format!("no value bound for parameter ':{}'", name.as_str()),
            )
        })?;
        params.push(value.clone());
        out.push_str(&token[last..whole.start()]);
        out.push_str(lead.as_str());
        out.push('?');
        last = whole.end();
    }
    out.push_str(&token[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_entities::{Note, Person};

    fn translator() -> JqlTranslator {
        JqlTranslator::new(Arc::new(MetadataRegistry::new()))
    }

    fn translation_message(result: Result<TranslatedQuery>) -> String {
        match result {
            Err(Error::QueryTranslation(e)) => e.message,
            other => panic!("expected translation error, got {other:?}"),
        }
    }

    #[test]
    fn select_by_bare_id() {
        let query = JqlQuery::<Person>::new("select p from Person p where id = :id")
            .with_parameter("id", 1_i64);
        let out = translator().translate(&query).unwrap();
        assert_eq!(out.sql, "select * from persons p where id = ?");
        assert_eq!(out.params, vec![Value::BigInt(1)]);
    }

    #[test]
    fn parameters_follow_token_order_not_binding_order() {
        let query = JqlQuery::<Person>::new(
            "select p from Person p where p.firstName = :firstName and p.lastName = :lastName and p.age = :age",
        )
        .with_parameter("lastName", "lastName")
        .with_parameter("age", 20)
        .with_parameter("firstName", "firstName");

        let out = translator().translate(&query).unwrap();
        assert_eq!(
            out.sql,
            "select * from persons p where p.first_name = ? and p.last_name = ? and p.age = ?"
        );
        assert_eq!(
            out.params,
            vec![
                Value::from("firstName"),
                Value::from("lastName"),
                Value::Int(20)
            ]
        );
    }

    #[test]
    fn update_rewrites_set_and_where() {
        let query = JqlQuery::<Person>::new(
            "update Person p set p.firstName = :newFirstName, p.lastName = :newLastName, p.age = :newAge, p.male = :newMale where p.firstName = :firstName and p.lastName = :lastName and p.age = :age",
        )
        .with_parameter("newFirstName", "newFirstName")
        .with_parameter("newAge", 25)
        .with_parameter("newLastName", "newLastName")
        .with_parameter("newMale", "M")
        .with_parameter("age", 20)
        .with_parameter("firstName", "firstName")
        .with_parameter("lastName", "lastName");

        let out = translator().translate(&query).unwrap();
        assert_eq!(
            out.sql,
            "update persons p set p.first_name = ?, p.last_name = ?, p.age = ?, p.male = ? where p.first_name = ? and p.last_name = ? and p.age = ?"
        );
        assert_eq!(
            out.params,
            vec![
                Value::from("newFirstName"),
                Value::from("newLastName"),
                Value::Int(25),
                Value::from("M"),
                Value::from("firstName"),
                Value::from("lastName"),
                Value::Int(20),
            ]
        );
    }

    #[test]
    fn extra_whitespace_collapses() {
        let query = JqlQuery::<Person>::new(
            "update Person p set  p.firstName = :fn,  p.age = :age   where p.id = :id",
        )
        .with_parameter("fn", "A")
        .with_parameter("age", 3)
        .with_parameter("id", 1);
        let sql = translator().to_sql_string(&query).unwrap();
        assert_eq!(
            sql,
            "update persons p set p.first_name = ?, p.age = ? where p.id = ?"
        );
    }

    #[test]
    fn delete_rewrites_table_and_columns() {
        let query = JqlQuery::<Person>::new(
            "delete from Person p where p.firstName = :firstName and p.lastName = :lastName and p.age = :age",
        )
        .with_parameter("firstName", "firstName")
        .with_parameter("age", 20)
        .with_parameter("lastName", "lastName");

        let out = translator().translate(&query).unwrap();
        assert_eq!(
            out.sql,
            "delete from persons p where p.first_name = ? and p.last_name = ? and p.age = ?"
        );
        assert_eq!(out.params.len(), 3);
        assert_eq!(out.params[2], Value::Int(20));
    }

    #[test]
    fn insert_keeps_parentheses_and_commas() {
        let query = JqlQuery::<Person>::new(
            "insert into Person p (p.firstName, p.lastName, p.age, p.male) values (:firstName, :lastName, :age, :male)",
        )
        .with_parameter("male", "M")
        .with_parameter("age", 20)
        .with_parameter("lastName", "lastName")
        .with_parameter("firstName", "firstName");

        let out = translator().translate(&query).unwrap();
        assert_eq!(
            out.sql,
            "insert into persons p (p.first_name, p.last_name, p.age, p.male) values (?, ?, ?, ?)"
        );
        assert_eq!(
            out.params,
            vec![
                Value::from("firstName"),
                Value::from("lastName"),
                Value::Int(20),
                Value::from("M")
            ]
        );
    }

    #[test]
    fn select_joins_owning_reference_with_alias() {
        let query = JqlQuery::<Note>::new("select n from Note n where n.Person.id = :personId")
            .with_parameter("personId", 1_i64);
        let out = translator().translate(&query).unwrap();
        assert_eq!(
            out.sql,
            "select * from notes n left join persons join_0 on join_0.id = n.person_id where n.person_id = ?"
        );
        assert_eq!(out.params, vec![Value::BigInt(1)]);
    }

    #[test]
    fn select_joins_owning_reference_without_alias() {
        let query = JqlQuery::<Note>::new("select * from Note where Person.id = :personId")
            .with_parameter(":personId", 1_i64);
        let sql = translator().to_sql_string(&query).unwrap();
        assert_eq!(
            sql,
            "select * from notes left join persons join_0 on join_0.id = person_id where person_id = ?"
        );
    }

    #[test]
    fn join_goes_to_the_end_without_where() {
        let query = JqlQuery::<Note>::new("select n from Note n");
        let sql = translator().to_sql_string(&query).unwrap();
        assert_eq!(
            sql,
            "select * from notes n left join persons join_0 on join_0.id = n.person_id"
        );

        let query = JqlQuery::<Note>::new("select n from Note n order by n.title");
        let sql = translator().to_sql_string(&query).unwrap();
        assert_eq!(
            sql,
            "select * from notes n left join persons join_0 on join_0.id = n.person_id order by n.title"
        );
    }

    #[test]
    fn navigation_to_non_id_field_uses_join_alias() {
        let query = JqlQuery::<Note>::new("select n from Note n where n.Person.firstName = :fn")
            .with_parameter("fn", "Ada");
        let sql = translator().to_sql_string(&query).unwrap();
        assert_eq!(
            sql,
            "select * from notes n left join persons join_0 on join_0.id = n.person_id where join_0.first_name = ?"
        );
    }

    #[test]
    fn navigation_outside_select_is_rejected() {
        let query = JqlQuery::<Note>::new("delete from Note n where n.Person.firstName = :fn")
            .with_parameter("fn", "Ada");
        let message = translation_message(translator().translate(&query));
        assert!(message.contains("select"), "{message}");

        let query = JqlQuery::<Note>::new("delete from Note n where n.Person.id = :id")
            .with_parameter("id", 3);
        assert_eq!(
            translator().to_sql_string(&query).unwrap(),
            "delete from notes n where n.person_id = ?"
        );
    }

    #[test]
    fn repeated_parameter_binds_each_occurrence() {
        let query = JqlQuery::<Person>::new(
            "select p from Person p where p.firstName = :name or p.lastName = :name",
        )
        .with_parameter("name", "X");
        let params = translator().parameters(&query).unwrap();
        assert_eq!(params, vec![Value::from("X"), Value::from("X")]);
    }

    #[test]
    fn malformed_queries_fail() {
        let t = translator();
        let message = translation_message(t.translate(&JqlQuery::<Person>::new("merge Person p")));
        assert!(message.contains("unresolvable query type keyword 'merge'"));

        let message = translation_message(t.translate(&JqlQuery::<Person>::new("   ")));
        assert_eq!(message, "empty query");

        let message = translation_message(t.translate(&JqlQuery::<Person>::new("select p from")));
        assert!(message.contains("after 'from'"));

        let message = translation_message(
            t.translate(&JqlQuery::<Person>::new("select p from Person p where p.id = :id")),
        );
        assert!(message.contains(":id"));

        let message = translation_message(
            t.translate(&JqlQuery::<Person>::new("select n from Note n")),
        );
        assert!(message.contains("expected entity 'Person'"));
    }

    #[test]
    fn unknown_alias_field_depends_on_strictness() {
        let query = JqlQuery::<Person>::new("select p from Person p where p.nickname = :n")
            .with_parameter("n", "x");

        let message = translation_message(translator().translate(&query));
        assert!(message.contains("p.nickname"));

        let lenient = translator().strict(false);
        assert!(!lenient.is_strict());
        assert_eq!(
            lenient.to_sql_string(&query).unwrap(),
            "select * from persons p where p.nickname = ?"
        );
    }

    #[test]
    fn undeclared_qualifier_is_rejected_in_strict_mode() {
        let query = JqlQuery::<Person>::new("select p from Person p where x.firstName = :f")
            .with_parameter("f", "Ada");
        let message = translation_message(translator().translate(&query));
        assert!(message.contains("'x' is neither the query alias"), "{message}");

        assert_eq!(
            translator().strict(false).to_sql_string(&query).unwrap(),
            "select * from persons p where x.firstName = ?"
        );

        let query = JqlQuery::<Person>::new("select p from Person p where p.age > 3.14");
        assert_eq!(
            translator().to_sql_string(&query).unwrap(),
            "select * from persons p where p.age > 3.14"
        );
    }

    #[test]
    fn double_colon_casts_are_not_parameters() {
        let query = JqlQuery::<Person>::new("select p from Person p where p.age::text = :age")
            .with_parameter("age", "3");
        let lenient = translator().strict(false);
        let out = lenient.translate(&query).unwrap();
        assert_eq!(out.sql, "select * from persons p where p.age::text = ?");
        assert_eq!(out.params, vec![Value::from("3")]);
    }

    #[test]
    fn strip_punctuation_splits_token() {
        assert_eq!(strip_punctuation("(p.age,"), ("(", "p.age", ","));
        assert_eq!(strip_punctuation("p.male)"), ("", "p.male", ")"));
        assert_eq!(strip_punctuation("?"), ("", "?", ""));
    }
}
