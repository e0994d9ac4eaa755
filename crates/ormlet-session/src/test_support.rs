//! Entities and a scripted connection shared by the session tests.

use ormlet_core::{Connection, Error, LazyList, Result, Row, Value};
use ormlet_macros::Entity;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Entity, Debug, Clone, Default)]
#[entity(table = "persons")]
pub struct Person {
    #[entity(id)]
    pub id: Option<i64>,
    #[entity(column = "first_name")]
    pub first_name: String,
    #[entity(column = "last_name")]
    pub last_name: String,
    pub age: i32,
    pub male: Option<String>,
    #[entity(one_to_many)]
    pub notes: LazyList<Note>,
}

impl Person {
    pub fn new(id: i64, first_name: &str, age: i32) -> Self {
        Self {
            id: Some(id),
            first_name: first_name.to_string(),
            last_name: "Lovelace".to_string(),
            age,
            ..Self::default()
        }
    }

    pub fn unsaved(first_name: &str, age: i32) -> Self {
        Self {
            id: None,
            ..Self::new(0, first_name, age)
        }
    }
}

#[derive(Entity, Debug, Clone, Default)]
#[entity(table = "notes")]
pub struct Note {
    #[entity(id)]
    pub id: Option<i64>,
    pub title: String,
    pub body: Option<String>,
    #[entity(many_to_one, join_column = "person_id")]
    pub person: Option<Person>,
}

#[derive(Entity, Debug, Clone, Default)]
#[entity(table = "versioned")]
pub struct Versioned {
    #[entity(id)]
    pub id: Option<i64>,
    pub name: String,
    #[entity(version)]
    pub version: Option<i64>,
}

pub fn person_row(id: i64, first_name: &str, age: i32) -> Row {
    Row::new(
        vec![
            "id".into(),
            "first_name".into(),
            "last_name".into(),
            "age".into(),
            "male".into(),
        ],
        vec![
            Value::BigInt(id),
            Value::from(first_name),
            Value::from("Lovelace"),
            Value::Int(age),
            Value::Null,
        ],
    )
}

pub fn versioned_row(id: i64, name: &str, version: i64) -> Row {
    Row::new(
        vec!["id".into(), "name".into(), "version".into()],
        vec![Value::BigInt(id), Value::from(name), Value::BigInt(version)],
    )
}

/// Scripted reply to the next statement.
pub enum Reply {
    Rows(Vec<Row>),
    Affected(u64),
    Key(Value),
    Fail(&'static str),
}

/// A connection that records every statement and answers from a script.
///
/// With an empty script, queries return no rows, statements affect one row
/// and inserts generate keys 1, 2, 3, ...
#[derive(Default)]
pub struct ScriptedConnection {
    pub statements: Mutex<Vec<(String, Vec<Value>)>>,
    replies: Mutex<VecDeque<Reply>>,
    next_key: Mutex<i64>,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, reply: Reply) -> &Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn sql(&self) -> Vec<String> {
        self.statements
            .lock()
            .unwrap()
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    pub fn params(&self, index: usize) -> Vec<Value> {
        self.statements.lock().unwrap()[index].1.clone()
    }

    fn record(&self, sql: &str, params: &[Value]) -> Option<Reply> {
        self.statements
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        self.replies.lock().unwrap().pop_front()
    }
}

fn scripted_failure(message: &str) -> Error {
    Error::data_access(ormlet_core::DataAccessErrorKind::Statement, message)
}

impl Connection for ScriptedConnection {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        match self.record(sql, params) {
            Some(Reply::Rows(rows)) => Ok(rows),
            Some(Reply::Fail(message)) => Err(scripted_failure(message)),
            _ => Ok(Vec::new()),
        }
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        match self.record(sql, params) {
            Some(Reply::Affected(n)) => Ok(n),
            Some(Reply::Fail(message)) => Err(scripted_failure(message)),
            _ => Ok(1),
        }
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<Value> {
        match self.record(sql, params) {
            Some(Reply::Key(key)) => Ok(key),
            Some(Reply::Fail(message)) => Err(scripted_failure(message)),
            _ => {
                let mut next = self.next_key.lock().unwrap();
                *next += 1;
                Ok(Value::BigInt(*next))
            }
        }
    }

    fn begin(&self) -> Result<()> {
        self.record("BEGIN", &[]);
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.record("COMMIT", &[]);
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.record("ROLLBACK", &[]);
        Ok(())
    }
}
