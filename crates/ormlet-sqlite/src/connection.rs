//! SQLite connection.
//!
//! A thin safe wrapper around the SQLite C API. Every call locks the handle,
//! prepares the statement, binds positional parameters and steps it to
//! completion; statements are not cached.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::borrow_as_ptr)]

use crate::types;
use libsqlite3_sys as ffi;
use ormlet_core::{
    ColumnInfo, Connection, DataAccessErrorKind, Error, Result, Row, TransactionErrorKind, Value,
};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// libsqlite3-sys 0.37 omits `sqlite3_close_v2` from its bindings; the bundled
// library still exports it.
unsafe extern "C" {
    fn sqlite3_close_v2(db: *mut ffi::sqlite3) -> c_int;
}

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for an in-memory database.
    pub path: String,
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds; 0 leaves SQLite's default.
    pub busy_timeout_ms: u32,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy)]
pub struct OpenFlags {
    pub read_only: bool,
    /// Create the database file if it doesn't exist. Ignored when read-only.
    pub create: bool,
    /// Interpret the path as a `file:` URI.
    pub uri: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self::create_read_write()
    }
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            create: false,
            uri: false,
        }
    }

    /// Read-write; the database must exist.
    pub fn read_write() -> Self {
        Self {
            read_only: false,
            create: false,
            uri: false,
        }
    }

    pub fn create_read_write() -> Self {
        Self {
            create: true,
            ..Self::read_write()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = if self.read_only {
            ffi::SQLITE_OPEN_READONLY
        } else {
            ffi::SQLITE_OPEN_READWRITE
        };
        if self.create && !self.read_only {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::memory()
    }
}

impl SqliteConfig {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }

    pub fn memory() -> Self {
        Self::file(":memory:")
    }

    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

struct SqliteInner {
    db: *mut ffi::sqlite3,
    in_transaction: bool,
}

// SAFETY: the handle is only used while holding the connection's mutex.
unsafe impl Send for SqliteInner {}

/// A prepared statement, finalized on drop.
struct Statement {
    raw: *mut ffi::sqlite3_stmt,
}

impl Drop for Statement {
    fn drop(&mut self) {
        // SAFETY: `raw` came from sqlite3_prepare_v2 and is finalized once.
        unsafe {
            ffi::sqlite3_finalize(self.raw);
        }
    }
}

/// A connection to a SQLite database.
///
/// The handle sits behind a mutex, so the connection is `Send + Sync` and
/// can be shared through an `Arc`.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
}

impl SqliteConnection {
    /// Open a connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::data_access(
                DataAccessErrorKind::Connection,
                "invalid database path: contains a null byte",
            )
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        // SAFETY: valid path and out-pointer; the result code is checked.
        let rc = unsafe {
            ffi::sqlite3_open_v2(
                c_path.as_ptr(),
                &mut db,
                config.flags.to_sqlite_flags(),
                ptr::null(),
            )
        };

        if rc != ffi::SQLITE_OK {
            let message = if db.is_null() {
                format!("error code {}", rc)
            } else {
                // SAFETY: sqlite3_open_v2 returns a handle even on failure; it
                // must still be closed.
                unsafe {
                    let message = last_error_message(db);
                    ffi::sqlite3_close(db);
                    message
                }
            };
            return Err(Error::data_access(
                DataAccessErrorKind::Connection,
                format!("failed to open database {}: {}", config.path, message),
            ));
        }

        if config.busy_timeout_ms > 0 {
            let timeout = c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX);
            // SAFETY: db is a valid open handle.
            unsafe {
                ffi::sqlite3_busy_timeout(db, timeout);
            }
        }

        tracing::debug!(path = %config.path, "Opened SQLite database");
        Ok(Self {
            inner: Mutex::new(SqliteInner {
                db,
                in_transaction: false,
            }),
            path: config.path.clone(),
        })
    }

    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, SqliteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a transaction begun through this connection is open.
    pub fn in_transaction(&self) -> bool {
        self.lock().in_transaction
    }

    /// Run one or more `;`-separated statements without parameters (DDL, pragmas).
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let inner = self.lock();
        exec(inner.db, sql)
    }

    /// Rowid of the most recent successful INSERT on this connection.
    pub fn last_insert_rowid(&self) -> i64 {
        let inner = self.lock();
        // SAFETY: db is valid while the connection lives.
        unsafe { ffi::sqlite3_last_insert_rowid(inner.db) }
    }

    fn execute_locked(inner: &SqliteInner, sql: &str, params: &[Value]) -> Result<u64> {
        let stmt = prepare(inner.db, sql)?;
        bind_all(inner.db, &stmt, sql, params)?;

        // SAFETY: stmt is a valid prepared statement.
        let rc = unsafe { ffi::sqlite3_step(stmt.raw) };
        match rc {
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => {
                // SAFETY: db is valid.
                let changes = unsafe { ffi::sqlite3_changes(inner.db) };
                Ok(u64::try_from(changes).unwrap_or(0))
            }
            _ => Err(statement_error(inner.db, sql)),
        }
    }

    fn set_transaction(&self, sql: &str, active: bool) -> Result<()> {
        let mut inner = self.lock();
        if inner.in_transaction == active {
            let (kind, message) = if active {
                (
                    TransactionErrorKind::AlreadyActive,
                    "already in a transaction",
                )
            } else {
                (TransactionErrorKind::NotActive, "not in a transaction")
            };
            return Err(Error::transaction(kind, message));
        }
        exec(inner.db, sql)?;
        inner.in_transaction = active;
        tracing::debug!(statement = sql, path = %self.path, "Transaction state changed");
        Ok(())
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let inner = self.lock();
        if !inner.db.is_null() {
            // SAFETY: db is valid and not used after this point.
            unsafe {
                sqlite3_close_v2(inner.db);
            }
        }
    }
}

impl Connection for SqliteConnection {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let inner = self.lock();
        let stmt = prepare(inner.db, sql)?;
        bind_all(inner.db, &stmt, sql, params)?;

        // SAFETY: stmt is a valid prepared statement.
        let column_count = unsafe { ffi::sqlite3_column_count(stmt.raw) };
        let names = (0..column_count)
            // SAFETY: i is below the column count.
            .map(|i| unsafe { types::column_name(stmt.raw, i) }.unwrap_or_else(|| format!("col{}", i)))
            .collect();
        let columns = Arc::new(ColumnInfo::new(names));

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is a valid prepared statement.
            match unsafe { ffi::sqlite3_step(stmt.raw) } {
                ffi::SQLITE_ROW => {
                    let values = (0..column_count)
                        // SAFETY: the last step returned SQLITE_ROW.
                        .map(|i| unsafe { types::read_column(stmt.raw, i) })
                        .collect();
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => break,
                _ => return Err(statement_error(inner.db, sql)),
            }
        }
        Ok(rows)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let inner = self.lock();
        Self::execute_locked(&inner, sql, params)
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<Value> {
        let inner = self.lock();
        Self::execute_locked(&inner, sql, params)?;
        // SAFETY: db is valid; the lock keeps other statements from interleaving.
        let rowid = unsafe { ffi::sqlite3_last_insert_rowid(inner.db) };
        Ok(Value::BigInt(rowid))
    }

    fn begin(&self) -> Result<()> {
        self.set_transaction("BEGIN", true)
    }

    fn commit(&self) -> Result<()> {
        self.set_transaction("COMMIT", false)
    }

    fn rollback(&self) -> Result<()> {
        self.set_transaction("ROLLBACK", false)
    }
}

// ============================================================================
// Statement helpers
// ============================================================================

fn prepare(db: *mut ffi::sqlite3, sql: &str) -> Result<Statement> {
    let c_sql = CString::new(sql).map_err(|_| {
        Error::data_access(DataAccessErrorKind::Statement, "SQL contains a null byte").with_sql(sql)
    })?;

    let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();
    // SAFETY: all pointers are valid for the duration of the call.
    let rc = unsafe {
        ffi::sqlite3_prepare_v2(
            db,
            c_sql.as_ptr(),
            c_sql.as_bytes().len() as c_int,
            &mut raw,
            ptr::null_mut(),
        )
    };
    if rc != ffi::SQLITE_OK {
        return Err(statement_error(db, sql));
    }
    if raw.is_null() {
        return Err(
            Error::data_access(DataAccessErrorKind::Statement, "empty SQL statement").with_sql(sql),
        );
    }
    Ok(Statement { raw })
}

fn bind_all(db: *mut ffi::sqlite3, stmt: &Statement, sql: &str, params: &[Value]) -> Result<()> {
    for (i, param) in params.iter().enumerate() {
        let index = (i + 1) as c_int;
        // SAFETY: stmt is valid; SQLite range-checks the index.
        let rc = unsafe { types::bind_value(stmt.raw, index, param) };
        if rc != ffi::SQLITE_OK {
            let message = format!(
                "failed to bind parameter {}: {}",
                index,
                // SAFETY: db is valid.
                unsafe { last_error_message(db) }
            );
            return Err(Error::data_access(DataAccessErrorKind::Statement, message).with_sql(sql));
        }
    }
    Ok(())
}

fn exec(db: *mut ffi::sqlite3, sql: &str) -> Result<()> {
    let c_sql = CString::new(sql).map_err(|_| {
        Error::data_access(DataAccessErrorKind::Statement, "SQL contains a null byte").with_sql(sql)
    })?;
    let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

    // SAFETY: all pointers are valid; errmsg is freed below when set.
    let rc = unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };
    if rc == ffi::SQLITE_OK {
        return Ok(());
    }

    let message = if errmsg.is_null() {
        format!("error code {}", rc)
    } else {
        // SAFETY: errmsg was allocated by SQLite and is freed exactly once.
        unsafe {
            let message = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
            ffi::sqlite3_free(errmsg.cast());
            message
        }
    };
    Err(Error::data_access(error_kind(rc), message).with_sql(sql))
}

/// # Safety
/// `db` must be a valid handle.
unsafe fn last_error_message(db: *mut ffi::sqlite3) -> String {
    // SAFETY: forwarded from the caller; errmsg returns a valid C string.
    unsafe { CStr::from_ptr(ffi::sqlite3_errmsg(db)) }
        .to_string_lossy()
        .into_owned()
}

fn statement_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid for every caller.
    let (code, message) = unsafe { (ffi::sqlite3_errcode(db), last_error_message(db)) };
    Error::data_access(error_kind(code), message).with_sql(sql)
}

fn error_kind(code: c_int) -> DataAccessErrorKind {
    match code & 0xff {
        ffi::SQLITE_CANTOPEN | ffi::SQLITE_NOTADB | ffi::SQLITE_IOERR => {
            DataAccessErrorKind::Connection
        }
        _ => DataAccessErrorKind::Statement,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> SqliteConnection {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw(
            "create table persons (id integer primary key autoincrement, name text not null, age integer, photo blob)",
        )
        .unwrap();
        conn
    }

    #[test]
    fn insert_returns_generated_rowid() {
        let conn = people();
        let first = conn
            .insert("insert into persons (name, age) values (?, ?)", &[
                Value::from("Ada"),
                Value::Int(36),
            ])
            .unwrap();
        let second = conn
            .insert("insert into persons (name, age) values (?, ?)", &[
                Value::from("Grace"),
                Value::Int(45),
            ])
            .unwrap();
        assert_eq!(first, Value::BigInt(1));
        assert_eq!(second, Value::BigInt(2));
        assert_eq!(conn.last_insert_rowid(), 2);
    }

    #[test]
    fn query_reads_named_columns() {
        let conn = people();
        conn.insert(
            "insert into persons (name, age, photo) values (?, ?, ?)",
            &[Value::from("Ada"), Value::BigInt(36), Value::Bytes(vec![1, 2])],
        )
        .unwrap();

        let rows = conn
            .query("select * from persons where name = ?", &[Value::from("Ada")])
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(
            row.column_names().collect::<Vec<_>>(),
            ["id", "name", "age", "photo"]
        );
        assert_eq!(row.get_named::<i64>("id").unwrap(), 1);
        assert_eq!(row.get_by_name("age"), Some(&Value::Int(36)));
        assert_eq!(row.get_by_name("photo"), Some(&Value::Bytes(vec![1, 2])));
    }

    #[test]
    fn large_integers_and_nulls_round_trip() {
        let conn = people();
        conn.execute(
            "insert into persons (id, name, age) values (?, ?, ?)",
            &[Value::BigInt(i64::MAX), Value::from("Big"), Value::Null],
        )
        .unwrap();
        let rows = conn.query("select id, age from persons", &[]).unwrap();
        assert_eq!(rows[0].get(0), Some(&Value::BigInt(i64::MAX)));
        assert_eq!(rows[0].get(1), Some(&Value::Null));
    }

    #[test]
    fn execute_counts_changed_rows() {
        let conn = people();
        for name in ["a", "b", "c"] {
            conn.insert("insert into persons (name) values (?)", &[Value::from(name)])
                .unwrap();
        }
        let changed = conn
            .execute("update persons set age = ? where id > ?", &[Value::Int(1), Value::Int(1)])
            .unwrap();
        assert_eq!(changed, 2);
        let none = conn
            .execute("delete from persons where id = ?", &[Value::Int(42)])
            .unwrap();
        assert_eq!(none, 0);
    }

    #[test]
    fn rollback_discards_changes() {
        let conn = people();
        conn.begin().unwrap();
        assert!(conn.in_transaction());
        conn.insert("insert into persons (name) values (?)", &[Value::from("tmp")])
            .unwrap();
        conn.rollback().unwrap();
        assert!(!conn.in_transaction());
        assert!(conn.query("select * from persons", &[]).unwrap().is_empty());

        conn.begin().unwrap();
        conn.insert("insert into persons (name) values (?)", &[Value::from("kept")])
            .unwrap();
        conn.commit().unwrap();
        assert_eq!(conn.query("select * from persons", &[]).unwrap().len(), 1);
    }

    #[test]
    fn transaction_state_is_checked() {
        let conn = people();
        assert!(matches!(
            conn.commit(),
            Err(Error::Transaction(ref e)) if e.kind == TransactionErrorKind::NotActive
        ));
        conn.begin().unwrap();
        assert!(matches!(
            conn.begin(),
            Err(Error::Transaction(ref e)) if e.kind == TransactionErrorKind::AlreadyActive
        ));
    }

    #[test]
    fn statement_errors_carry_sql() {
        let conn = people();
        let err = conn.query("select * from nowhere", &[]).unwrap_err();
        assert_eq!(err.data_access_kind(), Some(DataAccessErrorKind::Statement));
        assert_eq!(err.sql(), Some("select * from nowhere"));
        assert!(err.to_string().contains("no such table"));

        let err = conn
            .execute("insert into persons (name) values (?)", &[Value::Null])
            .unwrap_err();
        assert!(err.to_string().contains("NOT NULL"));
    }

    #[test]
    fn read_only_missing_file_fails_to_open() {
        let config = SqliteConfig::file("/nonexistent/dir/db.sqlite").flags(OpenFlags::read_only());
        let err = SqliteConnection::open(&config).err().unwrap();
        assert_eq!(err.data_access_kind(), Some(DataAccessErrorKind::Connection));
    }
}
