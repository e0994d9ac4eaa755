//! SQLite connection for ormlet.
//!
// FFI bindings require unsafe code
#![allow(unsafe_code)]
//!
//! [`SqliteConnection`] implements [`ormlet_core::Connection`] on top of the
//! SQLite C library, compiled in through `libsqlite3-sys`.
//!
//! # Example
//!
//! ```rust,ignore
//! use ormlet_sqlite::SqliteConnection;
//! use ormlet_core::{Connection, Value};
//!
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_raw("create table persons (id integer primary key, name text)")?;
//! let id = conn.insert("insert into persons (name) values (?)", &[Value::from("Ada")])?;
//! ```
//!
//! # Thread Safety
//!
//! `SqliteConnection` is `Send + Sync`; a mutex serializes access to the
//! underlying handle.

pub mod connection;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection};

use std::ffi::CStr;

/// Version string of the linked SQLite library.
pub fn sqlite_version() -> &'static str {
    // SAFETY: sqlite3_libversion returns a static NUL-terminated string.
    unsafe { CStr::from_ptr(libsqlite3_sys::sqlite3_libversion()) }
        .to_str()
        .unwrap_or("unknown")
}

/// Version number of the linked SQLite library, e.g. `3046000`.
pub fn sqlite_version_number() -> i32 {
    // SAFETY: no preconditions.
    unsafe { libsqlite3_sys::sqlite3_libversion_number() }
}
