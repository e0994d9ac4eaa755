//! Transaction lifecycle.

use ormlet_core::Result;

/// Explicit transaction control over a session's connection.
///
/// `begin` while a transaction is active, and `commit` or `rollback` while
/// none is, fail with a `TransactionError`.
pub trait TransactionManager {
    fn begin(&mut self) -> Result<()>;

    /// Flush pending actions, then commit.
    fn commit(&mut self) -> Result<()>;

    /// Discard pending actions and roll back.
    fn rollback(&mut self) -> Result<()>;

    fn is_active(&self) -> bool;
}
