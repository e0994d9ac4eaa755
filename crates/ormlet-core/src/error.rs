//! Error types for ormlet operations.

use std::fmt;

/// The primary error type for all ormlet operations.
#[derive(Debug)]
pub enum Error {
    /// Invalid or missing entity mapping metadata
    Mapping(MappingError),
    /// Operation attempted on a closed session
    SessionClosed,
    /// Operation not allowed in the current state (e.g. removing a detached entity)
    IllegalState(String),
    /// Failure reported by the data store or the statement executor
    DataAccess(DataAccessError),
    /// Transaction lifecycle misuse
    Transaction(TransactionError),
    /// Malformed JQL input
    QueryTranslation(QueryTranslationError),
    /// Value conversion errors
    Type(TypeError),
}

#[derive(Debug)]
pub struct MappingError {
    /// Simple name of the entity type the metadata belongs to.
    pub entity: String,
    pub message: String,
}

#[derive(Debug)]
pub struct DataAccessError {
    pub kind: DataAccessErrorKind,
    pub message: String,
    /// The SQL that was executing, when known.
    pub sql: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataAccessErrorKind {
    /// Failed to open or use the underlying connection
    Connection,
    /// Statement preparation or execution failed
    Statement,
    /// UPDATE or DELETE matched no row
    NoRowsAffected,
    /// Versioned UPDATE matched no row: the row was modified or deleted concurrently
    OptimisticLock,
    /// A single-result query returned more than one row
    NonUniqueResult,
    /// INSERT did not produce a generated key
    GeneratedKey,
    /// A row could not be turned into an entity
    Hydration,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// `begin` called while a transaction is active
    AlreadyActive,
    /// `commit` or `rollback` called with no active transaction
    NotActive,
    /// The store rejected BEGIN/COMMIT/ROLLBACK
    Failed,
}

#[derive(Debug)]
pub struct QueryTranslationError {
    /// The JQL text that failed to translate.
    pub query: String,
    pub message: String,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl Error {
    /// Build a mapping error for the given entity.
    pub fn mapping(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Mapping(MappingError {
            entity: entity.into(),
            message: message.into(),
        })
    }

    /// Build a data access error without an underlying cause.
    pub fn data_access(kind: DataAccessErrorKind, message: impl Into<String>) -> Self {
        Error::DataAccess(DataAccessError {
            kind,
            message: message.into(),
            sql: None,
            source: None,
        })
    }

    pub fn transaction(kind: TransactionErrorKind, message: impl Into<String>) -> Self {
        Error::Transaction(TransactionError {
            kind,
            message: message.into(),
        })
    }

    pub fn query_translation(query: impl Into<String>, message: impl Into<String>) -> Self {
        Error::QueryTranslation(QueryTranslationError {
            query: query.into(),
            message: message.into(),
        })
    }

    /// Attach the SQL being executed to a data access error. Other variants pass through.
    #[must_use]
    pub fn with_sql(self, sql: &str) -> Self {
        match self {
            Error::DataAccess(mut e) => {
                if e.sql.is_none() {
                    e.sql = Some(sql.to_string());
                }
                Error::DataAccess(e)
            }
            other => other,
        }
    }

    /// The data access kind, if this is a data access error.
    pub fn data_access_kind(&self) -> Option<DataAccessErrorKind> {
        match self {
            Error::DataAccess(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Is this an optimistic lock failure?
    pub fn is_optimistic_lock(&self) -> bool {
        self.data_access_kind() == Some(DataAccessErrorKind::OptimisticLock)
    }

    /// Get the SQL that caused this error, if available.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::DataAccess(e) => e.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Mapping(e) => write!(f, "Mapping error for entity '{}': {}", e.entity, e.message),
            Error::SessionClosed => write!(f, "Current session is closed"),
            Error::IllegalState(msg) => write!(f, "Illegal state: {}", msg),
            Error::DataAccess(e) => {
                if let Some(sql) = &e.sql {
                    write!(f, "Data access error: {} (sql: {})", e.message, sql)
                } else {
                    write!(f, "Data access error: {}", e.message)
                }
            }
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::QueryTranslation(e) => {
                write!(f, "Query translation error: {} in '{}'", e.message, e.query)
            }
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::DataAccess(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for DataAccessErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataAccessErrorKind::Connection => "connection",
            DataAccessErrorKind::Statement => "statement",
            DataAccessErrorKind::NoRowsAffected => "no rows affected",
            DataAccessErrorKind::OptimisticLock => "optimistic lock",
            DataAccessErrorKind::NonUniqueResult => "non-unique result",
            DataAccessErrorKind::GeneratedKey => "generated key",
            DataAccessErrorKind::Hydration => "hydration",
        };
        f.write_str(name)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<MappingError> for Error {
    fn from(err: MappingError) -> Self {
        Error::Mapping(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_sql_only_touches_data_access() {
        let err = Error::data_access(DataAccessErrorKind::NoRowsAffected, "nothing deleted")
            .with_sql("delete from persons where id = ?");
        assert_eq!(err.sql(), Some("delete from persons where id = ?"));
        assert!(err.to_string().contains("nothing deleted"));

        let err = Error::SessionClosed.with_sql("select 1");
        assert!(err.sql().is_none());
        assert_eq!(err.to_string(), "Current session is closed");
    }

    #[test]
    fn optimistic_lock_is_detectable() {
        let err = Error::data_access(DataAccessErrorKind::OptimisticLock, "stale version");
        assert!(err.is_optimistic_lock());
        assert!(!Error::IllegalState("x".into()).is_optimistic_lock());
    }

    #[test]
    fn source_is_exposed_for_data_access() {
        let io = std::io::Error::other("disk gone");
        let err = Error::DataAccess(DataAccessError {
            kind: DataAccessErrorKind::Connection,
            message: "open failed".to_string(),
            sql: None,
            source: Some(Box::new(io)),
        });
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("disk gone"));
    }

    #[test]
    fn mapping_display_names_entity() {
        let err = Error::mapping("Person", "identifier is not specified");
        assert_eq!(
            err.to_string(),
            "Mapping error for entity 'Person': identifier is not specified"
        );
    }
}
