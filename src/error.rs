use rusqlite::ErrorCode;
use thiserror::Error;

/// All failures the engine and its collaborators can surface.
///
/// Every variant carries a message key that the HTTP layer resolves to a
/// localized reason string; the variant itself decides the status code.
/// Raw `rusqlite::Error`s never cross the engine boundary, they are
/// converted here at the operation boundary.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing caller input. Never retried.
    #[error("validation failed: {key}")]
    Validation { key: &'static str },

    /// A referenced tag, image or file does not exist.
    #[error("not found: {key}")]
    NotFound { key: &'static str },

    /// A write would violate a store constraint. The transaction that
    /// produced it has already been rolled back.
    #[error("store integrity violation")]
    Integrity {
        key: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// The store (or another system resource) is unavailable, locked or
    /// failing. Retryable by the caller.
    #[error("operational failure: {key}")]
    Operational {
        key: &'static str,
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// The translation model returned a malformed, empty or non-conforming
    /// response. Nothing was committed.
    #[error("upstream failure: {key}: {detail}")]
    Upstream { key: &'static str, detail: String },
}

impl AppError {
    pub fn validation(key: &'static str) -> Self {
        AppError::Validation { key }
    }

    pub fn not_found(key: &'static str) -> Self {
        AppError::NotFound { key }
    }

    pub fn operational(key: &'static str) -> Self {
        AppError::Operational { key, source: None }
    }

    pub fn upstream(key: &'static str, detail: impl Into<String>) -> Self {
        AppError::Upstream {
            key,
            detail: detail.into(),
        }
    }

    /// Machine-readable kind, also used as the error name in responses.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "validation",
            AppError::NotFound { .. } => "not_found",
            AppError::Integrity { .. } => "integrity",
            AppError::Operational { .. } => "operational",
            AppError::Upstream { .. } => "upstream",
        }
    }

    /// `(category, key)` pair for the localization lookup.
    ///
    /// Client mistakes live under "validation" in the resource files,
    /// server-side failures under "except".
    pub fn message_key(&self) -> (&'static str, &'static str) {
        match self {
            AppError::Validation { key } | AppError::NotFound { key } => ("validation", key),
            AppError::Integrity { key, .. }
            | AppError::Operational { key, .. }
            | AppError::Upstream { key, .. } => ("except", key),
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
                AppError::Integrity {
                    key: "sqlite_integrity",
                    source: err,
                }
            }
            _ => AppError::Operational {
                key: "sqlite_operational",
                source: Some(err),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_violations_map_to_integrity() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT UNIQUE);")
            .unwrap();
        conn.execute("INSERT INTO t (v) VALUES ('x')", []).unwrap();

        let err = conn
            .execute("INSERT INTO t (v) VALUES ('x')", [])
            .unwrap_err();
        let app: AppError = err.into();
        assert_eq!(app.kind(), "integrity");
        assert_eq!(app.message_key(), ("except", "sqlite_integrity"));
    }

    #[test]
    fn other_sqlite_errors_map_to_operational() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err = conn.execute("SELECT * FROM missing", []).unwrap_err();
        let app: AppError = err.into();
        assert_eq!(app.kind(), "operational");
    }
}
