use axum::http::StatusCode;
use thiserror::Error;

const GENERIC_FAILURE_MESSAGE: &str = "An unexpected error occurred. Please try again later.";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("AUTHENTICATION: {0}")]
    Authentication(String),
    #[error("PERMISSION_DENIED: {0}")]
    Permission(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("VALIDATION: {0}")]
    Validation(String),
    #[error("DUPLICATE: {0}")]
    Duplicate(String),
    #[error("ALREADY_RECEIVED: {0}")]
    AlreadyReceived(String),
    #[error("RELATION: {0}")]
    Relation(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    /// SQLite reported the database busy or locked.
    #[error("STORE_BUSY: {0}")]
    Busy(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "AuthenticationError",
            Self::Permission(_) => "PermissionError",
            Self::NotFound(_) => "NotFoundError",
            Self::Validation(_) => "ValidationError",
            Self::Duplicate(_) | Self::AlreadyReceived(_) => "DuplicateError",
            Self::Relation(_) => "RelationError",
            Self::Io(_) | Self::Busy(_) | Self::Internal(_) => "UnexpectedError",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Permission(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) | Self::Relation(_) => StatusCode::BAD_REQUEST,
            Self::Duplicate(_) | Self::AlreadyReceived(_) => StatusCode::CONFLICT,
            Self::Io(_) | Self::Busy(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand back to a caller. Store and IO details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            Self::Authentication(message)
            | Self::Permission(message)
            | Self::NotFound(message)
            | Self::Validation(message)
            | Self::Duplicate(message)
            | Self::AlreadyReceived(message)
            | Self::Relation(message) => message.clone(),
            Self::Io(_) | Self::Busy(_) | Self::Internal(_) => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }

    /// Failures that may clear up on a second attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Busy(_))
    }

    /// Anything outside the domain taxonomy.
    pub fn is_unexpected(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Busy(_) | Self::Internal(_))
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        match &value {
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation
                    && matches!(
                        failure.extended_code,
                        rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    ) =>
            {
                Self::Duplicate(
                    message
                        .clone()
                        .unwrap_or_else(|| "Record already exists".to_string()),
                )
            }
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                Self::Busy(value.to_string())
            }
            _ => Self::Internal(value.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Validation(format!("Invalid configuration: {}", value))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::AppError;
    use axum::http::StatusCode;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(AppError::Authentication("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Permission("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Relation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Duplicate("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::AlreadyReceived("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_not_echoed() {
        let error = AppError::Internal("no such table: workspaces".into());
        assert!(!error.client_message().contains("workspaces"));
        assert_eq!(error.kind(), "UnexpectedError");
        assert!(error.is_unexpected());
        assert!(!error.is_transient());
        assert!(!AppError::Permission("nope".into()).is_transient());
    }

    #[test]
    fn only_busy_store_and_io_are_transient() {
        let busy = AppError::from(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        ));
        assert!(matches!(busy, AppError::Busy(_)));
        assert!(busy.is_transient());
        assert_eq!(busy.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!busy.client_message().contains("locked"));
        assert!(AppError::Io("disk".into()).is_transient());

        let parse = AppError::from(serde_json::from_str::<u32>("nope").expect_err("bad json"));
        assert!(!parse.is_transient());
        assert!(!AppError::Internal("database mutex poisoned".into()).is_transient());
    }

    #[test]
    fn unique_violation_becomes_duplicate() {
        let conn = rusqlite::Connection::open_in_memory().expect("open");
        conn.execute_batch("CREATE TABLE t (id TEXT PRIMARY KEY); INSERT INTO t VALUES ('a');")
            .expect("setup");
        let error = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .map_err(AppError::from)
            .expect_err("duplicate insert");
        assert!(matches!(error, AppError::Duplicate(_)));
    }
}
