use ballot_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found")]
    NotFound,
    #[error("precondition failed")]
    PreconditionFailed,
    #[error("{0}")]
    Validation(String),
    #[error("database error: {0}")]
    Database(DbError),
}

impl From<DbError> for CoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound => CoreError::NotFound,
            DbError::PreconditionFailed => CoreError::PreconditionFailed,
            other => CoreError::Database(other),
        }
    }
}
