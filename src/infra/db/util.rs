use crate::application::repos::RepoError;

// SQLSTATE classes the course schema can raise. Range and state checks
// back service-level validation, so a check firing is an integrity
// fault rather than bad input.
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";
const INVALID_TEXT_REPRESENTATION: &str = "22P02";
const QUERY_CANCELED: &str = "57014";

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => RepoError::Duplicate {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            },
            Some(FOREIGN_KEY_VIOLATION) | Some(INVALID_TEXT_REPRESENTATION) => {
                RepoError::InvalidInput {
                    message: db.message().to_string(),
                }
            }
            Some(CHECK_VIOLATION) => RepoError::Integrity {
                message: db.message().to_string(),
            },
            Some(QUERY_CANCELED) => RepoError::Timeout,
            _ => RepoError::from_persistence(db.message()),
        },
        other => RepoError::from_persistence(other),
    }
}
