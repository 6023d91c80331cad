pub mod admin;
pub mod public;
pub mod staff;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;

use crate::queue::{PersistenceError, QueueError};

impl ResponseError for QueueError {
    fn status_code(&self) -> StatusCode {
        match self {
            QueueError::Validation(_) => StatusCode::BAD_REQUEST,
            QueueError::Authorization(_) => StatusCode::FORBIDDEN,
            QueueError::NotFound { .. } => StatusCode::NOT_FOUND,
            QueueError::State(_) => StatusCode::CONFLICT,
            QueueError::Persistence(err) if err.is_conflict() => StatusCode::CONFLICT,
            QueueError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(json!({ "error": message }))
    }
}

/// Maps a failed administrative write, turning constraint violations into
/// client errors.
pub(crate) fn write_failed(entity: &'static str, err: sqlx::Error) -> QueueError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return QueueError::Validation(format!("{entity} already exists"));
        }
        if db_err.is_foreign_key_violation() {
            return QueueError::Validation(format!("{entity} refers to an unknown branch"));
        }
    }
    log::warn!("Failed to write {entity}: {err}");
    QueueError::Persistence(PersistenceError::Database(err))
}

/// Trims optional form text, treating blanks as absent.
pub(crate) fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
