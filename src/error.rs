use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

static EXPOSE_DETAILS: AtomicBool = AtomicBool::new(false);

/// Include internal error details in 500 responses. Local debugging only.
pub fn set_expose_details(enabled: bool) {
    EXPOSE_DETAILS.store(enabled, Ordering::Relaxed);
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self { field: field.to_string(), message: message.into() }
    }

    /// Pushes an error when `value` is longer than the column allows.
    pub fn check_len(errors: &mut Vec<FieldError>, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            errors.push(Self::new(field, format!("Must be at most {max} characters")));
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Validation { message: String, errors: Vec<FieldError> },
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unavailable(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Fails with a validation error when `errors` is non-empty.
    pub fn check(errors: Vec<FieldError>) -> AppResult<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Self::Validation { message: "Validation failed".into(), errors })
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::not_found("Resource not found"),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some("23505") => AppError::conflict("Resource already exists"),
                Some("23503") => {
                    AppError::conflict("Resource is referenced by other records")
                }
                Some("23514") => AppError::bad_request(db.message().to_string()),
                Some("22001") => AppError::bad_request("Value is too long for its field"),
                Some("22003") => AppError::bad_request("Numeric value is out of range"),
                _ => AppError::Internal(err.into()),
            },
            _ => AppError::Internal(err.into()),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::Validation { message, errors } => {
                json!({ "message": message, "errors": errors })
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {e:#}");
                if EXPOSE_DETAILS.load(Ordering::Relaxed) {
                    json!({ "message": "Internal server error", "detail": format!("{e:?}") })
                } else {
                    json!({ "message": "Internal server error" })
                }
            }
            other => json!({ "message": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_errors_list_fields() {
        let err = AppError::check(vec![FieldError::new("email", "Email is invalid")]).unwrap_err();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["errors"][0]["field"], "email");
    }

    #[test]
    fn empty_error_list_passes() {
        assert!(AppError::check(vec![]).is_ok());
    }

    #[tokio::test]
    async fn internal_errors_hide_details_by_default() {
        let resp = AppError::Internal(anyhow::anyhow!("disk on fire")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["message"], "Internal server error");
        assert!(body.get("detail").is_none());
    }

    #[test]
    fn row_not_found_maps_to_404() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[derive(Debug)]
    struct PgFailure(&'static str);

    impl std::fmt::Display for PgFailure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "postgres error {}", self.0)
        }
    }

    impl std::error::Error for PgFailure {}

    impl sqlx::error::DatabaseError for PgFailure {
        fn message(&self) -> &str {
            "database failure"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(self.0.into())
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    fn pg(code: &'static str) -> AppError {
        sqlx::Error::Database(Box::new(PgFailure(code))).into()
    }

    #[test]
    fn constraint_codes_map_to_client_errors() {
        assert_eq!(pg("23505").status(), StatusCode::CONFLICT);
        assert_eq!(pg("23503").status(), StatusCode::CONFLICT);
        assert_eq!(pg("23514").status(), StatusCode::BAD_REQUEST);
        assert_eq!(pg("22001").status(), StatusCode::BAD_REQUEST);
        assert_eq!(pg("22003").status(), StatusCode::BAD_REQUEST);
        assert_eq!(pg("40001").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn length_check_counts_characters() {
        let mut errors = Vec::new();
        FieldError::check_len(&mut errors, "name", &"é".repeat(10), 10);
        assert!(errors.is_empty());
        FieldError::check_len(&mut errors, "name", &"a".repeat(11), 10);
        assert_eq!(errors, vec![FieldError::new("name", "Must be at most 10 characters")]);
    }

    #[tokio::test]
    async fn conflict_carries_message() {
        let resp = AppError::conflict("Email already registered").into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(resp).await["message"], "Email already registered");
    }
}
