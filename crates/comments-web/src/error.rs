//! The five error kinds of `spec.md` §7, mapped to the `{"error",
//! "data_errors"}` response body.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use comments_db::DbError;
use comments_report::DownloadError;
use serde::Serialize;
use serde_json::Value as JsonValue;
use snafu::Snafu;
use tracing::error;

#[derive(Debug, Snafu)]
pub enum ApiError {
    #[snafu(display("{message}"))]
    Validation {
        message: String,
        data_errors: JsonValue,
    },
    #[snafu(display("{message}"))]
    NotFound { message: String },
    #[snafu(display("{message}"))]
    PermissionDenied {
        message: String,
        data_errors: JsonValue,
    },
    #[snafu(display("{message}"))]
    Conflict {
        message: String,
        data_errors: JsonValue,
    },
    #[snafu(display("Internal error"))]
    Unexpected {
        #[snafu(source(false))]
        source: comments_util_error::BoxedError,
    },
}

impl ApiError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        ApiError::Validation {
            data_errors: serde_json::json!({ field: message }),
            message,
        }
    }

    pub fn permission_denied(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        ApiError::PermissionDenied {
            data_errors: serde_json::json!({ field: message }),
            message,
        }
    }

    pub fn conflict(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        ApiError::Conflict {
            data_errors: serde_json::json!({ field: message }),
            message,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound {
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    data_errors: JsonValue,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            ApiError::Conflict { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unexpected { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(err = %self, "Unexpected error handling request");
        }

        let body = ErrorBody {
            error: self.to_string(),
            data_errors: match &self {
                ApiError::Validation { data_errors, .. }
                | ApiError::PermissionDenied { data_errors, .. }
                | ApiError::Conflict { data_errors, .. } => data_errors.clone(),
                ApiError::NotFound { .. } | ApiError::Unexpected { .. } => JsonValue::Object(Default::default()),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Maps the typed per-entity `DoesNotExist` variants to 404, `CommentHasChildren`
/// to 409/Conflict, and everything else (storage failures) to 500 — the
/// "Database not found conditions are mapped to typed per-entity errors and
/// translated to 404 by the handler" policy of `spec.md` §7.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::InstanceDoesNotExist { itype_id, i_id, .. } => ApiError::not_found(format!(
                "Instance {itype_id}/{i_id} does not exist"
            )),
            DbError::CommentDoesNotExist { id, .. } => {
                ApiError::not_found(format!("Comment {id} does not exist"))
            }
            DbError::DlRequestDoesNotExist { id, .. } => {
                ApiError::not_found(format!("DlRequest {id} does not exist"))
            }
            DbError::CommentHasChildren { id, children_cnt, .. } => ApiError::conflict(
                "comment_id",
                format!("Comment {id} still has {children_cnt} children"),
            ),
            other => ApiError::Unexpected {
                source: Box::new(other),
            },
        }
    }
}

impl From<DownloadError> for ApiError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::MissingScope { .. } => {
                ApiError::validation("_", "Instance or Author should be specified.")
            }
            DownloadError::Db { source } => source.into(),
            other => ApiError::Unexpected {
                source: Box::new(other),
            },
        }
    }
}
