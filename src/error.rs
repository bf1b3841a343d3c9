use axum::http::StatusCode;

use crate::services::grouping::GroupFormationError;

pub fn map_grouping_error(err: GroupFormationError) -> (StatusCode, String) {
    let status = match &err {
        GroupFormationError::InvalidParameters { .. } => StatusCode::BAD_REQUEST,
        GroupFormationError::Load(_) => StatusCode::SERVICE_UNAVAILABLE,
        GroupFormationError::Canceled => StatusCode::SERVICE_UNAVAILABLE,
        GroupFormationError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    match status {
        StatusCode::BAD_REQUEST => {
            tracing::warn!(code = err.code(), error = %err, "rejected grouping request");
            (status, err.to_string())
        }
        StatusCode::INTERNAL_SERVER_ERROR => {
            tracing::error!(code = err.code(), error = %err, "internal error");
            (status, "Internal server error".to_string())
        }
        _ => {
            tracing::error!(code = err.code(), error = %err, status = %status, "grouping failed");
            (status, err.to_string())
        }
    }
}
