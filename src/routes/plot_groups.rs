use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::map_grouping_error;
use crate::services::grouping::{GroupFormationResult, GroupingParameters};
use crate::state::AppState;

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GroupFormationRequest {
    #[serde(default)]
    pub cluster_id: Option<Uuid>,
    #[serde(default)]
    pub season_id: Option<Uuid>,
    /// Falls back to the configured defaults when omitted.
    #[serde(default)]
    pub parameters: Option<GroupingParameters>,
}

#[utoipa::path(
    post,
    path = "/api/plot-groups/proposals",
    tag = "plot_groups",
    request_body = GroupFormationRequest,
    responses(
        (status = 200, description = "Proposed groups and ungrouped plots", body = GroupFormationResult),
        (status = 400, description = "Invalid grouping parameters"),
        (status = 503, description = "Plot snapshot could not be loaded")
    )
)]
pub(crate) async fn propose_groups(
    State(state): State<AppState>,
    Json(request): Json<GroupFormationRequest>,
) -> Result<Json<GroupFormationResult>, (StatusCode, String)> {
    let params = request
        .parameters
        .unwrap_or_else(|| state.config.default_parameters.clone());

    // Dropping the handler (client went away) cancels the run.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let result = state
        .engine
        .form_groups(&params, request.cluster_id, request.season_id, &cancel)
        .await
        .map_err(map_grouping_error)?;
    Ok(Json(result))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/plot-groups/proposals", post(propose_groups))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .nest("/api", router())
            .with_state(crate::test_support::test_state())
    }

    #[tokio::test]
    async fn rejects_invalid_parameters_with_bad_request() {
        let body = serde_json::json!({
            "parameters": {
                "proximity_threshold": 100.0,
                "planting_date_tolerance_days": 7,
                "min_group_area": 10.0,
                "max_group_area": 5.0,
                "min_plots_per_group": 3,
                "max_plots_per_group": 30
            }
        });
        let resp = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/plot-groups/proposals")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("max_group_area"));
    }

    #[tokio::test]
    async fn rejects_malformed_json() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/plot-groups/proposals")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"cluster_id\": 42}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    }

    #[test]
    fn request_fields_are_optional() {
        let request: GroupFormationRequest = serde_json::from_str("{}").unwrap();
        assert!(request.cluster_id.is_none());
        assert!(request.season_id.is_none());
        assert!(request.parameters.is_none());
    }
}
