use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value as JsonValue;
use utoipa::OpenApi;

use crate::routes::{health, plot_groups};
use crate::services::grouping::{
    GroupFormationResult, GroupingParameters, ProposedGroup, UngroupedPlotInfo, UngroupedReason,
};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(title = "Plot grouping API"),
    paths(health::healthz_handler, plot_groups::propose_groups),
    components(schemas(
        health::HealthResponse,
        plot_groups::GroupFormationRequest,
        GroupingParameters,
        GroupFormationResult,
        ProposedGroup,
        UngroupedPlotInfo,
        UngroupedReason
    )),
    tags((name = "plot_groups", description = "Production group proposals"))
)]
pub struct ApiDoc;

pub fn openapi_json() -> JsonValue {
    serde_json::to_value(ApiDoc::openapi()).unwrap_or(JsonValue::Null)
}

async fn openapi_handler() -> Json<JsonValue> {
    Json(openapi_json())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_handler))
}
