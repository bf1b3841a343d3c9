use crate::config::GroupingConfig;
use crate::services::grouping::GroupFormationEngine;
use axum::extract::FromRef;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: GroupingConfig,
    pub db: PgPool,
    pub engine: Arc<GroupFormationEngine>,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> PgPool {
        state.db.clone()
    }
}

impl FromRef<AppState> for Arc<GroupFormationEngine> {
    fn from_ref(state: &AppState) -> Arc<GroupFormationEngine> {
        state.engine.clone()
    }
}
