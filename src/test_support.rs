use crate::config::GroupingConfig;
use crate::db;
use crate::services::grouping::{GroupFormationEngine, GroupingParameters};
use crate::state::AppState;
use std::sync::Arc;

pub fn test_config() -> GroupingConfig {
    GroupingConfig {
        // Nothing listens on port 1; handlers that reach the database fail fast.
        database_url: "postgresql://postgres@127.0.0.1:1/plots".to_string(),
        database_max_connections: 1,
        srid: 32648,
        max_parallel_partitions: 2,
        default_parameters: GroupingParameters::default(),
    }
}

pub fn test_state() -> AppState {
    let config = test_config();
    let db = db::connect_lazy(&config.database_url, config.database_max_connections)
        .expect("lazy pool");
    let engine = Arc::new(GroupFormationEngine::new(db.clone(), &config));
    AppState { config, db, engine }
}
