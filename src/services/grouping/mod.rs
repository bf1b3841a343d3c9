//! Plot group formation: partitions plots into spatially coherent, temporally aligned production
//! groups and explains every plot that could not be grouped.

pub mod aggregate;
pub mod boundary;
pub mod classify;
pub mod coherence;
pub mod engine;
pub mod geometry;
pub mod loader;
pub mod spatial;
pub mod summary;
pub mod temporal;
pub mod types;

#[cfg(test)]
pub(crate) mod test_fixtures;

use std::time::Instant;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::GroupingConfig;

pub use engine::{form_groups_from_snapshot, run_snapshot};
pub use summary::RunSummary;
pub use types::{
    GroupFormationError, GroupFormationResult, GroupingParameters, MalformedPlot, PlotRecord,
    PlotSnapshot, ProposedGroup, UngroupedPlotInfo, UngroupedReason,
};

/// Stateless entry point bound to a database and the configured CRS.
#[derive(Clone)]
pub struct GroupFormationEngine {
    db: PgPool,
    srid: i32,
    max_parallel_partitions: usize,
}

impl GroupFormationEngine {
    pub fn new(db: PgPool, config: &GroupingConfig) -> Self {
        Self {
            db,
            srid: config.srid,
            max_parallel_partitions: config.max_parallel_partitions.max(1),
        }
    }

    /// Loads eligible plots for the filters and forms groups over them. Parameters are validated
    /// before anything is loaded.
    pub async fn form_groups(
        &self,
        params: &GroupingParameters,
        cluster_id: Option<Uuid>,
        season_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Result<GroupFormationResult, GroupFormationError> {
        params.validate()?;
        let span = tracing::info_span!(
            "plot_grouping",
            cluster_id = ?cluster_id,
            season_id = ?season_id,
            srid = self.srid
        );
        async move {
            let started = Instant::now();
            let snapshot =
                loader::load_snapshot(&self.db, self.srid, cluster_id, season_id, cancel).await?;
            let result = form_groups_from_snapshot(
                snapshot,
                params,
                self.max_parallel_partitions,
                cancel,
            )
            .await?;
            RunSummary::from_result(&result).log(started.elapsed());
            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// Forms groups over an already loaded snapshot.
    pub async fn form_groups_from_snapshot(
        &self,
        snapshot: PlotSnapshot,
        params: &GroupingParameters,
        cancel: &CancellationToken,
    ) -> Result<GroupFormationResult, GroupFormationError> {
        let started = Instant::now();
        let result = form_groups_from_snapshot(
            snapshot,
            params,
            self.max_parallel_partitions,
            cancel,
        )
        .instrument(tracing::info_span!("plot_grouping", source = "snapshot"))
        .await?;
        RunSummary::from_result(&result).log(started.elapsed());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> GroupFormationEngine {
        let config = GroupingConfig {
            database_url: "postgresql://postgres@127.0.0.1:1/plots".to_string(),
            database_max_connections: 1,
            srid: 32648,
            max_parallel_partitions: 2,
            default_parameters: GroupingParameters::default(),
        };
        let db = crate::db::connect_lazy(&config.database_url, 1).unwrap();
        GroupFormationEngine::new(db, &config)
    }

    #[tokio::test]
    async fn invalid_parameters_are_rejected_before_loading() {
        let params = GroupingParameters {
            proximity_threshold: 0.0,
            ..GroupingParameters::default()
        };
        let err = engine()
            .form_groups(&params, None, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_parameters");
    }

    #[tokio::test]
    async fn snapshot_entry_point_handles_empty_input() {
        let result = engine()
            .form_groups_from_snapshot(
                PlotSnapshot::default(),
                &GroupingParameters::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(result.groups.is_empty());
        assert!(result.ungrouped_plots.is_empty());
    }
}
