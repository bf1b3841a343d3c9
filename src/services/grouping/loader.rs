//! Plot snapshot loading from PostgreSQL/PostGIS, and the row-to-record decoding shared with
//! offline snapshot files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::geometry;
use super::types::{GroupFormationError, MalformedPlot, PlotRecord, PlotSnapshot};

/// One plot joined with its active cultivation. The boundary is GeoJSON in the projected CRS.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct PlotRow {
    pub plot_id: Uuid,
    pub boundary: JsonValue,
    pub area: f64,
    pub cultivation_id: Uuid,
    pub rice_variety_id: Uuid,
    pub season_id: Uuid,
    #[serde(default)]
    pub cluster_id: Option<Uuid>,
    pub planting_date: DateTime<Utc>,
}

// DISTINCT ON keeps one cultivation per plot (latest planting) so a plot can only appear once.
const ELIGIBLE_PLOTS_SQL: &str = r#"
SELECT DISTINCT ON (p.id)
    p.id AS plot_id,
    ST_AsGeoJSON(ST_Transform(p.boundary, $3))::jsonb AS boundary,
    p.area::float8 AS area,
    pc.id AS cultivation_id,
    pc.rice_variety_id,
    pc.season_id,
    f.cluster_id,
    pc.planting_date
FROM plots p
JOIN plot_cultivations pc ON pc.plot_id = p.id AND pc.deleted_at IS NULL
JOIN farmers f ON f.id = p.farmer_id
WHERE p.boundary IS NOT NULL
  AND p.deleted_at IS NULL
  AND p.area > 0
  AND pc.planting_date IS NOT NULL
  AND ($1::uuid IS NULL OR f.cluster_id = $1)
  AND ($2::uuid IS NULL OR pc.season_id = $2)
ORDER BY p.id, pc.planting_date DESC, pc.id
"#;

/// Decodes rows into a snapshot. Rows whose boundary does not decode, or whose area is not
/// positive, are kept as malformed so every row is reported.
pub fn build_snapshot(rows: Vec<PlotRow>) -> PlotSnapshot {
    let mut snapshot = PlotSnapshot::default();
    for row in rows {
        let decoded = if !(row.area.is_finite() && row.area > 0.0) {
            Err(geometry::GeometryIssue::NonPositiveArea)
        } else {
            geometry::polygon_from_geojson(&row.boundary).and_then(|polygon| {
                geometry::polygon_centroid(&polygon)
                    .map(|centroid| (polygon, centroid))
                    .ok_or(geometry::GeometryIssue::ZeroArea)
            })
        };
        match decoded {
            Ok((boundary, centroid)) => snapshot.plots.push(PlotRecord {
                plot_id: row.plot_id,
                boundary,
                centroid,
                area: row.area,
                cultivation_id: row.cultivation_id,
                rice_variety_id: row.rice_variety_id,
                season_id: row.season_id,
                cluster_id: row.cluster_id,
                planting_date: row.planting_date,
            }),
            Err(issue) => snapshot.malformed.push(MalformedPlot {
                plot_id: row.plot_id,
                area: row.area,
                cultivation_id: row.cultivation_id,
                rice_variety_id: row.rice_variety_id,
                season_id: row.season_id,
                cluster_id: row.cluster_id,
                planting_date: row.planting_date,
                issue,
            }),
        }
    }
    snapshot
}

pub async fn fetch_rows(
    db: &PgPool,
    srid: i32,
    cluster_id: Option<Uuid>,
    season_id: Option<Uuid>,
) -> Result<Vec<PlotRow>, sqlx::Error> {
    sqlx::query_as::<_, PlotRow>(ELIGIBLE_PLOTS_SQL)
        .bind(cluster_id)
        .bind(season_id)
        .bind(srid)
        .fetch_all(db)
        .await
}

/// Loads eligible plots, racing the query against `cancel`.
pub async fn load_snapshot(
    db: &PgPool,
    srid: i32,
    cluster_id: Option<Uuid>,
    season_id: Option<Uuid>,
    cancel: &CancellationToken,
) -> Result<PlotSnapshot, GroupFormationError> {
    let rows = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(GroupFormationError::Canceled),
        rows = fetch_rows(db, srid, cluster_id, season_id) => {
            rows.map_err(|err| GroupFormationError::Load(err.to_string()))?
        }
    };
    let snapshot = build_snapshot(rows);
    tracing::info!(
        phase = "load",
        plots = snapshot.plots.len(),
        malformed = snapshot.malformed.len(),
        cluster_id = ?cluster_id,
        season_id = ?season_id,
        "plot snapshot loaded"
    );
    Ok(snapshot)
}
