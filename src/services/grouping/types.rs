use chrono::{DateTime, Utc};
use geo::{MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::geometry::{self, GeometryIssue};

/// One eligible plot with its active cultivation, in the projected CRS used for grouping.
#[derive(Debug, Clone)]
pub struct PlotRecord {
    pub plot_id: Uuid,
    pub boundary: Polygon<f64>,
    pub centroid: Point<f64>,
    pub area: f64,
    pub cultivation_id: Uuid,
    pub rice_variety_id: Uuid,
    pub season_id: Uuid,
    pub cluster_id: Option<Uuid>,
    pub planting_date: DateTime<Utc>,
}

/// A loaded plot whose boundary could not be decoded into a polygon.
#[derive(Debug, Clone)]
pub struct MalformedPlot {
    pub plot_id: Uuid,
    pub area: f64,
    pub cultivation_id: Uuid,
    pub rice_variety_id: Uuid,
    pub season_id: Uuid,
    pub cluster_id: Option<Uuid>,
    pub planting_date: DateTime<Utc>,
    pub issue: GeometryIssue,
}

#[derive(Debug, Clone, Default)]
pub struct PlotSnapshot {
    pub plots: Vec<PlotRecord>,
    pub malformed: Vec<MalformedPlot>,
}

impl PlotSnapshot {
    pub fn len(&self) -> usize {
        self.plots.len() + self.malformed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plots.is_empty() && self.malformed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GroupingParameters {
    /// Maximum centroid distance for two plots to be reachable, in CRS units.
    pub proximity_threshold: f64,
    pub planting_date_tolerance_days: u32,
    /// Hectares.
    pub min_group_area: f64,
    /// Hectares.
    pub max_group_area: f64,
    pub min_plots_per_group: u32,
    pub max_plots_per_group: u32,
    /// Outward expansion applied to each group's unioned boundary.
    #[serde(default)]
    pub border_buffer: f64,
}

impl Default for GroupingParameters {
    fn default() -> Self {
        Self {
            proximity_threshold: 100.0,
            planting_date_tolerance_days: 7,
            min_group_area: 5.0,
            max_group_area: 50.0,
            min_plots_per_group: 3,
            max_plots_per_group: 30,
            border_buffer: 10.0,
        }
    }
}

impl GroupingParameters {
    pub fn validate(&self) -> Result<(), GroupFormationError> {
        if !self.proximity_threshold.is_finite() || self.proximity_threshold <= 0.0 {
            return Err(GroupFormationError::invalid(
                "proximity_threshold",
                "must be a positive distance",
            ));
        }
        if self.planting_date_tolerance_days == 0 {
            return Err(GroupFormationError::invalid(
                "planting_date_tolerance_days",
                "must be at least 1 day",
            ));
        }
        if !self.min_group_area.is_finite() || self.min_group_area < 0.0 {
            return Err(GroupFormationError::invalid(
                "min_group_area",
                "must be a non-negative area",
            ));
        }
        if !self.max_group_area.is_finite() || self.max_group_area < self.min_group_area {
            return Err(GroupFormationError::invalid(
                "max_group_area",
                "must be greater than or equal to min_group_area",
            ));
        }
        if self.min_plots_per_group == 0 {
            return Err(GroupFormationError::invalid(
                "min_plots_per_group",
                "must be at least 1",
            ));
        }
        if self.max_plots_per_group < self.min_plots_per_group {
            return Err(GroupFormationError::invalid(
                "max_plots_per_group",
                "must be greater than or equal to min_plots_per_group",
            ));
        }
        if !self.border_buffer.is_finite() || self.border_buffer < 0.0 {
            return Err(GroupFormationError::invalid(
                "border_buffer",
                "must be a non-negative distance",
            ));
        }
        Ok(())
    }

    /// Width of one planting-date bucket.
    pub fn bucket_width_seconds(&self) -> i64 {
        86_400 * i64::from(self.planting_date_tolerance_days.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProposedGroup {
    pub group_number: u32,
    pub rice_variety_id: Uuid,
    pub plot_count: u32,
    pub total_area: f64,
    pub planting_window_start: DateTime<Utc>,
    pub planting_window_end: DateTime<Utc>,
    pub median_planting_date: DateTime<Utc>,
    /// Ordered by ascending planting date.
    pub plot_ids: Vec<Uuid>,
    pub cultivation_ids: Vec<Uuid>,
    /// GeoJSON MultiPolygon.
    #[serde(with = "geometry::geojson_multipolygon")]
    #[schema(value_type = Object)]
    pub group_boundary: MultiPolygon<f64>,
    /// GeoJSON Point.
    #[serde(with = "geometry::geojson_point")]
    #[schema(value_type = Object)]
    pub group_centroid: Point<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UngroupedReason {
    InvalidGeometry,
    IsolatedLocation,
    TooSpreadOut,
    PlantingDateTooFar,
    NoValidGroup,
    TooManyPlots,
    TooFewPlots,
    TooSmallArea,
    TooLargeArea,
    OtherReason,
}

impl UngroupedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UngroupedReason::InvalidGeometry => "invalid_geometry",
            UngroupedReason::IsolatedLocation => "isolated_location",
            UngroupedReason::TooSpreadOut => "too_spread_out",
            UngroupedReason::PlantingDateTooFar => "planting_date_too_far",
            UngroupedReason::NoValidGroup => "no_valid_group",
            UngroupedReason::TooManyPlots => "too_many_plots",
            UngroupedReason::TooFewPlots => "too_few_plots",
            UngroupedReason::TooSmallArea => "too_small_area",
            UngroupedReason::TooLargeArea => "too_large_area",
            UngroupedReason::OtherReason => "other_reason",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UngroupedPlotInfo {
    pub plot_id: Uuid,
    pub cultivation_id: Uuid,
    pub rice_variety_id: Uuid,
    pub planting_date: DateTime<Utc>,
    /// GeoJSON Point; null when the boundary could not be decoded.
    #[serde(with = "geometry::geojson_point_opt")]
    #[schema(value_type = Option<Object>)]
    pub centroid: Option<Point<f64>>,
    pub area: f64,
    pub reason: UngroupedReason,
    pub nearest_group_number: Option<u32>,
    pub distance_to_nearest_group: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GroupFormationResult {
    pub groups: Vec<ProposedGroup>,
    pub ungrouped_plots: Vec<UngroupedPlotInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupFormationError {
    InvalidParameters { field: &'static str, message: String },
    /// Plot snapshot could not be loaded (connectivity, timeout, query failure).
    Load(String),
    Canceled,
    Internal(String),
}

impl GroupFormationError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameters {
            field,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameters { .. } => "invalid_parameters",
            Self::Load(_) => "plot_load_failed",
            Self::Canceled => "canceled",
            Self::Internal(_) => "internal",
        }
    }
}

impl std::fmt::Display for GroupFormationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidParameters { field, message } => {
                write!(f, "Invalid grouping parameter {}: {}", field, message)
            }
            Self::Load(msg) => write!(f, "Failed to load plot snapshot: {}", msg),
            Self::Canceled => write!(f, "Group formation was canceled"),
            Self::Internal(msg) => write!(f, "Group formation failed: {}", msg),
        }
    }
}

impl std::error::Error for GroupFormationError {}
