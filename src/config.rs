use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::services::grouping::GroupingParameters;

/// Default projected CRS for grouping (WGS 84 / UTM zone 48N).
const DEFAULT_SRID: i32 = 32648;
const MAX_PARALLEL_PARTITIONS_CAP: usize = 64;

pub(crate) fn overrides_path() -> Option<PathBuf> {
    env_optional_string("PLOT_GROUPING_CONFIG_PATH").map(PathBuf::from)
}

/// Partial parameter set read from the overrides file; absent keys keep the env value.
#[derive(Debug, Clone, Default, Deserialize)]
struct ParameterOverrides {
    #[serde(default)]
    proximity_threshold: Option<f64>,
    #[serde(default)]
    planting_date_tolerance_days: Option<u32>,
    #[serde(default)]
    min_group_area: Option<f64>,
    #[serde(default)]
    max_group_area: Option<f64>,
    #[serde(default)]
    min_plots_per_group: Option<u32>,
    #[serde(default)]
    max_plots_per_group: Option<u32>,
    #[serde(default)]
    border_buffer: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GroupingConfigOverrides {
    #[serde(default)]
    database_url: Option<String>,
    #[serde(default)]
    srid: Option<i32>,
    #[serde(default)]
    max_parallel_partitions: Option<usize>,
    #[serde(default)]
    default_parameters: Option<ParameterOverrides>,
}

fn load_overrides(path: &Path) -> Option<GroupingConfigOverrides> {
    if !path.exists() {
        return None;
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to read grouping config; using env defaults"
            );
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to parse grouping config; using env defaults"
            );
            None
        }
    }
}

fn apply_overrides(config: &mut GroupingConfig, overrides: &GroupingConfigOverrides) {
    if let Some(url) = overrides
        .database_url
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        config.database_url = normalize_database_url(url.to_string());
    }
    if let Some(srid) = overrides.srid.filter(|v| *v > 0) {
        config.srid = srid;
    }
    if let Some(value) = overrides.max_parallel_partitions.filter(|v| *v != 0) {
        config.max_parallel_partitions = value.min(MAX_PARALLEL_PARTITIONS_CAP);
    }
    if let Some(params) = overrides.default_parameters.as_ref() {
        let target = &mut config.default_parameters;
        if let Some(value) = params.proximity_threshold {
            target.proximity_threshold = value;
        }
        if let Some(value) = params.planting_date_tolerance_days {
            target.planting_date_tolerance_days = value;
        }
        if let Some(value) = params.min_group_area {
            target.min_group_area = value;
        }
        if let Some(value) = params.max_group_area {
            target.max_group_area = value;
        }
        if let Some(value) = params.min_plots_per_group {
            target.min_plots_per_group = value;
        }
        if let Some(value) = params.max_plots_per_group {
            target.max_plots_per_group = value;
        }
        if let Some(value) = params.border_buffer {
            target.border_buffer = value;
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupingConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    /// Projected CRS that boundaries are transformed into before grouping.
    pub srid: i32,
    pub max_parallel_partitions: usize,
    /// Used when a request does not carry its own parameters.
    pub default_parameters: GroupingParameters,
}

impl GroupingConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = GroupingParameters::default();
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        let mut config = Self {
            database_url: normalize_database_url(env_string(
                "PLOT_GROUPING_DATABASE_URL",
                &env_string("DATABASE_URL", "postgresql://postgres@localhost/plots"),
            )),
            database_max_connections: env_u32("PLOT_GROUPING_DATABASE_MAX_CONNECTIONS", 10)
                .clamp(1, 100),
            srid: env_i32("PLOT_GROUPING_SRID", DEFAULT_SRID),
            max_parallel_partitions: env_usize("PLOT_GROUPING_MAX_PARALLEL_PARTITIONS", available)
                .clamp(1, MAX_PARALLEL_PARTITIONS_CAP),
            default_parameters: GroupingParameters {
                proximity_threshold: env_f64(
                    "PLOT_GROUPING_PROXIMITY_THRESHOLD",
                    defaults.proximity_threshold,
                ),
                planting_date_tolerance_days: env_u32(
                    "PLOT_GROUPING_PLANTING_DATE_TOLERANCE_DAYS",
                    defaults.planting_date_tolerance_days,
                ),
                min_group_area: env_f64("PLOT_GROUPING_MIN_GROUP_AREA", defaults.min_group_area),
                max_group_area: env_f64("PLOT_GROUPING_MAX_GROUP_AREA", defaults.max_group_area),
                min_plots_per_group: env_u32(
                    "PLOT_GROUPING_MIN_PLOTS_PER_GROUP",
                    defaults.min_plots_per_group,
                ),
                max_plots_per_group: env_u32(
                    "PLOT_GROUPING_MAX_PLOTS_PER_GROUP",
                    defaults.max_plots_per_group,
                ),
                border_buffer: env_f64("PLOT_GROUPING_BORDER_BUFFER", defaults.border_buffer),
            },
        };

        if let Some(path) = overrides_path() {
            if let Some(overrides) = load_overrides(&path) {
                apply_overrides(&mut config, &overrides);
            }
        }
        if config.srid <= 0 {
            anyhow::bail!("PLOT_GROUPING_SRID must be a positive EPSG code");
        }
        config
            .default_parameters
            .validate()
            .context("default grouping parameters are invalid")?;
        Ok(config)
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_optional_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_i32(key: &str, default: i32) -> i32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<i32>().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
}

pub(crate) fn normalize_database_url(url: String) -> String {
    if let Some(stripped) = url.strip_prefix("postgresql+psycopg://") {
        return format!("postgresql://{stripped}");
    }
    if let Some(stripped) = url.strip_prefix("postgresql+asyncpg://") {
        return format!("postgresql://{stripped}");
    }
    url
}
