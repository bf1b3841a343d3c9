use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::types::{GroupingParameters, PlotRecord};

/// Fixed-width planting-date window index. Windows are aligned to the Unix epoch, so two plots a
/// day apart can still land in neighboring buckets.
pub fn date_bucket(planting_date: DateTime<Utc>, params: &GroupingParameters) -> i64 {
    planting_date
        .timestamp()
        .div_euclid(params.bucket_width_seconds())
}

/// Splits one spatial cluster by date bucket. Members keep arena order inside each bucket.
pub fn bucket_members(
    plots: &[PlotRecord],
    members: &[usize],
    params: &GroupingParameters,
) -> BTreeMap<i64, Vec<usize>> {
    let mut buckets: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for &idx in members {
        buckets
            .entry(date_bucket(plots[idx].planting_date, params))
            .or_default()
            .push(idx);
    }
    buckets
}
