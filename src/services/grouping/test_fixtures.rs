use chrono::{DateTime, TimeZone, Utc};
use geo::{MultiPolygon, Point};
use uuid::Uuid;

use super::geometry::square;
use super::types::{PlotRecord, ProposedGroup};

pub(crate) const VARIETY_A: Uuid = Uuid::from_u128(0xA0);
pub(crate) const VARIETY_B: Uuid = Uuid::from_u128(0xB0);
pub(crate) const SEASON: Uuid = Uuid::from_u128(0x5E);
pub(crate) const CLUSTER: Uuid = Uuid::from_u128(0xC1);

pub(crate) fn utc_date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

/// 10 x 10 square centered on (x, y), one hectare, variety A, planted 2025-03-10.
pub(crate) fn plot_at(seed: u128, x: f64, y: f64) -> PlotRecord {
    PlotRecord {
        plot_id: Uuid::from_u128(seed),
        boundary: square(x - 5.0, y - 5.0, 10.0),
        centroid: Point::new(x, y),
        area: 1.0,
        cultivation_id: Uuid::from_u128(seed + 1_000_000),
        rice_variety_id: VARIETY_A,
        season_id: SEASON,
        cluster_id: Some(CLUSTER),
        planting_date: utc_date(2025, 3, 10),
    }
}

pub(crate) fn group_at(group_number: u32, rice_variety_id: Uuid, x: f64, y: f64) -> ProposedGroup {
    ProposedGroup {
        group_number,
        rice_variety_id,
        plot_count: 1,
        total_area: 1.0,
        planting_window_start: utc_date(2025, 3, 10),
        planting_window_end: utc_date(2025, 3, 10),
        median_planting_date: utc_date(2025, 3, 10),
        plot_ids: Vec::new(),
        cultivation_ids: Vec::new(),
        group_boundary: MultiPolygon::new(vec![square(x - 5.0, y - 5.0, 10.0)]),
        group_centroid: Point::new(x, y),
    }
}
