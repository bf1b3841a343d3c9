use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::types::{GroupingParameters, PlotRecord, UngroupedReason};

/// Plots sharing (variety, spatial cluster, date bucket).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub rice_variety_id: Uuid,
    pub spatial_cluster_id: u32,
    pub date_bucket: i64,
    /// Arena indices ordered by ascending planting date, then plot id.
    pub members: Vec<usize>,
    pub plot_count: u32,
    pub total_area: f64,
    pub planting_window_start: DateTime<Utc>,
    pub planting_window_end: DateTime<Utc>,
    pub median_planting_date: DateTime<Utc>,
}

impl Candidate {
    pub fn sort_key(&self) -> (Uuid, u32, i64) {
        (self.rice_variety_id, self.spatial_cluster_id, self.date_bucket)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateRejection {
    TooManyPlots,
    TooFewPlots,
    TooSmallArea,
    TooLargeArea,
}

impl CandidateRejection {
    pub fn reason(self) -> UngroupedReason {
        match self {
            CandidateRejection::TooManyPlots => UngroupedReason::TooManyPlots,
            CandidateRejection::TooFewPlots => UngroupedReason::TooFewPlots,
            CandidateRejection::TooSmallArea => UngroupedReason::TooSmallArea,
            CandidateRejection::TooLargeArea => UngroupedReason::TooLargeArea,
        }
    }
}

/// Builds the candidate for one bucket. Returns `None` for an empty bucket.
pub fn build_candidate(
    plots: &[PlotRecord],
    rice_variety_id: Uuid,
    spatial_cluster_id: u32,
    date_bucket: i64,
    members: &[usize],
) -> Option<Candidate> {
    let mut members = members.to_vec();
    members.sort_by_key(|&idx| (plots[idx].planting_date, plots[idx].plot_id));
    let first = *members.first()?;
    let last = *members.last()?;
    // Fixed 1-indexed position floor(n/2)+1, i.e. the upper middle for even counts.
    let median = members[members.len() / 2];
    let total_area = members.iter().map(|&idx| plots[idx].area).sum();

    Some(Candidate {
        rice_variety_id,
        spatial_cluster_id,
        date_bucket,
        plot_count: members.len() as u32,
        total_area,
        planting_window_start: plots[first].planting_date,
        planting_window_end: plots[last].planting_date,
        median_planting_date: plots[median].planting_date,
        members,
    })
}

/// First failing bound wins, in the order plot-count ceiling, plot-count floor, area floor, area
/// ceiling.
pub fn evaluate_candidate(
    candidate: &Candidate,
    params: &GroupingParameters,
) -> Result<(), CandidateRejection> {
    if candidate.plot_count > params.max_plots_per_group {
        return Err(CandidateRejection::TooManyPlots);
    }
    if candidate.plot_count < params.min_plots_per_group {
        return Err(CandidateRejection::TooFewPlots);
    }
    if candidate.total_area < params.min_group_area {
        return Err(CandidateRejection::TooSmallArea);
    }
    if candidate.total_area > params.max_group_area {
        return Err(CandidateRejection::TooLargeArea);
    }
    Ok(())
}
