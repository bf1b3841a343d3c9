//! Reason assignment for plots left out of every accepted group, and nearest-group lookup.

use geo::Point;
use uuid::Uuid;

use super::aggregate::CandidateRejection;
use super::geometry::planar_distance;
use super::types::{ProposedGroup, UngroupedReason};

/// What the pipeline learned about one plot on its way through the stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotTrace {
    InvalidGeometry,
    Unclustered,
    Clustered(ClusterTrace),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterTrace {
    pub coherent: bool,
    /// Number of date buckets the plot's spatial cluster was split into.
    pub bucket_count: usize,
    pub candidate: Option<CandidateOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOutcome {
    Accepted,
    Rejected(CandidateRejection),
}

/// Ordered decision chain; the first matching check wins. `None` means the plot is grouped.
pub fn assign_reason(trace: &PlotTrace) -> Option<UngroupedReason> {
    let cluster = match trace {
        PlotTrace::InvalidGeometry => return Some(UngroupedReason::InvalidGeometry),
        PlotTrace::Unclustered => return Some(UngroupedReason::IsolatedLocation),
        PlotTrace::Clustered(cluster) => cluster,
    };
    if !cluster.coherent {
        return Some(UngroupedReason::TooSpreadOut);
    }
    if cluster.candidate == Some(CandidateOutcome::Accepted) {
        return None;
    }
    if cluster.bucket_count > 1 {
        return Some(UngroupedReason::PlantingDateTooFar);
    }
    match cluster.candidate {
        None => Some(UngroupedReason::NoValidGroup),
        Some(CandidateOutcome::Rejected(rejection)) => Some(rejection.reason()),
        Some(CandidateOutcome::Accepted) => None,
    }
}

/// Closest accepted group of the same variety by centroid distance; ties go to the lower group
/// number. `groups` must be in group-number order.
pub fn nearest_group(
    groups: &[ProposedGroup],
    rice_variety_id: Uuid,
    centroid: Point<f64>,
) -> Option<(u32, f64)> {
    let mut best: Option<(u32, f64)> = None;
    for group in groups
        .iter()
        .filter(|group| group.rice_variety_id == rice_variety_id)
    {
        let distance = planar_distance(centroid, group.group_centroid);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((group.group_number, distance)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::grouping::test_fixtures::{group_at, VARIETY_A, VARIETY_B};

    fn clustered(coherent: bool, bucket_count: usize, candidate: Option<CandidateOutcome>) -> PlotTrace {
        PlotTrace::Clustered(ClusterTrace {
            coherent,
            bucket_count,
            candidate,
        })
    }

    #[test]
    fn chain_follows_precedence() {
        assert_eq!(
            assign_reason(&PlotTrace::InvalidGeometry),
            Some(UngroupedReason::InvalidGeometry)
        );
        assert_eq!(
            assign_reason(&PlotTrace::Unclustered),
            Some(UngroupedReason::IsolatedLocation)
        );
        assert_eq!(
            assign_reason(&clustered(
                false,
                3,
                Some(CandidateOutcome::Rejected(CandidateRejection::TooFewPlots))
            )),
            Some(UngroupedReason::TooSpreadOut)
        );
        assert_eq!(
            assign_reason(&clustered(
                true,
                2,
                Some(CandidateOutcome::Rejected(CandidateRejection::TooSmallArea))
            )),
            Some(UngroupedReason::PlantingDateTooFar)
        );
        assert_eq!(
            assign_reason(&clustered(true, 1, None)),
            Some(UngroupedReason::NoValidGroup)
        );
        assert_eq!(
            assign_reason(&clustered(
                true,
                1,
                Some(CandidateOutcome::Rejected(CandidateRejection::TooLargeArea))
            )),
            Some(UngroupedReason::TooLargeArea)
        );
    }

    #[test]
    fn accepted_plots_get_no_reason_even_when_cluster_was_split() {
        assert_eq!(
            assign_reason(&clustered(true, 4, Some(CandidateOutcome::Accepted))),
            None
        );
    }

    #[test]
    fn nearest_group_stays_within_variety_and_prefers_lower_number_on_ties() {
        let groups = vec![
            group_at(1, VARIETY_A, 100.0, 0.0),
            group_at(2, VARIETY_A, -100.0, 0.0),
            group_at(3, VARIETY_B, 1.0, 0.0),
        ];
        assert_eq!(
            nearest_group(&groups, VARIETY_A, Point::new(0.0, 0.0)),
            Some((1, 100.0))
        );
        assert_eq!(
            nearest_group(&groups, VARIETY_A, Point::new(-90.0, 0.0)),
            Some((2, 10.0))
        );
        assert_eq!(
            nearest_group(&groups, Uuid::from_u128(99), Point::new(0.0, 0.0)),
            None
        );
    }
}
