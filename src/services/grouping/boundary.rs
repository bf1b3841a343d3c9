use super::aggregate::Candidate;
use super::geometry;
use super::types::{GroupFormationError, GroupingParameters, PlotRecord, ProposedGroup};

/// Sorts accepted candidates by (variety, spatial cluster, date bucket) so numbering does not
/// depend on the order partitions finished in.
pub fn order_for_numbering(candidates: &mut [Candidate]) {
    candidates.sort_by_key(Candidate::sort_key);
}

pub fn build_group(
    plots: &[PlotRecord],
    candidate: &Candidate,
    group_number: u32,
    params: &GroupingParameters,
) -> Result<ProposedGroup, GroupFormationError> {
    let union = geometry::union_all(candidate.members.iter().map(|&idx| &plots[idx].boundary));
    let group_centroid = geometry::multipolygon_centroid(&union).ok_or_else(|| {
        GroupFormationError::Internal(format!(
            "group {} has an empty boundary union",
            group_number
        ))
    })?;
    let group_boundary = geometry::buffer_outward(&union, params.border_buffer);

    Ok(ProposedGroup {
        group_number,
        rice_variety_id: candidate.rice_variety_id,
        plot_count: candidate.plot_count,
        total_area: candidate.total_area,
        planting_window_start: candidate.planting_window_start,
        planting_window_end: candidate.planting_window_end,
        median_planting_date: candidate.median_planting_date,
        plot_ids: candidate
            .members
            .iter()
            .map(|&idx| plots[idx].plot_id)
            .collect(),
        cultivation_ids: candidate
            .members
            .iter()
            .map(|&idx| plots[idx].cultivation_id)
            .collect(),
        group_boundary,
        group_centroid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::grouping::aggregate::build_candidate;
    use crate::services::grouping::test_fixtures::{plot_at, VARIETY_A, VARIETY_B};
    use geo::Area;

    #[test]
    fn numbering_order_is_variety_then_cluster_then_bucket() {
        let plots = vec![plot_at(1, 0.0, 0.0)];
        let mut candidates = vec![
            build_candidate(&plots, VARIETY_B, 0, 0, &[0]).unwrap(),
            build_candidate(&plots, VARIETY_A, 1, 5, &[0]).unwrap(),
            build_candidate(&plots, VARIETY_A, 0, 9, &[0]).unwrap(),
            build_candidate(&plots, VARIETY_A, 0, 2, &[0]).unwrap(),
        ];
        order_for_numbering(&mut candidates);
        let keys: Vec<_> = candidates.iter().map(Candidate::sort_key).collect();
        assert_eq!(
            keys,
            vec![(VARIETY_A, 0, 2), (VARIETY_A, 0, 9), (VARIETY_A, 1, 5), (VARIETY_B, 0, 0)]
        );
    }

    #[test]
    fn centroid_is_taken_before_buffering() {
        let plots = vec![plot_at(1, 0.0, 0.0), plot_at(2, 20.0, 0.0)];
        let candidate = build_candidate(&plots, VARIETY_A, 0, 0, &[0, 1]).unwrap();
        let params = GroupingParameters {
            border_buffer: 5.0,
            ..GroupingParameters::default()
        };
        let group = build_group(&plots, &candidate, 1, &params).unwrap();
        assert_eq!(group.group_number, 1);
        assert!((group.group_centroid.x() - 10.0).abs() < 1e-6);
        assert!(group.group_centroid.y().abs() < 1e-6);

        let unbuffered = geometry::union_all(plots.iter().map(|p| &p.boundary));
        assert!(group.group_boundary.unsigned_area() > unbuffered.unsigned_area());
        assert_eq!(group.plot_ids, vec![plots[0].plot_id, plots[1].plot_id]);
        assert_eq!(
            group.cultivation_ids,
            vec![plots[0].cultivation_id, plots[1].cultivation_id]
        );
    }
}
