//! Orchestration: snapshot preparation, per-variety partitions, and deterministic assembly.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::aggregate::{build_candidate, evaluate_candidate, Candidate, CandidateRejection};
use super::boundary::{build_group, order_for_numbering};
use super::classify::{
    assign_reason, nearest_group, CandidateOutcome, ClusterTrace, PlotTrace,
};
use super::coherence::evaluate_cluster;
use super::geometry::check_simple_polygon;
use super::spatial::{cluster_variety, ClusterDensity};
use super::temporal::bucket_members;
use super::types::{
    GroupFormationError, GroupFormationResult, GroupingParameters, PlotRecord, PlotSnapshot,
    UngroupedPlotInfo, UngroupedReason,
};

/// Valid plots split by variety, plus entries already decided before clustering.
#[derive(Debug)]
struct PreparedSnapshot {
    plots: Vec<PlotRecord>,
    partitions: BTreeMap<Uuid, Vec<usize>>,
    invalid: Vec<UngroupedPlotInfo>,
}

#[derive(Debug, Default)]
struct PartitionOutcome {
    accepted: Vec<Candidate>,
    ungrouped: Vec<(usize, UngroupedReason)>,
}

fn check_cancel(cancel: &CancellationToken) -> Result<(), GroupFormationError> {
    if cancel.is_cancelled() {
        return Err(GroupFormationError::Canceled);
    }
    Ok(())
}

fn invalid_geometry_reason() -> UngroupedReason {
    assign_reason(&PlotTrace::InvalidGeometry).unwrap_or(UngroupedReason::OtherReason)
}

fn invalid_entry(plot: &PlotRecord) -> UngroupedPlotInfo {
    let centroid = plot.centroid;
    UngroupedPlotInfo {
        plot_id: plot.plot_id,
        cultivation_id: plot.cultivation_id,
        rice_variety_id: plot.rice_variety_id,
        planting_date: plot.planting_date,
        centroid: (centroid.x().is_finite() && centroid.y().is_finite()).then_some(centroid),
        area: plot.area,
        reason: invalid_geometry_reason(),
        nearest_group_number: None,
        distance_to_nearest_group: None,
    }
}

fn prepare(snapshot: PlotSnapshot) -> PreparedSnapshot {
    let mut seen: HashSet<Uuid> = HashSet::with_capacity(snapshot.len());
    let mut plots = Vec::with_capacity(snapshot.plots.len());
    let mut invalid = Vec::new();

    for plot in snapshot.plots {
        if !seen.insert(plot.plot_id) {
            tracing::warn!(plot_id = %plot.plot_id, "dropping duplicate plot from snapshot");
            continue;
        }
        let centroid_ok = plot.centroid.x().is_finite() && plot.centroid.y().is_finite();
        let area_ok = plot.area.is_finite() && plot.area > 0.0;
        match check_simple_polygon(&plot.boundary) {
            Ok(()) if centroid_ok && area_ok => plots.push(plot),
            Ok(()) => {
                tracing::warn!(plot_id = %plot.plot_id, area = plot.area, "plot has unusable centroid or area");
                invalid.push(invalid_entry(&plot));
            }
            Err(issue) => {
                tracing::warn!(plot_id = %plot.plot_id, %issue, "plot boundary is not a simple polygon");
                invalid.push(invalid_entry(&plot));
            }
        }
    }

    for malformed in snapshot.malformed {
        if !seen.insert(malformed.plot_id) {
            tracing::warn!(plot_id = %malformed.plot_id, "dropping duplicate plot from snapshot");
            continue;
        }
        tracing::warn!(plot_id = %malformed.plot_id, issue = %malformed.issue, "plot boundary could not be decoded");
        invalid.push(UngroupedPlotInfo {
            plot_id: malformed.plot_id,
            cultivation_id: malformed.cultivation_id,
            rice_variety_id: malformed.rice_variety_id,
            planting_date: malformed.planting_date,
            centroid: None,
            area: malformed.area,
            reason: invalid_geometry_reason(),
            nearest_group_number: None,
            distance_to_nearest_group: None,
        });
    }

    let mut partitions: BTreeMap<Uuid, Vec<usize>> = BTreeMap::new();
    for (idx, plot) in plots.iter().enumerate() {
        partitions.entry(plot.rice_variety_id).or_default().push(idx);
    }

    PreparedSnapshot {
        plots,
        partitions,
        invalid,
    }
}

/// Clustering through reason assignment for one rice variety.
fn run_partition(
    plots: &[PlotRecord],
    rice_variety_id: Uuid,
    members: &[usize],
    params: &GroupingParameters,
    cancel: &CancellationToken,
) -> Result<PartitionOutcome, GroupFormationError> {
    let clustering = cluster_variety(plots, members, params, cancel)?;
    check_cancel(cancel)?;

    let mut outcome = PartitionOutcome::default();
    let mut traces: Vec<(usize, PlotTrace)> = clustering
        .unclustered
        .iter()
        .map(|&idx| (idx, PlotTrace::Unclustered))
        .collect();

    for cluster in &clustering.clusters {
        check_cancel(cancel)?;
        let verdict = evaluate_cluster(plots, &cluster.members, params);
        if !verdict.is_coherent() {
            tracing::debug!(
                variety = %rice_variety_id,
                cluster = cluster.id,
                verdict = ?verdict,
                "spatial cluster rejected"
            );
            traces.extend(cluster.members.iter().map(|&idx| {
                (
                    idx,
                    PlotTrace::Clustered(ClusterTrace {
                        coherent: false,
                        bucket_count: 0,
                        candidate: None,
                    }),
                )
            }));
            continue;
        }

        if cluster.density == ClusterDensity::Sparse {
            // No member reached the core threshold, so the cluster can never be a group.
            traces.extend(cluster.members.iter().map(|&idx| {
                (
                    idx,
                    PlotTrace::Clustered(ClusterTrace {
                        coherent: true,
                        bucket_count: 1,
                        candidate: Some(CandidateOutcome::Rejected(
                            CandidateRejection::TooFewPlots,
                        )),
                    }),
                )
            }));
            continue;
        }

        let buckets = bucket_members(plots, &cluster.members, params);
        let bucket_count = buckets.len();
        for (bucket, bucket_plots) in buckets {
            let candidate = build_candidate(plots, rice_variety_id, cluster.id, bucket, &bucket_plots);
            let candidate_outcome = candidate.as_ref().map(|candidate| {
                match evaluate_candidate(candidate, params) {
                    Ok(()) => CandidateOutcome::Accepted,
                    Err(rejection) => CandidateOutcome::Rejected(rejection),
                }
            });
            traces.extend(bucket_plots.iter().map(|&idx| {
                (
                    idx,
                    PlotTrace::Clustered(ClusterTrace {
                        coherent: true,
                        bucket_count,
                        candidate: candidate_outcome,
                    }),
                )
            }));
            if let (Some(candidate), Some(CandidateOutcome::Accepted)) = (candidate, candidate_outcome) {
                outcome.accepted.push(candidate);
            }
        }
    }

    for (idx, trace) in traces {
        if let Some(reason) = assign_reason(&trace) {
            outcome.ungrouped.push((idx, reason));
        }
    }
    Ok(outcome)
}

fn leftover_entry(plot: &PlotRecord, reason: UngroupedReason) -> UngroupedPlotInfo {
    UngroupedPlotInfo {
        plot_id: plot.plot_id,
        cultivation_id: plot.cultivation_id,
        rice_variety_id: plot.rice_variety_id,
        planting_date: plot.planting_date,
        centroid: Some(plot.centroid),
        area: plot.area,
        reason,
        nearest_group_number: None,
        distance_to_nearest_group: None,
    }
}

fn finalize(
    prepared: PreparedSnapshot,
    outcomes: Vec<PartitionOutcome>,
    params: &GroupingParameters,
) -> Result<GroupFormationResult, GroupFormationError> {
    let PreparedSnapshot { plots, invalid, .. } = prepared;

    let mut accepted = Vec::new();
    let mut leftovers = Vec::new();
    for outcome in outcomes {
        accepted.extend(outcome.accepted);
        leftovers.extend(outcome.ungrouped);
    }
    order_for_numbering(&mut accepted);

    let mut covered = vec![false; plots.len()];
    let mut groups = Vec::with_capacity(accepted.len());
    for (position, candidate) in accepted.iter().enumerate() {
        let group_number = position as u32 + 1;
        groups.push(build_group(&plots, candidate, group_number, params)?);
        for &idx in &candidate.members {
            covered[idx] = true;
        }
    }

    let mut ungrouped = invalid;
    for (idx, reason) in leftovers {
        if covered[idx] {
            return Err(GroupFormationError::Internal(format!(
                "plot {} is both grouped and ungrouped",
                plots[idx].plot_id
            )));
        }
        covered[idx] = true;
        ungrouped.push(leftover_entry(&plots[idx], reason));
    }
    for (idx, plot) in plots.iter().enumerate() {
        if !covered[idx] {
            tracing::warn!(plot_id = %plot.plot_id, "plot fell through every grouping stage");
            ungrouped.push(leftover_entry(plot, UngroupedReason::OtherReason));
        }
    }

    for entry in &mut ungrouped {
        if let Some(centroid) = entry.centroid {
            if let Some((number, distance)) = nearest_group(&groups, entry.rice_variety_id, centroid) {
                entry.nearest_group_number = Some(number);
                entry.distance_to_nearest_group = Some(distance);
            }
        }
    }
    ungrouped.sort_by_key(|entry| (entry.rice_variety_id, entry.plot_id));

    Ok(GroupFormationResult {
        groups,
        ungrouped_plots: ungrouped,
    })
}

/// Runs every partition on the calling thread.
pub fn run_snapshot(
    snapshot: PlotSnapshot,
    params: &GroupingParameters,
    cancel: &CancellationToken,
) -> Result<GroupFormationResult, GroupFormationError> {
    params.validate()?;
    check_cancel(cancel)?;
    let prepared = prepare(snapshot);
    let mut outcomes = Vec::with_capacity(prepared.partitions.len());
    for (&variety, members) in &prepared.partitions {
        check_cancel(cancel)?;
        outcomes.push(run_partition(&prepared.plots, variety, members, params, cancel)?);
    }
    check_cancel(cancel)?;
    finalize(prepared, outcomes, params)
}

/// Runs partitions on the blocking pool, at most `max_parallel_partitions` at a time. The output
/// is identical to [`run_snapshot`].
pub async fn form_groups_from_snapshot(
    snapshot: PlotSnapshot,
    params: &GroupingParameters,
    max_parallel_partitions: usize,
    cancel: &CancellationToken,
) -> Result<GroupFormationResult, GroupFormationError> {
    params.validate()?;
    check_cancel(cancel)?;
    let mut prepared = prepare(snapshot);
    let plots = Arc::new(std::mem::take(&mut prepared.plots));
    let semaphore = Arc::new(Semaphore::new(max_parallel_partitions.max(1)));

    let tasks = prepared.partitions.iter().map(|(&variety, members)| {
        let plots = plots.clone();
        let members = members.clone();
        let params = params.clone();
        let cancel = cancel.clone();
        let semaphore = semaphore.clone();
        async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| GroupFormationError::Internal("partition gate closed".to_string()))?;
            check_cancel(&cancel)?;
            tokio::task::spawn_blocking(move || {
                run_partition(&plots, variety, &members, &params, &cancel)
            })
            .await
            .map_err(|err| {
                GroupFormationError::Internal(format!("partition worker failed: {}", err))
            })?
        }
    });
    let outcomes = futures::future::try_join_all(tasks).await?;
    check_cancel(cancel)?;

    prepared.plots = Arc::try_unwrap(plots).unwrap_or_else(|shared| (*shared).clone());
    finalize(prepared, outcomes, params)
}
