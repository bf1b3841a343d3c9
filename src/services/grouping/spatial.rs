//! Density-based clustering of plot centroids within a single rice variety.
//!
//! Dense clusters follow DBSCAN: a plot is a core point when at least `min_points` plots (itself
//! included) lie within `proximity_threshold`, and clusters grow through core points. Plots that
//! are not density-reachable but still have at least one neighbor are linked into *sparse*
//! clusters so they can later be reported as too-few-plots instead of isolated. Plots without any
//! neighbor stay unclustered.

use rstar::primitives::GeomWithData;
use rstar::RTree;
use tokio_util::sync::CancellationToken;

use super::types::{GroupFormationError, GroupingParameters, PlotRecord};

const CANCEL_CHECK_INTERVAL: usize = 256;

type IndexedCentroid = GeomWithData<[f64; 2], usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterDensity {
    Dense,
    Sparse,
}

#[derive(Debug, Clone)]
pub struct SpatialCluster {
    /// Scoped to the variety; dense clusters are numbered before sparse ones.
    pub id: u32,
    pub density: ClusterDensity,
    /// Indices into the plot arena, in arena order.
    pub members: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct VarietyClustering {
    pub clusters: Vec<SpatialCluster>,
    pub unclustered: Vec<usize>,
}

/// A single plot can never seed a cluster, whatever the configured group minimum.
pub(crate) fn core_min_points(params: &GroupingParameters) -> usize {
    (params.min_plots_per_group as usize).max(2)
}

/// Clusters `members` (arena indices of one variety). Members are visited in `plot_id` order so
/// the assignment of border plots shared by two clusters is reproducible.
pub fn cluster_variety(
    plots: &[PlotRecord],
    members: &[usize],
    params: &GroupingParameters,
    cancel: &CancellationToken,
) -> Result<VarietyClustering, GroupFormationError> {
    let mut ordered: Vec<usize> = members.to_vec();
    ordered.sort_by_key(|&idx| plots[idx].plot_id);
    let count = ordered.len();
    if count == 0 {
        return Ok(VarietyClustering::default());
    }

    let entries: Vec<IndexedCentroid> = ordered
        .iter()
        .enumerate()
        .map(|(local, &idx)| {
            let centroid = plots[idx].centroid;
            GeomWithData::new([centroid.x(), centroid.y()], local)
        })
        .collect();
    let tree = RTree::bulk_load(entries);
    let radius_sq = params.proximity_threshold * params.proximity_threshold;

    let mut neighbors: Vec<Vec<usize>> = Vec::with_capacity(count);
    for (local, &idx) in ordered.iter().enumerate() {
        if local % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(GroupFormationError::Canceled);
        }
        let centroid = plots[idx].centroid;
        let mut found: Vec<usize> = tree
            .locate_within_distance([centroid.x(), centroid.y()], radius_sq)
            .map(|entry| entry.data)
            .collect();
        found.sort_unstable();
        neighbors.push(found);
    }

    let min_points = core_min_points(params);
    let is_core = |local: usize| neighbors[local].len() >= min_points;
    let mut labels: Vec<Option<u32>> = vec![None; count];
    let mut next_id: u32 = 0;

    for seed in 0..count {
        if seed % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(GroupFormationError::Canceled);
        }
        if labels[seed].is_some() || !is_core(seed) {
            continue;
        }
        let cluster_id = next_id;
        next_id += 1;
        labels[seed] = Some(cluster_id);
        let mut frontier: Vec<usize> = neighbors[seed].clone();
        let mut cursor = 0;
        while cursor < frontier.len() {
            let local = frontier[cursor];
            cursor += 1;
            if labels[local].is_some() {
                continue;
            }
            labels[local] = Some(cluster_id);
            if is_core(local) {
                frontier.extend(neighbors[local].iter().copied());
            }
        }
    }
    let dense_count = next_id;

    // Link the remaining reachable plots among themselves.
    for seed in 0..count {
        if labels[seed].is_some() || neighbors[seed].len() < 2 {
            continue;
        }
        let cluster_id = next_id;
        next_id += 1;
        labels[seed] = Some(cluster_id);
        let mut frontier = vec![seed];
        while let Some(local) = frontier.pop() {
            for &other in &neighbors[local] {
                if labels[other].is_none() && neighbors[other].len() >= 2 {
                    labels[other] = Some(cluster_id);
                    frontier.push(other);
                }
            }
        }
    }

    let mut clusters: Vec<SpatialCluster> = (0..next_id)
        .map(|id| SpatialCluster {
            id,
            density: if id < dense_count {
                ClusterDensity::Dense
            } else {
                ClusterDensity::Sparse
            },
            members: Vec::new(),
        })
        .collect();
    let mut unclustered = Vec::new();
    for (local, label) in labels.iter().enumerate() {
        match label {
            Some(id) => clusters[*id as usize].members.push(ordered[local]),
            None => unclustered.push(ordered[local]),
        }
    }
    for cluster in &mut clusters {
        cluster.members.sort_unstable();
    }
    unclustered.sort_unstable();

    tracing::debug!(
        plots = count,
        dense_clusters = dense_count,
        sparse_clusters = next_id - dense_count,
        unclustered = unclustered.len(),
        "spatial clustering finished"
    );

    Ok(VarietyClustering {
        clusters,
        unclustered,
    })
}
