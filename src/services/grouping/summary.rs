use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use super::types::{GroupFormationResult, UngroupedReason};

/// Totals for one run, logged after every formation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub groups: usize,
    pub grouped_plots: usize,
    pub ungrouped_plots: usize,
    pub grouped_area: f64,
    pub reasons: BTreeMap<UngroupedReason, usize>,
}

impl RunSummary {
    pub fn from_result(result: &GroupFormationResult) -> Self {
        let mut reasons = BTreeMap::new();
        for entry in &result.ungrouped_plots {
            *reasons.entry(entry.reason).or_insert(0) += 1;
        }
        Self {
            groups: result.groups.len(),
            grouped_plots: result.groups.iter().map(|g| g.plot_ids.len()).sum(),
            ungrouped_plots: result.ungrouped_plots.len(),
            grouped_area: result.groups.iter().map(|g| g.total_area).sum(),
            reasons,
        }
    }

    pub fn total_plots(&self) -> usize {
        self.grouped_plots + self.ungrouped_plots
    }

    /// `reason=count` pairs in reason order, e.g. `isolated_location=2,too_few_plots=1`.
    pub fn reason_breakdown(&self) -> String {
        self.reasons
            .iter()
            .map(|(reason, count)| format!("{}={}", reason.as_str(), count))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn log(&self, elapsed: Duration) {
        if self.reasons.contains_key(&UngroupedReason::OtherReason) {
            tracing::warn!(
                count = self.reasons[&UngroupedReason::OtherReason],
                "plots were left ungrouped without a specific reason"
            );
        }
        tracing::info!(
            phase = "summary",
            groups = self.groups,
            grouped_plots = self.grouped_plots,
            ungrouped_plots = self.ungrouped_plots,
            total_plots = self.total_plots(),
            grouped_area = self.grouped_area,
            reasons = %self.reason_breakdown(),
            duration_ms = elapsed.as_millis() as u64,
            "plot grouping finished"
        );
    }
}
