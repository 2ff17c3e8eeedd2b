//! How well a set of matches preserves the numeric attribute and the strata.

use crate::error::Result;
use crate::matching::{MatchResult, StratifiedPopulation, Tier};
use crate::table::Table;
use log::info;

/// Relative error up to which a match counts as close
pub const DEFAULT_TOLERANCE: f64 = 0.25;

/// Trip count difference up to which a match counts as close
pub const DEFAULT_TRIP_TOLERANCE: f64 = 2.0;

/// Value at fraction `p` of sorted, non-empty `values`, interpolating
/// linearly between neighbouring ranks
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = p * (sorted.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    sorted[low] + (sorted[high] - sorted[low]) * (rank - low as f64)
}

/// min, q1, median, q3 and max in full f64 precision
pub fn five_numbers(values: &[f64]) -> Option<[f64; 5]> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some([0.0, 0.25, 0.5, 0.75, 1.0].map(|p| percentile(&sorted, p)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchSummary {
    pub total: usize,
    pub exact: usize,
    pub relaxed: usize,
    /// min, q1, median, q3, max of the absolute differences
    pub distance_quartiles: Option<[f64; 5]>,
    pub tolerance: f64,
    /// share of matches whose difference is at most `tolerance` times the
    /// target value
    pub within_tolerance: f64,
    /// per strata key, the share of matches where target and source agree
    pub stratum_agreement: Vec<(String, f64)>,
    pub trip_tolerance: f64,
    /// share of matches whose trip counts differ by at most `trip_tolerance`,
    /// once counts are known
    pub trips_within: Option<f64>,
}

impl MatchSummary {
    pub fn new(
        results: &[MatchResult],
        source: &StratifiedPopulation,
        target: &StratifiedPopulation,
        tolerance: f64,
    ) -> MatchSummary {
        let total = results.len();
        let exact = results.iter().filter(|m| m.tier == Tier::Exact).count();
        let share = |n: usize| if total == 0 { 0.0 } else { n as f64 / total as f64 };

        let distances: Vec<f64> = results.iter().map(|m| m.distance).collect();
        let distance_quartiles = five_numbers(&distances);

        let within = results
            .iter()
            .filter(|m| {
                let value = target.records()[m.target].value.abs();
                m.distance <= tolerance * value
            })
            .count();

        let stratum_agreement = target
            .keys()
            .iter()
            .enumerate()
            .map(|(k, key)| {
                let agree = results
                    .iter()
                    .filter(|m| {
                        target.records()[m.target].strata[k] == source.records()[m.source].strata[k]
                    })
                    .count();
                (key.clone(), share(agree))
            })
            .collect();

        MatchSummary {
            total,
            exact,
            relaxed: total - exact,
            distance_quartiles,
            tolerance,
            within_tolerance: share(within),
            stratum_agreement,
            trip_tolerance: DEFAULT_TRIP_TOLERANCE,
            trips_within: None,
        }
    }

    /// Adds the trip count agreement. `target_counts` and `source_counts` are
    /// indexed like the populations the results refer to; a match whose
    /// count is missing does not agree.
    pub fn with_trip_counts(
        mut self,
        results: &[MatchResult],
        target_counts: &[f64],
        source_counts: &[f64],
        tolerance: f64,
    ) -> MatchSummary {
        let within = results
            .iter()
            .filter(|m| match (target_counts.get(m.target), source_counts.get(m.source)) {
                (Some(t), Some(s)) => (t - s).abs() <= tolerance,
                _ => false,
            })
            .count();
        self.trip_tolerance = tolerance;
        self.trips_within = Some(if results.is_empty() {
            0.0
        } else {
            within as f64 / results.len() as f64
        });
        self
    }

    pub fn log(&self) {
        info!(
            "{} matches: {} exact, {} relaxed",
            self.total, self.exact, self.relaxed
        );
        if let Some(q) = self.distance_quartiles {
            info!(
                "absolute difference: min {} q1 {} median {} q3 {} max {}",
                q[0], q[1], q[2], q[3], q[4]
            );
        }
        info!(
            "{:.1}% within {:.0}% of the target value",
            self.within_tolerance * 100.0,
            self.tolerance * 100.0
        );
        if let Some(share) = self.trips_within {
            info!(
                "{:.1}% within {} trips of the target trip count",
                share * 100.0,
                self.trip_tolerance
            );
        }
        for (key, share) in &self.stratum_agreement {
            info!("{}: {:.1}% agree", key, share * 100.0);
        }
    }

    /// Two column `metric,value` table
    pub fn to_table(&self) -> Result<Table> {
        let mut rows = vec![
            ("total".to_string(), self.total.to_string()),
            ("exact".to_string(), self.exact.to_string()),
            ("relaxed".to_string(), self.relaxed.to_string()),
            ("within_tolerance".to_string(), self.within_tolerance.to_string()),
        ];
        if let Some(share) = self.trips_within {
            rows.push(("trips_within_tolerance".to_string(), share.to_string()));
        }
        if let Some(q) = self.distance_quartiles {
            for (name, v) in ["min", "q1", "median", "q3", "max"].iter().zip(q) {
                rows.push((format!("distance_{}", name), v.to_string()));
            }
        }
        for (key, share) in &self.stratum_agreement {
            rows.push((format!("agreement_{}", key), share.to_string()));
        }
        Table::from_rows(
            vec!["metric".to_string(), "value".to_string()],
            rows.into_iter().map(|(a, b)| vec![a, b]).collect(),
        )
    }
}
