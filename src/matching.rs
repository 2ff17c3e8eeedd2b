//! Stratified nearest neighbour matching between two populations.
//!
//! Records of both populations are grouped by the full combination of
//! their strata keys. Each target record takes the source record of the
//! same stratum whose numeric value is closest (tier 1). When the source
//! has no record in that stratum, or the closest one is farther away than
//! the optional distance threshold, the strata are relaxed to a coarser
//! subset of keys and the search is repeated there (tier 2).
//!
//! A target record that finds nothing in either tier is an error: it is
//! never given a default record.

use crate::error::{Error, Result};
use crate::table::Table;
use crate::traits::Enrich;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use rayon::prelude::*;
use std::collections::HashMap;

/// Sorted values with their record positions. Building is O(m log m),
/// every query is a binary search.
#[derive(Debug, Clone)]
pub struct NearestIndex {
    entries: Vec<(f64, usize)>,
}

impl NearestIndex {
    pub fn new<I>(items: I) -> NearestIndex
    where
        I: IntoIterator<Item = (f64, usize)>,
    {
        let mut entries: Vec<_> = items.into_iter().collect();
        entries.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        NearestIndex { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The record with the smallest absolute difference to `value`, and that
    /// difference. On ties the smaller value wins.
    pub fn nearest(&self, value: f64) -> Option<(usize, f64)> {
        let i = self.entries.partition_point(|(v, _)| *v < value);
        // first record of the run of equal values just below
        let below = i.checked_sub(1).map(|j| {
            let lo = self.entries[j].0;
            self.entries[self.entries[..i].partition_point(|(v, _)| *v < lo)]
        });
        let above = self.entries.get(i).copied();
        match (below, above) {
            (Some((lo, a)), Some((hi, b))) => {
                let d_lo = value - lo;
                let d_hi = hi - value;
                if d_lo <= d_hi {
                    Some((a, d_lo))
                } else {
                    Some((b, d_hi))
                }
            }
            (Some((lo, a)), None) => Some((a, (value - lo).abs())),
            (None, Some((hi, b))) => Some((b, (hi - value).abs())),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StratifiedRecord {
    pub id: String,
    pub strata: Vec<String>,
    pub value: f64,
}

/// Records carrying the same strata keys, in a fixed order, and one numeric
/// matching attribute.
#[derive(Debug, Clone)]
pub struct StratifiedPopulation {
    keys: Vec<String>,
    records: Vec<StratifiedRecord>,
}

impl StratifiedPopulation {
    pub fn new(keys: Vec<String>, records: Vec<StratifiedRecord>) -> Result<Self> {
        for r in &records {
            if r.strata.len() != keys.len() {
                return Err(Error::Config(format!(
                    "record `{}` has {} strata values for {} keys",
                    r.id,
                    r.strata.len(),
                    keys.len()
                )));
            }
        }
        Ok(StratifiedPopulation { keys, records })
    }

    pub fn from_table(
        table: &Table,
        id_field: &str,
        strata_keys: &[String],
        numeric_key: &str,
    ) -> Result<Self> {
        let id = table.column(id_field)?;
        let strata = strata_keys
            .iter()
            .map(|k| table.column(k))
            .collect::<Result<Vec<_>>>()?;
        let numeric = table.column(numeric_key)?;

        let records = (0..table.len())
            .map(|row| {
                Ok(StratifiedRecord {
                    id: table.cell(row, id).to_string(),
                    strata: strata
                        .iter()
                        .map(|&c| table.cell(row, c).trim().to_string())
                        .collect(),
                    value: table.numeric(row, numeric)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        StratifiedPopulation::new(strata_keys.to_vec(), records)
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn records(&self) -> &[StratifiedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record positions grouped by the strata values at `positions`
    fn groups(&self, positions: &[usize]) -> HashMap<Vec<&str>, Vec<usize>> {
        let mut groups: HashMap<Vec<&str>, Vec<usize>> = HashMap::new();
        for (i, r) in self.records.iter().enumerate() {
            let key = positions.iter().map(|&p| r.strata[p].as_str()).collect();
            groups.entry(key).or_default().push(i);
        }
        groups
    }

    fn index_groups(&self, positions: &[usize]) -> HashMap<Vec<&str>, NearestIndex> {
        self.groups(positions)
            .into_par_iter()
            .map(|(key, members)| {
                let index = NearestIndex::new(members.into_iter().map(|i| (self.records[i].value, i)));
                (key, index)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Exact,
    Relaxed,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Exact => "exact",
            Tier::Relaxed => "relaxed",
        }
    }
}

/// Positions refer to the records of the populations handed to the matcher
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub target: usize,
    pub source: usize,
    pub tier: Tier,
    /// absolute difference of the numeric attribute
    pub distance: f64,
}

#[derive(Debug, Clone)]
pub struct Matcher {
    strata_keys: Vec<String>,
    relaxed_keys: Vec<String>,
    max_distance: Option<f64>,
}

impl Matcher {
    /// `relaxed_keys` must be a strict subset of `strata_keys`. It may be
    /// empty, in which case tier 2 searches the whole source population.
    pub fn new(
        strata_keys: Vec<String>,
        relaxed_keys: Vec<String>,
        max_distance: Option<f64>,
    ) -> Result<Matcher> {
        if strata_keys.is_empty() {
            return Err(Error::Config("at least one strata key is required".to_string()));
        }
        for k in &relaxed_keys {
            if !strata_keys.contains(k) {
                return Err(Error::Config(format!(
                    "relaxed key `{}` is not one of the strata keys",
                    k
                )));
            }
        }
        if relaxed_keys.len() >= strata_keys.len() {
            return Err(Error::Config(
                "relaxed keys must drop at least one strata key".to_string(),
            ));
        }
        if let Some(d) = max_distance {
            if !(d >= 0.0) {
                return Err(Error::Config(format!("max_distance {} must be >= 0", d)));
            }
        }
        Ok(Matcher {
            strata_keys,
            relaxed_keys,
            max_distance,
        })
    }

    pub fn strata_keys(&self) -> &[String] {
        &self.strata_keys
    }

    pub fn relaxed_keys(&self) -> &[String] {
        &self.relaxed_keys
    }

    pub fn max_distance(&self) -> Option<f64> {
        self.max_distance
    }

    /// One `MatchResult` per target record, in target order. Neither
    /// population is modified.
    pub fn run(
        &self,
        source: &StratifiedPopulation,
        target: &StratifiedPopulation,
    ) -> Result<Vec<MatchResult>> {
        for population in [source, target] {
            if population.keys() != self.strata_keys.as_slice() {
                return Err(Error::Config(format!(
                    "population strata {:?} differ from matcher strata {:?}",
                    population.keys(),
                    self.strata_keys
                )));
            }
        }

        let all: Vec<usize> = (0..self.strata_keys.len()).collect();
        let relaxed: Vec<usize> = self
            .strata_keys
            .iter()
            .enumerate()
            .filter(|(_, k)| self.relaxed_keys.contains(k))
            .map(|(i, _)| i)
            .collect();

        let exact_indices = source.index_groups(&all);
        let relaxed_indices = source.index_groups(&relaxed);
        let target_groups: Vec<_> = target.groups(&all).into_iter().collect();

        info!(
            "Matching {} target records in {} strata against {} source records...",
            target.len(),
            target_groups.len(),
            source.len()
        );

        let bar = ProgressBar::new(target_groups.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("[{elapsed}] {wide_bar} {pos}/{len} strata ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let per_group: Vec<(Vec<MatchResult>, Vec<usize>)> = target_groups
            .par_iter()
            .map(|(key, members)| {
                let exact = exact_indices.get(key);
                let relaxed_key: Vec<&str> = relaxed.iter().map(|&p| key[p]).collect();
                let fallback = relaxed_indices.get(&relaxed_key);
                debug!(
                    "stratum {:?}: {} targets, {} exact and {} relaxed candidates",
                    key,
                    members.len(),
                    exact.map_or(0, |i| i.len()),
                    fallback.map_or(0, |i| i.len())
                );

                let mut matched = Vec::with_capacity(members.len());
                let mut unmatched = Vec::new();
                for &t in members {
                    let value = target.records[t].value;
                    let direct = exact
                        .and_then(|index| index.nearest(value))
                        .filter(|(_, d)| self.max_distance.map_or(true, |max| *d <= max));
                    let found = match direct {
                        Some((s, d)) => Some((s, d, Tier::Exact)),
                        None => fallback
                            .and_then(|index| index.nearest(value))
                            .map(|(s, d)| (s, d, Tier::Relaxed)),
                    };
                    match found {
                        Some((source, distance, tier)) => matched.push(MatchResult {
                            target: t,
                            source,
                            tier,
                            distance,
                        }),
                        None => unmatched.push(t),
                    }
                }
                bar.inc(1);
                (matched, unmatched)
            })
            .collect();
        bar.finish_and_clear();

        let mut results = Vec::with_capacity(target.len());
        let mut unmatched = Vec::new();
        for (m, u) in per_group {
            results.extend(m);
            unmatched.extend(u);
        }

        if !unmatched.is_empty() {
            unmatched.sort_unstable();
            return Err(Error::Unmatched {
                count: unmatched.len(),
                ids: unmatched
                    .into_iter()
                    .map(|t| target.records[t].id.clone())
                    .collect(),
            });
        }

        results.sort_by_key(|m| m.target);
        let exact = results.iter().filter(|m| m.tier == Tier::Exact).count();
        info!(
            "Matched {} records: {} exact, {} relaxed",
            results.len(),
            exact,
            results.len() - exact
        );
        Ok(results)
    }
}

/// Matches the rows of a target table against a source table and copies the
/// source attributes onto every target row, together with bookkeeping
/// columns `matched_id`, `match_tier` and `match_distance`.
pub struct MatchTransfer<'a> {
    pub matcher: Matcher,
    pub source: &'a Table,
    pub source_id_field: String,
    pub source_numeric_key: String,
    pub target_id_field: String,
    pub target_numeric_key: String,
    /// source columns to copy; all of them when empty
    pub transfer: Vec<String>,
    /// appended to a copied column name that already exists on the target
    pub suffix: String,
}

impl MatchTransfer<'_> {
    pub fn populations(&self, target: &Table) -> Result<(StratifiedPopulation, StratifiedPopulation)> {
        let keys = self.matcher.strata_keys();
        let source = StratifiedPopulation::from_table(
            self.source,
            &self.source_id_field,
            keys,
            &self.source_numeric_key,
        )?;
        let target = StratifiedPopulation::from_table(
            target,
            &self.target_id_field,
            keys,
            &self.target_numeric_key,
        )?;
        Ok((source, target))
    }

    fn transfer_columns(&self, target: &Table) -> Result<Vec<(usize, String)>> {
        let names: Vec<String> = if self.transfer.is_empty() {
            self.source.headers().to_vec()
        } else {
            self.transfer.clone()
        };
        names
            .iter()
            .map(|name| {
                let col = self.source.column(name)?;
                let out = if target.has_column(name) {
                    format!("{}{}", name, self.suffix)
                } else {
                    name.clone()
                };
                Ok((col, out))
            })
            .collect()
    }

    /// The raw match results, for reporting
    pub fn run(&self, target: &Table) -> Result<Vec<MatchResult>> {
        let (source, target) = self.populations(target)?;
        self.matcher.run(&source, &target)
    }
}

impl Enrich for MatchTransfer<'_> {
    fn enrich(&self, table: &Table) -> Result<Table> {
        self.transfer(table).map(|(out, _)| out)
    }
}

impl MatchTransfer<'_> {
    /// The enriched table together with the match results behind it
    pub fn transfer(&self, table: &Table) -> Result<(Table, Vec<MatchResult>)> {
        let columns = self.transfer_columns(table)?;
        let matches = self.run(table)?;

        let mut out = table.clone();
        let source_id = self.source.column(&self.source_id_field)?;
        out.append_column(
            "matched_id",
            matches
                .iter()
                .map(|m| self.source.cell(m.source, source_id).to_string())
                .collect(),
        )?;
        out.append_column(
            "match_tier",
            matches.iter().map(|m| m.tier.as_str().to_string()).collect(),
        )?;
        out.append_column(
            "match_distance",
            matches.iter().map(|m| m.distance.to_string()).collect(),
        )?;
        for (col, name) in columns {
            out.append_column(
                &name,
                matches
                    .iter()
                    .map(|m| self.source.cell(m.source, col).to_string())
                    .collect(),
            )?;
        }
        Ok((out, matches))
    }
}
