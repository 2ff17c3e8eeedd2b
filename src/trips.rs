//! Trip tables: filtering, per-agent totals and writing matched attributes
//! back onto every trip.

use crate::aggregate::group_means;
use crate::error::Result;
use crate::table::Table;
use crate::traits::Enrich;
use log::{info, warn};
use std::collections::HashMap;

/// Keeps trips on days numbered below `below`, e.g. `day_of_week < 5` for
/// weekdays only
#[derive(Debug, Clone)]
pub struct DayLimit {
    pub field: String,
    pub below: f64,
}

/// Which trips count towards an agent's total
#[derive(Debug, Clone)]
pub struct TripFilter {
    pub person_field: String,
    /// agents whose id contains any of these are dropped
    pub exclude_agents: Vec<String>,
    pub mode_field: String,
    /// keep only this mode, or every mode
    pub mode: Option<String>,
    pub distance_field: String,
    /// distances are divided by this first, e.g. 1000 for meters to km.
    /// The kept trips carry the scaled values.
    pub distance_scale: f64,
    /// trips must be strictly longer than this, after scaling
    pub min_distance: Option<f64>,
    pub days: Option<DayLimit>,
}

impl TripFilter {
    pub fn apply(&self, trips: &Table) -> Result<Table> {
        let mut trips = trips.clone();
        // map_numeric also surfaces bad distances with their row numbers
        let scale = self.distance_scale;
        trips.map_numeric(&self.distance_field, |d| d / scale)?;

        let person = trips.column(&self.person_field)?;
        let mode = match &self.mode {
            Some(m) => Some((trips.column(&self.mode_field)?, m.as_str())),
            None => None,
        };
        let distance = trips.column(&self.distance_field)?;
        let days = match &self.days {
            Some(limit) => {
                let col = trips.column(&limit.field)?;
                for row in 0..trips.len() {
                    trips.numeric(row, col)?;
                }
                Some((col, limit.below))
            }
            None => None,
        };

        let numeric = |cell: &str| cell.trim().parse::<f64>().ok();
        let kept = trips.filter(|row| {
            !self.exclude_agents.iter().any(|e| row[person].contains(e.as_str()))
                && mode.map_or(true, |(c, m)| row[c] == m)
                && self
                    .min_distance
                    .map_or(true, |min| numeric(&row[distance]).map_or(false, |d| d > min))
                && days.map_or(true, |(c, below)| numeric(&row[c]).map_or(false, |d| d < below))
        });
        info!("Kept {} of {} trips", kept.len(), trips.len());
        Ok(kept)
    }
}

/// Sums a distance column per agent
#[derive(Debug, Clone)]
pub struct AgentAggregation {
    pub person_field: String,
    pub distance_field: String,
    /// When set, totals are summed per day first and then averaged over the
    /// days an agent travelled.
    pub day_field: Option<String>,
    /// per-agent attributes copied from the agent's first trip
    pub keep: Vec<String>,
}

impl AgentAggregation {
    /// One row per agent in order of first appearance: the person field, the
    /// kept attributes, the distance total and `number_trips`.
    pub fn aggregate(&self, trips: &Table) -> Result<Table> {
        let person = trips.column(&self.person_field)?;
        let distance = trips.column(&self.distance_field)?;
        let day_col = match &self.day_field {
            Some(d) => Some(trips.column(d)?),
            None => None,
        };
        let keep = self
            .keep
            .iter()
            .map(|c| trips.column(c))
            .collect::<Result<Vec<_>>>()?;

        // agent -> (first row, day -> (sum, count))
        let mut order: Vec<&str> = Vec::new();
        let mut agents: HashMap<&str, (usize, Vec<(&str, f64, usize)>)> = HashMap::new();
        for row in 0..trips.len() {
            let id = trips.cell(row, person);
            let d = trips.numeric(row, distance)?;
            let day = day_col.map_or("", |c| trips.cell(row, c));
            let (_, days) = agents.entry(id).or_insert_with(|| {
                order.push(id);
                (row, Vec::new())
            });
            match days.iter_mut().find(|(k, _, _)| *k == day) {
                Some((_, sum, count)) => {
                    *sum += d;
                    *count += 1;
                }
                None => days.push((day, d, 1)),
            }
        }

        let mut headers = vec![self.person_field.clone()];
        headers.extend(self.keep.iter().cloned());
        headers.push(self.distance_field.clone());
        headers.push("number_trips".to_string());
        let mut out = Table::new(headers)?;
        for id in order {
            let (first, days) = &agents[id];
            let n = days.len() as f64;
            let distance: f64 = days.iter().map(|(_, s, _)| s).sum::<f64>() / n;
            let trips_per_day = days.iter().map(|(_, _, c)| *c as f64).sum::<f64>() / n;
            let mut row = vec![id.to_string()];
            row.extend(keep.iter().map(|&c| trips.cell(*first, c).to_string()));
            row.push(distance.to_string());
            row.push(trips_per_day.to_string());
            out.push_row(row)?;
        }
        info!("Aggregated {} trips into {} agents", trips.len(), out.len());
        Ok(out)
    }
}

/// Copies agent attributes onto each trip of the agent, adds the trip end
/// time and orders trips by start and end time.
pub struct TripEnrichment<'a> {
    pub agents: &'a Table,
    pub person_field: String,
    pub columns: Vec<String>,
    pub start_field: String,
    pub travel_time_field: String,
    pub end_field: String,
}

impl Enrich for TripEnrichment<'_> {
    fn enrich(&self, table: &Table) -> Result<Table> {
        let columns: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        let mut out = table.left_join(self.agents, &self.person_field, &columns)?;

        let start = out.numeric_column(&self.start_field)?;
        let travel = out.numeric_column(&self.travel_time_field)?;
        let end = start
            .iter()
            .zip(&travel)
            .map(|(s, t)| (s + t).to_string())
            .collect();
        out.append_column(&self.end_field, end)?;
        out.sort_by_numeric(&[self.start_field.as_str(), self.end_field.as_str()])?;
        Ok(out)
    }
}

/// Attaches the mean of `columns` per combination of `keys` found in a
/// vehicle stock table, e.g. the mean consumption per vehicle type and
/// powertrain. Rows whose combination is not in the stock get empty cells.
pub struct VehicleAttributes<'a> {
    pub stock: &'a Table,
    pub keys: Vec<String>,
    pub columns: Vec<String>,
}

impl Enrich for VehicleAttributes<'_> {
    fn enrich(&self, table: &Table) -> Result<Table> {
        let keys: Vec<&str> = self.keys.iter().map(String::as_str).collect();
        let columns: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        let means = group_means(self.stock, &keys, &columns)?;
        let out = table.left_join_on(&means, &keys, &columns)?;

        if let Some(first) = columns.first() {
            let col = out.column(first)?;
            let missing = (0..out.len()).filter(|&r| out.cell(r, col).is_empty()).count();
            if missing > 0 {
                warn!("{} rows have no vehicle stock entry for {:?}", missing, keys);
            }
        }
        Ok(out)
    }
}
