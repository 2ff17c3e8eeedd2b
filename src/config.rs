//! Pipeline configuration, read from a TOML file.
//!
//! Every section is optional; unspecified values fall back to the defaults
//! below. A configuration is validated as a whole when it is loaded, so a
//! bad threshold vector fails before any data is read.

use crate::binning::{
    Binner, CategoricalBinner, CategoryGroup, Dimension, IntervalBinner, Labeler, Thresholds,
};
use crate::error::{Error, Result};
use crate::matching::Matcher;
use crate::spatial::{HomeSelection, SpatialJoiner};
use crate::table::SchemaMapping;
use crate::trips::{DayLimit, TripFilter};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub join: JoinConfig,
    pub matching: MatchingConfig,
    pub trips: TripsConfig,
    pub vehicles: VehiclesConfig,
    pub bins: Vec<BinConfig>,
    /// column mappings per data source, e.g. `[sources.trips]`
    pub sources: BTreeMap<String, SchemaMapping>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    /// Assign points outside every zone to the zone with the nearest centroid
    pub fix_by_distance: bool,
    pub chunk_size: usize,
    /// GeoJSON property holding the zone id
    pub zone_id_field: String,
    /// zone properties appended next to the zone id
    pub zone_attributes: Vec<String>,
}

impl Default for JoinConfig {
    fn default() -> Self {
        JoinConfig {
            fix_by_distance: true,
            chunk_size: 10000,
            zone_id_field: "municipality_id".to_string(),
            zone_attributes: Vec::new(),
        }
    }
}

impl JoinConfig {
    pub fn joiner(&self) -> Result<SpatialJoiner> {
        if self.chunk_size == 0 {
            return Err(Error::Config("join.chunk_size must be > 0".to_string()));
        }
        Ok(SpatialJoiner {
            fix_by_distance: self.fix_by_distance,
            chunk_size: self.chunk_size,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub strata_keys: Vec<String>,
    pub relaxed_keys: Vec<String>,
    pub target_id_field: String,
    pub source_id_field: String,
    /// numeric attribute of the target population
    pub numeric_key: String,
    /// numeric attribute of the source population, `numeric_key` if unset
    pub source_numeric_key: Option<String>,
    pub max_distance: Option<f64>,
    pub source_suffix: String,
    pub transfer: Vec<String>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        MatchingConfig {
            strata_keys: vec!["municipality_type".to_string(), "canton".to_string()],
            relaxed_keys: vec!["municipality_type".to_string()],
            target_id_field: "person_id".to_string(),
            source_id_field: "agent_id".to_string(),
            numeric_key: "distance".to_string(),
            source_numeric_key: None,
            max_distance: None,
            source_suffix: "_source".to_string(),
            transfer: Vec::new(),
        }
    }
}

impl MatchingConfig {
    pub fn matcher(&self) -> Result<Matcher> {
        Matcher::new(
            self.strata_keys.clone(),
            self.relaxed_keys.clone(),
            self.max_distance,
        )
    }

    pub fn source_numeric_key(&self) -> &str {
        self.source_numeric_key.as_deref().unwrap_or(&self.numeric_key)
    }
}

/// How both trip tables are filtered and become agents
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TripsConfig {
    pub exclude_agents: Vec<String>,
    pub mode_field: String,
    /// an empty mode keeps every mode, here and in `source_mode`
    pub mode: Option<String>,
    /// target distances are divided by this, e.g. 1000 for meters to km
    pub distance_scale: f64,
    /// applied after scaling
    pub min_distance: f64,
    pub source_mode_field: String,
    pub source_mode: Option<String>,
    /// source trips are summed per day and averaged over days when set
    pub source_day_field: Option<String>,
    /// only source trips on days numbered below this are kept, given a day
    /// field
    pub source_max_day: Option<f64>,
    pub start_field: String,
    pub travel_time_field: String,
    pub end_field: String,
}

impl Default for TripsConfig {
    fn default() -> Self {
        TripsConfig {
            exclude_agents: vec!["freight".to_string()],
            mode_field: "mode".to_string(),
            mode: Some("car".to_string()),
            distance_scale: 1.0,
            min_distance: 0.001,
            source_mode_field: "mode".to_string(),
            source_mode: Some("Car".to_string()),
            source_day_field: Some("day_of_week".to_string()),
            source_max_day: Some(5.0),
            start_field: "start_time".to_string(),
            travel_time_field: "travel_time".to_string(),
            end_field: "end_time".to_string(),
        }
    }
}

impl TripsConfig {
    /// Filter for the target trips
    pub fn filter(&self, person_field: &str, distance_field: &str) -> Result<TripFilter> {
        if !self.min_distance.is_finite() {
            return Err(Error::Config(format!(
                "trips.min_distance {} is not finite",
                self.min_distance
            )));
        }
        if !(self.distance_scale.is_finite() && self.distance_scale > 0.0) {
            return Err(Error::Config(format!(
                "trips.distance_scale {} must be positive",
                self.distance_scale
            )));
        }
        Ok(TripFilter {
            person_field: person_field.to_string(),
            exclude_agents: self.exclude_agents.clone(),
            mode_field: self.mode_field.clone(),
            mode: non_empty(&self.mode).map(String::from),
            distance_field: distance_field.to_string(),
            distance_scale: self.distance_scale,
            min_distance: Some(self.min_distance),
            days: None,
        })
    }

    /// Day column of the source trips. An empty name switches both the
    /// per-day averaging and the day limit off.
    pub fn source_day_field(&self) -> Option<&str> {
        non_empty(&self.source_day_field)
    }

    /// Filter for the source trips: mode and day only
    pub fn source_filter(&self, person_field: &str, distance_field: &str) -> Result<TripFilter> {
        let days = match (self.source_max_day, self.source_day_field()) {
            (Some(below), _) if !below.is_finite() => {
                return Err(Error::Config(format!(
                    "trips.source_max_day {} is not finite",
                    below
                )))
            }
            (Some(below), Some(field)) => Some(DayLimit {
                field: field.to_string(),
                below,
            }),
            _ => None,
        };
        Ok(TripFilter {
            person_field: person_field.to_string(),
            exclude_agents: Vec::new(),
            mode_field: self.source_mode_field.clone(),
            mode: non_empty(&self.source_mode).map(String::from),
            distance_field: distance_field.to_string(),
            distance_scale: 1.0,
            min_distance: None,
            days,
        })
    }
}

// TOML has no null, so an empty string stands for "not set"
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Vehicle stock: per-type means attached to the source trips, and the
/// composition compared between both populations after matching
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VehiclesConfig {
    pub keys: Vec<String>,
    /// averaged per key combination in the stock file
    pub mean_columns: Vec<String>,
    /// source agents count with this weight in the stock comparison
    pub source_weight: Option<String>,
}

impl Default for VehiclesConfig {
    fn default() -> Self {
        VehiclesConfig {
            keys: vec!["vehicle_type".to_string(), "powertrain".to_string()],
            mean_columns: vec!["consumption".to_string()],
            source_weight: Some("weight".to_string()),
        }
    }
}

fn unit_scale() -> f64 {
    1.0
}

/// One labelled dimension, `kind = "interval"` or `kind = "categorical"`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BinConfig {
    Interval {
        name: String,
        column: String,
        thresholds: Vec<f64>,
        #[serde(default)]
        unit: String,
        #[serde(default = "unit_scale")]
        scale: f64,
    },
    Categorical {
        name: String,
        column: String,
        groups: Vec<GroupConfig>,
        other: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    pub label: String,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub at_most: Option<f64>,
}

impl BinConfig {
    pub fn dimension(&self) -> Result<Dimension> {
        Ok(match self {
            BinConfig::Interval {
                name,
                column,
                thresholds,
                unit,
                scale,
            } => Dimension {
                name: name.clone(),
                column: column.clone(),
                binner: Binner::Interval(IntervalBinner::new(
                    Thresholds::new(thresholds.clone())?,
                    unit,
                    *scale,
                )?),
            },
            BinConfig::Categorical {
                name,
                column,
                groups,
                other,
            } => Dimension {
                name: name.clone(),
                column: column.clone(),
                binner: Binner::Categorical(CategoricalBinner::new(
                    groups
                        .iter()
                        .map(|g| CategoryGroup {
                            label: g.label.clone(),
                            values: g.values.clone(),
                            at_most: g.at_most,
                        })
                        .collect(),
                    other,
                )?),
            },
        })
    }
}

impl PipelineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
        let text = std::fs::read_to_string(path)?;
        PipelineConfig::parse(&text)
    }

    pub fn parse(text: &str) -> Result<PipelineConfig> {
        let config: PipelineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.join.joiner()?;
        self.matching.matcher()?;
        self.trips
            .filter(&self.matching.target_id_field, &self.matching.numeric_key)?;
        self.trips
            .source_filter(&self.matching.source_id_field, self.matching.source_numeric_key())?;
        if self.vehicles.keys.is_empty() {
            return Err(Error::Config("vehicles.keys must not be empty".to_string()));
        }
        self.labeler()?;
        for source in self.sources.values() {
            source.delimiter_byte()?;
        }
        Ok(())
    }

    pub fn labeler(&self) -> Result<Labeler> {
        let mut names = Vec::new();
        for b in &self.bins {
            let name = match b {
                BinConfig::Interval { name, .. } | BinConfig::Categorical { name, .. } => name,
            };
            if names.contains(&name) {
                return Err(Error::Config(format!("bins `{}` is defined twice", name)));
            }
            names.push(name);
        }
        Ok(Labeler {
            dimensions: self
                .bins
                .iter()
                .map(|b| b.dimension())
                .collect::<Result<Vec<_>>>()?,
        })
    }

    /// Home departures of the target agents, keyed like the matching and
    /// skipping the same agents as the trip filter
    pub fn home_selection(&self) -> HomeSelection {
        HomeSelection {
            person_field: self.matching.target_id_field.clone(),
            exclude: self.trips.exclude_agents.clone(),
            ..HomeSelection::default()
        }
    }

    /// The mapping for a named source, or the identity mapping
    pub fn source(&self, name: &str) -> SchemaMapping {
        self.sources.get(name).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = PipelineConfig::parse("").unwrap();
        assert!(config.join.fix_by_distance);
        assert_eq!(config.join.chunk_size, 10000);
        assert_eq!(config.matching.source_numeric_key(), "distance");
        assert_eq!(config.source("trips").delimiter, ',');
        assert_eq!(config.trips.mode.as_deref(), Some("car"));
        assert_eq!(config.trips.min_distance, 0.001);
        assert_eq!(config.trips.distance_scale, 1.0);
        assert_eq!(config.vehicles.keys, vec!["vehicle_type", "powertrain"]);
        assert!(config.labeler().unwrap().dimensions.is_empty());

        let source = config.trips.source_filter("agent_id", "distance").unwrap();
        assert_eq!(source.mode.as_deref(), Some("Car"));
        assert_eq!(source.min_distance, None);
        let days = source.days.unwrap();
        assert_eq!((days.field.as_str(), days.below), ("day_of_week", 5.0));
    }

    #[test]
    fn test_trip_options() {
        let text = r#"
            [matching]
            target_id_field = "agent"

            [trips]
            exclude_agents = ["freight", "transit"]
            distance_scale = 1000.0
            source_mode = "car"
            source_max_day = 7.0
        "#;
        let config = PipelineConfig::parse(text).unwrap();
        let target = config.trips.filter("agent", "network_distance").unwrap();
        assert_eq!(target.distance_scale, 1000.0);
        assert_eq!(target.min_distance, Some(0.001));
        assert!(target.days.is_none());
        let source = config.trips.source_filter("agent_id", "distance").unwrap();
        assert_eq!(source.distance_scale, 1.0);
        assert_eq!(source.days.unwrap().below, 7.0);

        let homes = config.home_selection();
        assert_eq!(homes.person_field, "agent");
        assert_eq!(homes.exclude, vec!["freight", "transit"]);
        assert_eq!(homes.purpose_field, "preceedingPurpose");

        let any_day = PipelineConfig::parse("[trips]\nsource_day_field = \"\"\nsource_mode = \"\"")
            .unwrap();
        assert_eq!(any_day.trips.source_day_field(), None);
        let source = any_day.trips.source_filter("agent_id", "distance").unwrap();
        assert!(source.days.is_none());
        assert!(source.mode.is_none());
    }

    #[test]
    fn test_full_config() {
        let text = r#"
            [join]
            chunk_size = 500
            zone_id_field = "GMDNR"
            zone_attributes = ["canton_id"]

            [matching]
            strata_keys = ["municipality_type", "canton"]
            relaxed_keys = ["municipality_type"]
            numeric_key = "network_distance"
            source_numeric_key = "distance"
            max_distance = 5.0
            transfer = ["powertrain", "fuel"]

            [[bins]]
            kind = "interval"
            name = "distance"
            column = "year_km"
            thresholds = [11000, 20000]
            unit = "km"

            [[bins]]
            kind = "categorical"
            name = "agglo"
            column = "agglo_type"
            other = "rural"
            groups = [{ label = "urban", values = ["1", "2", "3", "4"] }]

            [sources.beddem]
            delimiter = ";"
            rename = { AgentID = "agent_id", Kanton = "canton" }
            required = ["agent_id"]
        "#;
        let config = PipelineConfig::parse(text).unwrap();
        assert_eq!(config.join.chunk_size, 500);
        assert!(config.join.fix_by_distance);
        assert_eq!(config.matching.max_distance, Some(5.0));
        assert_eq!(config.matching.source_numeric_key(), "distance");
        assert_eq!(config.matching.source_suffix, "_source");

        let labeler = config.labeler().unwrap();
        assert_eq!(labeler.dimensions.len(), 2);
        assert_eq!(labeler.dimensions[0].labels()[2], "> 20000km");

        let beddem = config.source("beddem");
        assert_eq!(beddem.delimiter_byte().unwrap(), b';');
        assert_eq!(beddem.rename["Kanton"], "canton");
    }

    #[test]
    fn test_invalid_configs() {
        let bad = [
            "[join]\nchunk_size = 0",
            "[matching]\nstrata_keys = [\"canton\"]\nrelaxed_keys = [\"region\"]",
            "[matching]\nmax_distance = -1.0",
            "[[bins]]\nkind = \"interval\"\nname = \"d\"\ncolumn = \"d\"\nthresholds = [2, 1]",
            "[[bins]]\nkind = \"interval\"\nname = \"d\"\ncolumn = \"d\"\nthresholds = [1]\n\
             [[bins]]\nkind = \"interval\"\nname = \"d\"\ncolumn = \"e\"\nthresholds = [1]",
            "[sources.x]\ndelimiter = \"\u{e9}\"",
            "[trips]\ndistance_scale = 0.0",
            "[trips]\nsource_max_day = inf",
            "[vehicles]\nkeys = []",
        ];
        for text in bad {
            assert!(
                matches!(PipelineConfig::parse(text), Err(Error::Config(_))),
                "{}",
                text
            );
        }
        assert!(matches!(
            PipelineConfig::parse("[join]\nchunk_size = \"many\""),
            Err(Error::Toml(_))
        ));
    }
}
