//! Turns continuous or coded values into ordered class labels.
//!
//! Interval bins follow a strictly increasing threshold vector of length N:
//! bin 0 covers `[0, t1)`, bin i covers `[t_i, t_{i+1})` and bin N is
//! everything from `t_N` upwards. A value equal to a threshold belongs to the
//! upper bin.

use crate::error::{Error, Result};
use crate::table::Table;
use crate::traits::Enrich;
use log::info;
use std::cmp::Ordering;

/// Separator between the per-dimension parts of a composite label
pub const COMPOSITE_SEPARATOR: &str = "-";

#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds(Vec<f64>);

impl Thresholds {
    pub fn new(values: Vec<f64>) -> Result<Thresholds> {
        if values.is_empty() {
            return Err(Error::Config("thresholds must not be empty".to_string()));
        }
        if let Some(v) = values.iter().find(|v| !v.is_finite()) {
            return Err(Error::Config(format!("threshold {} is not finite", v)));
        }
        if values.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::Config(format!(
                "thresholds {:?} are not strictly increasing",
                values
            )));
        }
        Ok(Thresholds(values))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of bins, one more than the number of thresholds
    pub fn bins(&self) -> usize {
        self.0.len() + 1
    }

    pub fn bin_index(&self, value: f64) -> usize {
        self.0.partition_point(|t| *t <= value)
    }
}

/// Index of the interval containing `value`
pub fn bin_index(value: f64, thresholds: &Thresholds) -> usize {
    thresholds.bin_index(value)
}

fn bound(v: f64) -> String {
    format!("{}", v)
}

/// Label of the interval containing `value`, bounds printed as given
pub fn label(value: f64, thresholds: &Thresholds, unit: &str) -> String {
    interval_label(thresholds.bin_index(value), thresholds.as_slice(), unit)
}

// `thresholds` is never empty: it comes from a validated `Thresholds`
fn interval_label(index: usize, thresholds: &[f64], unit: &str) -> String {
    let n = thresholds.len();
    if index == 0 {
        format!("[0, {}{}]", bound(thresholds[0]), unit)
    } else if index >= n {
        format!("> {}{}", bound(thresholds[n - 1]), unit)
    } else {
        format!(
            "[{}{}, {}{}]",
            bound(thresholds[index - 1]),
            unit,
            bound(thresholds[index]),
            unit
        )
    }
}

/// Numeric lower bound of an interval label, e.g. `50` for `[50km, 100km]`
/// and `100` for `> 100km`.
pub fn parse_lower_bound(label: &str) -> Option<f64> {
    let rest = label
        .strip_prefix('[')
        .or_else(|| label.strip_prefix('>'))?
        .trim_start();
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// Orders interval labels by their lower bound. Labels that carry no bound
/// sort after those that do, alphabetically.
pub fn compare_labels(a: &str, b: &str) -> Ordering {
    match (parse_lower_bound(a), parse_lower_bound(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// A label together with the index of its class. Ordering follows the index,
/// not the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledInterval {
    pub index: usize,
    pub label: String,
}

impl Ord for LabeledInterval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index
            .cmp(&other.index)
            .then_with(|| self.label.cmp(&other.label))
    }
}

impl PartialOrd for LabeledInterval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone)]
pub struct IntervalBinner {
    thresholds: Thresholds,
    unit: String,
    /// bounds are divided by this for display, e.g. 1000 to print meters as km
    scale: f64,
}

impl IntervalBinner {
    pub fn new(thresholds: Thresholds, unit: &str, scale: f64) -> Result<IntervalBinner> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(Error::Config(format!("scale {} must be positive", scale)));
        }
        Ok(IntervalBinner {
            thresholds,
            unit: unit.to_string(),
            scale,
        })
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn classify(&self, value: f64) -> LabeledInterval {
        let index = self.thresholds.bin_index(value);
        LabeledInterval {
            index,
            label: self.label_of(index),
        }
    }

    /// Label of bin `index`
    pub fn label_of(&self, index: usize) -> String {
        let display: Vec<f64> = self
            .thresholds
            .as_slice()
            .iter()
            .map(|t| t / self.scale)
            .collect();
        interval_label(index, &display, &self.unit)
    }

    /// All labels in bin order
    pub fn labels(&self) -> Vec<String> {
        (0..self.thresholds.bins()).map(|i| self.label_of(i)).collect()
    }
}

/// A named group of coded values. A value belongs to the group if it is
/// listed in `values`, or if it is numeric and not above `at_most`.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryGroup {
    pub label: String,
    pub values: Vec<String>,
    pub at_most: Option<f64>,
}

impl CategoryGroup {
    fn contains(&self, raw: &str) -> bool {
        let raw = raw.trim();
        if self.values.iter().any(|v| v == raw) {
            return true;
        }
        match (self.at_most, raw.parse::<f64>()) {
            (Some(max), Ok(v)) => v <= max,
            _ => false,
        }
    }
}

/// Maps coded values onto group labels; the first matching group wins and
/// anything else gets the `other` label.
#[derive(Debug, Clone)]
pub struct CategoricalBinner {
    groups: Vec<CategoryGroup>,
    other: String,
}

impl CategoricalBinner {
    pub fn new(groups: Vec<CategoryGroup>, other: &str) -> Result<CategoricalBinner> {
        if groups.is_empty() {
            return Err(Error::Config("categorical bins need at least one group".to_string()));
        }
        Ok(CategoricalBinner {
            groups,
            other: other.to_string(),
        })
    }

    pub fn classify(&self, raw: &str) -> LabeledInterval {
        match self.groups.iter().position(|g| g.contains(raw)) {
            Some(index) => LabeledInterval {
                index,
                label: self.groups[index].label.clone(),
            },
            None => LabeledInterval {
                index: self.groups.len(),
                label: self.other.clone(),
            },
        }
    }

    pub fn labels(&self) -> Vec<String> {
        self.groups
            .iter()
            .map(|g| g.label.clone())
            .chain(std::iter::once(self.other.clone()))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum Binner {
    Interval(IntervalBinner),
    Categorical(CategoricalBinner),
}

/// One labelled dimension: a source column and how to bin it
#[derive(Debug, Clone)]
pub struct Dimension {
    pub name: String,
    pub column: String,
    pub binner: Binner,
}

impl Dimension {
    fn classify(&self, table: &Table, row: usize, col: usize) -> Result<LabeledInterval> {
        Ok(match &self.binner {
            Binner::Interval(b) => b.classify(table.numeric(row, col)?),
            Binner::Categorical(b) => b.classify(table.cell(row, col)),
        })
    }

    pub fn labels(&self) -> Vec<String> {
        match &self.binner {
            Binner::Interval(b) => b.labels(),
            Binner::Categorical(b) => b.labels(),
        }
    }
}

/// The per-dimension class indices and the joined label of one record.
/// Ordering follows the indices, dimension by dimension.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CompositeLabel {
    pub indices: Vec<usize>,
    pub label: String,
}

pub fn composite_label(parts: &[(&str, &LabeledInterval)]) -> CompositeLabel {
    CompositeLabel {
        indices: parts.iter().map(|(_, l)| l.index).collect(),
        label: parts
            .iter()
            .map(|(name, l)| format!("{}_{}", name, l.label))
            .collect::<Vec<_>>()
            .join(COMPOSITE_SEPARATOR),
    }
}

/// Appends `<name>_class` and `<name>_label` for every dimension, plus the
/// composite `label` column.
pub struct Labeler {
    pub dimensions: Vec<Dimension>,
}

impl Labeler {
    pub fn classify_rows(&self, table: &Table) -> Result<Vec<Vec<LabeledInterval>>> {
        let cols = self
            .dimensions
            .iter()
            .map(|d| table.column(&d.column))
            .collect::<Result<Vec<_>>>()?;
        (0..table.len())
            .map(|row| {
                self.dimensions
                    .iter()
                    .zip(&cols)
                    .map(|(d, &c)| d.classify(table, row, c))
                    .collect()
            })
            .collect()
    }
}

impl Enrich for Labeler {
    fn enrich(&self, table: &Table) -> Result<Table> {
        let classes = self.classify_rows(table)?;
        let mut out = table.clone();
        for (i, d) in self.dimensions.iter().enumerate() {
            out.append_column(
                &format!("{}_class", d.name),
                classes.iter().map(|c| c[i].index.to_string()).collect(),
            )?;
            out.append_column(
                &format!("{}_label", d.name),
                classes.iter().map(|c| c[i].label.clone()).collect(),
            )?;
        }
        let composite: Vec<String> = classes
            .iter()
            .map(|c| {
                let parts: Vec<_> = self
                    .dimensions
                    .iter()
                    .map(|d| d.name.as_str())
                    .zip(c.iter())
                    .collect();
                composite_label(&parts).label
            })
            .collect();
        out.append_column("label", composite)?;
        info!(
            "Labelled {} rows over {} dimension(s)",
            out.len(),
            self.dimensions.len()
        );
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn meters_as_km() -> IntervalBinner {
        IntervalBinner::new(Thresholds::new(vec![50000.0, 100000.0]).unwrap(), "km", 1000.0).unwrap()
    }

    #[test]
    fn test_distance_bins() {
        let binner = meters_as_km();
        let classes: Vec<_> = [0.0, 49999.0, 50000.0, 150000.0]
            .iter()
            .map(|&v| binner.classify(v))
            .collect();
        let indices: Vec<_> = classes.iter().map(|c| c.index).collect();
        let labels: Vec<_> = classes.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(indices, vec![0, 0, 1, 2]);
        assert_eq!(labels, vec!["[0, 50km]", "[0, 50km]", "[50km, 100km]", "> 100km"]);
    }

    #[test]
    fn test_unscaled_label() {
        let t = Thresholds::new(vec![2.5, 4.0]).unwrap();
        assert_eq!(label(1.0, &t, "h"), "[0, 2.5h]");
        assert_eq!(label(2.5, &t, "h"), "[2.5h, 4h]");
        assert_eq!(label(9.0, &t, "h"), "> 4h");
        assert_eq!(bin_index(4.0, &t), 2);
    }

    #[test]
    fn test_label_needs_valid_thresholds() {
        // neither an empty nor an unsorted vector reaches the labelling code
        assert!(matches!(Thresholds::new(vec![]), Err(Error::Config(_))));
        assert!(matches!(
            Thresholds::new(vec![100.0, 50.0]),
            Err(Error::Config(_))
        ));
        let single = Thresholds::new(vec![50.0]).unwrap();
        assert_eq!(bin_index(75.0, &single), 1);
        assert_eq!(label(5.0, &single, "km"), "[0, 50km]");
        assert_eq!(label(75.0, &single, "km"), "> 50km");
    }

    #[test]
    fn test_bin_index_is_monotonic() {
        let t = Thresholds::new(vec![11000.0, 20000.0, 35000.0]).unwrap();
        let mut last = 0;
        for i in 0..500 {
            let v = i as f64 * 97.3;
            let b = t.bin_index(v);
            assert!(b >= last);
            assert!(b < t.bins());
            last = b;
        }
        assert_eq!(last, 3);
    }

    #[test]
    fn test_thresholds_validated() {
        assert!(Thresholds::new(vec![]).is_err());
        assert!(Thresholds::new(vec![1.0, 1.0]).is_err());
        assert!(Thresholds::new(vec![2.0, 1.0]).is_err());
        assert!(Thresholds::new(vec![1.0, f64::INFINITY]).is_err());
        assert!(IntervalBinner::new(Thresholds::new(vec![1.0]).unwrap(), "km", 0.0).is_err());
    }

    #[test]
    fn test_labels_sort_like_bins() {
        let binner = meters_as_km();
        let mut labels = binner.labels();
        labels.reverse();
        labels.sort_by(|a, b| compare_labels(a, b));
        assert_eq!(labels, binner.labels());
        assert_eq!(parse_lower_bound("> 100km"), Some(100.0));
        assert_eq!(parse_lower_bound("[2.5h, 4h]"), Some(2.5));
        assert_eq!(parse_lower_bound("urban"), None);

        // "[100km, ..." would sort before "[50km, ..." as plain text
        let mut classes = vec![binner.classify(150000.0), binner.classify(1.0), binner.classify(60000.0)];
        classes.sort();
        let indices: Vec<_> = classes.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    fn income() -> CategoricalBinner {
        CategoricalBinner::new(
            vec![CategoryGroup {
                label: "<=10,000CHF".into(),
                values: vec![],
                at_most: Some(5.0),
            }],
            ">10,000CHF",
        )
        .unwrap()
    }

    fn agglo() -> CategoricalBinner {
        CategoricalBinner::new(
            vec![CategoryGroup {
                label: "urban".into(),
                values: vec!["1".into(), "2".into(), "3".into(), "4".into()],
                at_most: None,
            }],
            "rural",
        )
        .unwrap()
    }

    #[test]
    fn test_categorical_groups() {
        assert_eq!(income().classify("5").label, "<=10,000CHF");
        assert_eq!(income().classify("6").label, ">10,000CHF");
        assert_eq!(income().classify("").index, 1);
        assert_eq!(agglo().classify(" 3 ").label, "urban");
        assert_eq!(agglo().classify("5").label, "rural");
        assert!(CategoricalBinner::new(vec![], "x").is_err());
    }

    #[test]
    fn test_labeler_appends_columns() {
        let table = Table::from_rows(
            vec!["agentId".into(), "year_km".into(), "income".into(), "agglo_type".into()],
            vec![
                vec!["1".into(), "25000".into(), "3".into(), "2".into()],
                vec!["2".into(), "9000".into(), "8".into(), "5".into()],
            ],
        )
        .unwrap();
        let labeler = Labeler {
            dimensions: vec![
                Dimension {
                    name: "distance".into(),
                    column: "year_km".into(),
                    binner: Binner::Interval(
                        IntervalBinner::new(Thresholds::new(vec![11000.0, 20000.0]).unwrap(), "km", 1.0)
                            .unwrap(),
                    ),
                },
                Dimension {
                    name: "income".into(),
                    column: "income".into(),
                    binner: Binner::Categorical(income()),
                },
                Dimension {
                    name: "agglo".into(),
                    column: "agglo_type".into(),
                    binner: Binner::Categorical(agglo()),
                },
            ],
        };
        let out = labeler.enrich(&table).unwrap();
        assert_eq!(out.headers().len(), 4 + 2 * 3 + 1);
        let label = out.column("label").unwrap();
        assert_eq!(
            out.cell(0, label),
            "distance_> 20000km-income_<=10,000CHF-agglo_urban"
        );
        assert_eq!(
            out.cell(1, label),
            "distance_[0, 11000km]-income_>10,000CHF-agglo_rural"
        );
        let class = out.column("distance_class").unwrap();
        assert_eq!(out.cell(0, class), "2");

        // labelling twice would overwrite columns
        assert!(labeler.enrich(&out).is_err());
    }

    #[test]
    fn test_composite_label_order() {
        let a = composite_label(&[
            ("range", &LabeledInterval { index: 1, label: "[50km, 100km]".into() }),
            ("time", &LabeledInterval { index: 0, label: "[0, 2h]".into() }),
        ]);
        let b = composite_label(&[
            ("range", &LabeledInterval { index: 0, label: "[0, 50km]".into() }),
            ("time", &LabeledInterval { index: 2, label: "> 4h".into() }),
        ]);
        assert_eq!(a.label, "range_[50km, 100km]-time_[0, 2h]");
        assert!(b < a);
    }
}
