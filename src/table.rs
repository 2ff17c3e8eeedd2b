//! A small string-cell table. Every stage reads one of these, appends
//! columns to it, and hands it on, so original fields always survive.

use crate::error::{Error, Result, SchemaError};
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Read, Write};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::new();
        for h in &headers {
            if !seen.insert(h.as_str()) {
                return Err(SchemaError::DuplicateColumn(h.clone()).into());
            }
        }
        Ok(Table {
            headers,
            rows: Vec::new(),
        })
    }

    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        let mut table = Table::new(headers)?;
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    /// Index of a column, or a schema error naming it
    pub fn column(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| SchemaError::MissingColumn(name.to_string()).into())
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        &self.rows[row][col]
    }

    /// Parse a cell as a float. Empty cells are treated as invalid.
    pub fn numeric(&self, row: usize, col: usize) -> Result<f64> {
        let raw = self.cell(row, col);
        match raw.trim().parse::<f64>() {
            Ok(v) if !v.is_nan() => Ok(v),
            _ => Err(Error::InvalidValue {
                column: self.headers[col].clone(),
                row,
                value: raw.to_string(),
            }),
        }
    }

    /// Every value of a column parsed as a float
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>> {
        let col = self.column(name)?;
        (0..self.len()).map(|row| self.numeric(row, col)).collect()
    }

    pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.headers.len() {
            return Err(SchemaError::RaggedRow {
                row: self.rows.len(),
                expected: self.headers.len(),
                found: row.len(),
            }
            .into());
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn append_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if self.has_column(name) {
            return Err(SchemaError::DuplicateColumn(name.to_string()).into());
        }
        if values.len() != self.rows.len() {
            return Err(Error::Config(format!(
                "column `{}` has {} values for {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }
        self.headers.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// A new table holding only the named columns, in the given order
    pub fn select(&self, names: &[&str]) -> Result<Table> {
        let cols = names
            .iter()
            .map(|n| self.column(n))
            .collect::<Result<Vec<_>>>()?;
        Ok(Table {
            headers: names.iter().map(|n| n.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| cols.iter().map(|&c| row[c].clone()).collect())
                .collect(),
        })
    }

    pub fn filter<F>(&self, keep: F) -> Table
    where
        F: Fn(&[String]) -> bool,
    {
        Table {
            headers: self.headers.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Stable sort by the numeric value of the given columns, in order
    pub fn sort_by_numeric(&mut self, names: &[&str]) -> Result<()> {
        let cols = names
            .iter()
            .map(|n| self.column(n))
            .collect::<Result<Vec<_>>>()?;
        let keys = (0..self.len())
            .map(|row| {
                cols.iter()
                    .map(|&c| self.numeric(row, c))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| {
            keys[a]
                .iter()
                .zip(&keys[b])
                .map(|(x, y)| x.total_cmp(y))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        let mut rows: Vec<Option<Vec<String>>> =
            std::mem::take(&mut self.rows).into_iter().map(Some).collect();
        self.rows = order.into_iter().filter_map(|i| rows[i].take()).collect();
        Ok(())
    }

    /// Append `columns` of `other` to every row, looked up by `key`.
    /// Rows without a partner get empty cells. If `other` repeats a key the
    /// first occurrence wins.
    pub fn left_join(&self, other: &Table, key: &str, columns: &[&str]) -> Result<Table> {
        self.left_join_on(other, &[key], columns)
    }

    /// [`Table::left_join`] on a composite key: a row matches when every
    /// key column agrees.
    pub fn left_join_on(&self, other: &Table, keys: &[&str], columns: &[&str]) -> Result<Table> {
        let own_keys = keys
            .iter()
            .map(|k| self.column(k))
            .collect::<Result<Vec<_>>>()?;
        let other_keys = keys
            .iter()
            .map(|k| other.column(k))
            .collect::<Result<Vec<_>>>()?;
        let other_cols = columns
            .iter()
            .map(|c| other.column(c))
            .collect::<Result<Vec<_>>>()?;
        for c in columns {
            if self.has_column(c) {
                return Err(SchemaError::DuplicateColumn(c.to_string()).into());
            }
        }

        let mut lookup: HashMap<Vec<&str>, usize> = HashMap::new();
        for (i, row) in other.rows.iter().enumerate() {
            let key = other_keys.iter().map(|&k| row[k].as_str()).collect();
            lookup.entry(key).or_insert(i);
        }

        let mut headers = self.headers.clone();
        headers.extend(columns.iter().map(|c| c.to_string()));
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut out = row.clone();
                let key: Vec<&str> = own_keys.iter().map(|&k| row[k].as_str()).collect();
                match lookup.get(&key) {
                    Some(&i) => out.extend(other_cols.iter().map(|&c| other.rows[i][c].clone())),
                    None => out.extend(other_cols.iter().map(|_| String::new())),
                }
                out
            })
            .collect();
        Ok(Table { headers, rows })
    }

    /// Rewrite every value of a numeric column in place
    pub fn map_numeric<F>(&mut self, name: &str, f: F) -> Result<()>
    where
        F: Fn(f64) -> f64,
    {
        let values = self.numeric_column(name)?;
        let col = self.column(name)?;
        for (row, v) in self.rows.iter_mut().zip(values) {
            row[col] = f(v).to_string();
        }
        Ok(())
    }

    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Table> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .from_reader(reader);
        let headers = rdr.headers()?.iter().map(String::from).collect();
        let mut table = Table::new(headers)?;
        for record in rdr.records() {
            let record = record?;
            table.push_row(record.iter().map(String::from).collect())?;
        }
        Ok(table)
    }

    pub fn read_csv<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Table> {
        let file = std::fs::File::open(path)?;
        Table::from_reader(file, delimiter)
    }

    pub fn to_writer<W: Write>(&self, writer: W, delimiter: u8) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(writer);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Write through a temporary file in the destination directory and
    /// rename it into place, so a failed write never leaves a file behind.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P, delimiter: u8) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        self.to_writer(tmp.as_file_mut(), delimiter)?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

/// Maps the column names of one data source onto canonical names
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchemaMapping {
    pub delimiter: char,
    /// raw name -> canonical name
    pub rename: BTreeMap<String, String>,
    /// canonical columns that must be present after renaming
    pub required: Vec<String>,
}

impl Default for SchemaMapping {
    fn default() -> Self {
        SchemaMapping {
            delimiter: ',',
            rename: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

impl SchemaMapping {
    pub fn delimiter_byte(&self) -> Result<u8> {
        if !self.delimiter.is_ascii() {
            return Err(Error::Config(format!(
                "delimiter `{}` is not ASCII",
                self.delimiter
            )));
        }
        Ok(self.delimiter as u8)
    }

    pub fn apply(&self, mut table: Table) -> Result<Table> {
        for (raw, canonical) in &self.rename {
            let col = table.column(raw)?;
            if raw != canonical && table.has_column(canonical) {
                return Err(SchemaError::DuplicateColumn(canonical.clone()).into());
            }
            table.headers[col] = canonical.clone();
        }
        for name in &self.required {
            table.column(name)?;
        }
        Ok(table)
    }

    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Table> {
        let table = Table::read_csv(path, self.delimiter_byte()?)?;
        self.apply(table)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn strings(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|x| x.to_string()).collect()
    }

    fn sample() -> Table {
        Table::from_rows(
            strings(&["person_id", "start_time", "mode"]),
            vec![
                strings(&["2", "30.5", "car"]),
                strings(&["1", "8", "walk"]),
                strings(&["3", "8", "car"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_header_rejected() {
        let err = Table::new(strings(&["a", "a"])).unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::DuplicateColumn(_))));
    }

    #[test]
    fn test_ragged_row_rejected() {
        let mut t = Table::new(strings(&["a", "b"])).unwrap();
        let err = t.push_row(strings(&["1"])).unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(SchemaError::RaggedRow { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn test_missing_column() {
        let err = sample().column("x").unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::MissingColumn(ref c)) if c == "x"));
    }

    #[test]
    fn test_numeric_reports_location() {
        let t = sample();
        let col = t.column("mode").unwrap();
        match t.numeric(1, col).unwrap_err() {
            Error::InvalidValue { column, row, value } => {
                assert_eq!(column, "mode");
                assert_eq!(row, 1);
                assert_eq!(value, "walk");
            }
            e => panic!("unexpected error {e}"),
        }
    }

    #[test]
    fn test_append_column_collision() {
        let mut t = sample();
        let err = t
            .append_column("mode", strings(&["", "", ""]))
            .unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::DuplicateColumn(_))));
    }

    #[test]
    fn test_sort_is_stable() {
        let mut t = sample();
        t.sort_by_numeric(&["start_time"]).unwrap();
        let ids: Vec<_> = t.rows().iter().map(|r| r[0].as_str()).collect();
        assert_eq!(ids, vec!["1", "3", "2"]);
    }

    #[test]
    fn test_left_join_keeps_all_rows() {
        let t = sample();
        let other = Table::from_rows(
            strings(&["person_id", "powertrain"]),
            vec![strings(&["1", "BEV"]), strings(&["2", "ICE"]), strings(&["1", "PHEV"])],
        )
        .unwrap();
        let joined = t.left_join(&other, "person_id", &["powertrain"]).unwrap();
        assert_eq!(joined.len(), 3);
        let col = joined.column("powertrain").unwrap();
        assert_eq!(joined.cell(0, col), "ICE");
        assert_eq!(joined.cell(1, col), "BEV");
        assert_eq!(joined.cell(2, col), "");
    }

    #[test]
    fn test_left_join_on_composite_key() {
        let trips = Table::from_rows(
            strings(&["agent_id", "vehicle_type", "powertrain"]),
            vec![
                strings(&["1", "car", "BEV"]),
                strings(&["2", "car", "ICE"]),
                strings(&["3", "van", "BEV"]),
            ],
        )
        .unwrap();
        let means = Table::from_rows(
            strings(&["vehicle_type", "powertrain", "consumption"]),
            vec![strings(&["car", "ICE", "6.5"]), strings(&["car", "BEV", "17"])],
        )
        .unwrap();
        let joined = trips
            .left_join_on(&means, &["vehicle_type", "powertrain"], &["consumption"])
            .unwrap();
        let col = joined.column("consumption").unwrap();
        let values: Vec<_> = (0..3).map(|r| joined.cell(r, col)).collect();
        assert_eq!(values, vec!["17", "6.5", ""]);
    }

    #[test]
    fn test_map_numeric() {
        let mut t = sample();
        t.map_numeric("start_time", |v| v / 2.0).unwrap();
        let col = t.column("start_time").unwrap();
        assert_eq!(t.cell(0, col), "15.25");
        assert_eq!(t.cell(1, col), "4");
        assert!(t.map_numeric("mode", |v| v).is_err());
    }

    #[test]
    fn test_schema_mapping_renames_and_validates() {
        let raw = "AgentID;Kanton;Distance\n7;1;12.5\n";
        let table = Table::from_reader(raw.as_bytes(), b';').unwrap();
        let mapping = SchemaMapping {
            delimiter: ';',
            rename: [("AgentID", "agent_id"), ("Kanton", "canton")]
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            required: strings(&["agent_id", "canton", "Distance"]),
        };
        let table = mapping.apply(table).unwrap();
        assert_eq!(table.headers(), &strings(&["agent_id", "canton", "Distance"])[..]);

        let missing = SchemaMapping {
            required: strings(&["weight"]),
            ..SchemaMapping::default()
        };
        assert!(missing.apply(table).is_err());
    }

    #[test]
    fn test_write_csv_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let t = sample();
        t.write_csv(&path, b',').unwrap();
        let back = Table::read_csv(&path, b',').unwrap();
        assert_eq!(back, t);
        // only the final file remains in the directory
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
