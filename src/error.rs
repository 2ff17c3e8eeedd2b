use thiserror::Error;

/// Column layout problems. Raised before any row is processed so a stage
/// never produces a partial result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("column `{0}` is missing")]
    MissingColumn(String),

    /// The destination field already exists, so joining would be ambiguous
    #[error("column `{0}` already exists")]
    DuplicateColumn(String),

    #[error("row {row} has {found} cells but the header has {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("invalid geometry for `{id}`: {reason}")]
    InvalidGeometry { id: String, reason: String },

    /// Target records that no matching tier could serve
    #[error("{count} record(s) could not be matched: {}", preview(.ids))]
    Unmatched { count: usize, ids: Vec<String> },

    #[error("duplicate {kind} id `{id}`")]
    DuplicateId { kind: &'static str, id: String },

    #[error("invalid value `{value}` in column `{column}` at row {row}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

// keep error messages readable for large populations
fn preview(ids: &[String]) -> String {
    const MAX: usize = 10;
    if ids.len() <= MAX {
        ids.join(", ")
    } else {
        format!("{}, ... ({} more)", ids[..MAX].join(", "), ids.len() - MAX)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_unmatched_message_is_truncated() {
        let ids: Vec<_> = (0..12).map(|i| i.to_string()).collect();
        let err = Error::Unmatched { count: 12, ids };
        assert_eq!(
            err.to_string(),
            "12 record(s) could not be matched: 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, ... (2 more)"
        );
    }

    #[test]
    fn test_schema_error_converts() {
        let err: Error = SchemaError::MissingColumn("person_id".into()).into();
        assert!(matches!(
            err,
            Error::Schema(SchemaError::MissingColumn(ref c)) if c == "person_id"
        ));
    }
}
