pub mod aggregate;
pub mod binning;
pub mod config;
pub mod error;
pub mod logging;
pub mod matching;
pub mod quality;
pub mod spatial;
pub mod table;
pub mod traits;
pub mod trips;

pub use error::{Error, Result, SchemaError};
pub use table::{SchemaMapping, Table};
pub use traits::Enrich;

/// Delimiter byte of a single character `--delimiter` argument
pub fn delimiter_byte(c: char) -> Result<u8> {
    SchemaMapping {
        delimiter: c,
        ..SchemaMapping::default()
    }
    .delimiter_byte()
}
