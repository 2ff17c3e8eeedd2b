use crate::error::Result;
use crate::table::Table;
use std::path::Path;

/// Describes a pipeline stage that appends columns to a table.
/// The original columns and row order always survive; the stage only adds
/// what it computed, e.g. zone ids, matched source attributes or labels.
pub trait Enrich {
    /// Compute the enriched table in memory
    fn enrich(&self, table: &Table) -> Result<Table>;

    /// Enrich and write the result as csv.
    /// The file only appears once the whole stage has succeeded, so a
    /// stage that fails halfway never leaves an output that looks complete.
    fn enrich_to_file(&self, table: &Table, path: &Path, delimiter: u8) -> Result<Table> {
        let enriched = self.enrich(table)?;
        enriched.write_csv(path, delimiter)?;
        Ok(enriched)
    }
}
