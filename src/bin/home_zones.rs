// Assigns every agent's home location to a census zone.
//
// Homes are the origins of trips that leave from a `home` activity. Points
// inside a zone polygon take that zone; points outside every polygon (on
// borders, lakes, or just outside the country) take the zone whose centroid
// is nearest, unless --no-fix-by-distance is given.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tripmerge::config::PipelineConfig;
use tripmerge::spatial::{load_zones, ZoneImputation, ZoneIndex};
use tripmerge::{delimiter_byte, logging, Enrich};

#[derive(Parser, Debug)]
#[command(about = "Impute the census zone of each agent's home location")]
struct Args {
    /// Trip table with `person_id`, `preceedingPurpose`, `origin_x`, `origin_y`
    #[arg(long)]
    trips: PathBuf,
    /// Zone polygons as a GeoJSON feature collection
    #[arg(long)]
    zones: PathBuf,
    /// Table of zone attributes (canton, municipality type) keyed by zone id
    #[arg(long)]
    zone_attributes: Option<PathBuf>,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    output: PathBuf,
    #[arg(long, default_value_t = ',')]
    output_delimiter: char,
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Leave points outside every zone unassigned
    #[arg(long)]
    no_fix_by_distance: bool,
}

fn main() -> Result<()> {
    logging::setup();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(n) = args.chunk_size {
        config.join.chunk_size = n;
    }
    if args.no_fix_by_distance {
        config.join.fix_by_distance = false;
    }

    let trips = config
        .source("trips")
        .load(&args.trips)
        .with_context(|| format!("loading trips from {}", args.trips.display()))?;
    let selection = config.home_selection();
    let homes = selection.select(&trips)?;

    let id_field = config.join.zone_id_field.as_str();
    let attributes: Vec<&str> = config.join.zone_attributes.iter().map(String::as_str).collect();
    let zones = load_zones(&args.zones, id_field, &attributes)
        .with_context(|| format!("loading zones from {}", args.zones.display()))?;
    let index = ZoneIndex::new(id_field, zones)?;

    let stage = ZoneImputation {
        joiner: config.join.joiner()?,
        zones: &index,
        point_id_field: selection.person_field.clone(),
        x_field: "x".to_string(),
        y_field: "y".to_string(),
        zone_attributes: config.join.zone_attributes.clone(),
    };
    let mut homes = stage.enrich(&homes)?;

    if let Some(path) = &args.zone_attributes {
        let table = config
            .source("zone_attributes")
            .load(path)
            .with_context(|| format!("loading zone attributes from {}", path.display()))?;
        let columns: Vec<&str> = table
            .headers()
            .iter()
            .map(String::as_str)
            .filter(|h| *h != id_field)
            .collect();
        homes = homes.left_join(&table, id_field, &columns)?;
    }

    homes
        .write_csv(&args.output, delimiter_byte(args.output_delimiter)?)
        .with_context(|| format!("writing {}", args.output.display()))?;
    Ok(())
}
