// Gives every simulated agent the vehicle of its closest survey respondent.
//
// Both trip tables are reduced to one row per agent carrying the strata
// (municipality type, canton) and the travelled distance. Each simulated
// agent is then matched to the survey agent with the closest distance in the
// same strata, falling back to the relaxed strata where needed, and the
// survey agent's attributes are copied over. Survey trips are limited to
// weekday car trips first and can carry the mean consumption of their
// vehicle type.

use anyhow::{Context, Result};
use clap::Parser;
use log::warn;
use std::path::PathBuf;
use tripmerge::aggregate::stock_comparison;
use tripmerge::config::PipelineConfig;
use tripmerge::matching::MatchTransfer;
use tripmerge::quality::{MatchSummary, DEFAULT_TOLERANCE, DEFAULT_TRIP_TOLERANCE};
use tripmerge::trips::{AgentAggregation, TripEnrichment, VehicleAttributes};
use tripmerge::{delimiter_byte, logging, Enrich};

#[derive(Parser, Debug)]
#[command(about = "Match simulated agents to survey agents and transfer their attributes")]
struct Args {
    /// Survey trips (the source population)
    #[arg(long)]
    source: PathBuf,
    /// Simulated trips (the target population)
    #[arg(long)]
    trips: PathBuf,
    /// Home zones of the simulated agents, as written by home_zones
    #[arg(long)]
    homes: PathBuf,
    /// Vehicle stock of the survey; its per vehicle type means are added to
    /// the survey trips
    #[arg(long)]
    vehicles: Option<PathBuf>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Matched agents
    #[arg(long)]
    output: PathBuf,
    /// Simulated trips with the transferred attributes and end times
    #[arg(long)]
    trips_output: Option<PathBuf>,
    /// Match quality table
    #[arg(long)]
    report: Option<PathBuf>,
    /// Vehicle type shares of the matched agents next to the survey's
    #[arg(long)]
    stock_output: Option<PathBuf>,
    #[arg(long, default_value_t = ',')]
    output_delimiter: char,
    /// Retry in the relaxed strata when the closest exact match is farther
    #[arg(long)]
    max_distance: Option<f64>,
}

fn main() -> Result<()> {
    logging::setup();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if args.max_distance.is_some() {
        config.matching.max_distance = args.max_distance;
    }
    let matching = &config.matching;
    let delimiter = delimiter_byte(args.output_delimiter)?;

    // survey agents
    let source_numeric_key = matching.source_numeric_key();
    let source_trips = config
        .source("source")
        .load(&args.source)
        .with_context(|| format!("loading source trips from {}", args.source.display()))?;
    let source_trips = config
        .trips
        .source_filter(&matching.source_id_field, source_numeric_key)?
        .apply(&source_trips)?;
    let vehicles = &config.vehicles;
    let source_trips = match &args.vehicles {
        Some(path) => {
            let stock = config
                .source("vehicles")
                .load(path)
                .with_context(|| format!("loading vehicle stock from {}", path.display()))?;
            VehicleAttributes {
                stock: &stock,
                keys: vehicles.keys.clone(),
                columns: vehicles.mean_columns.clone(),
            }
            .enrich(&source_trips)?
        }
        None => source_trips,
    };

    let mut wanted: Vec<&String> = matching.transfer.iter().collect();
    if args.vehicles.is_some() {
        wanted.extend(&vehicles.mean_columns);
    }
    if args.stock_output.is_some() {
        wanted.extend(&vehicles.keys);
        wanted.extend(&vehicles.source_weight);
    }
    let mut keep: Vec<String> = matching.strata_keys.clone();
    for c in wanted {
        if !keep.contains(c) && c != source_numeric_key && c != &matching.source_id_field {
            keep.push(c.clone());
        }
    }
    let source = AgentAggregation {
        person_field: matching.source_id_field.clone(),
        distance_field: source_numeric_key.to_string(),
        day_field: config.trips.source_day_field().map(String::from),
        keep,
    }
    .aggregate(&source_trips)?;

    // simulated agents
    let trips = config
        .source("trips")
        .load(&args.trips)
        .with_context(|| format!("loading trips from {}", args.trips.display()))?;
    let trips = config
        .trips
        .filter(&matching.target_id_field, &matching.numeric_key)?
        .apply(&trips)?;
    let agents = AgentAggregation {
        person_field: matching.target_id_field.clone(),
        distance_field: matching.numeric_key.clone(),
        day_field: None,
        keep: Vec::new(),
    }
    .aggregate(&trips)?;

    let homes = config
        .source("homes")
        .load(&args.homes)
        .with_context(|| format!("loading homes from {}", args.homes.display()))?;
    let strata: Vec<&str> = matching.strata_keys.iter().map(String::as_str).collect();
    let agents = agents.left_join(&homes, &matching.target_id_field, &strata)?;
    let before = agents.len();
    let agents = agents.filter(|row| {
        row[row.len() - strata.len()..]
            .iter()
            .all(|v| !v.trim().is_empty())
    });
    if agents.len() < before {
        warn!(
            "Dropped {} agents without a home zone",
            before - agents.len()
        );
    }

    let stage = MatchTransfer {
        matcher: matching.matcher()?,
        source: &source,
        source_id_field: matching.source_id_field.clone(),
        source_numeric_key: source_numeric_key.to_string(),
        target_id_field: matching.target_id_field.clone(),
        target_numeric_key: matching.numeric_key.clone(),
        transfer: matching.transfer.clone(),
        suffix: matching.source_suffix.clone(),
    };
    let (matched, results) = stage.transfer(&agents)?;
    matched
        .write_csv(&args.output, delimiter)
        .with_context(|| format!("writing {}", args.output.display()))?;

    let (source_population, target_population) = stage.populations(&agents)?;
    let summary = MatchSummary::new(
        &results,
        &source_population,
        &target_population,
        DEFAULT_TOLERANCE,
    )
    .with_trip_counts(
        &results,
        &agents.numeric_column("number_trips")?,
        &source.numeric_column("number_trips")?,
        DEFAULT_TRIP_TOLERANCE,
    );
    summary.log();
    if let Some(path) = &args.report {
        summary
            .to_table()?
            .write_csv(path, delimiter)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    if let Some(path) = &args.stock_output {
        let keys: Vec<&str> = vehicles.keys.iter().map(String::as_str).collect();
        stock_comparison(&matched, &source, &keys, vehicles.source_weight.as_deref())
            .context("comparing vehicle stocks")?
            .write_csv(path, delimiter)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    if let Some(path) = &args.trips_output {
        let enrichment = TripEnrichment {
            agents: &matched,
            person_field: matching.target_id_field.clone(),
            columns: matched.headers()[agents.headers().len()..].to_vec(),
            start_field: config.trips.start_field.clone(),
            travel_time_field: config.trips.travel_time_field.clone(),
            end_field: config.trips.end_field.clone(),
        };
        enrichment
            .enrich_to_file(&trips, path, delimiter)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}
