// Labels agent features with the classes configured under [[bins]] and
// writes the per-class tables used for reporting.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use tripmerge::aggregate::{category_shares, crosstab, group_means, melt_intervals};
use tripmerge::config::PipelineConfig;
use tripmerge::{delimiter_byte, logging, Enrich};

#[derive(Parser, Debug)]
#[command(about = "Label agent features and summarise them per class")]
struct Args {
    #[arg(long)]
    features: PathBuf,
    /// Configuration with at least one [[bins]] dimension
    #[arg(long)]
    config: PathBuf,
    #[arg(long)]
    output: PathBuf,
    /// Count and mean of the `--value-prefix` columns per class combination
    #[arg(long)]
    means: Option<PathBuf>,
    /// The class means in long format, one row per time interval column
    #[arg(long, requires = "value_prefix")]
    melted: Option<PathBuf>,
    /// Columns such as `parked_s[0;900]` share this prefix
    #[arg(long)]
    value_prefix: Option<String>,
    /// Classes of the first dimension against the second
    #[arg(long)]
    crosstab: Option<PathBuf>,
    /// Log the share of every value of this column
    #[arg(long)]
    shares: Option<String>,
    #[arg(long, default_value_t = ',')]
    output_delimiter: char,
}

fn main() -> Result<()> {
    logging::setup();
    let args = Args::parse();
    let delimiter = delimiter_byte(args.output_delimiter)?;

    let config = PipelineConfig::load(&args.config)
        .with_context(|| format!("reading config {}", args.config.display()))?;
    let labeler = config.labeler()?;
    if labeler.dimensions.is_empty() {
        bail!("{} defines no [[bins]]", args.config.display());
    }

    let features = config
        .source("features")
        .load(&args.features)
        .with_context(|| format!("loading features from {}", args.features.display()))?;
    let labelled = labeler
        .enrich_to_file(&features, &args.output, delimiter)
        .with_context(|| format!("writing {}", args.output.display()))?;

    let label_columns: Vec<String> = labeler
        .dimensions
        .iter()
        .map(|d| format!("{}_label", d.name))
        .collect();
    let label_columns: Vec<&str> = label_columns.iter().map(String::as_str).collect();
    let value_columns: Vec<&str> = match &args.value_prefix {
        Some(prefix) => labelled
            .headers()
            .iter()
            .map(String::as_str)
            .filter(|h| h.starts_with(prefix.as_str()))
            .collect(),
        None => Vec::new(),
    };

    if args.means.is_some() || args.melted.is_some() {
        let means = group_means(&labelled, &label_columns, &value_columns)?;
        if let Some(path) = &args.means {
            means
                .write_csv(path, delimiter)
                .with_context(|| format!("writing {}", path.display()))?;
        }
        if let (Some(path), Some(prefix)) = (&args.melted, &args.value_prefix) {
            let mut keep = label_columns.clone();
            keep.push("n");
            melt_intervals(&means, &keep, prefix, prefix)?
                .write_csv(path, delimiter)
                .with_context(|| format!("writing {}", path.display()))?;
        }
    }

    if let Some(path) = &args.crosstab {
        if label_columns.len() < 2 {
            bail!("a crosstab needs two [[bins]] dimensions");
        }
        crosstab(&labelled, label_columns[0], label_columns[1])?
            .write_csv(path, delimiter)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    if let Some(column) = &args.shares {
        for (value, share) in category_shares(&labelled, column)? {
            info!("{} = {}: {:.1}%", column, value, share * 100.0);
        }
    }
    Ok(())
}
