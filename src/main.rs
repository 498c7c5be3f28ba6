// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn, LevelFilter};
use std::path::PathBuf;
use std::time::Instant;

use dedupe_lib::errors::{stage_context, Stage};
use dedupe_lib::io::{read_csv, write_results, ConsoleOracle};
use dedupe_lib::models::core::{FieldDefinition, FieldSchema};
use dedupe_lib::persistence::{ModelStore, DEFAULT_SETTINGS_FILE, DEFAULT_TRAINING_FILE};
use dedupe_lib::utils::dedupe_config::DedupeConfig;
use dedupe_lib::utils::env::load_env;
use dedupe_lib::utils::progress_bars::progress_config::ProgressConfig;
use dedupe_lib::DedupePipeline;

#[derive(Parser)]
#[command(author, version, about = "Find and group duplicate records in a CSV file", long_about = None)]
struct Args {
    /// CSV file with the records to deduplicate
    #[arg(short, long)]
    input: PathBuf,

    /// Where to write results (.csv for annotated rows, anything else for JSON)
    #[arg(short, long)]
    output: PathBuf,

    /// Learned settings file; when it exists, labeling and training are skipped
    #[arg(short, long, default_value = DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,

    /// Labeled training pairs, read to resume labeling and rewritten afterwards
    #[arg(short, long, default_value = DEFAULT_TRAINING_FILE)]
    training: PathBuf,

    /// Fields to compare, as `name` or `name:string|exact|text`
    #[arg(short, long = "fields", required = true, num_args = 1..)]
    fields: Vec<String>,

    /// Column holding each record's unique identifier
    #[arg(long, default_value = "listing_id")]
    id_field: String,

    /// Match probability needed to link two records (overrides DEDUPE_THRESHOLD)
    #[arg(long)]
    threshold: Option<f64>,

    /// Treat every field as always present (no missing-value indicators)
    #[arg(long)]
    no_missing: bool,

    /// Increase logging verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    load_env();
    let start = Instant::now();

    let mut config = DedupeConfig::from_env();
    if let Some(threshold) = args.threshold {
        anyhow::ensure!(
            (0.0..=1.0).contains(&threshold),
            "--threshold must be between 0 and 1, got {}",
            threshold
        );
        config.threshold = threshold;
    }
    config.log_config();

    let progress = ProgressConfig::from_env();
    info!(
        "Progress tracking: enabled={}, detailed={}",
        progress.enabled, progress.detailed
    );

    let definitions = args
        .fields
        .iter()
        .map(|field| FieldDefinition::parse_descriptor(field, !args.no_missing))
        .collect::<Result<Vec<_>, _>>()
        .and_then(FieldSchema::new);
    let schema = definitions.map_err(stage_context)?;

    let input_failed = || format!("Run failed during {} stage", Stage::Input);
    let table = read_csv(&args.input).with_context(input_failed)?;
    table
        .check_columns(&schema, &args.id_field)
        .with_context(input_failed)?;
    let records = table.record_set(&args.id_field).map_err(stage_context)?;
    info!("Loaded {} records", records.len());

    let store = ModelStore::new(&args.settings, &args.training);
    let pipeline = DedupePipeline::new(schema, config, store).with_progress(progress);
    let mut oracle = ConsoleOracle::new();

    let outcome = pipeline
        .run(&records, &mut oracle, None)
        .map_err(stage_context)?;
    if outcome.no_candidate_pairs {
        warn!("No candidate pairs were found; no records could be matched");
    }

    write_results(&args.output, &table, &args.id_field, &outcome.memberships)?;
    println!(
        "{} duplicate sets covering {} of {} records written to {} in {:.2?}",
        outcome.stats.clusters,
        outcome.stats.clustered_records,
        records.len(),
        args.output.display(),
        start.elapsed()
    );
    Ok(())
}
