// src/bin/report_model_weights.rs
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use dedupe_lib::persistence::settings;

#[derive(Parser)]
#[command(author, version, about = "Print the learned weights of a settings file", long_about = None)]
struct Args {
    /// Settings file written by a dedupe run
    settings: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let stored = settings::read(&args.settings)
        .with_context(|| format!("Failed to read settings from {}", args.settings.display()))?;
    let model = &stored.model;

    println!("--- Dedupe Model Weight Report ---");
    println!("Settings file: {}", args.settings.display());
    println!("Field fingerprint: {}", stored.fingerprint);
    println!("Created at: {}", stored.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Trained on {} labeled examples\n", model.trained_on());

    println!("  Fields:");
    for field in model.schema().fields() {
        println!(
            "    {} ({}{})",
            field.name,
            field.kind,
            if field.has_missing { ", missing allowed" } else { "" }
        );
    }
    println!();

    let mut weights = model.feature_weights();
    weights.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()).then_with(|| a.0.cmp(&b.0)));

    println!("  Most Influential Features (Sorted by Absolute Weight):");
    println!("  ------------------------------------------------------");
    println!("  | {:<35} | {:>10} |", "Feature Name", "Weight");
    println!("  |-------------------------------------|------------|");
    for (name, weight) in &weights {
        println!("  | {:<35} | {:>10.4} |", name, weight);
    }
    println!("  |-------------------------------------|------------|");
    println!("  | {:<35} | {:>10.4} |", "(Bias Term)", model.bias());
    println!("  ------------------------------------------------------\n");
    println!("--- End of Report ---");
    Ok(())
}
