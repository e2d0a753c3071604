//! Uplift Engine CLI
//!
//! Fits the CATE estimator family on a randomized experiment, evaluates the
//! resulting effect scores with lift tables and targeting policies, and
//! writes a report bundle.
//!
//! # Usage
//!
//! ```bash
//! # Holdout evaluation of one experiment
//! uplift-engine evaluate --units experiment.csv --out report/
//!
//! # Fit on history, evaluate on a later cohort with an external score column
//! uplift-engine temporal --history 2023.csv --later 2024.csv \
//!     --external forest=forest_scores.csv --out report_2024/
//!
//! # Print the effective configuration
//! uplift-engine show-config
//! ```
//!
//! # Environment Variables
//!
//! - `UPLIFT_CONFIG`: Path to the TOML config (default: ./uplift_config.toml)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::info;

use uplift_engine::data::{load_external_scores, load_units, write_bundle};
use uplift_engine::pipeline::EvaluationRun;
use uplift_engine::{
    ArtifactStore, EngineConfig, ExternalScores, HoldoutEvaluation, TemporalValidator,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "uplift-engine")]
#[command(about = "Treatment-effect estimation and targeting-policy evaluation")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file (overrides UPLIFT_CONFIG and ./uplift_config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// External score table as NAME=PATH (repeatable)
    #[arg(long = "external", value_name = "NAME=PATH", value_parser = parse_external)]
    external: Vec<(String, PathBuf)>,

    /// Directory for the report bundle
    #[arg(long, default_value = "uplift_report")]
    out: PathBuf,

    /// Run id for stored artifacts (default: UTC timestamp)
    #[arg(long)]
    run: Option<String>,

    /// Do not persist fitted models and scores
    #[arg(long)]
    no_store: bool,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Split one experiment, fit on training, evaluate on validation
    Evaluate {
        /// Unit table CSV
        #[arg(long)]
        units: PathBuf,

        /// Override the configured split seed
        #[arg(long)]
        seed: Option<u64>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Fit on a full historical cohort, evaluate on a later cohort
    Temporal {
        /// Historical unit table CSV (fit)
        #[arg(long)]
        history: PathBuf,

        /// Later-period unit table CSV (scored and evaluated)
        #[arg(long)]
        later: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

fn parse_external(raw: &str) -> Result<(String, PathBuf), String> {
    match raw.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got '{raw}'")),
    }
}

// ============================================================================
// Commands
// ============================================================================

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(p) => EngineConfig::load_from_file(p)
            .with_context(|| format!("Failed to load config {}", p.display())),
        None => Ok(EngineConfig::load()),
    }
}

fn load_external(config: &EngineConfig, specs: &[(String, PathBuf)]) -> Result<Vec<ExternalScores>> {
    specs
        .iter()
        .map(|(name, path)| {
            load_external_scores(path, name, &config.data)
                .with_context(|| format!("Failed to load external scores '{name}'"))
        })
        .collect()
}

fn finish(config: &EngineConfig, run: &EvaluationRun, output: &OutputArgs) -> Result<()> {
    let files = write_bundle(&output.out, &run.report, &run.scores)
        .with_context(|| format!("Failed to write report to {}", output.out.display()))?;

    if !output.no_store {
        let run_id = output
            .run
            .clone()
            .unwrap_or_else(|| Utc::now().format("%Y%m%dT%H%M%SZ").to_string());
        let store = ArtifactStore::open(&config.storage.path).with_context(|| {
            format!("Failed to open artifact store {}", config.storage.path.display())
        })?;
        for model in &run.models {
            store.store_model(&run_id, model)?;
        }
        store.store_scores(&run_id, &run.scores)?;
        info!(run = %run_id, models = run.models.len(), "Artifacts stored");
    }

    println!("{:<28} {:>10} {:>16}", "policy", "targeted", "profit");
    for row in &run.report.policy_table {
        println!(
            "{:<28} {:>9.1}% {:>16.2}",
            row.name,
            row.targeted_fraction * 100.0,
            row.estimated_profit
        );
    }
    for curve in &run.report.profit_curves {
        println!(
            "{:<28} best top {:>5.1}% -> {:.2}",
            curve.model,
            curve.best.top_percent * 100.0,
            curve.best.estimated_profit
        );
    }
    for path in files {
        println!("wrote {}", path.display());
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let mut config = load_config(args.config.as_deref())?;

    match args.command {
        SubCommand::Evaluate {
            units,
            seed,
            output,
        } => {
            if let Some(seed) = seed {
                config.experiment.seed = seed;
            }
            let table = load_units(&units, &config.data, config.experiment.propensity)
                .with_context(|| format!("Failed to load units from {}", units.display()))?;
            let external = load_external(&config, &output.external)?;

            let run = HoldoutEvaluation::from_config(&config)?
                .run(&table.units, &external)
                .context("Holdout evaluation failed")?;
            finish(&config, &run, &output)
        }
        SubCommand::Temporal {
            history,
            later,
            output,
        } => {
            let history_table = load_units(&history, &config.data, config.experiment.propensity)
                .with_context(|| format!("Failed to load history from {}", history.display()))?;
            let later_table = load_units(&later, &config.data, config.experiment.propensity)
                .with_context(|| format!("Failed to load later cohort from {}", later.display()))?;
            let external = load_external(&config, &output.external)?;

            let run = TemporalValidator::from_config(&config)?
                .run(&history_table.units, &later_table.units, &external)
                .context("Temporal validation failed")?;
            finish(&config, &run, &output)
        }
        SubCommand::ShowConfig => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
