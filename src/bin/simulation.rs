//! Randomized Experiment Simulation
//!
//! Generates a synthetic randomized experiment with a heterogeneous true
//! treatment effect, for demos and end-to-end testing of uplift-engine.
//!
//! - Covariates `x0..x{p-1}` are independent standard normals
//! - Treatment is Bernoulli(`propensity`)
//! - Outcome is `base + Σ β_j x_j + W · tau(x) + noise`
//! - `tau(x) = effect + slope · x0 + max(x1, 0)` (needs `features >= 2`)
//!
//! Optionally writes an external score table holding `tau(x)` plus noise,
//! standing in for an externally trained model.
//!
//! # Usage
//! ```bash
//! ./simulation --units 5000 --out history.csv
//! ./simulation --units 2000 --seed 8 --id-prefix later- --out later.csv --scores forest.csv
//! ```

use clap::Parser;
use rand::prelude::*;
use rand_distr::{Bernoulli, Distribution, Normal};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

// ============================================================================
// Outcome Model Constants
// ============================================================================

/// Outcome for an untreated unit at x = 0
const BASE_OUTCOME: f64 = 10.0;
/// Main-effect coefficient scale for covariate j: BETA_SCALE / (j + 1)
const BETA_SCALE: f64 = 2.0;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "simulation")]
#[command(about = "Synthetic randomized experiment generator for uplift-engine")]
#[command(version = "1.0")]
struct Args {
    /// Number of units
    #[arg(short = 'n', long, default_value = "5000")]
    units: usize,

    /// Number of covariates (at least 2)
    #[arg(short, long, default_value = "4", value_parser = clap::value_parser!(u32).range(2..=50))]
    features: u32,

    /// Treatment probability
    #[arg(long, default_value = "0.5")]
    propensity: f64,

    /// Average treatment effect at x = 0
    #[arg(long, default_value = "3.0")]
    effect: f64,

    /// Effect change per unit of x0
    #[arg(long, default_value = "2.0")]
    slope: f64,

    /// Outcome noise standard deviation
    #[arg(long, default_value = "1.0")]
    noise: f64,

    /// Noise standard deviation added to the external scores
    #[arg(long, default_value = "0.5")]
    score_noise: f64,

    /// Random seed for reproducibility
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Prefix for unit ids (keeps cohorts from different runs disjoint)
    #[arg(long, default_value = "u")]
    id_prefix: String,

    /// Unit table output (stdout when omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// External score table output
    #[arg(long)]
    scores: Option<PathBuf>,
}

// ============================================================================
// Generation
// ============================================================================

struct SimulatedUnit {
    id: String,
    covariates: Vec<f64>,
    treated: bool,
    outcome: f64,
    true_effect: f64,
}

fn true_effect(args: &Args, x: &[f64]) -> f64 {
    args.effect + args.slope * x[0] + x[1].max(0.0)
}

fn simulate(args: &Args, rng: &mut StdRng) -> Result<Vec<SimulatedUnit>, Box<dyn std::error::Error>> {
    let standard = Normal::new(0.0, 1.0)?;
    let noise = Normal::new(0.0, args.noise)?;
    let assignment = Bernoulli::new(args.propensity)?;
    let p = args.features as usize;

    Ok((0..args.units)
        .map(|i| {
            let covariates: Vec<f64> = (0..p).map(|_| standard.sample(rng)).collect();
            let treated = assignment.sample(rng);
            let baseline: f64 = covariates
                .iter()
                .enumerate()
                .map(|(j, x)| BETA_SCALE / (j + 1) as f64 * x)
                .sum();
            let tau = true_effect(args, &covariates);
            let w = if treated { 1.0 } else { 0.0 };
            SimulatedUnit {
                id: format!("{}{i}", args.id_prefix),
                outcome: BASE_OUTCOME + baseline + w * tau + noise.sample(rng),
                covariates,
                treated,
                true_effect: tau,
            }
        })
        .collect())
}

fn write_units(out: &mut dyn Write, units: &[SimulatedUnit], features: usize) -> io::Result<()> {
    let names: Vec<String> = (0..features).map(|j| format!("x{j}")).collect();
    writeln!(out, "id,treatment,outcome,{}", names.join(","))?;
    for u in units {
        let xs: Vec<String> = u.covariates.iter().map(|x| format!("{x:.6}")).collect();
        writeln!(
            out,
            "{},{},{:.6},{}",
            u.id,
            u8::from(u.treated),
            u.outcome,
            xs.join(",")
        )?;
    }
    out.flush()
}

fn write_scores(
    out: &mut dyn Write,
    units: &[SimulatedUnit],
    score_noise: &Normal<f64>,
    rng: &mut StdRng,
) -> io::Result<()> {
    writeln!(out, "id,tau")?;
    for u in units {
        writeln!(out, "{},{:.6}", u.id, u.true_effect + score_noise.sample(rng))?;
    }
    out.flush()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    if !(args.propensity > 0.0 && args.propensity < 1.0) {
        return Err(format!("--propensity {} must be in (0, 1)", args.propensity).into());
    }

    let mut rng = StdRng::seed_from_u64(args.seed);
    let units = simulate(&args, &mut rng)?;
    let features = args.features as usize;

    match &args.out {
        Some(path) => write_units(&mut BufWriter::new(File::create(path)?), &units, features)?,
        None => write_units(&mut io::stdout().lock(), &units, features)?,
    }

    if let Some(path) = &args.scores {
        let score_noise = Normal::new(0.0, args.score_noise)?;
        write_scores(&mut BufWriter::new(File::create(path)?), &units, &score_noise, &mut rng)?;
    }

    let treated = units.iter().filter(|u| u.treated).count();
    let mean_effect = units.iter().map(|u| u.true_effect).sum::<f64>() / units.len().max(1) as f64;
    eprintln!(
        "simulated {} units ({} treated), mean true effect {:.3}",
        units.len(),
        treated,
        mean_effect
    );
    Ok(())
}
