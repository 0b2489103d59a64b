//! Fit synthetic waveforms and compare against the generating parameters
//!
//! Generates exponential decays and PSP-shaped traces with filtered noise,
//! fits them with the configured minimizer and prints per-parameter errors.
//! Results are written to a Parquet file when `SYNPHYS_FIT_OUTPUT` is set.
//!
//! Run with: cargo run --example fit_waveforms --release

use std::env;
use std::time::Instant;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use synphys_core::config::{load_config, PipelineConfig};
use synphys_core::export::{fit_results_to_batch, write_parquet};
use synphys_core::fit::synth::{ExpGenerator, FitComparison, PspGenerator, SyntheticExample};
use synphys_core::fit::{FitEngine, FitMethod, FitModel, FitResult};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const EXAMPLES: usize = 20;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match load_config(None) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Using default configuration");
            PipelineConfig::default()
        }
    };

    let mut rng = StdRng::seed_from_u64(42);
    let mut results = Vec::new();

    println!("=== Exponential decay ===");
    let generator = ExpGenerator::new(0.4, 10_000.0);
    let engine = FitEngine::new(
        "minimize",
        FitMethod::Minimize {
            model: FitModel::ExponentialDecay,
            analytic_gradient: true,
        },
        config.fit.options(),
    );
    let examples = (0..EXAMPLES)
        .map(|_| generator.make_example(&mut rng))
        .collect::<synphys_core::Result<Vec<_>>>()?;
    results.extend(run(&engine, &examples)?);

    println!("\n=== PSP ===");
    let generator = PspGenerator::new(0.06, 10_000.0);
    let engine = config.psp_engine();
    let examples = (0..EXAMPLES)
        .map(|_| generator.make_example(&mut rng))
        .collect::<synphys_core::Result<Vec<_>>>()?;
    results.extend(run(&engine, &examples)?);

    if let Ok(path) = env::var("SYNPHYS_FIT_OUTPUT") {
        let batch = fit_results_to_batch(&results)?;
        write_parquet(&batch, &path).with_context(|| format!("writing {path}"))?;
        info!(rows = batch.num_rows(), path = %path, "Wrote fit results");
    }
    Ok(())
}

fn run(engine: &FitEngine, examples: &[SyntheticExample]) -> anyhow::Result<Vec<FitResult>> {
    let samples: Vec<_> = examples.iter().map(|e| e.sample.clone()).collect();
    let start = Instant::now();
    let results = engine
        .fit_batch(&samples)
        .into_iter()
        .collect::<synphys_core::Result<Vec<_>>>()?;
    let elapsed = start.elapsed();

    let mut converged = 0;
    let mut true_error = 0.0;
    for (example, result) in examples.iter().zip(&results) {
        let comparison = FitComparison::new(example, result);
        if result.success() {
            converged += 1;
        }
        true_error += comparison.true_error;
        let errors: Vec<String> = comparison
            .param_errors
            .iter()
            .map(|(name, err)| format!("{name}={err:+.3e}"))
            .collect();
        println!(
            "  iters={:4} err={:.3e} {}",
            result.iterations().unwrap_or(0),
            result.error().unwrap_or(f64::NAN),
            errors.join(" ")
        );
    }

    #[allow(clippy::cast_precision_loss)]
    let mean_error = true_error / examples.len().max(1) as f64;
    println!(
        "  {converged}/{} converged, mean true error {mean_error:.3e}, {elapsed:?} total",
        examples.len()
    );
    Ok(results)
}
