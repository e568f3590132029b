//! SplitLab CLI — moment fitting, posterior comparison, and simulation plans.
//!
//! Commands:
//! - `fit beta|gamma|normal-gamma`: fit prior parameters from moments
//! - `compare`: update a Beta prior with observed counts and compare A vs B
//! - `simulate`: run a TOML experiment plan and report per-configuration aggregates

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use splitlab_core::{
    evaluate_losses, evaluate_probability, fit_beta, fit_gamma, fit_normal_gamma, update_beta,
    Beta, EvaluationMethod, PriorSpec,
};
use splitlab_runner::{run_configurations, AggregateResult, ExperimentPlan};

#[derive(Parser)]
#[command(
    name = "splitlab",
    about = "SplitLab CLI — Bayesian A/B decisions by expected loss"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit conjugate prior parameters from a mean and variance.
    Fit {
        #[command(subcommand)]
        family: FitFamily,

        /// Print JSON instead of text.
        #[arg(long, default_value_t = false, global = true)]
        json: bool,
    },
    /// Compare two variants from observed conversions under a shared Beta prior.
    Compare {
        #[arg(long)]
        a_successes: u64,
        #[arg(long)]
        a_trials: u64,
        #[arg(long)]
        b_successes: u64,
        #[arg(long)]
        b_trials: u64,

        /// Prior alpha. Defaults to a uniform Beta(1, 1).
        #[arg(long, default_value_t = 1.0)]
        prior_alpha: f64,

        /// Prior beta.
        #[arg(long, default_value_t = 1.0)]
        prior_beta: f64,

        /// Use numerical integration instead of the closed-form sum
        /// (needed for fractional posterior parameters).
        #[arg(long, default_value_t = false)]
        numerical: bool,

        /// Print JSON instead of text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run a TOML experiment plan.
    Simulate {
        /// Path to the plan file.
        #[arg(long)]
        plan: PathBuf,

        /// Override the plan's thread count.
        #[arg(long)]
        threads: Option<usize>,

        /// Override the plan's master seed.
        #[arg(long)]
        seed: Option<u64>,

        /// Print JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum FitFamily {
    /// Beta prior for a conversion rate.
    Beta {
        #[arg(long)]
        mean: f64,
        #[arg(long)]
        variance: f64,
    },
    /// Gamma prior (shape/rate) for a positive quantity.
    Gamma {
        #[arg(long)]
        mean: f64,
        #[arg(long)]
        variance: f64,
    },
    /// Normal-Gamma prior for a Gaussian mean and precision.
    NormalGamma {
        #[arg(long, allow_hyphen_values = true)]
        mean: f64,
        #[arg(long)]
        precision_mean: f64,
        #[arg(long)]
        var_of_mean: f64,
        #[arg(long)]
        var_of_precision: f64,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Fit { family, json } => run_fit(family, json),
        Commands::Compare {
            a_successes,
            a_trials,
            b_successes,
            b_trials,
            prior_alpha,
            prior_beta,
            numerical,
            json,
        } => {
            let prior = Beta::new(prior_alpha, prior_beta)?;
            let method = if numerical {
                EvaluationMethod::NumericalIntegration
            } else {
                EvaluationMethod::ClosedForm
            };
            run_compare(
                &prior,
                (a_successes, a_trials),
                (b_successes, b_trials),
                method,
                json,
            )
        }
        Commands::Simulate {
            plan,
            threads,
            seed,
            json,
        } => run_simulate(plan, threads, seed, json),
    }
}

fn run_fit(family: FitFamily, json: bool) -> Result<()> {
    let spec = match family {
        FitFamily::Beta { mean, variance } => PriorSpec::Beta(fit_beta(mean, variance)?),
        FitFamily::Gamma { mean, variance } => PriorSpec::Gamma(fit_gamma(mean, variance)?),
        FitFamily::NormalGamma {
            mean,
            precision_mean,
            var_of_mean,
            var_of_precision,
        } => PriorSpec::NormalGamma(fit_normal_gamma(
            mean,
            precision_mean,
            var_of_mean,
            var_of_precision,
        )?),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&spec)?);
        return Ok(());
    }
    match spec {
        PriorSpec::Beta(b) => println!("Beta(alpha = {}, beta = {})", b.alpha(), b.beta()),
        PriorSpec::Gamma(g) => println!("Gamma(alpha = {}, beta = {})", g.alpha(), g.beta()),
        PriorSpec::NormalGamma(ng) => println!(
            "NormalGamma(mu0 = {}, lambda = {}, alpha = {}, beta = {})",
            ng.mu0(),
            ng.lambda(),
            ng.alpha(),
            ng.beta()
        ),
    }
    Ok(())
}

fn run_compare(
    prior: &Beta,
    (a_successes, a_trials): (u64, u64),
    (b_successes, b_trials): (u64, u64),
    method: EvaluationMethod,
    json: bool,
) -> Result<()> {
    let a = PriorSpec::Beta(update_beta(prior, a_successes, a_trials).context("variant A")?);
    let b = PriorSpec::Beta(update_beta(prior, b_successes, b_trials).context("variant B")?);

    let p_b = evaluate_probability(method, &a, &b)?;
    let losses = evaluate_losses(method, &a, &b)?;

    if json {
        let out = serde_json::json!({
            "posterior_a": a,
            "posterior_b": b,
            "prob_b_greater_a": p_b,
            "expected_loss_a": losses.loss_a,
            "expected_loss_b": losses.loss_b,
            "preferred": losses.preferred(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("P(B > A)           : {p_b:.6}");
    println!("Expected loss (A)  : {:.6e}", losses.loss_a);
    println!("Expected loss (B)  : {:.6e}", losses.loss_b);
    println!("Preferred variant  : {:?}", losses.preferred());
    Ok(())
}

fn run_simulate(
    plan_path: PathBuf,
    threads: Option<usize>,
    seed: Option<u64>,
    json: bool,
) -> Result<()> {
    let plan = ExperimentPlan::from_file(&plan_path)?;
    let experiments = plan.experiments()?;

    let mut options = plan.driver_options();
    if let Some(t) = threads {
        if t == 0 {
            bail!("--threads must be >= 1");
        }
        options.threads = Some(t);
    }
    if let Some(s) = seed {
        options.master_seed = s;
    }

    info!(plan = %plan_path.display(), experiments = experiments.len(), "running plan");
    let results = run_configurations(&experiments, &options, None);

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_table(&results);
    }
    Ok(())
}

fn print_table(results: &[AggregateResult]) {
    println!(
        "{:<24} {:>10} {:>7} {:>12} {:>8} {:>10} {:>12} {:>6} {:>6}",
        "label", "threshold", "trials", "mean_loss", "stop", "rounds", "realized", "A", "B"
    );
    for r in results {
        println!(
            "{:<24} {:>10.1e} {:>7} {:>12.4e} {:>7.1}% {:>10.1} {:>12.4e} {:>6} {:>6}",
            r.label,
            r.loss_threshold,
            r.trials,
            r.mean_loss,
            r.stop_rate * 100.0,
            r.mean_rounds,
            r.mean_realized_loss,
            r.wins_a,
            r.wins_b
        );
        if r.failed_trials > 0 || r.skipped_trials > 0 {
            println!(
                "{:<24} failed: {}, skipped: {}",
                "", r.failed_trials, r.skipped_trials
            );
        }
    }
}
