//! HousingLab CLI: download, verify, clean, features, score, all.
//!
//! Commands:
//! - `download`: fetch every catalog dataset plus BLS series into the data directory
//! - `verify`: check what is on disk and write `verification_report.json`
//! - `clean`: reconcile all sources into the metro master and county tables
//! - `features`: derive momentum, yield and growth features
//! - `score`: rank metros and/or counties with weighted investment scores
//! - `all`: every stage in order

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use housinglab_core::data::StdoutProgress;
use housinglab_runner::pipeline::{self, ScoreLevel};
use housinglab_runner::{
    ConfigOverrides, Normalization, PipelineConfig, Readiness, ScoreWeights, BLS_API_KEY_ENV,
};

#[derive(Parser)]
#[command(
    name = "housinglab",
    version,
    about = "HousingLab: housing market data pipeline and investment scoring"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory. Defaults to ./housing_market_data.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Restrict to a metro (CBSA code or name). Repeatable.
    #[arg(long = "metro")]
    metros: Vec<String>,

    /// Restrict county processing to a 5-digit county FIPS. Repeatable.
    #[arg(long = "county")]
    counties: Vec<String>,

    /// State for county processing (abbreviation, FIPS or name). Repeatable.
    #[arg(long = "state")]
    states: Vec<String>,
}

/// Options of the scoring stage.
#[derive(Args, Debug, Clone)]
struct ScoreArgs {
    /// Weights as "affordability,growth,demographics,yield", summing to 100.
    #[arg(long)]
    weights: Option<String>,

    /// Entity level to score. Repeatable; defaults to both.
    #[arg(long, value_enum)]
    level: Vec<LevelArg>,

    /// Rows shown in the console and Markdown tables.
    #[arg(long)]
    top_n: Option<usize>,

    /// min-max, percentile-rank or z-score.
    #[arg(long)]
    normalization: Option<Normalization>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every catalog dataset and the BLS metro series.
    Download {
        #[command(flatten)]
        common: CommonArgs,

        /// BLS API key (falls back to the BLS_API_KEY environment variable).
        #[arg(long)]
        bls_api_key: Option<String>,

        /// Re-download files that already exist.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Check downloaded files and write verification_report.json.
    Verify {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Reconcile every source into the master and county tables.
    Clean {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Derive features from the master and county tables.
    Features {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Rank metros and counties.
    Score {
        #[command(flatten)]
        common: CommonArgs,

        #[command(flatten)]
        score: ScoreArgs,
    },
    /// Run download, verify, clean, features and score in order.
    All {
        #[command(flatten)]
        common: CommonArgs,

        #[command(flatten)]
        score: ScoreArgs,

        /// BLS API key (falls back to the BLS_API_KEY environment variable).
        #[arg(long)]
        bls_api_key: Option<String>,

        /// Re-download files that already exist.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LevelArg {
    Metro,
    County,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match dispatch(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .init();
}

fn dispatch(command: Commands) -> Result<i32> {
    match command {
        Commands::Download {
            common,
            bls_api_key,
            force,
        } => {
            let config = build_config(&common, None, bls_api_key, force)?;
            run_download(&config)
        }
        Commands::Verify { common } => run_verify(&build_config(&common, None, None, false)?),
        Commands::Clean { common } => run_clean(&build_config(&common, None, None, false)?),
        Commands::Features { common } => run_features(&build_config(&common, None, None, false)?),
        Commands::Score { common, score } => {
            let config = build_config(&common, Some(&score), None, false)?;
            run_score(&config, &levels(&score))
        }
        Commands::All {
            common,
            score,
            bls_api_key,
            force,
        } => {
            let config = build_config(&common, Some(&score), bls_api_key, force)?;
            run_all(&config)
        }
    }
}

/// File → CLI flags → environment, then validate.
fn build_config(
    common: &CommonArgs,
    score: Option<&ScoreArgs>,
    bls_api_key: Option<String>,
    force: bool,
) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(common.config.as_deref())?;

    let weights = score
        .and_then(|s| s.weights.as_deref())
        .map(ScoreWeights::parse_list)
        .transpose()?;
    config.apply_overrides(ConfigOverrides {
        data_dir: common.data_dir.clone(),
        weights,
        metros: common.metros.clone(),
        states: common.states.clone(),
        counties: common.counties.clone(),
        bls_api_key,
        top_n: score.and_then(|s| s.top_n),
        normalization: score.and_then(|s| s.normalization),
        force,
    });
    config.apply_env_key(std::env::var(BLS_API_KEY_ENV).ok());
    config.validate().context("invalid configuration")?;

    tracing::debug!(data_dir = %config.data_dir.display(), weights = %config.scoring.weights, "configuration resolved");
    Ok(config)
}

fn levels(score: &ScoreArgs) -> Vec<ScoreLevel> {
    if score.level.is_empty() {
        return vec![ScoreLevel::Metro, ScoreLevel::County];
    }
    score
        .level
        .iter()
        .map(|l| match l {
            LevelArg::Metro => ScoreLevel::Metro,
            LevelArg::County => ScoreLevel::County,
        })
        .collect()
}

fn run_download(config: &PipelineConfig) -> Result<i32> {
    if config.bls.api_key.is_none() {
        println!("No BLS API key set; using the unregistered request budget.");
    }
    let summary = pipeline::run_download(config, &StdoutProgress)?;
    println!("{summary}");
    if summary.datasets.failed() > 0 {
        println!("Failed downloads can be retried with `housinglab download`; existing files are kept.");
    }
    Ok(0)
}

fn run_verify(config: &PipelineConfig) -> Result<i32> {
    let report = pipeline::run_verify(config)?;
    print!("{}", report.render());
    println!(
        "Report written to {}",
        config.layout().verification_report_path().display()
    );
    Ok(report.readiness.exit_code())
}

fn run_clean(config: &PipelineConfig) -> Result<i32> {
    let summary = pipeline::run_clean(config)?;
    print!("{summary}");
    println!("Master written to {}", config.layout().master_path().display());
    Ok(0)
}

fn run_features(config: &PipelineConfig) -> Result<i32> {
    let summary = pipeline::run_features(config)?;
    print!("{summary}");
    Ok(0)
}

fn run_score(config: &PipelineConfig, levels: &[ScoreLevel]) -> Result<i32> {
    let outcomes = pipeline::run_score(config, levels)?;
    println!("Weights (affordability/growth/demographics/yield): {}", config.scoring.weights);
    for outcome in &outcomes {
        println!();
        print!("{outcome}");
    }
    Ok(0)
}

fn run_all(config: &PipelineConfig) -> Result<i32> {
    let summary = pipeline::run_all(config, &StdoutProgress)?;
    println!("{}", summary.download);
    print!("{}", summary.verification.render());
    if summary.verification.readiness == Readiness::Incomplete {
        for missing in summary.verification.missing_core() {
            println!("  missing core dataset: {}", missing.name);
        }
    }
    print!("{}", summary.clean);
    print!("{}", summary.features);
    for outcome in &summary.scores {
        println!();
        print!("{outcome}");
    }
    Ok(0)
}
