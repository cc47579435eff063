//! CLI entry point for training, prediction and profiling.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tabforge_learning::{
    FittedArtifacts, Pipeline, PipelineConfig, Scalar, TabforgeError, clean_parameters,
};
use tabforge_processing::{FeatureProfiler, TabularLoader};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Supervised learning on tabular datasets",
    long_about = "Train a model on a CSV or spreadsheet, evaluate it on a held-out split \
                  and predict single records with the saved artifacts.\n\n\
                  EXAMPLES:\n  \
                  # Train and save the artifacts\n  \
                  tabforge train -i customers.csv -c config.json -o model.json\n\n  \
                  # Predict one record\n  \
                  tabforge predict -a model.json --values 35,Paris\n\n  \
                  # Inspect feature types\n  \
                  tabforge profile -i customers.csv --features age,city"
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model and report its metrics
    Train {
        /// Dataset to train on (.csv, .xls or .xlsx)
        #[arg(short, long)]
        input: PathBuf,

        /// JSON file with the pipeline configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Where to write the fitted artifacts
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Where to write the metrics as JSON
        #[arg(short, long)]
        metrics: Option<PathBuf>,

        /// Print the whole training outcome as JSON to stdout
        ///
        /// Disables all logs; only the JSON document is written.
        #[arg(long)]
        json: bool,
    },

    /// Predict one record with saved artifacts
    Predict {
        /// Artifacts written by `train --output`
        #[arg(short, long)]
        artifacts: PathBuf,

        /// Comma-separated feature values
        #[arg(long, value_delimiter = ',', required = true)]
        values: Vec<String>,

        /// Comma-separated column names for the values (default: training order)
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,
    },

    /// Classify features as categorical or numerical
    Profile {
        /// Dataset to profile
        #[arg(short, long)]
        input: PathBuf,

        /// Comma-separated feature columns
        #[arg(long, value_delimiter = ',', required = true)]
        features: Vec<String>,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is disabled so stdout only carries
/// the JSON document.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    let json_output = matches!(args.command, Command::Train { json: true, .. });
    init_logging(&args.log_level, args.quiet, json_output);

    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .downcast_ref::<TabforgeError>()
                .map_or("ERROR", TabforgeError::error_code);
            eprintln!("error [{code}]: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Train {
            input,
            config,
            output,
            metrics,
            json,
        } => run_train(&input, &config, output.as_deref(), metrics.as_deref(), json),
        Command::Predict {
            artifacts,
            values,
            columns,
        } => run_predict(&artifacts, &values, columns),
        Command::Profile { input, features } => run_profile(&input, &features),
    }
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let mut config = PipelineConfig::from_json(&json)?;
    config.parameters = clean_parameters(std::mem::take(&mut config.parameters));
    debug!(?config, "Loaded configuration");
    Ok(config)
}

fn run_train(
    input: &Path,
    config_path: &Path,
    output: Option<&Path>,
    metrics_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    if !input.exists() {
        return Err(anyhow!("Input file not found: {}", input.display()));
    }

    let config = load_config(config_path)?;
    let pipeline = Pipeline::builder().config(config).build()?;

    info!("Loading dataset from: {}", input.display());
    let outcome = pipeline.train_from_path(input)?;

    if let Some(path) = output {
        outcome.artifacts.save(path)?;
    }
    if let Some(path) = metrics_path {
        std::fs::write(path, serde_json::to_vec_pretty(&outcome.metrics)?)
            .with_context(|| format!("writing metrics to {}", path.display()))?;
        info!("Metrics written to {}", path.display());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let artifacts = &outcome.artifacts;
    println!("Model:          {}", artifacts.model_kind());
    println!("Problem type:   {}", artifacts.problem_type());
    println!("Score:          {}", outcome.score);
    println!("Training time:  {}s", outcome.training_time_seconds);
    println!(
        "Rows:           {} -> {} after cleaning",
        outcome.cleaning.rows_before, outcome.cleaning.rows_after
    );
    println!("Feature importance:");
    let importance = &outcome.metrics.feature_importance;
    for (label, value) in importance.labels.iter().zip(&importance.values) {
        println!("  {label:<24} {value:.4}");
    }
    Ok(())
}

fn run_predict(path: &Path, values: &[String], columns: Option<Vec<String>>) -> Result<()> {
    let artifacts = FittedArtifacts::load(path)?;
    let columns = columns.unwrap_or_else(|| artifacts.features().to_vec());
    let values: Vec<Scalar> = values.iter().map(|v| Scalar::parse(v)).collect();

    let prediction = artifacts.predict(&values, &columns)?;
    println!("{prediction}");
    Ok(())
}

fn run_profile(input: &Path, features: &[String]) -> Result<()> {
    let df = TabularLoader::load_path(input).map_err(TabforgeError::from)?;
    let profile = FeatureProfiler::profile(&df, features).map_err(TabforgeError::from)?;
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}
