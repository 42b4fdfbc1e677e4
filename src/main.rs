//! flocast - River Flood Prediction
//!
//! Pipeline stages, run one at a time:
//! 1. `fetch`   - download the historical climate and discharge series to CSV
//! 2. `train`   - label, fit and evaluate the random forest, save the model
//! 3. `predict` - apply the saved model to the next ~6 months, by month
//! 4. `grid`    - classify forecast discharge over a coordinate grid
//!
//! Usage:
//!   cargo run --release -- fetch
//!   cargo run --release -- train
//!   cargo run --release -- predict
//!   cargo run --release -- grid
//!
//! Environment:
//!   FLOCAST_CONFIG - alternative config file (default: flocast.toml)
//!   FLOCAST_LOG    - tracing filter directive (overrides --log-level)

use chrono::Utc;
use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;

use flocast::analysis::severity::severity_counts;
use flocast::artifact::TrainedModel;
use flocast::config::FlocastConfig;
use flocast::dataset::DailyFrame;
use flocast::ingest::client::OpenMeteoClient;
use flocast::logging::{self, LogLevel};
use flocast::pipeline::{self, SeveritySource};
use flocast::predictor;
use flocast::training::Trainer;

#[derive(Parser, Debug)]
#[command(name = "flocast")]
#[command(about = "Flood prediction from Open-Meteo climate and river discharge data")]
struct Cli {
    /// Config file (overrides FLOCAST_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Minimum log level: debug, info, warn or error
    #[arg(long, global = true, default_value = "info")]
    log_level: LogLevel,

    /// Show debug events (same as --log-level debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the training period for the climate and discharge sites
    Fetch,
    /// Train and evaluate the flood classifier from the fetched CSVs
    Train,
    /// Predict monthly flood probability for the coming months
    Predict {
        /// Days ahead of today to forecast
        #[arg(long)]
        horizon_days: Option<i64>,
    },
    /// Build (or load) the grid flood severity table
    Grid {
        /// Ignore an existing severity CSV and fetch again
        #[arg(long)]
        refresh: bool,
    },
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("\n❌ {}\n", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = match &cli.config {
        Some(path) => FlocastConfig::load_from(path)?,
        None => FlocastConfig::load()?,
    };

    let level = if cli.verbose { LogLevel::Debug } else { cli.log_level };
    let log_file = config.paths.log_file.as_ref().map(|p| p.to_string_lossy().into_owned());
    logging::init_logger(level, log_file.as_deref())?;

    println!("🌊 flocast - River Flood Prediction");
    println!("====================================\n");

    match cli.command {
        Command::Fetch => fetch(&config),
        Command::Train => train(&config),
        Command::Predict { horizon_days } => predict(&config, horizon_days),
        Command::Grid { refresh } => grid(&config, refresh),
    }
}

fn client(config: &FlocastConfig) -> Result<OpenMeteoClient, Box<dyn Error>> {
    Ok(OpenMeteoClient::new(
        config.retry_policy(),
        config.cache_ttl(),
        config.request_timeout(),
    )?)
}

fn fetch(config: &FlocastConfig) -> Result<(), Box<dyn Error>> {
    let t = &config.training;
    println!("📥 Fetching {} to {}...", t.start_date, t.end_date);

    let api = client(config)?;
    let history = pipeline::fetch_history(&api, config)?;

    println!("\n🌡️  Climate ({} days)", history.climate.frame.len());
    history.climate.site.print_metadata();
    println!("\n💧 River discharge ({} days)", history.discharge.frame.len());
    history.discharge.site.print_metadata();

    println!("\n✓ Wrote {}", config.paths.climate_csv.display());
    println!("✓ Wrote {}\n", config.paths.discharge_csv.display());
    Ok(())
}

fn train(config: &FlocastConfig) -> Result<(), Box<dyn Error>> {
    println!("📋 Loading fetched series...");
    let discharge = DailyFrame::read_csv(&config.paths.discharge_csv)?;
    let climate = DailyFrame::read_csv(&config.paths.climate_csv)?;
    println!("✓ {} discharge days, {} climate days\n", discharge.len(), climate.len());

    println!("🌲 Training random forest ({} trees)...", config.training.n_trees);
    let trainer = Trainer::new(config.trainer_config());
    let run = pipeline::train_model(&discharge, &climate, &trainer, config.training.flood_quantile)?;

    println!("✓ Merged {} days, dropped {} incomplete rows", run.merged_rows, run.dropped_rows);
    println!(
        "✓ Flood threshold {:.2} m³/s ({} flood days), {} train / {} test rows\n",
        run.model.flood_threshold, run.positives, run.train_rows, run.test_rows
    );

    let cv = &run.cross_validation;
    println!("🔁 Cross-Validation ({} folds)", cv.scores.len());
    let scores: Vec<String> = cv.scores.iter().map(|s| format!("{:.4}", s)).collect();
    println!("   Accuracy scores: [{}]", scores.join(", "));
    println!("   Mean accuracy: {:.4}", cv.mean);
    println!("   Standard deviation: {:.4}\n", cv.std);

    println!("📈 Hold-out evaluation");
    println!("   Accuracy: {:.2}\n", run.evaluation.accuracy);
    println!("{}", run.evaluation.report);

    println!("📊 Feature importance (ascending)");
    for (name, importance) in &run.evaluation.feature_ranking {
        println!("   {:<32} {:.4}", name, importance);
    }
    println!();

    run.model.forest.summary();

    run.model.save(&config.paths.model)?;
    println!("\n✓ Model saved to {}\n", config.paths.model.display());
    Ok(())
}

fn predict(config: &FlocastConfig, horizon_days: Option<i64>) -> Result<(), Box<dyn Error>> {
    println!("📋 Loading model from {}...", config.paths.model.display());
    let model = TrainedModel::load(&config.paths.model)?;
    println!(
        "✓ {} trees, trained {}\n",
        model.forest.n_trees(),
        model.trained_at.format("%Y-%m-%d %H:%M UTC")
    );

    let horizon = horizon_days.unwrap_or(config.prediction.horizon_days);
    let today = Utc::now().date_naive();
    println!("🔮 Forecasting {} days from {}...", horizon, today);

    let api = client(config)?;
    let report = predictor::run_forecast(&api, &model, &config.forecast_sources(), today, horizon)?;
    println!(
        "✓ {} days predicted ({} to {}), {} incomplete rows skipped\n",
        report.predictions.len(),
        report.start_date,
        report.end_date,
        report.dropped_rows
    );

    println!("📅 Monthly flood probability");
    for m in &report.monthly {
        println!(
            "   {}-{:02}  {:.3}  ({} of {} days flagged)",
            m.year, m.month, m.mean_probability, m.flood_days, m.days
        );
    }
    println!();
    Ok(())
}

fn grid(config: &FlocastConfig, refresh: bool) -> Result<(), Box<dyn Error>> {
    let cache = &config.paths.severity_csv;
    if refresh && cache.exists() {
        std::fs::remove_file(cache)?;
    }

    if cache.exists() {
        println!("📋 CSV file found. Loading data from {}...", cache.display());
    } else {
        println!("📥 CSV file not found. Fetching grid forecast...");
    }

    let api = client(config)?;
    let run = pipeline::load_or_build_severity(
        &api,
        &config.api.flood_url,
        &config.grid_spec(),
        config.grid.batch_size,
        &config.grid_fetch_params(),
        cache,
    )?;

    if let SeveritySource::Fetched { points, report } = &run.source {
        println!(
            "✓ {} points in {} batches: {} fetched, {} failed",
            points,
            report.batches_total,
            report.fetched.len(),
            report.failed.len()
        );
        for failure in &report.failed {
            println!("   ✗ batch {} ({} points) [{}]: {}", failure.batch, failure.locations, failure.failure_type, failure.error);
        }
        println!("✓ Flood severity written to {}", cache.display());
    }

    println!("\n🌊 Flood severity ({} rows)", run.records.len());
    for (severity, count) in severity_counts(&run.records) {
        println!("   {:<12} {}", severity, count);
    }
    println!();
    Ok(())
}
