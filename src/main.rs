//! CLI entry point for the metrocast GBQR forecaster.
//!
//! Picks the reference Saturday from `--today-date`, loads the target and
//! supplementary series, fits the bagged quantile ensemble, and writes one
//! hub-format forecast file.

use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use metrocast_gbqr::config::{RunConfig, Variant};
use metrocast_gbqr::epiweek::next_saturday;
use metrocast_gbqr::fetch::BasicClient;
use metrocast_gbqr::model::GbqrModel;
use metrocast_gbqr::sources::TargetMode;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "metrocast_gbqr")]
#[command(about = "Gradient-boosted quantile forecasts of flu ED visits", long_about = None)]
struct Cli {
    /// Run date; the forecast anchors on the next Saturday on or after it
    #[arg(long, alias = "today_date", value_name = "YYYY-MM-DD")]
    today_date: NaiveDate,

    /// Model variant to run
    #[arg(long, value_enum, default_value_t = Variant::Gbqr)]
    variant: Variant,

    /// Cut the bag count tenfold for fast iteration
    #[arg(long, alias = "short_run", default_value_t = false)]
    short_run: bool,

    /// Read target data from the hub checkout instead of fetching it
    #[arg(long, alias = "use_local_mchub", default_value_t = false)]
    use_local_mchub: bool,

    /// Fetch target data as of the reference date via the commit history
    #[arg(long, alias = "use_versioned_mchub", default_value_t = false)]
    use_versioned_mchub: bool,

    /// Root of the hub checkout (crosswalk, local target-data cache)
    #[arg(long, alias = "hub_root", default_value = ".")]
    hub_root: PathBuf,

    /// Directory forecast files are written beneath
    #[arg(long, alias = "output_root", default_value = "model-output")]
    output_root: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/metrocast_gbqr.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("metrocast_gbqr.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let ref_date = next_saturday(cli.today_date);
    let mode = if cli.use_local_mchub {
        TargetMode::Local
    } else if cli.use_versioned_mchub {
        TargetMode::Versioned
    } else {
        TargetMode::Latest
    };

    let mut config = cli.variant.model_config();
    if cli.short_run {
        config = config.with_short_run();
    }
    info!(
        model = %config.model_name,
        %ref_date,
        ?mode,
        bags = config.num_bags,
        "Starting forecast run"
    );

    let mut run = RunConfig::new(ref_date, cli.hub_root, cli.output_root);
    // GitHub rate limits unauthenticated requests aggressively; a token
    // raises the ceiling for versioned runs. It is scoped to the commits API
    // inside the versioned loader, not attached to the whole client.
    run.github_token = std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());

    let model = GbqrModel::new(config);
    let client = BasicClient::new();
    let path = model.run(&client, &run, mode).await?;

    info!(path = %path.display(), "Forecast run complete");
    Ok(())
}
