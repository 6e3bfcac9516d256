//! Command line entry point for trendline.

#![allow(clippy::print_stdout)]

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};
use trendline::{
    config::{self, Config},
    fetch, publish, report, trace,
};
use trendline_history::{MetricLabel, aggregate, filename, history, read_history};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage the published history with the latest snapshots and render the
    /// report
    Publish(PublishCommand),
    /// Render the report for a directory of snapshots
    Report(ReportCommand),
    /// Rename the runs in a directory onto a shared date prefix
    Harmonize(HarmonizeCommand),
    /// Save the current metrics of the application under test as a snapshot
    Fetch(FetchCommand),
    /// Print the aggregated history of a directory as JSON lines
    History(HistoryCommand),
    /// Export the Theia measurements of every snapshot as Chrome trace events
    Trace(TraceCommand),
    /// Validate configuration file and exit
    ConfigCheck(ConfigCheckCommand),
}

#[derive(Args)]
struct PublishCommand {
    /// path on disk to the configuration file
    #[clap(long)]
    config: Option<PathBuf>,
    /// checkout of the previously published site
    #[clap(long)]
    gh_pages_path: Option<PathBuf>,
    /// directory the new site is staged in
    #[clap(long)]
    publish_path: Option<PathBuf>,
    /// report location relative to the publish path
    #[clap(long)]
    performance_publish_path: Option<PathBuf>,
    /// directory holding the latest snapshots
    #[clap(long)]
    performance_metrics_path: Option<PathBuf>,
    /// keep the latest snapshot names as they are
    #[clap(long)]
    no_harmonize: bool,
}

#[derive(Args)]
struct ReportCommand {
    /// directory of snapshots the report is written into
    #[clap(long)]
    path: PathBuf,
    /// path on disk to the configuration file
    #[clap(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct HarmonizeCommand {
    /// directory of snapshots to rename
    #[clap(long)]
    path: PathBuf,
}

#[derive(Args)]
struct FetchCommand {
    /// path on disk to the configuration file
    #[clap(long)]
    config: Option<PathBuf>,
    /// run number appended to the snapshot name
    #[clap(long)]
    run: Option<u32>,
    /// total elapsed time of the run, recorded as `playwright_total_time`
    #[clap(long)]
    total_time: Option<String>,
}

#[derive(Args)]
struct HistoryCommand {
    /// directory of snapshots
    #[clap(long)]
    path: PathBuf,
    /// path on disk to the configuration file
    #[clap(long)]
    config: Option<PathBuf>,
    /// only this metric instead of the configured ones
    #[clap(long)]
    metric: Option<String>,
    /// print every snapshot instead of combining runs
    #[clap(long)]
    raw: bool,
}

#[derive(Args)]
struct TraceCommand {
    /// directory of snapshots
    #[clap(long)]
    path: PathBuf,
    /// directory the trace files are written to
    #[clap(long, default_value = "traces")]
    output: PathBuf,
}

#[derive(Args)]
struct ConfigCheckCommand {
    /// path on disk to the configuration file
    #[clap(long)]
    config_path: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error(transparent)]
    Publish(#[from] publish::Error),
    #[error(transparent)]
    Report(#[from] report::Error),
    #[error(transparent)]
    Fetch(#[from] fetch::Error),
    #[error(transparent)]
    History(#[from] history::Error),
    #[error(transparent)]
    Harmonize(#[from] filename::Error),
    #[error(transparent)]
    Trace(#[from] trace::Error),
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

async fn run_publish(cmd: PublishCommand) -> Result<(), Error> {
    let config = config::load_config(cmd.config.as_deref())?;
    let mut paths = config.paths;
    if let Some(path) = cmd.gh_pages_path {
        paths.gh_pages = path;
    }
    if let Some(path) = cmd.publish_path {
        paths.publish = path;
    }
    if let Some(path) = cmd.performance_publish_path {
        paths.performance_publish = path;
    }
    if let Some(path) = cmd.performance_metrics_path {
        paths.performance_metrics = path;
    }

    let report_dir = publish::prepare_publish(&paths, config.harmonize && !cmd.no_harmonize)?;
    info!("Generating report");
    report::generate_report(&report_dir, &config.metrics, &config.report).await?;
    Ok(())
}

async fn run_report(cmd: ReportCommand) -> Result<(), Error> {
    let config = config::load_config(cmd.config.as_deref())?;
    report::generate_report(&cmd.path, &config.metrics, &config.report).await?;
    Ok(())
}

fn run_harmonize(path: &Path) -> Result<(), Error> {
    for rename in filename::harmonize_names(path)? {
        info!("Renamed {:?} to {:?}", rename.from, rename.to);
    }
    Ok(())
}

async fn run_fetch(cmd: FetchCommand) -> Result<(), Error> {
    let Config { fetch: fetch_config, .. } = config::load_config(cmd.config.as_deref())?;
    let client = reqwest::Client::builder().build()?;
    let file_name = fetch::snapshot_file_name(&fetch_config, &chrono::Local::now(), cmd.run);
    fetch::fetch_snapshot(&client, &fetch_config, &file_name, cmd.total_time.as_deref()).await?;
    Ok(())
}

async fn run_history(cmd: HistoryCommand) -> Result<(), Error> {
    let labels = match cmd.metric {
        Some(metric) => vec![MetricLabel::new(&metric)],
        None => config::load_config(cmd.config.as_deref())?.metrics,
    };
    let mut histories = read_history(&cmd.path, &labels).await?;
    if !cmd.raw {
        histories = aggregate(&histories);
    }
    for metric in &histories {
        println!("{}", serde_json::to_string(metric)?);
    }
    Ok(())
}

async fn run_trace(cmd: TraceCommand) -> Result<(), Error> {
    let written = trace::export_traces(&cmd.path, &cmd.output).await?;
    info!("Traces available in {:?}, {n} files", cmd.output, n = written.len());
    Ok(())
}

fn run_config_check(path: &Path) -> Result<(), Error> {
    match config::load_config_from_path(path) {
        Ok(config) => {
            info!(
                "Configuration {path:?} is valid, {n} metrics requested",
                n = config.metrics.len()
            );
            Ok(())
        }
        Err(err) => {
            error!("Configuration {path:?} is invalid: {err}");
            Err(err.into())
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(false)
        .finish()
        .init();

    let version = env!("CARGO_PKG_VERSION");
    info!("Starting trendline {version}.");

    match Cli::parse().command {
        Commands::Publish(cmd) => run_publish(cmd).await,
        Commands::Report(cmd) => run_report(cmd).await,
        Commands::Harmonize(cmd) => run_harmonize(&cmd.path),
        Commands::Fetch(cmd) => run_fetch(cmd).await,
        Commands::History(cmd) => run_history(cmd).await,
        Commands::Trace(cmd) => run_trace(cmd).await,
        Commands::ConfigCheck(cmd) => run_config_check(&cmd.config_path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn publish_flags_parse() {
        let cli = Cli::try_parse_from([
            "trendline",
            "publish",
            "--gh-pages-path",
            "site",
            "--no-harmonize",
        ])
        .expect("valid arguments");
        let Commands::Publish(cmd) = cli.command else {
            panic!("expected publish");
        };
        assert_eq!(cmd.gh_pages_path, Some(PathBuf::from("site")));
        assert!(cmd.no_harmonize);
        assert!(cmd.publish_path.is_none());
    }

    #[test]
    fn trace_output_defaults() {
        let cli = Cli::try_parse_from(["trendline", "trace", "--path", "performance"])
            .expect("valid arguments");
        let Commands::Trace(cmd) = cli.command else {
            panic!("expected trace");
        };
        assert_eq!(cmd.path, PathBuf::from("performance"));
        assert_eq!(cmd.output, PathBuf::from("traces"));
    }

    #[test]
    fn report_requires_path() {
        assert!(Cli::try_parse_from(["trendline", "report"]).is_err());
    }

    #[test]
    fn config_check_rejects_invalid_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("trendline.yaml");
        std::fs::write(&path, "metrics: []\n").expect("write config");
        assert!(matches!(
            run_config_check(&path),
            Err(Error::Config(config::Error::NoMetrics))
        ));

        std::fs::write(&path, "metrics: [foo]\n").expect("write config");
        assert!(run_config_check(&path).is_ok());
    }
}
