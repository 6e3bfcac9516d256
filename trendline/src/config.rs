//! This module controls configuration parsing from the end user, providing a
//! convenience mechanism for the rest of the program. Every section is
//! optional; an absent config file behaves like an empty one.
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use trendline_history::MetricLabel;

/// Errors produced by [`Config`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// Error reading config file
    #[error("Failed to read config file {path:?}: {source}")]
    ReadFile {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
    /// No metric labels requested
    #[error("At least one metric must be requested")]
    NoMetrics,
}

/// Labels charted when the config does not name any.
pub const DEFAULT_METRICS: [&str; 10] = [
    "theia_measurements/frontend",
    "theia_measurements/startContributions",
    "theia_measurements/waitForDeployment",
    "theia_measurements/revealShell",
    "theia_measurements/deployPlugins",
    "theia_measurements/syncPlugins",
    "theia_measurements/loadPlugins",
    "theia_measurements/startPlugins",
    "process_cpu_seconds_total",
    "playwright_total_time",
];

fn default_metrics() -> Vec<MetricLabel> {
    DEFAULT_METRICS.iter().map(|l| MetricLabel::new(l)).collect()
}

fn default_true() -> bool {
    true
}

/// Main configuration struct for this program
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Metric labels to chart, in report order
    #[serde(default = "default_metrics")]
    pub metrics: Vec<MetricLabel>,
    /// Where history, staging and fresh metrics live
    #[serde(default)]
    pub paths: Paths,
    /// Rename the fresh runs onto one prefix before publishing
    #[serde(default = "default_true")]
    pub harmonize: bool,
    /// Report presentation
    #[serde(default)]
    pub report: ReportConfig,
    /// Snapshot fetching
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metrics: default_metrics(),
            paths: Paths::default(),
            harmonize: true,
            report: ReportConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

/// Locations used when publishing a report
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct Paths {
    /// The history of previous publications
    pub gh_pages: PathBuf,
    /// The fresh publication, history included
    pub publish: PathBuf,
    /// Location of the report relative to `publish`
    pub performance_publish: PathBuf,
    /// The latest metric snapshots
    pub performance_metrics: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            gh_pages: PathBuf::from("gh-pages"),
            publish: PathBuf::from("public"),
            performance_publish: PathBuf::from("performance"),
            performance_metrics: PathBuf::from("performance-metrics"),
        }
    }
}

impl Paths {
    /// The directory the report and its snapshots are written to.
    #[must_use]
    pub fn report_dir(&self) -> PathBuf {
        self.publish.join(&self.performance_publish)
    }
}

/// Report presentation settings
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct ReportConfig {
    /// Page title and heading
    pub title: String,
    /// Number of trailing points the average and deviation lines cover
    pub trailing_window: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: "Performance Report".to_string(),
            trailing_window: 10,
        }
    }
}

/// Snapshot fetch settings
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct FetchConfig {
    /// Endpoint serving the exposition text
    pub metrics_endpoint: String,
    /// Prepended to the timestamp in snapshot names
    pub output_file_name_prefix: String,
    /// Appended to the timestamp in snapshot names
    pub output_file_name_postfix: String,
    /// Directory snapshots are written to
    pub output_file_path: PathBuf,
    /// Request timeout
    pub timeout_seconds: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            metrics_endpoint: "http://localhost:3000/metrics".to_string(),
            output_file_name_prefix: String::new(),
            output_file_name_postfix: ".txt".to_string(),
            output_file_path: PathBuf::from("performance-metrics"),
            timeout_seconds: 10,
        }
    }
}

impl FetchConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Config {
    /// Parse a config from yaml text.
    ///
    /// # Errors
    ///
    /// Returns an error if the yaml is invalid or names no metrics.
    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        // An empty document deserializes to unit, not to an empty mapping.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(contents)?;
        if config.metrics.is_empty() {
            return Err(Error::NoMetrics);
        }
        Ok(config)
    }
}

/// Load the configuration at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid config.
pub fn load_config_from_path(path: &Path) -> Result<Config, Error> {
    let contents = fs::read_to_string(path).map_err(|source| Error::ReadFile {
        path: path.to_path_buf(),
        source: Box::new(source),
    })?;
    Config::from_yaml(&contents)
}

/// Load the configuration at `path`, or the defaults when no path is given.
///
/// # Errors
///
/// See [`load_config_from_path`].
pub fn load_config(path: Option<&Path>) -> Result<Config, Error> {
    match path {
        Some(path) => load_config_from_path(path),
        None => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() -> Result<(), Error> {
        let config = Config::from_yaml("")?;
        assert_eq!(config, Config::default());
        assert_eq!(config.metrics.len(), DEFAULT_METRICS.len());
        assert_eq!(config.paths.report_dir(), PathBuf::from("public/performance"));
        assert!(config.harmonize);
        Ok(())
    }

    #[test]
    fn config_deserializes() -> Result<(), Error> {
        let contents = r#"
metrics:
  - theia_measurements/frontend
  - process_cpu_seconds_total
paths:
  gh_pages: site
  publish: out
harmonize: false
report:
  title: Nightly
fetch:
  metrics_endpoint: http://127.0.0.1:9000/metrics
  timeout_seconds: 3
"#;
        let config = Config::from_yaml(contents)?;
        assert_eq!(
            config.metrics,
            vec![
                MetricLabel::new("theia_measurements/frontend"),
                MetricLabel::new("process_cpu_seconds_total"),
            ]
        );
        assert_eq!(config.paths.gh_pages, PathBuf::from("site"));
        assert_eq!(config.paths.publish, PathBuf::from("out"));
        assert_eq!(config.paths.performance_publish, PathBuf::from("performance"));
        assert!(!config.harmonize);
        assert_eq!(config.report.title, "Nightly");
        assert_eq!(config.report.trailing_window, 10);
        assert_eq!(config.fetch.metrics_endpoint, "http://127.0.0.1:9000/metrics");
        assert_eq!(config.fetch.timeout(), Duration::from_secs(3));
        assert_eq!(config.fetch.output_file_name_postfix, ".txt");
        Ok(())
    }

    #[test]
    fn unknown_fields_rejected() {
        let result = Config::from_yaml("metricz: [foo]\n");
        assert!(matches!(result, Err(Error::SerdeYaml(_))));
    }

    #[test]
    fn empty_metric_list_rejected() {
        let result = Config::from_yaml("metrics: []\n");
        assert!(matches!(result, Err(Error::NoMetrics)));
    }

    #[test]
    fn load_single_file_works() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let config_path = temp_dir.path().join("trendline.yaml");
        let mut file = fs::File::create(&config_path)?;
        file.write_all(b"metrics:\n  - foo\n")?;

        let config = load_config_from_path(&config_path)?;
        assert_eq!(config.metrics, vec![MetricLabel::new("foo")]);
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = load_config(Some(Path::new("/nonexistent/trendline.yaml")));
        assert!(matches!(result, Err(Error::ReadFile { .. })));
        assert!(load_config(None).is_ok());
    }
}
