//! Snapshot fetching
//!
//! After a performance run the application under test still serves its
//! metrics endpoint. This module saves that exposition text as one snapshot
//! named after the local time of the fetch, `Y-M-DTH-Mi-S` with non-padded
//! fields, optionally followed by `_<run>` for repeated runs of one session.
//! Unlike the rest of the pipeline a failure here is fatal: a run without a
//! snapshot must not go unnoticed.

use std::{
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use tokio::fs;
use tracing::{info, warn};

use crate::config::FetchConfig;

/// Metric label under which the total elapsed time of a run is appended
pub const TOTAL_TIME_LABEL: &str = "playwright_total_time";

/// Errors produced while fetching a snapshot
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The request could not be made or its body could not be read
    #[error("Failed to fetch metrics from {uri}: {source}")]
    Request {
        /// Endpoint requested
        uri: String,
        /// Underlying client error
        #[source]
        source: reqwest::Error,
    },
    /// The endpoint answered with a non-success status
    #[error("Metrics endpoint {uri} answered with status {status}")]
    Status {
        /// Endpoint requested
        uri: String,
        /// HTTP status code
        status: u16,
    },
    /// Error writing the snapshot
    #[error("Failed to write snapshot {path:?}: {source}")]
    Write {
        /// Snapshot path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
}

/// Formats `now` the way snapshot names carry it, `2023-9-5T10-3-4`.
#[must_use]
pub fn snapshot_timestamp<Tz: TimeZone>(now: &DateTime<Tz>) -> String {
    format!(
        "{}-{}-{}T{}-{}-{}",
        now.year(),
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

/// The file name of a snapshot taken at `now`.
#[must_use]
pub fn snapshot_file_name<Tz: TimeZone>(
    config: &FetchConfig,
    now: &DateTime<Tz>,
    run: Option<u32>,
) -> String {
    let run = run.map(|run| format!("_{run}")).unwrap_or_default();
    format!(
        "{prefix}{timestamp}{run}{postfix}",
        prefix = config.output_file_name_prefix,
        timestamp = snapshot_timestamp(now),
        postfix = config.output_file_name_postfix,
    )
}

/// Appends the total elapsed time of a run to fetched exposition text.
#[must_use]
pub fn with_total_time(mut body: String, total_time: Option<&str>) -> String {
    if let Some(total_time) = total_time {
        body.push_str(&format!("\n\n{TOTAL_TIME_LABEL} {total_time}"));
    }
    body
}

fn write_err(path: &Path) -> impl FnOnce(io::Error) -> Error + '_ {
    move |source| Error::Write {
        path: path.to_path_buf(),
        source: Box::new(source),
    }
}

/// Fetches the metrics endpoint and writes the response as snapshot
/// `file_name` in the configured output directory.
///
/// A snapshot already present at the target path is replaced.
///
/// # Errors
///
/// Returns an error if the endpoint cannot be reached, answers with a
/// non-success status or the snapshot cannot be written.
pub async fn fetch_snapshot(
    client: &reqwest::Client,
    config: &FetchConfig,
    file_name: &str,
    total_time: Option<&str>,
) -> Result<PathBuf, Error> {
    let dir = config.output_file_path.as_path();
    let target = dir.join(file_name);

    fs::create_dir_all(dir).await.map_err(write_err(dir))?;
    if fs::try_exists(&target).await.unwrap_or(false) {
        warn!("Snapshot {target:?} already exists, replacing it");
        fs::remove_file(&target).await.map_err(write_err(&target))?;
    }

    let uri = config.metrics_endpoint.as_str();
    let request_err = |source| Error::Request {
        uri: uri.to_string(),
        source,
    };
    let response = client
        .get(uri)
        .timeout(config.timeout())
        .send()
        .await
        .map_err(request_err)?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Status {
            uri: uri.to_string(),
            status: status.as_u16(),
        });
    }
    let body = response.text().await.map_err(request_err)?;

    fs::write(&target, with_total_time(body, total_time))
        .await
        .map_err(write_err(&target))?;
    info!("Wrote snapshot {target:?}");
    Ok(target)
}
