//! Trace event export
//!
//! Theia reports the phases of its startup as grouped samples:
//!
//! ```text
//! theia_measurements{id="backend", name="deployPlugin", startTime="943.32", owner="backend"} 1.77
//! ```
//!
//! where `startTime` and the value are milliseconds. Each such sample becomes
//! a begin/end pair in the Chrome trace event format, with timestamps in
//! microseconds, so a snapshot can be opened in a trace viewer. Only families
//! whose name starts with `the` are exported.

use std::{
    io,
    path::{Path, PathBuf},
};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use tokio::fs;
use tracing::{debug, info, trace};
use trendline_history::filename::{SNAPSHOT_EXTENSION, sort_file_names};

use crate::report::REPORT_FILE;

/// Extension of the written trace files
pub const TRACE_EXTENSION: &str = ".json";

static MEASUREMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(\S+)\{id="(\S+)", name="(\S+)", startTime="(\S+)", owner="(\S+)"\} (\S+)"#,
    )
    .expect("Invalid regex pattern provided")
});

/// Errors produced while exporting traces
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Filesystem operation failed
    #[error("Failed to {action} {path:?}: {source}")]
    Io {
        /// What was attempted
        action: &'static str,
        /// Path the operation was applied to
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
    /// Serializing events failed
    #[error("Failed to serialize trace events: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_err<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> Error + 'a {
    move |source| Error::Io {
        action,
        path: path.to_path_buf(),
        source: Box::new(source),
    }
}

/// Trace event phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// Duration begin
    #[serde(rename = "B")]
    Begin,
    /// Duration end
    #[serde(rename = "E")]
    End,
}

/// Arguments attached to every event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Args {
    /// The metric family the sample came from
    pub msg: String,
    /// The sample's `id` attribute
    pub id: String,
}

/// One Chrome trace event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    /// Timestamp in microseconds
    pub ts: f64,
    /// Measurement name
    pub name: String,
    /// Owning process, the sample's `owner` attribute
    pub pid: String,
    /// Begin or end
    pub ph: Phase,
    /// Family and id
    pub args: Args,
}

/// Converts one snapshot line into its begin and end events.
///
/// Returns `None` for lines that are not a Theia measurement or whose start
/// time or duration is not a finite number.
#[must_use]
pub fn parse_measurement(line: &str) -> Option<[TraceEvent; 2]> {
    let caps = MEASUREMENT.captures(line)?;
    let family = &caps[1];
    if !family.starts_with("the") {
        return None;
    }
    let start: f64 = caps[4].parse().ok()?;
    let duration: f64 = caps[6].parse().ok()?;
    if !start.is_finite() || !duration.is_finite() {
        trace!("Skipping non-finite measurement: {line}");
        return None;
    }

    let event = |ts: f64, ph: Phase| TraceEvent {
        ts,
        name: caps[3].to_string(),
        pid: caps[5].to_string(),
        ph,
        args: Args {
            msg: family.to_string(),
            id: caps[2].to_string(),
        },
    };
    Some([
        event(start * 1000.0, Phase::Begin),
        event((start + duration) * 1000.0, Phase::End),
    ])
}

/// Every trace event in snapshot `text`, in line order.
#[must_use]
pub fn trace_events(text: &str) -> Vec<TraceEvent> {
    text.lines().filter_map(parse_measurement).flatten().collect()
}

/// Serializes `events` as a JSON array, one-space indented.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json(events: &[TraceEvent]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b" "));
    events.serialize(&mut serializer)?;
    Ok(out)
}

/// The trace file name for snapshot `name`.
#[must_use]
pub fn trace_file_name(name: &str) -> String {
    let stem = name.strip_suffix(SNAPSHOT_EXTENSION).unwrap_or(name);
    format!("{stem}{TRACE_EXTENSION}")
}

/// Writes one trace file into `output` for every snapshot in `input`,
/// returning the written paths in canonical snapshot order.
///
/// The rendered report and anything that is not a snapshot are skipped.
/// Snapshots are decoded lossily, a stray invalid byte does not lose the
/// measurements around it.
///
/// # Errors
///
/// Returns an error if a directory cannot be read or created, or a trace
/// cannot be written.
pub async fn export_traces(input: &Path, output: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut entries = fs::read_dir(input).await.map_err(io_err("read", input))?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err("read", input))? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
        if !is_file || name == REPORT_FILE || !name.ends_with(SNAPSHOT_EXTENSION) {
            debug!("Skipping {name}");
            continue;
        }
        names.push(name);
    }
    sort_file_names(&mut names);

    fs::create_dir_all(output)
        .await
        .map_err(io_err("create", output))?;
    let mut written = Vec::with_capacity(names.len());
    for name in names {
        let source = input.join(&name);
        let bytes = fs::read(&source).await.map_err(io_err("read", &source))?;
        let events = trace_events(&String::from_utf8_lossy(&bytes));
        let target = output.join(trace_file_name(&name));
        fs::write(&target, to_json(&events)?)
            .await
            .map_err(io_err("write", &target))?;
        debug!("{name}: {n} events", n = events.len());
        written.push(target);
    }
    info!("Wrote {n} traces to {output:?}", n = written.len());
    Ok(written)
}
