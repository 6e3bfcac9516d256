//! Snapshot line parser
//!
//! Snapshots are mostly Prometheus text exposition, but only a handful of
//! values are of interest and the files are read a line at a time, so rather
//! than parse every sample this module matches lines against the requested
//! [`MetricLabel`]s by prefix:
//!
//! * `foo` matches `foo 12.5 ...` and takes the second space-separated token
//! * `family/name` matches `family{...name="name"...} ... 12.5` and takes the
//!   last space-separated token
//!
//! Lines that match nothing, or whose value is not a finite number, are
//! skipped. Bytes that are not valid UTF-8 are replaced rather than rejected,
//! so a stray Latin-1 byte in a `# HELP` line costs nothing but that line's
//! text.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::{
    fs,
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
};
use tokio_stream::{StreamExt, wrappers::SplitStream};
use tracing::{trace, warn};

use crate::label::MetricLabel;

const NAME_ATTRIBUTE: &str = "name=\"";

static FLOAT_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?").expect("Invalid regex pattern provided")
});

/// A value pulled out of a snapshot line for one label
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<'a> {
    /// The label the line matched
    pub label: &'a MetricLabel,
    /// The parsed value
    pub value: f64,
}

/// Matches snapshot lines against a fixed set of labels
#[derive(Debug, Clone)]
pub struct LineParser {
    labels: Vec<(MetricLabel, String)>,
}

/// Parses the longest leading decimal number of `text`, the way a browser's
/// `parseFloat` does: `"12ms"` is 12, `"abc"` is nothing.
///
/// Only finite values are returned. Infinities, including literals too large
/// for an `f64`, cannot be charted and yield nothing.
#[must_use]
pub fn parse_float_prefix(text: &str) -> Option<f64> {
    let found = FLOAT_PREFIX.find(text.trim_start())?.as_str();
    let value = found.parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

impl LineParser {
    /// Create a parser for `labels`.
    #[must_use]
    pub fn new<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a MetricLabel>,
    {
        let mut parser = Self { labels: Vec::new() };
        for label in labels {
            // A repeated label would report every matching line twice.
            if parser.labels.iter().any(|(known, _)| known == label) {
                continue;
            }
            parser
                .labels
                .push((label.clone(), label.expected_line_start()));
        }
        parser
    }

    /// Returns every `(label, value)` pair `line` yields.
    ///
    /// In practice a line matches at most one label, but two distinct labels
    /// sharing a prefix will both be reported.
    #[must_use]
    pub fn parse_line(&self, line: &str) -> Vec<Sample<'_>> {
        let mut samples = Vec::new();
        for (label, expected_start) in &self.labels {
            if !line.starts_with(expected_start.as_str()) {
                continue;
            }
            let value = match label {
                MetricLabel::Simple(_) => Self::simple_value(line),
                MetricLabel::Complex { name, .. } => Self::complex_value(line, name),
            };
            match value {
                Some(value) => samples.push(Sample { label, value }),
                None => trace!("No value for {label} in line: {line}"),
            }
        }
        samples
    }

    fn simple_value(line: &str) -> Option<f64> {
        line.split(' ').nth(1).and_then(parse_float_prefix)
    }

    fn complex_value(line: &str, name: &str) -> Option<f64> {
        let start = line.find(NAME_ATTRIBUTE)? + NAME_ATTRIBUTE.len();
        if !line[start..].starts_with(name) {
            return None;
        }
        line.split(' ').next_back().and_then(parse_float_prefix)
    }

    /// Drains `reader` line by line, collecting every sample.
    ///
    /// Lines are decoded lossily, invalid UTF-8 never ends the stream.
    ///
    /// # Errors
    ///
    /// Returns the first read error, samples seen before it are dropped.
    pub async fn parse_reader<R>(&self, reader: R) -> std::io::Result<Vec<(MetricLabel, f64)>>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = SplitStream::new(reader.split(b'\n'));
        let mut samples = Vec::new();
        while let Some(line) = lines.next().await {
            let line = line?;
            let line = line.strip_suffix(b"\r").unwrap_or(line.as_slice());
            let line = String::from_utf8_lossy(line);
            samples.extend(
                self.parse_line(&line)
                    .into_iter()
                    .map(|sample| (sample.label.clone(), sample.value)),
            );
        }
        Ok(samples)
    }

    /// Reads the snapshot at `path`.
    ///
    /// A file that cannot be opened or read is logged and yields no samples,
    /// it never stops the caller from moving on to the next snapshot. Invalid
    /// UTF-8 is not a read error.
    pub async fn parse_file(&self, path: &Path) -> Vec<(MetricLabel, f64)> {
        let file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(e) => {
                warn!("Failed to open snapshot {path:?}: {e}");
                return Vec::new();
            }
        };
        match self.parse_reader(BufReader::new(file)).await {
            Ok(samples) => samples,
            Err(e) => {
                warn!("Failed to read snapshot {path:?}: {e}");
                Vec::new()
            }
        }
    }
}
