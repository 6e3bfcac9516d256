//! Metric histories read from a snapshot directory
//!
//! [`read_history`] walks a directory of snapshots in canonical order and
//! builds, for every requested label, the sequence of values it took. Every
//! requested label is present in the result even when no snapshot mentions
//! it, so a report can say "no data" rather than silently drop a chart.

use std::{
    io,
    path::{Path, PathBuf},
};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::{
    filename::{self, SNAPSHOT_EXTENSION},
    label::MetricLabel,
    line::LineParser,
};

/// Errors produced by [`read_history`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error reading directory entries
    #[error("Failed to read directory entries from {path:?}: {source}")]
    ReadDir {
        /// Directory path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
}

/// One observation of a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Label of the observation, a snapshot name or a combined run label
    pub entry_label: String,
    /// The observed value, or the average of the combined runs
    pub value: f64,
    /// Best of the combined runs, set once runs are aggregated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best: Option<f64>,
    /// Raw entry labels folded into this entry, set once runs are aggregated
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub combines_runs: Vec<String>,
}

impl HistoryEntry {
    /// A raw, not yet aggregated, observation.
    #[must_use]
    pub fn new(entry_label: impl Into<String>, value: f64) -> Self {
        Self {
            entry_label: entry_label.into(),
            value,
            best: None,
            combines_runs: Vec::new(),
        }
    }

    /// Number of runs this entry stands for.
    #[must_use]
    pub fn runs(&self) -> usize {
        self.combines_runs.len().max(1)
    }
}

/// The ordered observations of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricHistory {
    /// The metric
    pub label: MetricLabel,
    /// Observations in ascending date and run order
    pub history: Vec<HistoryEntry>,
}

impl MetricHistory {
    /// An empty history for `label`.
    #[must_use]
    pub fn new(label: MetricLabel) -> Self {
        Self {
            label,
            history: Vec::new(),
        }
    }
}

/// Histories keyed by label, iterated in the order labels were requested
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Histories {
    metrics: Vec<MetricHistory>,
    index: FxHashMap<MetricLabel, usize>,
}

impl Histories {
    /// Empty histories for each of `labels`. Repeated labels are kept once.
    #[must_use]
    pub fn new<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a MetricLabel>,
    {
        let mut histories = Self::default();
        for label in labels {
            histories.insert(MetricHistory::new(label.clone()));
        }
        histories
    }

    /// Adds `history`, replacing any history already held for its label.
    pub fn insert(&mut self, history: MetricHistory) {
        if let Some(&idx) = self.index.get(&history.label) {
            self.metrics[idx] = history;
        } else {
            self.index.insert(history.label.clone(), self.metrics.len());
            self.metrics.push(history);
        }
    }

    /// The history for `label`, if requested.
    #[must_use]
    pub fn get(&self, label: &MetricLabel) -> Option<&MetricHistory> {
        self.index.get(label).map(|&idx| &self.metrics[idx])
    }

    /// Appends an observation to `label`'s history. Unrequested labels are
    /// ignored.
    pub fn push(&mut self, label: &MetricLabel, entry: HistoryEntry) {
        if let Some(&idx) = self.index.get(label) {
            self.metrics[idx].history.push(entry);
        }
    }

    /// The requested labels, in order.
    pub fn labels(&self) -> impl Iterator<Item = &MetricLabel> {
        self.metrics.iter().map(|metric| &metric.label)
    }

    /// Iterate histories in request order.
    pub fn iter(&self) -> std::slice::Iter<'_, MetricHistory> {
        self.metrics.iter()
    }

    /// Number of metrics held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Whether no metric is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

impl IntoIterator for Histories {
    type Item = MetricHistory;
    type IntoIter = std::vec::IntoIter<MetricHistory>;

    fn into_iter(self) -> Self::IntoIter {
        self.metrics.into_iter()
    }
}

impl<'a> IntoIterator for &'a Histories {
    type Item = &'a MetricHistory;
    type IntoIter = std::slice::Iter<'a, MetricHistory>;

    fn into_iter(self) -> Self::IntoIter {
        self.metrics.iter()
    }
}

impl FromIterator<MetricHistory> for Histories {
    fn from_iter<T: IntoIterator<Item = MetricHistory>>(iter: T) -> Self {
        let mut histories = Self::default();
        for history in iter {
            histories.insert(history);
        }
        histories
    }
}

/// Lists the snapshot names in `dir` in canonical order.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed.
pub async fn snapshot_files(dir: &Path) -> Result<Vec<String>, Error> {
    let read_dir_err = |source| Error::ReadDir {
        path: dir.to_path_buf(),
        source: Box::new(source),
    };
    let mut entries = fs::read_dir(dir).await.map_err(read_dir_err)?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_dir_err)? {
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if filename::is_snapshot_name(&name) {
            names.push(name);
        }
    }
    filename::sort_file_names(&mut names);
    Ok(names)
}

/// Reads the history of every label in `labels` from the snapshots in `dir`.
///
/// Snapshots are processed one after another in canonical order; the result
/// is only chronological if the snapshot names are.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed. Individual snapshots
/// that cannot be read contribute nothing and are logged.
pub async fn read_history(dir: &Path, labels: &[MetricLabel]) -> Result<Histories, Error> {
    let mut histories = Histories::new(labels);
    let parser = LineParser::new(histories.labels());

    let files = snapshot_files(dir).await?;
    info!("Reading {n} snapshots from {dir:?}", n = files.len());

    for file in files {
        let entry_label = file
            .strip_suffix(SNAPSHOT_EXTENSION)
            .unwrap_or(&file)
            .to_string();
        let samples = parser.parse_file(&dir.join(&file)).await;
        debug!("{file}: {n} samples", n = samples.len());
        for (label, value) in samples {
            histories.push(&label, HistoryEntry::new(entry_label.clone(), value));
        }
    }

    Ok(histories)
}
