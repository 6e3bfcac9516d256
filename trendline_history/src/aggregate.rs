//! Folding repeated runs into summarized entries
//!
//! A test session is run several times and every run leaves a snapshot named
//! `<date>_<run>.txt`. Once harmonized, the runs of a session share a base
//! label, so in a history ordered by date and run they form a contiguous
//! stretch of entries with equal base labels. Each such stretch is collapsed
//! into one entry:
//!
//! * `entry_label` is the shared base label, suffixed with `[]` when more than
//!   one run was folded in
//! * `value` is the mean of the runs after dropping the single largest one
//! * `best` is the smallest run
//! * `combines_runs` lists the raw labels that were folded in
//!
//! Grouping is purely by contiguity. `[a_1, a_2, b_1, a_3]` is three groups,
//! the input is never reordered.
//!
//! Note that both the outlier rule and `best` assume lower is better, which
//! holds for durations and CPU time but not for throughput-like metrics.

use tracing::debug;

use crate::{
    filename::extract_base_label,
    history::{Histories, HistoryEntry, MetricHistory},
};

/// Suffix marking an entry that merges more than one run
pub const COMBINED_SUFFIX: &str = "[]";

/// Grouping state while walking a history left to right.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Grouping {
    /// No entry seen yet
    #[default]
    Idle,
    /// Collecting entries that share `base`
    Collecting {
        /// Base label shared by every entry in `runs`
        base: String,
        /// Entries collected so far, in input order
        runs: Vec<HistoryEntry>,
    },
}

impl Grouping {
    /// Feeds `entry`, returning the next state and the entry completed by this
    /// step, if any.
    ///
    /// An entry whose base label differs from the group being collected closes
    /// that group and starts a new one.
    #[must_use]
    pub fn step(self, entry: HistoryEntry) -> (Self, Option<HistoryEntry>) {
        let entry_base = extract_base_label(&entry.entry_label).to_string();
        match self {
            Self::Idle => (
                Self::Collecting {
                    base: entry_base,
                    runs: vec![entry],
                },
                None,
            ),
            Self::Collecting { base, mut runs } if base == entry_base => {
                runs.push(entry);
                (Self::Collecting { base, runs }, None)
            }
            Self::Collecting { runs, .. } => (
                Self::Collecting {
                    base: entry_base,
                    runs: vec![entry],
                },
                collapse(&runs),
            ),
        }
    }

    /// Closes the group being collected, if any.
    #[must_use]
    pub fn finish(self) -> Option<HistoryEntry> {
        match self {
            Self::Idle => None,
            Self::Collecting { runs, .. } => collapse(&runs),
        }
    }
}

/// Mean of `values` after dropping the single largest. A lone value is
/// returned as is.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn average_without_max(values: &[f64]) -> Option<f64> {
    match values {
        [] => None,
        [only] => Some(*only),
        _ => {
            let max_idx = values
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
                .map(|(idx, _)| idx)?;
            let sum: f64 = values
                .iter()
                .enumerate()
                .filter(|(idx, _)| *idx != max_idx)
                .map(|(_, value)| value)
                .sum();
            Some(sum / (values.len() - 1) as f64)
        }
    }
}

/// Smallest of `values`.
#[must_use]
pub fn best(values: &[f64]) -> Option<f64> {
    values.iter().copied().min_by(f64::total_cmp)
}

/// Collapses a group of runs into one combined entry. Returns `None` for an
/// empty group.
#[must_use]
pub fn collapse(runs: &[HistoryEntry]) -> Option<HistoryEntry> {
    let first = runs.first()?;
    let values: Vec<f64> = runs.iter().map(|run| run.value).collect();
    let mut entry_label = extract_base_label(&first.entry_label).to_string();
    if runs.len() > 1 {
        entry_label.push_str(COMBINED_SUFFIX);
    }
    Some(HistoryEntry {
        entry_label,
        value: average_without_max(&values)?,
        best: best(&values),
        combines_runs: runs.iter().map(|run| run.entry_label.clone()).collect(),
    })
}

/// Summarizes one ordered history.
#[must_use]
pub fn aggregate_history(history: &[HistoryEntry]) -> Vec<HistoryEntry> {
    let mut combined = Vec::new();
    let mut state = Grouping::Idle;
    for entry in history {
        let (next, done) = state.step(entry.clone());
        state = next;
        combined.extend(done);
    }
    combined.extend(state.finish());
    combined
}

/// Summarizes every history, keeping label order.
#[must_use]
pub fn aggregate(histories: &Histories) -> Histories {
    histories
        .iter()
        .map(|metric| {
            let history = aggregate_history(&metric.history);
            debug!(
                "{label}: {raw} entries combined into {n}",
                label = metric.label,
                raw = metric.history.len(),
                n = history.len()
            );
            MetricHistory {
                label: metric.label.clone(),
                history,
            }
        })
        .collect()
}
