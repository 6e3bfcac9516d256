//! Crate regarding trendline's metric snapshot histories
//!
//! A metrics directory holds one exposition snapshot per test run, named
//! `<date>[_<run>].txt`. This crate orders those snapshots, pulls requested
//! metric values out of them and folds repeated runs of the same session into
//! summarized entries suitable for charting.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::perf)]
#![deny(clippy::suspicious)]
#![deny(clippy::complexity)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![allow(clippy::multiple_crate_versions)]

pub mod aggregate;
pub mod filename;
pub mod history;
pub mod label;
pub mod line;

pub use aggregate::aggregate;
pub use history::{Histories, HistoryEntry, MetricHistory, read_history};
pub use label::MetricLabel;
