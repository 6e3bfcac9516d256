//! The trendline performance report tool.
//!
//! This library supports the trendline binary found elsewhere in this project.
//! It fetches metric snapshots from a running application under test, stages
//! them next to previously published history and renders the aggregated
//! history of every requested metric as a static HTML report. Snapshots can
//! also be exported as Chrome trace events. The history handling itself lives
//! in the `trendline-history` crate.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod fetch;
pub mod publish;
pub mod report;
pub mod trace;
