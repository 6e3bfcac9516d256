//! Snapshot file naming
//!
//! Snapshot files are named `<date>[_<run>].txt` where `<date>` has the shape
//! `Y-M-DTH-Mi-S`, each field a non-padded integer. The date orders snapshots
//! in time, the optional run number orders repeated runs of one session. This
//! module decodes those names, defines the canonical ordering and can rename
//! the runs of a session onto one shared prefix.

use std::{
    cmp::Ordering,
    fs, io,
    path::{Path, PathBuf},
};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

/// Extension carried by every snapshot file
pub const SNAPSHOT_EXTENSION: &str = ".txt";

/// Run number reported for names without a `_<run>` suffix
pub const NO_RUN: i64 = -1;

static RUN_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_(\d+)$").expect("Invalid regex pattern provided"));

/// Errors produced while renaming snapshot files
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
    /// Error reading directory entry
    #[error("Failed to read directory entry in {dir:?}: {source}")]
    ReadDirEntry {
        /// Directory path
        dir: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
    /// Error renaming a snapshot
    #[error("Failed to rename {from:?} to {to:?}: {source}")]
    Rename {
        /// Current path
        from: PathBuf,
        /// Target path
        to: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
}

/// A point in time decoded from a snapshot date label.
///
/// Fields are kept exactly as written, the month is not shifted and nothing is
/// checked against calendar ranges. Ordering is positional, year first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    /// Year
    pub year: i64,
    /// Month, as written
    pub month: i64,
    /// Day of month
    pub day: i64,
    /// Hour
    pub hour: i64,
    /// Minute
    pub minute: i64,
    /// Second
    pub second: i64,
}

/// A rename performed by [`harmonize_names`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    /// Path before the rename
    pub from: PathBuf,
    /// Path after the rename
    pub to: PathBuf,
}

fn strip_extension(name: &str) -> &str {
    name.strip_suffix(SNAPSHOT_EXTENSION).unwrap_or(name)
}

/// Whether `name` looks like a snapshot file.
#[must_use]
pub fn is_snapshot_name(name: &str) -> bool {
    name.len() > SNAPSHOT_EXTENSION.len() && name.ends_with(SNAPSHOT_EXTENSION)
}

/// Returns the characters of `name` up to the first `.` or `_`.
///
/// This is the display label of an entry and the key that ties the runs of one
/// session together.
#[must_use]
pub fn extract_base_label(name: &str) -> &str {
    let end = name.find(['.', '_']).unwrap_or(name.len());
    &name[..end]
}

/// Returns the trailing `_<digits>` run number of `name`, ignoring the
/// snapshot extension, or [`NO_RUN`].
#[must_use]
pub fn extract_run_number(name: &str) -> i64 {
    RUN_SUFFIX
        .captures(strip_extension(name))
        .and_then(|cap| cap[1].parse::<i64>().ok())
        .unwrap_or(NO_RUN)
}

/// Returns the date label of `name`: the extension-less name with any
/// `_<run_number>` suffix removed.
#[must_use]
pub fn extract_date_label(name: &str, run_number: i64) -> &str {
    let stem = strip_extension(name);
    if run_number < 0 {
        return stem;
    }
    stem.strip_suffix(&format!("_{run_number}"))
        .or_else(|| stem.rsplit_once('_').map(|(date, _)| date))
        .unwrap_or(stem)
}

/// Decodes a `Y-M-DTH-Mi-S` date label.
///
/// Returns `None` for malformed labels: a missing `T`, a side without exactly
/// three fields or a field that is not an integer.
#[must_use]
pub fn parse_timestamp(date_label: &str) -> Option<Timestamp> {
    let (date, time) = date_label.split_once('T')?;
    let [year, month, day] = parse_fields(date)?;
    let [hour, minute, second] = parse_fields(time)?;
    Some(Timestamp {
        year,
        month,
        day,
        hour,
        minute,
        second,
    })
}

fn parse_fields(part: &str) -> Option<[i64; 3]> {
    let mut fields = part.split('-').map(|field| field.trim().parse::<i64>());
    let first = fields.next()?.ok()?;
    let second = fields.next()?.ok()?;
    let third = fields.next()?.ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some([first, second, third])
}

/// The timestamp and run number a file name sorts by.
#[must_use]
pub fn order_key(name: &str) -> (Option<Timestamp>, i64) {
    let run = extract_run_number(name);
    (parse_timestamp(extract_date_label(name, run)), run)
}

/// Canonical chronological then run ordering of snapshot names.
///
/// Names with an invalid timestamp sort before every valid one.
#[must_use]
pub fn compare_file_order(a: &str, b: &str) -> Ordering {
    order_key(a).cmp(&order_key(b))
}

/// Sorts snapshot names by [`compare_file_order`].
pub fn sort_file_names<S: AsRef<str>>(names: &mut [S]) {
    names.sort_by(|a, b| compare_file_order(a.as_ref(), b.as_ref()));
}

fn snapshot_names(dir: &Path) -> Result<Vec<String>, Error> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(|source| Error::ReadDir {
        path: dir.to_path_buf(),
        source: Box::new(source),
    })? {
        let entry = entry.map_err(|source| Error::ReadDirEntry {
            dir: dir.to_path_buf(),
            source: Box::new(source),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if is_snapshot_name(name) {
            names.push(name.to_string());
        }
    }
    sort_file_names(&mut names);
    Ok(names)
}

/// Renames the runs in `dir` onto one canonical prefix.
///
/// Runs of one session are written at slightly different times and so carry
/// different date labels. With more than one snapshot present, the base label
/// of the first snapshot in canonical order becomes the prefix and every
/// snapshot with a run number is renamed to `<prefix>_<run>.txt`. Snapshots
/// without a run number are left alone. Running this twice renames nothing the
/// second time.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed or a rename fails.
pub fn harmonize_names(dir: &Path) -> Result<Vec<Rename>, Error> {
    let names = snapshot_names(dir)?;
    if names.len() <= 1 {
        debug!("{n} snapshot(s) in {dir:?}, nothing to harmonize", n = names.len());
        return Ok(Vec::new());
    }

    let Some(prefix) = names
        .iter()
        .map(|name| extract_base_label(name))
        .find(|base| !base.is_empty())
        .map(str::to_string)
    else {
        debug!("No snapshot in {dir:?} carries a base label");
        return Ok(Vec::new());
    };
    info!("Harmonizing {n} snapshots in {dir:?} onto prefix {prefix}", n = names.len());

    let mut renames = Vec::new();
    for name in &names {
        let run = extract_run_number(name);
        if run < 0 {
            continue;
        }
        let target = format!("{prefix}_{run}{SNAPSHOT_EXTENSION}");
        if target == *name {
            continue;
        }
        let from = dir.join(name);
        let to = dir.join(&target);
        if to.exists() {
            warn!("Not renaming {from:?}, {to:?} already exists");
            continue;
        }
        fs::rename(&from, &to).map_err(|source| Error::Rename {
            from: from.clone(),
            to: to.clone(),
            source: Box::new(source),
        })?;
        debug!("Renamed {name} to {target}");
        renames.push(Rename { from, to });
    }
    Ok(renames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), name).expect("write snapshot");
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .expect("read dir")
            .map(|entry| {
                entry
                    .expect("entry")
                    .file_name()
                    .into_string()
                    .expect("utf-8 name")
            })
            .collect();
        names.sort();
        names
    }

    #[test]
    fn base_label_stops_at_dot_or_underscore() {
        assert_eq!(extract_base_label("2023-9-5T10-3-4_2.txt"), "2023-9-5T10-3-4");
        assert_eq!(extract_base_label("2023-9-5T10-3-4.txt"), "2023-9-5T10-3-4");
        assert_eq!(extract_base_label("run"), "run");
        assert_eq!(extract_base_label("_1.txt"), "");
    }

    #[test]
    fn run_number_with_and_without_suffix() {
        assert_eq!(extract_run_number("2023-9-5T10-3-4_2.txt"), 2);
        assert_eq!(extract_run_number("2023-9-5T10-3-4_17"), 17);
        assert_eq!(extract_run_number("2023-9-5T10-3-4.txt"), NO_RUN);
        assert_eq!(extract_run_number("run.txt"), NO_RUN);
        assert_eq!(extract_run_number("m_x.txt"), NO_RUN);
    }

    #[test]
    fn date_label_drops_run_suffix() {
        assert_eq!(extract_date_label("2023-9-5T10-3-4_2.txt", 2), "2023-9-5T10-3-4");
        assert_eq!(extract_date_label("2023-9-5T10-3-4.txt", NO_RUN), "2023-9-5T10-3-4");
        assert_eq!(extract_date_label("a_b_3.txt", 3), "a_b");
    }

    #[test]
    fn timestamp_fields_are_positional() {
        assert_eq!(
            parse_timestamp("2023-9-5T10-3-4"),
            Some(Timestamp {
                year: 2023,
                month: 9,
                day: 5,
                hour: 10,
                minute: 3,
                second: 4,
            })
        );
    }

    #[test]
    fn malformed_timestamp_is_invalid() {
        assert_eq!(parse_timestamp("2023-9-5"), None);
        assert_eq!(parse_timestamp("2023-9T10-3-4"), None);
        assert_eq!(parse_timestamp("2023-x-5T10-3-4"), None);
        assert_eq!(parse_timestamp("run"), None);
    }

    #[test]
    fn unpadded_fields_order_numerically() {
        assert_eq!(
            compare_file_order("2023-9-5T10-3-4.txt", "2023-10-1T1-1-1.txt"),
            Ordering::Less
        );
        assert_eq!(
            compare_file_order("2023-9-5T9-59-59.txt", "2023-9-5T10-0-0.txt"),
            Ordering::Less
        );
    }

    #[test]
    fn run_number_breaks_ties() {
        let mut names = vec![
            "2023-9-5T10-3-4_10.txt",
            "2023-9-5T10-3-4_2.txt",
            "2023-9-4T10-3-4.txt",
            "2023-9-5T10-3-4_1.txt",
        ];
        sort_file_names(&mut names);
        assert_eq!(
            names,
            vec![
                "2023-9-4T10-3-4.txt",
                "2023-9-5T10-3-4_1.txt",
                "2023-9-5T10-3-4_2.txt",
                "2023-9-5T10-3-4_10.txt",
            ]
        );
    }

    #[test]
    fn invalid_timestamps_sort_first() {
        assert_eq!(compare_file_order("run.txt", "2023-9-5T10-3-4.txt"), Ordering::Less);
    }

    #[test]
    fn harmonize_single_file_is_noop() {
        let dir = tempfile::tempdir().expect("create temp dir");
        touch(dir.path(), "2023-9-5T10-3-4_1.txt");
        let renames = harmonize_names(dir.path()).expect("harmonize");
        assert!(renames.is_empty());
        assert_eq!(listing(dir.path()), vec!["2023-9-5T10-3-4_1.txt"]);
    }

    #[test]
    fn harmonize_empty_dir_is_noop() {
        let dir = tempfile::tempdir().expect("create temp dir");
        assert!(harmonize_names(dir.path()).expect("harmonize").is_empty());
    }

    #[test]
    fn harmonize_renames_runs_onto_first_prefix() {
        let dir = tempfile::tempdir().expect("create temp dir");
        touch(dir.path(), "2023-9-5T10-3-4_1.txt");
        touch(dir.path(), "2023-9-5T10-3-40_2.txt");
        touch(dir.path(), "2023-9-5T10-4-20_3.txt");
        touch(dir.path(), "notes.md");

        let renames = harmonize_names(dir.path()).expect("harmonize");
        assert_eq!(renames.len(), 2);
        assert_eq!(
            listing(dir.path()),
            vec![
                "2023-9-5T10-3-4_1.txt",
                "2023-9-5T10-3-4_2.txt",
                "2023-9-5T10-3-4_3.txt",
                "notes.md",
            ]
        );
        // contents travel with the rename
        let moved = fs::read_to_string(dir.path().join("2023-9-5T10-3-4_3.txt")).expect("read");
        assert_eq!(moved, "2023-9-5T10-4-20_3.txt");
    }

    #[test]
    fn harmonize_leaves_unnumbered_files() {
        let dir = tempfile::tempdir().expect("create temp dir");
        touch(dir.path(), "2023-9-5T10-3-4.txt");
        touch(dir.path(), "2023-9-5T10-3-9_2.txt");

        harmonize_names(dir.path()).expect("harmonize");
        assert_eq!(
            listing(dir.path()),
            vec!["2023-9-5T10-3-4.txt", "2023-9-5T10-3-4_2.txt"]
        );
    }

    #[test]
    fn harmonize_is_idempotent() {
        let dir = tempfile::tempdir().expect("create temp dir");
        touch(dir.path(), "2023-9-5T10-3-4_1.txt");
        touch(dir.path(), "2023-9-5T10-3-7_2.txt");

        let first = harmonize_names(dir.path()).expect("harmonize");
        assert_eq!(first.len(), 1);
        let before = listing(dir.path());
        let second = harmonize_names(dir.path()).expect("harmonize");
        assert!(second.is_empty());
        assert_eq!(listing(dir.path()), before);
    }

    #[test]
    fn harmonize_does_not_clobber_existing_run() {
        let dir = tempfile::tempdir().expect("create temp dir");
        touch(dir.path(), "2023-9-5T10-3-4_1.txt");
        touch(dir.path(), "2023-9-5T10-3-9_1.txt");

        harmonize_names(dir.path()).expect("harmonize");
        assert_eq!(
            listing(dir.path()),
            vec!["2023-9-5T10-3-4_1.txt", "2023-9-5T10-3-9_1.txt"]
        );
    }

    #[test]
    fn grouping_key_stable_under_harmonize() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let names = [
            "2023-9-5T10-3-4_1.txt",
            "2023-9-5T10-3-8_2.txt",
            "2023-9-5T10-3-12_3.txt",
        ];
        for name in names {
            touch(dir.path(), name);
        }
        harmonize_names(dir.path()).expect("harmonize");

        let after = snapshot_names(dir.path()).expect("list");
        let bases: Vec<&str> = after.iter().map(|name| extract_base_label(name)).collect();
        assert!(bases.windows(2).all(|w| w[0] == w[1]));
        let runs: Vec<i64> = after.iter().map(|name| extract_run_number(name)).collect();
        assert_eq!(runs, vec![1, 2, 3]);
    }

    proptest! {
        #[test]
        fn run_number_round_trip(
            date in "[0-9]{4}-[0-9]{1,2}-[0-9]{1,2}T[0-9]{1,2}-[0-9]{1,2}-[0-9]{1,2}",
            run in 0i64..100_000,
        ) {
            let name = format!("{date}_{run}.txt");
            prop_assert_eq!(extract_run_number(&name), run);
            prop_assert_eq!(extract_date_label(&name, run), date.as_str());
        }

        #[test]
        fn no_suffix_means_no_run(date in "[0-9]{4}-[0-9]{1,2}-[0-9]{1,2}T[0-9]{1,2}-[0-9]{1,2}-[0-9]{1,2}") {
            let name = format!("{date}.txt");
            prop_assert_eq!(extract_run_number(&name), NO_RUN);
        }

        #[test]
        fn no_panic_on_any_name(name: String) {
            let run = extract_run_number(&name);
            let _ = parse_timestamp(extract_date_label(&name, run));
            let _ = extract_base_label(&name);
        }

        #[test]
        fn ordering_is_total(a: String, b: String) {
            prop_assert_eq!(compare_file_order(&a, &b), compare_file_order(&b, &a).reverse());
        }
    }
}
