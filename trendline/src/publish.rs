//! Staging a publication
//!
//! A report is published as a static site. Every publication carries the
//! snapshots of all earlier ones, so staging starts from the previously
//! published site, adds the fresh snapshots next to the historical ones and
//! leaves the result ready for the report to be rendered into.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};
use trendline_history::filename;

use crate::config::Paths;

/// Errors produced while staging a publication
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
    /// Renaming fresh runs failed
    #[error(transparent)]
    Harmonize(#[from] filename::Error),
}

fn io_err<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> Error + 'a {
    move |source| Error::Io {
        action,
        path: path.to_path_buf(),
        source: Box::new(source),
    }
}

/// Whether a path, relative to the copy root, holds version control metadata.
fn is_vcs_path(relative: &Path) -> bool {
    relative
        .components()
        .any(|component| component.as_os_str().to_string_lossy().contains(".git"))
}

/// Removes everything inside `dir`, creating it if missing.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or cleared.
pub fn empty_dir(dir: &Path) -> Result<(), Error> {
    if !dir.exists() {
        return fs::create_dir_all(dir).map_err(io_err("create", dir));
    }
    for entry in fs::read_dir(dir).map_err(io_err("read", dir))? {
        let path = entry.map_err(io_err("read", dir))?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path).map_err(io_err("remove", &path))?;
        } else {
            fs::remove_file(&path).map_err(io_err("remove", &path))?;
        }
    }
    Ok(())
}

/// Recursively copies the contents of `from` into `to`, skipping any path
/// `skip` rejects. Returns the number of files copied.
///
/// # Errors
///
/// Returns an error if a directory cannot be read or created or a file cannot
/// be copied.
pub fn copy_dir<F>(from: &Path, to: &Path, skip: &F) -> Result<usize, Error>
where
    F: Fn(&Path) -> bool,
{
    copy_dir_inner(from, Path::new(""), to, skip)
}

fn copy_dir_inner<F>(root: &Path, relative: &Path, to: &Path, skip: &F) -> Result<usize, Error>
where
    F: Fn(&Path) -> bool,
{
    let source_dir = root.join(relative);
    let target_dir = to.join(relative);
    fs::create_dir_all(&target_dir).map_err(io_err("create", &target_dir))?;

    let mut copied = 0;
    for entry in fs::read_dir(&source_dir).map_err(io_err("read", &source_dir))? {
        let entry = entry.map_err(io_err("read", &source_dir))?;
        let child = relative.join(entry.file_name());
        if skip(&child) {
            debug!("Skipping {child:?}");
            continue;
        }
        let source = entry.path();
        if source.is_dir() {
            copied += copy_dir_inner(root, &child, to, skip)?;
        } else {
            let target = to.join(&child);
            fs::copy(&source, &target).map_err(io_err("copy", &source))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Stages a publication and returns the directory the report belongs in.
///
/// 1. Optionally harmonizes the fresh runs in `performance_metrics`.
/// 2. Empties `publish`.
/// 3. Copies the published history from `gh_pages`, version control metadata
///    excluded. A missing history is a first publication, not an error.
/// 4. Copies the fresh snapshots into `publish/performance_publish`.
///
/// # Errors
///
/// Returns an error if any filesystem step fails.
pub fn prepare_publish(paths: &Paths, harmonize: bool) -> Result<PathBuf, Error> {
    if harmonize {
        let renames = filename::harmonize_names(&paths.performance_metrics)?;
        info!("Harmonized {n} snapshot names", n = renames.len());
    }

    info!("Copying history");
    empty_dir(&paths.publish)?;
    if paths.gh_pages.is_dir() {
        let copied = copy_dir(&paths.gh_pages, &paths.publish, &is_vcs_path)?;
        debug!("Copied {copied} historical files");
    } else {
        warn!(
            "No history found at {:?}, publishing from scratch",
            paths.gh_pages
        );
    }

    info!("Copying performance metrics");
    let report_dir = paths.report_dir();
    fs::create_dir_all(&report_dir).map_err(io_err("create", &report_dir))?;
    let copied = copy_dir(&paths.performance_metrics, &report_dir, &|_: &Path| false)?;
    debug!("Copied {copied} fresh snapshots");

    Ok(report_dir)
}
