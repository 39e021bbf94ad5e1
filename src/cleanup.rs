//! Retention for the output directory.
//!
//! Every run leaves a `<YYYYmmdd_HHMMSS>_<slug>` session directory and the
//! CLI appends to daily log files under `<output>/logs/`. [`prune_outputs`]
//! keeps the newest few of each and deletes the rest. Names carry the
//! timestamp, so "newest" is decided by name rather than file-system times.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory under the output base that holds log files.
pub const LOG_DIR_NAME: &str = "logs";

/// Log files are named `<prefix>.<YYYY-MM-DD>.<suffix>` by the CLI's daily
/// rolling appender.
pub const LOG_FILE_PREFIX: &str = "webdoc2pdf";
pub const LOG_FILE_SUFFIX: &str = "log";

/// Retention defaults.
pub const DEFAULT_KEEP_SESSIONS: usize = 2;
pub const DEFAULT_KEEP_LOGS: usize = 5;

static SESSION_DIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}_\d{6}_.+$").unwrap());

/// What [`prune_outputs`] did.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PruneReport {
    pub kept_sessions: usize,
    pub kept_logs: usize,
    pub removed_sessions: Vec<PathBuf>,
    pub removed_logs: Vec<PathBuf>,
    /// Entries that could not be deleted, with the reason.
    pub failures: Vec<(PathBuf, String)>,
}

/// Session directories under `base`, oldest first.
pub fn session_dirs(base: &Path) -> io::Result<Vec<PathBuf>> {
    let mut dirs = named_entries(base, |name, is_dir| is_dir && SESSION_DIR.is_match(name))?;
    dirs.sort();
    Ok(dirs)
}

/// Log files under `<base>/logs`, oldest first.
pub fn log_files(base: &Path) -> io::Result<Vec<PathBuf>> {
    let dir = base.join(LOG_DIR_NAME);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = named_entries(&dir, |name, is_dir| {
        !is_dir
            && name
                .strip_prefix(LOG_FILE_PREFIX)
                .is_some_and(|rest| rest.starts_with('.') && rest.ends_with(LOG_FILE_SUFFIX))
    })?;
    files.sort();
    Ok(files)
}

/// Delete all but the newest `keep_sessions` session directories and the
/// newest `keep_logs` log files. A missing `base` is not an error.
pub fn prune_outputs(base: &Path, keep_sessions: usize, keep_logs: usize) -> io::Result<PruneReport> {
    let mut report = PruneReport::default();
    if !base.exists() {
        debug!("Nothing to prune: {} does not exist", base.display());
        return Ok(report);
    }

    let sessions = session_dirs(base)?;
    let excess = sessions.len().saturating_sub(keep_sessions);
    report.kept_sessions = sessions.len() - excess;
    for dir in sessions.into_iter().take(excess) {
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!("Removed old session {}", dir.display());
                report.removed_sessions.push(dir);
            }
            Err(e) => {
                warn!("Failed to remove {}: {}", dir.display(), e);
                report.failures.push((dir, e.to_string()));
            }
        }
    }

    let logs = log_files(base)?;
    let excess = logs.len().saturating_sub(keep_logs);
    report.kept_logs = logs.len() - excess;
    for file in logs.into_iter().take(excess) {
        match fs::remove_file(&file) {
            Ok(()) => {
                info!("Removed old log {}", file.display());
                report.removed_logs.push(file);
            }
            Err(e) => {
                warn!("Failed to remove {}: {}", file.display(), e);
                report.failures.push((file, e.to_string()));
            }
        }
    }

    Ok(report)
}

fn named_entries(dir: &Path, keep: impl Fn(&str, bool) -> bool) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_dir = entry.file_type()?.is_dir();
        if let Some(name) = entry.file_name().to_str() {
            if keep(name, is_dir) {
                out.push(entry.path());
            }
        }
    }
    Ok(out)
}
