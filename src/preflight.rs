//! Environment checks run by the CLI before (or instead of) an extraction.
//!
//! The extraction pipeline never calls this; a missing browser surfaces there
//! as [`crate::error::ExtractError::Launch`]. `--check` uses it to tell the
//! user everything that is missing at once.

use crate::cleanup::{session_dirs, LOG_DIR_NAME};
use crate::config::ExtractionConfig;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One thing the environment lacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingCapability {
    /// Short identifier, e.g. `chrome`.
    pub name: &'static str,
    pub detail: String,
}

impl fmt::Display for MissingCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.detail)
    }
}

/// The most recent session directory and its PDF, if any.
#[derive(Debug, Clone, Serialize)]
pub struct RecentOutput {
    pub dir: PathBuf,
    pub pdf: Option<PathBuf>,
    pub pdf_bytes: Option<u64>,
}

/// Everything that would stop an extraction from running. Empty means ready.
pub fn check_environment(config: &ExtractionConfig) -> Vec<MissingCapability> {
    let mut missing = Vec::new();

    match &config.chrome_executable {
        Some(path) if !path.is_file() => missing.push(MissingCapability {
            name: "chrome",
            detail: format!("configured executable not found: {}", path.display()),
        }),
        Some(path) => debug!("Using configured browser {}", path.display()),
        None => match chrome_probe::locate_chrome() {
            Ok(path) => debug!("Found browser {}", path.display()),
            Err(e) => missing.push(MissingCapability {
                name: "chrome",
                detail: e.to_string(),
            }),
        },
    }

    if let Err(detail) = check_writable(&config.output_base_dir) {
        missing.push(MissingCapability {
            name: "output-dir",
            detail,
        });
    }

    let logs = config.output_base_dir.join(LOG_DIR_NAME);
    if let Err(e) = fs::create_dir_all(&logs) {
        missing.push(MissingCapability {
            name: "log-dir",
            detail: format!("cannot create {}: {}", logs.display(), e),
        });
    }

    missing
}

/// The newest session directory under `base`.
pub fn latest_output(base: &Path) -> Option<RecentOutput> {
    let dir = session_dirs(base).ok()?.pop()?;
    let pdf = fs::read_dir(&dir).ok()?.filter_map(Result::ok).find_map(|entry| {
        let path = entry.path();
        (path.extension().is_some_and(|ext| ext == "pdf")).then_some(path)
    });
    let pdf_bytes = pdf
        .as_ref()
        .and_then(|p| fs::metadata(p).ok())
        .map(|m| m.len());
    Some(RecentOutput {
        dir,
        pdf,
        pdf_bytes,
    })
}

/// Create `dir` if needed and prove a file can be written inside it.
fn check_writable(dir: &Path) -> Result<(), String> {
    fs::create_dir_all(dir).map_err(|e| format!("cannot create {}: {}", dir.display(), e))?;
    tempfile::NamedTempFile::new_in(dir)
        .map(drop)
        .map_err(|e| format!("cannot write in {}: {}", dir.display(), e))
}
