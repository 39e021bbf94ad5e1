//! Data carried through and out of an extraction run.

use crate::pipeline::fingerprint::Fingerprint;
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One accepted screenshot, i.e. one page of the final PDF.
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    /// Position in the accepted sequence. Contiguous from 0.
    pub index: usize,
    /// PNG bytes exactly as returned by the browser.
    pub png: Vec<u8>,
    pub fingerprint: Fingerprint,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Local>,
}

/// Identity of one `run()` invocation.
#[derive(Debug, Clone)]
pub struct ExtractionSession {
    pub url: String,
    pub started_at: DateTime<Local>,
    /// `<output_base_dir>/<YYYYmmdd_HHMMSS>_<slug>`; created lazily, after
    /// the browser has loaded the document.
    pub output_dir: PathBuf,
    /// Navigation attempts made so far.
    pub attempts: u32,
}

impl ExtractionSession {
    pub fn new(url: &str, output_base_dir: &Path) -> Self {
        let started_at = Local::now();
        let dir_name = format!("{}_{}", started_at.format("%Y%m%d_%H%M%S"), url_slug(url));
        Self {
            url: url.to_string(),
            started_at,
            output_dir: output_base_dir.join(dir_name),
            attempts: 0,
        }
    }

    /// Final artifact path inside the session directory.
    pub fn pdf_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.pdf", url_slug(&self.url)))
    }

    /// Debug-mode path of the PNG for frame `index`.
    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.output_dir.join(format!("page_{:04}.png", index + 1))
    }
}

static SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^[a-z][a-z0-9+.-]*://").unwrap());
static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());
static PAGE_EXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.(s?html?|php|aspx?)$").unwrap());

const MAX_SLUG_LEN: usize = 80;

/// File-system-safe identifier derived from a document URL.
///
/// `https://www.doc88.com/p-74287148231067.html` → `www.doc88.com_p-74287148231067`
pub fn url_slug(url: &str) -> String {
    let without_scheme = SCHEME.replace(url.trim(), "");
    let without_query = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');
    let without_ext = PAGE_EXT.replace(without_query, "");
    let slug = UNSAFE_CHARS.replace_all(&without_ext, "_");
    let slug: String = slug.trim_matches(['_', '.']).chars().take(MAX_SLUG_LEN).collect();
    if slug.is_empty() {
        "document".to_string()
    } else {
        slug
    }
}

/// Result of a successful [`crate::extract::run_detailed`].
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutput {
    pub pdf_path: PathBuf,
    pub output_dir: PathBuf,
    pub pages: usize,
    pub stats: ExtractionStats,
}

/// Counters describing how the capture loop got to its result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    /// Reveal cycles run after the initial capture.
    pub reveal_cycles: usize,
    /// Captures discarded by the duplicate filter.
    pub rejected_frames: usize,
    /// Cycles where neither scrolling nor clicking did anything.
    pub idle_cycles: usize,
    /// Stability waits that hit `max_stability_wait_ms`.
    pub stability_timeouts: usize,
    /// Screenshot attempts that failed and were retried.
    pub capture_retries: usize,
    /// The session wall-clock ran out and the run ended best-effort.
    pub truncated: bool,
    pub navigation_attempts: u32,
    pub capture_duration_ms: u64,
    pub assembly_duration_ms: u64,
    pub total_duration_ms: u64,
}
