//! Error types for the webdoc2pdf library.
//!
//! Two layers reflect two audiences:
//!
//! * [`ExtractError`]: what a single component reports (browser launch,
//!   navigation, screenshot, PDF assembly, …). Components return it and the
//!   owning component decides whether to retry.
//!
//! * [`ExtractionFailure`]: the one consolidated failure that
//!   [`crate::extract::run`] surfaces. It records which stage failed and how
//!   many pages had been accepted, and keeps the component error as its
//!   `source()` for diagnostics.
//!
//! [`ErrorKind`] classifies either layer without matching on every variant.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by pipeline components.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Browser errors ────────────────────────────────────────────────────
    /// The browser engine could not be started. Never retried.
    #[error("Failed to launch browser: {reason}\nInstall Chrome/Chromium or set CHROME_PATH.")]
    Launch { reason: String },

    /// The document URL could not be loaded.
    #[error("Failed to load '{url}': {reason}")]
    Navigation { url: String, reason: String },

    /// Navigation did not finish within the configured timeout.
    #[error("Navigation to '{url}' timed out after {elapsed_ms}ms")]
    NavigationTimeout { url: String, elapsed_ms: u64 },

    /// The renderer failed to produce or evaluate something on the page.
    #[error("Capture failed during {operation}: {reason}")]
    Capture {
        operation: &'static str,
        reason: String,
    },

    /// The capture loop ran `attempts` reveal cycles without reaching the
    /// end of the document.
    #[error("No end of document after {attempts} reveal cycles")]
    RevealLimitExceeded { attempts: usize },

    /// The session wall-clock ran out before any page was captured.
    #[error("Session timed out after {elapsed_ms}ms")]
    SessionTimeout { elapsed_ms: u64 },

    /// The page did not settle within the wait budget. Non-fatal: the
    /// capture loop logs it and proceeds as if the page were stable.
    #[error("Page did not stabilise within {waited_ms}ms")]
    StabilityTimeout { waited_ms: u64 },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The frame sequence could not be turned into a PDF.
    #[error("PDF assembly failed ({frames} frames): {detail}")]
    Assembly { frames: usize, detail: String },

    /// The output directory is unusable.
    #[error("Output directory '{path}' is not usable: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file inside the session directory could not be written.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Input / config errors ─────────────────────────────────────────────
    /// The URL is not an absolute HTTP/HTTPS URL.
    #[error("Invalid URL '{url}': must start with http:// or https://")]
    InvalidUrl { url: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A JSON configuration file could not be read or parsed.
    #[error("Failed to load config file '{path}': {detail}")]
    ConfigFile { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// The run was cancelled before it finished.
    #[error("Extraction cancelled")]
    Cancelled,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a failure, stable across variant additions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Launch,
    Navigation,
    Capture,
    StabilityTimeout,
    Assembly,
    Output,
    Config,
    Cancelled,
    Internal,
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::Launch { .. } => ErrorKind::Launch,
            ExtractError::Navigation { .. } | ExtractError::NavigationTimeout { .. } => {
                ErrorKind::Navigation
            }
            ExtractError::Capture { .. }
            | ExtractError::RevealLimitExceeded { .. }
            | ExtractError::SessionTimeout { .. } => ErrorKind::Capture,
            ExtractError::StabilityTimeout { .. } => ErrorKind::StabilityTimeout,
            ExtractError::Assembly { .. } => ErrorKind::Assembly,
            ExtractError::OutputDir { .. } | ExtractError::OutputWriteFailed { .. } => {
                ErrorKind::Output
            }
            ExtractError::InvalidUrl { .. }
            | ExtractError::InvalidConfig(_)
            | ExtractError::ConfigFile { .. } => ErrorKind::Config,
            ExtractError::Cancelled => ErrorKind::Cancelled,
            ExtractError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the owning component may retry the operation locally.
    pub fn is_transient(&self) -> bool {
        match self {
            ExtractError::RevealLimitExceeded { .. } | ExtractError::SessionTimeout { .. } => false,
            other => matches!(
                other.kind(),
                ErrorKind::Navigation | ErrorKind::Capture | ErrorKind::StabilityTimeout
            ),
        }
    }

    pub(crate) fn capture(operation: &'static str, reason: impl fmt::Display) -> Self {
        ExtractError::Capture {
            operation,
            reason: reason.to_string(),
        }
    }
}

/// Pipeline stage at which a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// URL and output-directory validation.
    Setup,
    /// Browser launch and navigation.
    Open,
    /// The capture loop.
    Capture,
    /// PDF assembly.
    Assembly,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Setup => "setup",
            Stage::Open => "browser open",
            Stage::Capture => "page capture",
            Stage::Assembly => "PDF assembly",
        };
        f.write_str(s)
    }
}

/// The single failure returned by [`crate::extract::run`].
#[derive(Debug, Error)]
#[error("Extraction of '{url}' failed during {stage} ({frames} page(s) captured): {cause}")]
pub struct ExtractionFailure {
    pub url: String,
    pub stage: Stage,
    /// Frames accepted before the failure.
    pub frames: usize,
    #[source]
    pub cause: ExtractError,
}

impl ExtractionFailure {
    pub fn new(url: impl Into<String>, stage: Stage, frames: usize, cause: ExtractError) -> Self {
        Self {
            url: url.into(),
            stage,
            frames,
            cause,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.cause.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn navigation_timeout_is_navigation_kind() {
        let e = ExtractError::NavigationTimeout {
            url: "https://example.com".into(),
            elapsed_ms: 30_000,
        };
        assert_eq!(e.kind(), ErrorKind::Navigation);
        assert!(e.is_transient());
        assert!(e.to_string().contains("30000ms"));
    }

    #[test]
    fn launch_is_not_transient() {
        let e = ExtractError::Launch {
            reason: "no such file".into(),
        };
        assert!(!e.is_transient());
        assert!(e.to_string().contains("CHROME_PATH"));
    }

    #[test]
    fn loop_limits_are_capture_kind_but_final() {
        let e = ExtractError::RevealLimitExceeded { attempts: 500 };
        assert_eq!(e.kind(), ErrorKind::Capture);
        assert!(!e.is_transient());
        assert!(!ExtractError::SessionTimeout { elapsed_ms: 1 }.is_transient());
    }

    #[test]
    fn assembly_display_includes_frame_count() {
        let e = ExtractError::Assembly {
            frames: 0,
            detail: "no frames".into(),
        };
        assert!(e.to_string().contains("0 frames"), "got: {e}");
    }

    #[test]
    fn failure_preserves_cause() {
        let f = ExtractionFailure::new(
            "https://example.com/doc",
            Stage::Capture,
            4,
            ExtractError::capture("screenshot", "renderer crashed"),
        );
        assert_eq!(f.kind(), ErrorKind::Capture);
        let msg = f.to_string();
        assert!(msg.contains("page capture"), "got: {msg}");
        assert!(msg.contains("4 page(s)"), "got: {msg}");
        let source = f.source().expect("source kept");
        assert!(source.to_string().contains("renderer crashed"));
    }
}
