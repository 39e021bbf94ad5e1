//! Extraction entry points.
//!
//! [`run`] is the whole pipeline for one document: validate, open a browser,
//! capture every page, write the PDF, release the browser. Whatever fails,
//! the browser is released and the caller gets one [`ExtractionFailure`]
//! carrying the stage, the number of pages captured and the root cause.

#[cfg(feature = "chrome")]
use crate::browser::ChromeLauncher;
use crate::browser::{BrowserLauncher, BrowserSession, SessionGuard};
use crate::config::ExtractionConfig;
use crate::error::{ExtractError, ExtractionFailure, Stage};
use crate::output::{ExtractionOutput, ExtractionSession, ExtractionStats};
use crate::pipeline::{assemble, capture};
use crate::progress::{ExtractionProgressCallback, NoopProgressCallback};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Navigation is attempted at most this many times.
const MAX_OPEN_ATTEMPTS: u32 = 2;

/// Suffixes `_2` … `_N` tried when a session directory name is taken.
const MAX_SESSION_DIR_SUFFIX: u32 = 100;

static HTTP_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^https?://[^\s/?#]+[^\s]*$").unwrap());

/// Extract the document at `url` into a PDF using a local Chrome/Chromium.
///
/// # Returns
/// Path of the written PDF inside a fresh session directory under
/// `config.output_base_dir`.
///
/// # Errors
/// One [`ExtractionFailure`]; use [`ExtractionFailure::kind`] to classify it
/// and `source()` for the component error.
#[cfg(feature = "chrome")]
pub async fn run(
    url: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<PathBuf, ExtractionFailure> {
    run_with_launcher(url, config, &ChromeLauncher::new()).await
}

/// [`run`] with an explicit browser backend.
pub async fn run_with_launcher(
    url: impl AsRef<str>,
    config: &ExtractionConfig,
    launcher: &dyn BrowserLauncher,
) -> Result<PathBuf, ExtractionFailure> {
    run_detailed(url, config, launcher)
        .await
        .map(|output| output.pdf_path)
}

/// Like [`run_with_launcher`], returning page count and loop statistics too.
pub async fn run_detailed(
    url: impl AsRef<str>,
    config: &ExtractionConfig,
    launcher: &dyn BrowserLauncher,
) -> Result<ExtractionOutput, ExtractionFailure> {
    let total_start = Instant::now();
    let url = url.as_ref().trim();
    let fail = |stage: Stage, frames: usize, cause: ExtractError| {
        error!("Extraction failed during {}: {}", stage, cause);
        ExtractionFailure::new(url, stage, frames, cause)
    };
    info!("Starting extraction: {}", url);

    let noop = NoopProgressCallback;
    let progress: &dyn ExtractionProgressCallback =
        config.progress_callback.as_deref().unwrap_or(&noop);

    // ── Step 1: Validate inputs ──────────────────────────────────────────
    validate_url(url).map_err(|e| fail(Stage::Setup, 0, e))?;
    ensure_base_dir(&config.output_base_dir)
        .await
        .map_err(|e| fail(Stage::Setup, 0, e))?;
    let mut extraction = ExtractionSession::new(url, &config.output_base_dir);

    // ── Step 2: Open browser session ─────────────────────────────────────
    let session = open_with_retry(launcher, &mut extraction, config)
        .await
        .map_err(|e| fail(Stage::Open, 0, e))?;
    let mut guard = SessionGuard::new(session);

    // ── Step 3: Create session directory ─────────────────────────────────
    if let Err(e) = create_session_dir(&mut extraction).await {
        release(guard).await;
        return Err(fail(Stage::Setup, 0, e));
    }
    info!("Session directory: {}", extraction.output_dir.display());
    progress.on_session_start(url, &extraction.output_dir);

    // ── Step 4: Capture loop ─────────────────────────────────────────────
    let outcome = capture::run_capture_loop(guard.session(), config, &extraction).await;

    // The browser is not needed for assembly.
    release(guard).await;

    let frames = outcome.frames.len();
    let mut stats = ExtractionStats {
        navigation_attempts: extraction.attempts,
        ..outcome.stats
    };
    if let Some(cause) = outcome.failure {
        discard_session_dir(&extraction, config).await;
        return Err(fail(Stage::Capture, frames, cause));
    }

    // ── Step 5: Assemble PDF ─────────────────────────────────────────────
    let assembly_start = Instant::now();
    let pdf_path = match assemble::assemble(outcome.frames, &extraction.pdf_path()).await {
        Ok(path) => path,
        Err(cause) => {
            discard_session_dir(&extraction, config).await;
            return Err(fail(Stage::Assembly, frames, cause));
        }
    };
    stats.assembly_duration_ms = assembly_start.elapsed().as_millis() as u64;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    progress.on_pdf_written(&pdf_path, frames);

    info!(
        "Extraction complete: {} page(s) → {} ({}ms)",
        frames,
        pdf_path.display(),
        stats.total_duration_ms
    );

    Ok(ExtractionOutput {
        pdf_path,
        output_dir: extraction.output_dir,
        pages: frames,
        stats,
    })
}

/// Accepts absolute `http://` / `https://` URLs with a host.
pub fn validate_url(url: &str) -> Result<(), ExtractError> {
    if HTTP_URL.is_match(url) {
        Ok(())
    } else {
        Err(ExtractError::InvalidUrl {
            url: url.to_string(),
        })
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Make sure `dir` exists and is a directory.
async fn ensure_base_dir(dir: &Path) -> Result<(), ExtractError> {
    let dir_err = |source: std::io::Error| ExtractError::OutputDir {
        path: dir.to_path_buf(),
        source,
    };
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(dir_err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "exists and is not a directory",
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(dir).await.map_err(dir_err)
        }
        Err(e) => Err(dir_err(e)),
    }
}

/// Create a directory no other run owns. Runs of the same URL started within
/// the same second get `_2`, `_3`, … appended; `extraction.output_dir` is
/// updated to the directory actually created.
async fn create_session_dir(extraction: &mut ExtractionSession) -> Result<(), ExtractError> {
    let preferred = extraction.output_dir.clone();
    for n in 1..=MAX_SESSION_DIR_SUFFIX {
        let candidate = if n == 1 {
            preferred.clone()
        } else {
            let mut name = preferred.clone().into_os_string();
            name.push(format!("_{n}"));
            PathBuf::from(name)
        };
        match tokio::fs::create_dir(&candidate).await {
            Ok(()) => {
                extraction.output_dir = candidate;
                return Ok(());
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!("{} is taken", candidate.display());
            }
            Err(source) => {
                return Err(ExtractError::OutputDir {
                    path: candidate,
                    source,
                })
            }
        }
    }
    Err(ExtractError::OutputDir {
        path: preferred,
        source: std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{MAX_SESSION_DIR_SUFFIX} session directories with this name already exist"),
        ),
    })
}

/// Open the session, retrying transient (navigation) failures once after a backoff.
async fn open_with_retry(
    launcher: &dyn BrowserLauncher,
    extraction: &mut ExtractionSession,
    config: &ExtractionConfig,
) -> Result<Box<dyn BrowserSession>, ExtractError> {
    let browser_config = config.browser();
    let backoff = Duration::from_millis(config.navigation_retry_backoff_ms);

    loop {
        extraction.attempts += 1;
        match launcher.open(&extraction.url, &browser_config).await {
            Ok(session) => return Ok(session),
            Err(e) if e.is_transient() && extraction.attempts < MAX_OPEN_ATTEMPTS => {
                warn!(
                    "Navigation attempt {} failed ({}); retrying in {}ms",
                    extraction.attempts,
                    e,
                    backoff.as_millis()
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn release(guard: SessionGuard) {
    if let Err(e) = guard.release().await {
        warn!("Browser release reported an error: {}", e);
    }
}

/// Remove a failed run's session directory unless debugging.
async fn discard_session_dir(extraction: &ExtractionSession, config: &ExtractionConfig) {
    if config.debug_mode {
        info!(
            "Debug mode: keeping {} for inspection",
            extraction.output_dir.display()
        );
        return;
    }
    if let Err(e) = tokio::fs::remove_dir_all(&extraction.output_dir).await {
        warn!(
            "Failed to remove {}: {}",
            extraction.output_dir.display(),
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn accepts_http_and_https() {
        assert!(validate_url("https://www.doc88.com/p-74287148231067.html").is_ok());
        assert!(validate_url("HTTP://example.com").is_ok());
        assert!(validate_url("http://localhost:8080/doc?id=1").is_ok());
    }

    #[test]
    fn rejects_non_http() {
        for bad in ["", "example.com", "ftp://example.com", "https://", "https:// spaced.com"] {
            let err = validate_url(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config, "accepted {bad:?}");
        }
    }

    struct FailingLauncher {
        error: fn() -> ExtractError,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl BrowserLauncher for FailingLauncher {
        async fn open(
            &self,
            _url: &str,
            _config: &crate::config::BrowserConfig,
        ) -> Result<Box<dyn BrowserSession>, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.error)())
        }
    }

    async fn open_calls(error: fn() -> ExtractError) -> (usize, u32, ErrorKind) {
        let tmp = tempfile::tempdir().unwrap();
        let config = ExtractionConfig::builder()
            .navigation_retry_backoff_ms(1)
            .build()
            .unwrap();
        let launcher = FailingLauncher {
            error,
            calls: AtomicUsize::new(0),
        };
        let mut extraction = ExtractionSession::new("https://example.com/d", tmp.path());
        let err = open_with_retry(&launcher, &mut extraction, &config)
            .await
            .err()
            .expect("launcher always fails");
        (launcher.calls.load(Ordering::SeqCst), extraction.attempts, err.kind())
    }

    #[tokio::test]
    async fn navigation_timeout_is_retried_once() {
        let (calls, attempts, kind) = open_calls(|| ExtractError::NavigationTimeout {
            url: "https://example.com/d".into(),
            elapsed_ms: 30_000,
        })
        .await;
        assert_eq!((calls, attempts), (2, 2));
        assert_eq!(kind, ErrorKind::Navigation);
    }

    #[tokio::test]
    async fn launch_failure_is_final() {
        let (calls, attempts, kind) = open_calls(|| ExtractError::Launch {
            reason: "no chrome".into(),
        })
        .await;
        assert_eq!((calls, attempts), (1, 1));
        assert_eq!(kind, ErrorKind::Launch);
    }

    #[tokio::test]
    async fn same_second_sessions_get_distinct_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let first = ExtractionSession::new("https://example.com/doc.html", tmp.path());
        let mut a = first.clone();
        let mut b = first.clone();
        let mut c = first;

        create_session_dir(&mut a).await.unwrap();
        std::fs::write(a.pdf_path(), b"%PDF-1.5").unwrap();
        create_session_dir(&mut b).await.unwrap();
        create_session_dir(&mut c).await.unwrap();

        assert_ne!(a.output_dir, b.output_dir);
        assert!(b.output_dir.to_string_lossy().ends_with("_2"));
        assert!(c.output_dir.to_string_lossy().ends_with("_3"));
        assert!(a.pdf_path().exists(), "first session untouched");
        let names: Vec<_> = crate::cleanup::session_dirs(tmp.path()).unwrap();
        assert_eq!(names.len(), 3, "suffixed dirs still count as sessions");
    }

    #[tokio::test]
    async fn session_dir_under_a_file_is_output_error() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut extraction = ExtractionSession::new("https://example.com/d", tmp.path());
        let err = create_session_dir(&mut extraction).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Output);
    }

    #[tokio::test]
    async fn base_dir_is_created_when_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a").join("b");
        ensure_base_dir(&dir).await.unwrap();
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn base_dir_that_is_a_file_is_rejected() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let err = ensure_base_dir(tmp.path()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Output);
    }
}
