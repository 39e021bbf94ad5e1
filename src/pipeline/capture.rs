//! The page capture loop.
//!
//! Document length is unknown up front, so the loop is action-then-verify:
//! reveal more content, wait for the page to settle, capture, and let the
//! duplicate filter decide whether anything new appeared. Termination is
//! driven by consecutive no-progress cycles, not by a page-count estimate.
//!
//! ```text
//! Init ─▶ WaitingStable ─▶ Capturing ─▶ Deciding ─┬─▶ Revealing ─▶ WaitingStable …
//!                                         ▲        ├─▶ Done
//!               Revealing (no action) ────┘        └─▶ Failed
//! ```

use crate::browser::BrowserSession;
use crate::config::{ExtractionConfig, ScrollMode};
use crate::error::ExtractError;
use crate::output::{CaptureFrame, ExtractionSession, ExtractionStats};
use crate::pipeline::dedup::{Decision, DuplicateFilter};
use crate::pipeline::fingerprint::Fingerprint;
use crate::pipeline::stability::{wait_for_stability, StabilityOutcome};
use crate::progress::{ExtractionProgressCallback, NoopProgressCallback};
use chrono::{DateTime, Local};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// A screenshot that has not been judged yet.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub png: Vec<u8>,
    pub fingerprint: Fingerprint,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Local>,
}

/// States of the capture loop.
#[derive(Debug)]
pub enum CaptureState {
    /// Page just navigated; optional zoom, then the first capture.
    Init,
    /// Scroll and/or click the reveal control.
    Revealing,
    WaitingStable,
    Capturing,
    /// Judge the candidate. `None` means the reveal step could not act.
    Deciding(Option<Candidate>),
    Done,
    Failed(ExtractError),
}

/// What the loop produced, successful or not.
#[derive(Debug)]
pub struct CaptureOutcome {
    /// Accepted frames in sequence order. Kept on failure for reporting.
    pub frames: Vec<CaptureFrame>,
    pub stats: ExtractionStats,
    /// `Some` when the loop ended in `Failed`.
    pub failure: Option<ExtractError>,
}

impl CaptureOutcome {
    pub fn is_done(&self) -> bool {
        self.failure.is_none()
    }
}

/// Drive `session` from its freshly navigated state to `Done` or `Failed`.
pub async fn run_capture_loop(
    session: &mut dyn BrowserSession,
    config: &ExtractionConfig,
    extraction: &ExtractionSession,
) -> CaptureOutcome {
    let noop = NoopProgressCallback;
    let progress: &dyn ExtractionProgressCallback =
        config.progress_callback.as_deref().unwrap_or(&noop);

    let mut capture_loop = CaptureLoop {
        config,
        extraction,
        progress,
        filter: DuplicateFilter::new(config.similarity_threshold),
        frames: Vec::new(),
        stats: ExtractionStats::default(),
        no_progress: 0,
        cycles: 0,
        started: Instant::now(),
    };

    let failure = capture_loop.drive(session).await;
    let mut stats = capture_loop.stats;
    stats.capture_duration_ms = capture_loop.started.elapsed().as_millis() as u64;

    match &failure {
        None => info!(
            "Capture finished: {} page(s) after {} reveal cycle(s)",
            capture_loop.frames.len(),
            stats.reveal_cycles
        ),
        Some(e) => warn!(
            "Capture failed after {} page(s): {}",
            capture_loop.frames.len(),
            e
        ),
    }
    progress.on_capture_complete(capture_loop.frames.len());

    CaptureOutcome {
        frames: capture_loop.frames,
        stats,
        failure,
    }
}

struct CaptureLoop<'a> {
    config: &'a ExtractionConfig,
    extraction: &'a ExtractionSession,
    progress: &'a dyn ExtractionProgressCallback,
    filter: DuplicateFilter,
    frames: Vec<CaptureFrame>,
    stats: ExtractionStats,
    no_progress: usize,
    cycles: usize,
    started: Instant,
}

impl CaptureLoop<'_> {
    async fn drive(&mut self, session: &mut dyn BrowserSession) -> Option<ExtractError> {
        let mut state = CaptureState::Init;
        loop {
            debug!("Capture state: {:?}", StateName(&state));
            state = match state {
                CaptureState::Init => self.init(session).await,
                CaptureState::Revealing => self.reveal(session).await,
                CaptureState::WaitingStable => self.wait_stable(session).await,
                CaptureState::Capturing => self.capture(session).await,
                CaptureState::Deciding(candidate) => self.decide(candidate).await,
                CaptureState::Done => return None,
                CaptureState::Failed(e) => return Some(e),
            };
        }
    }

    async fn init(&mut self, session: &mut dyn BrowserSession) -> CaptureState {
        for i in 0..self.config.zoom_clicks {
            match session.click_if_present(&self.config.zoom_control).await {
                Ok(true) => debug!("Zoom click {}/{}", i + 1, self.config.zoom_clicks),
                Ok(false) => {
                    if i == 0 {
                        warn!("Zoom control not found; capturing at default zoom");
                    }
                    break;
                }
                Err(e) => return CaptureState::Failed(e),
            }
        }
        CaptureState::WaitingStable
    }

    async fn reveal(&mut self, session: &mut dyn BrowserSession) -> CaptureState {
        let elapsed = self.started.elapsed();
        if elapsed >= self.config.session_timeout() {
            let elapsed_ms = elapsed.as_millis() as u64;
            if self.frames.is_empty() {
                return CaptureState::Failed(ExtractError::SessionTimeout { elapsed_ms });
            }
            warn!(
                "Session time limit reached after {}ms; keeping {} page(s) captured so far",
                elapsed_ms,
                self.frames.len()
            );
            self.stats.truncated = true;
            return CaptureState::Done;
        }
        if self.cycles >= self.config.max_reveal_attempts {
            return CaptureState::Failed(ExtractError::RevealLimitExceeded {
                attempts: self.cycles,
            });
        }

        self.cycles += 1;
        self.stats.reveal_cycles = self.cycles;
        self.progress.on_reveal(self.cycles);

        let scrolled = match self.config.scroll_mode {
            ScrollMode::Viewport => session.scroll_by_viewport().await,
            ScrollMode::Bottom => session.scroll_to_bottom().await,
        };
        let scrolled = match scrolled {
            Ok(v) => v,
            Err(e) => return CaptureState::Failed(e),
        };
        let clicked = match session.click_if_present(&self.config.reveal_control).await {
            Ok(v) => v,
            Err(e) => return CaptureState::Failed(e),
        };
        debug!(
            "Reveal cycle {}: scrolled={} clicked={}",
            self.cycles, scrolled, clicked
        );

        if scrolled || clicked {
            CaptureState::WaitingStable
        } else {
            CaptureState::Deciding(None)
        }
    }

    async fn wait_stable(&mut self, session: &mut dyn BrowserSession) -> CaptureState {
        let outcome = wait_for_stability(
            session,
            self.config.poll_interval(),
            self.config.max_stability_wait(),
            self.config.stability_window,
        )
        .await;
        match outcome {
            Ok(StabilityOutcome::Stable { .. }) => {}
            Ok(StabilityOutcome::TimedOut { waited_ms }) => {
                warn!("{}; capturing anyway", ExtractError::StabilityTimeout { waited_ms });
                self.stats.stability_timeouts += 1;
                self.progress.on_stability_timeout(waited_ms);
            }
            // The capture step retries on its own; a failed probe only
            // means we could not confirm stability.
            Err(e) => {
                warn!("Stability probe failed ({}); capturing anyway", e);
                self.stats.stability_timeouts += 1;
            }
        }
        CaptureState::Capturing
    }

    async fn capture(&mut self, session: &mut dyn BrowserSession) -> CaptureState {
        let retries = self.config.capture_retries;
        let delay = Duration::from_millis(self.config.capture_retry_delay_ms);
        let mut last_err: Option<ExtractError> = None;

        for attempt in 0..=retries {
            if attempt > 0 {
                warn!("Screenshot retry {}/{} after {}ms", attempt, retries, delay.as_millis());
                self.stats.capture_retries += 1;
                sleep(delay).await;
            }

            match take_candidate(session).await {
                Ok(candidate) => return CaptureState::Deciding(Some(candidate)),
                Err(e) => {
                    warn!("Screenshot attempt {} failed: {}", attempt + 1, e);
                    last_err = Some(e);
                }
            }
        }

        CaptureState::Failed(
            last_err.unwrap_or_else(|| ExtractError::capture("screenshot", "no attempt made")),
        )
    }

    async fn decide(&mut self, candidate: Option<Candidate>) -> CaptureState {
        let limit = self.config.no_progress_limit;

        let Some(candidate) = candidate else {
            self.no_progress += 1;
            self.stats.idle_cycles += 1;
            debug!(
                "No further action possible ({}/{} no-progress cycles)",
                self.no_progress, limit
            );
            self.progress.on_frame_rejected(self.no_progress, limit);
            return self.after_no_progress();
        };

        match self.filter.accept(&candidate.fingerprint, &self.frames) {
            Decision::Accepted => {
                let frame = CaptureFrame {
                    index: self.frames.len(),
                    png: candidate.png,
                    fingerprint: candidate.fingerprint,
                    width: candidate.width,
                    height: candidate.height,
                    captured_at: candidate.captured_at,
                };
                info!(
                    "Page {} captured ({}x{})",
                    frame.index + 1,
                    frame.width,
                    frame.height
                );
                if self.config.debug_mode {
                    self.write_debug_frame(&frame).await;
                }
                self.progress
                    .on_frame_accepted(frame.index, frame.width, frame.height);
                self.frames.push(frame);
                self.no_progress = 0;
                CaptureState::Revealing
            }
            Decision::Rejected(reason) => {
                self.no_progress += 1;
                self.stats.rejected_frames += 1;
                debug!(
                    "Capture rejected: {:?} ({}/{} no-progress cycles)",
                    reason, self.no_progress, limit
                );
                self.progress.on_frame_rejected(self.no_progress, limit);
                self.after_no_progress()
            }
        }
    }

    fn after_no_progress(&self) -> CaptureState {
        if self.no_progress >= self.config.no_progress_limit {
            info!("End of document after {} no-progress cycles", self.no_progress);
            CaptureState::Done
        } else {
            CaptureState::Revealing
        }
    }

    async fn write_debug_frame(&self, frame: &CaptureFrame) {
        let path = self.extraction.frame_path(frame.index);
        if let Err(e) = tokio::fs::write(&path, &frame.png).await {
            warn!("Failed to write debug image {}: {}", path.display(), e);
        } else {
            debug!("Saved {}", path.display());
        }
    }
}

/// Screenshot and fingerprint the current render.
async fn take_candidate(session: &mut dyn BrowserSession) -> Result<Candidate, ExtractError> {
    let png = session.screenshot().await?;
    let captured_at = Local::now();
    let (png, (fingerprint, width, height)) = tokio::task::spawn_blocking(move || {
        let decoded = Fingerprint::from_png(&png)?;
        Ok::<_, ExtractError>((png, decoded))
    })
    .await
    .map_err(|e| ExtractError::Internal(format!("Fingerprint task panicked: {}", e)))??;

    Ok(Candidate {
        png,
        fingerprint,
        width,
        height,
        captured_at,
    })
}

/// Logs a state without dumping candidate bytes.
struct StateName<'a>(&'a CaptureState);

impl std::fmt::Debug for StateName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.0 {
            CaptureState::Init => "Init",
            CaptureState::Revealing => "Revealing",
            CaptureState::WaitingStable => "WaitingStable",
            CaptureState::Capturing => "Capturing",
            CaptureState::Deciding(Some(_)) => "Deciding",
            CaptureState::Deciding(None) => "Deciding(no action)",
            CaptureState::Done => "Done",
            CaptureState::Failed(_) => "Failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::StabilityMeasurement;
    use crate::config::ControlIntent;
    use crate::error::ErrorKind;
    use crate::pipeline::fingerprint::tests::{page_image, png_bytes};
    use async_trait::async_trait;

    /// A document of `pages` distinct renders revealed one per scroll.
    struct FakeDocument {
        pages: Vec<Vec<u8>>,
        position: usize,
        /// Keep scrolling after the last page (content no longer changes).
        endless_scroll: bool,
        /// Every position renders a new page, forever.
        unbounded: bool,
        /// Measurements never repeat.
        restless: bool,
        screenshot_failures: usize,
        screenshots: usize,
        clicks: Vec<ControlIntent>,
        tick: u64,
    }

    impl FakeDocument {
        fn new(pages: usize) -> Self {
            Self {
                pages: (0..pages as u32)
                    .map(|i| png_bytes(&page_image(i + 1, 170, 160)))
                    .collect(),
                position: 0,
                endless_scroll: false,
                unbounded: false,
                restless: false,
                screenshot_failures: 0,
                screenshots: 0,
                clicks: Vec::new(),
                tick: 0,
            }
        }

        fn current(&self) -> Vec<u8> {
            if self.unbounded {
                return png_bytes(&page_image(self.position as u32 + 1, 170, 160));
            }
            self.pages[self.position.min(self.pages.len() - 1)].clone()
        }
    }

    #[async_trait]
    impl BrowserSession for FakeDocument {
        async fn scroll_to_bottom(&mut self) -> Result<bool, ExtractError> {
            self.scroll_by_viewport().await
        }
        async fn scroll_by_viewport(&mut self) -> Result<bool, ExtractError> {
            if self.unbounded || self.endless_scroll || self.position + 1 < self.pages.len() {
                self.position += 1;
                return Ok(true);
            }
            Ok(false)
        }
        async fn click_if_present(&mut self, intent: &ControlIntent) -> Result<bool, ExtractError> {
            self.clicks.push(intent.clone());
            Ok(false)
        }
        async fn screenshot(&mut self) -> Result<Vec<u8>, ExtractError> {
            if self.screenshot_failures > 0 {
                self.screenshot_failures -= 1;
                return Err(ExtractError::capture("screenshot", "renderer busy"));
            }
            self.screenshots += 1;
            Ok(self.current())
        }
        async fn measure(&mut self) -> Result<StabilityMeasurement, ExtractError> {
            self.tick += 1;
            let salt = if self.restless { self.tick } else { 0 };
            Ok(StabilityMeasurement {
                page_height: 1000 * (self.position as u64 + 1),
                element_count: self.position as u64,
                screenshot_hash: salt,
            })
        }
        async fn close(&mut self) -> Result<(), ExtractError> {
            Ok(())
        }
        fn abort(&mut self) {}
    }

    fn config() -> crate::config::ExtractionConfigBuilder {
        ExtractionConfig::builder()
            .poll_interval_ms(10)
            .max_stability_wait_ms(100)
            .stability_window(2)
            .capture_retry_delay_ms(5)
    }

    fn extraction(dir: &std::path::Path) -> ExtractionSession {
        ExtractionSession::new("https://example.com/doc.html", dir)
    }

    #[tokio::test(start_paused = true)]
    async fn three_states_give_three_frames_then_done() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config().build().unwrap();
        let mut doc = FakeDocument::new(3);

        let out = run_capture_loop(&mut doc, &cfg, &extraction(dir.path())).await;

        assert!(out.is_done(), "failure: {:?}", out.failure);
        assert_eq!(out.frames.len(), 3);
        assert_eq!(doc.screenshots, 3, "no capture after the last page");
        let indices: Vec<usize> = out.frames.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(out.stats.idle_cycles, 2);
        assert_eq!(out.stats.reveal_cycles, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_content_ends_after_limit() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config().build().unwrap();
        let mut doc = FakeDocument::new(2);
        doc.endless_scroll = true;

        let out = run_capture_loop(&mut doc, &cfg, &extraction(dir.path())).await;

        assert!(out.is_done());
        assert_eq!(out.frames.len(), 2);
        assert_eq!(out.stats.rejected_frames, 2);
        for pair in out.frames.windows(2) {
            assert!(pair[0].fingerprint.distance(&pair[1].fingerprint) > cfg.similarity_threshold);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_screenshot_failure_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config().capture_retries(2).build().unwrap();
        let mut doc = FakeDocument::new(1);
        doc.screenshot_failures = 2;

        let out = run_capture_loop(&mut doc, &cfg, &extraction(dir.path())).await;

        assert!(out.is_done());
        assert_eq!(out.frames.len(), 1);
        assert_eq!(out.stats.capture_retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_screenshot_failure_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config().capture_retries(1).build().unwrap();
        let mut doc = FakeDocument::new(2);
        doc.screenshot_failures = 10;

        let out = run_capture_loop(&mut doc, &cfg, &extraction(dir.path())).await;

        let err = out.failure.expect("should fail");
        assert_eq!(err.kind(), ErrorKind::Capture);
        assert!(out.frames.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_limit_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config().max_reveal_attempts(3).build().unwrap();
        let mut doc = FakeDocument::new(1);
        doc.unbounded = true;

        let out = run_capture_loop(&mut doc, &cfg, &extraction(dir.path())).await;

        match out.failure {
            Some(ExtractError::RevealLimitExceeded { attempts }) => assert_eq!(attempts, 3),
            other => panic!("expected reveal limit, got {other:?}"),
        }
        assert_eq!(out.frames.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn stability_timeout_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config().build().unwrap();
        let mut doc = FakeDocument::new(2);
        doc.restless = true;

        let out = run_capture_loop(&mut doc, &cfg, &extraction(dir.path())).await;

        assert!(out.is_done());
        assert_eq!(out.frames.len(), 2);
        assert_eq!(out.stats.stability_timeouts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn session_timeout_keeps_captured_pages() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config()
            .max_stability_wait_ms(1_000)
            .session_timeout_ms(1_500)
            .build()
            .unwrap();
        let mut doc = FakeDocument::new(1);
        doc.unbounded = true;
        doc.restless = true;

        let out = run_capture_loop(&mut doc, &cfg, &extraction(dir.path())).await;

        assert!(out.is_done());
        assert!(out.stats.truncated);
        assert_eq!(out.frames.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zoom_clicks_happen_before_first_capture() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config().zoom_clicks(3).build().unwrap();
        let mut doc = FakeDocument::new(1);

        run_capture_loop(&mut doc, &cfg, &extraction(dir.path())).await;

        // The fake never finds the control, so zooming stops after one try.
        assert_eq!(doc.clicks.first(), Some(&cfg.zoom_control));
        assert_eq!(doc.clicks.get(1), Some(&cfg.reveal_control));
    }

    #[tokio::test]
    async fn debug_mode_writes_page_images() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config().debug_mode(true).build().unwrap();
        let session = extraction(dir.path());
        std::fs::create_dir_all(&session.output_dir).unwrap();
        let mut doc = FakeDocument::new(2);

        let out = run_capture_loop(&mut doc, &cfg, &session).await;

        assert_eq!(out.frames.len(), 2);
        assert!(session.frame_path(0).exists());
        assert!(session.frame_path(1).exists());
        assert!(!session.frame_path(2).exists());
    }
}
