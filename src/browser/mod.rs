//! Browser session management.
//!
//! The pipeline talks to the browser only through two traits:
//!
//! * [`BrowserLauncher`]: starts a browser, opens one page and navigates it.
//! * [`BrowserSession`]: the primitives the capture loop needs on that page
//!   (scroll, click, screenshot, measure, close).
//!
//! [`chrome::ChromeLauncher`] implements them over `chromiumoxide`; tests
//! substitute scripted fakes. Sessions are always held through a
//! [`SessionGuard`] so the browser process is released on every exit path,
//! including cancellation of the owning future.

#[cfg(feature = "chrome")]
pub mod chrome;
pub mod scripts;

use crate::config::{BrowserConfig, ControlIntent};
use crate::error::ExtractError;
use async_trait::async_trait;
use std::hash::{DefaultHasher, Hash, Hasher};
use tracing::{debug, warn};

#[cfg(feature = "chrome")]
pub use chrome::ChromeLauncher;

/// One polling sample taken by the stability detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StabilityMeasurement {
    pub page_height: u64,
    pub element_count: u64,
    pub screenshot_hash: u64,
}

impl StabilityMeasurement {
    /// Hashes screenshot bytes for the `screenshot_hash` field.
    pub fn hash_screenshot(bytes: &[u8]) -> u64 {
        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        hasher.finish()
    }
}

/// Starts browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a browser, open one page and navigate it to `url`.
    ///
    /// # Errors
    /// * [`ExtractError::Launch`]: the engine could not start.
    /// * [`ExtractError::Navigation`] / [`ExtractError::NavigationTimeout`]:
    ///   the page did not load. The launched process must already be
    ///   released when this is returned.
    async fn open(
        &self,
        url: &str,
        config: &BrowserConfig,
    ) -> Result<Box<dyn BrowserSession>, ExtractError>;
}

/// One page in one browser process.
#[async_trait]
pub trait BrowserSession: Send {
    /// Jump to the end of the document. Returns whether the scroll position
    /// changed; makes no promise that new content has arrived.
    async fn scroll_to_bottom(&mut self) -> Result<bool, ExtractError>;

    /// Advance by one viewport height. Returns whether the position changed.
    async fn scroll_by_viewport(&mut self) -> Result<bool, ExtractError>;

    /// Click the first visible control matching `intent`.
    /// `Ok(false)` when there is none; absence is not an error.
    async fn click_if_present(&mut self, intent: &ControlIntent) -> Result<bool, ExtractError>;

    /// PNG of the current render.
    async fn screenshot(&mut self) -> Result<Vec<u8>, ExtractError>;

    async fn measure(&mut self) -> Result<StabilityMeasurement, ExtractError>;

    /// Release the page and the browser process. Idempotent.
    async fn close(&mut self) -> Result<(), ExtractError>;

    /// Synchronous best-effort release for paths that cannot await
    /// (a dropped future). Idempotent.
    fn abort(&mut self);
}

/// Owns a [`BrowserSession`] and guarantees it is released.
///
/// Call [`SessionGuard::release`] on normal and error paths. If the guard is
/// dropped without it (the future was cancelled, or a panic unwound) the
/// session is aborted synchronously.
pub struct SessionGuard {
    session: Box<dyn BrowserSession>,
    released: bool,
}

impl SessionGuard {
    pub fn new(session: Box<dyn BrowserSession>) -> Self {
        Self {
            session,
            released: false,
        }
    }

    pub fn session(&mut self) -> &mut dyn BrowserSession {
        self.session.as_mut()
    }

    pub async fn release(mut self) -> Result<(), ExtractError> {
        self.released = true;
        let result = self.session.close().await;
        if let Err(ref e) = result {
            warn!("Browser close failed, aborting instead: {}", e);
            self.session.abort();
        }
        debug!("Browser session released");
        result
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.released {
            warn!("Browser session dropped before release; aborting browser");
            self.session.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSession {
        closes: Arc<AtomicUsize>,
        aborts: Arc<AtomicUsize>,
        fail_close: bool,
    }

    #[async_trait]
    impl BrowserSession for CountingSession {
        async fn scroll_to_bottom(&mut self) -> Result<bool, ExtractError> {
            Ok(false)
        }
        async fn scroll_by_viewport(&mut self) -> Result<bool, ExtractError> {
            Ok(false)
        }
        async fn click_if_present(&mut self, _intent: &ControlIntent) -> Result<bool, ExtractError> {
            Ok(false)
        }
        async fn screenshot(&mut self) -> Result<Vec<u8>, ExtractError> {
            Ok(Vec::new())
        }
        async fn measure(&mut self) -> Result<StabilityMeasurement, ExtractError> {
            Ok(StabilityMeasurement {
                page_height: 0,
                element_count: 0,
                screenshot_hash: 0,
            })
        }
        async fn close(&mut self) -> Result<(), ExtractError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(ExtractError::Internal("close failed".into()));
            }
            Ok(())
        }
        fn abort(&mut self) {
            self.aborts.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn guard(fail_close: bool) -> (SessionGuard, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let aborts = Arc::new(AtomicUsize::new(0));
        let session = CountingSession {
            closes: Arc::clone(&closes),
            aborts: Arc::clone(&aborts),
            fail_close,
        };
        (SessionGuard::new(Box::new(session)), closes, aborts)
    }

    #[tokio::test]
    async fn release_closes_once_without_abort() {
        let (g, closes, aborts) = guard(false);
        g.release().await.unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(aborts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_close_falls_back_to_abort() {
        let (g, closes, aborts) = guard(true);
        assert!(g.release().await.is_err());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(aborts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_unreleased_guard_aborts() {
        let (g, closes, aborts) = guard(false);
        drop(g);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
        assert_eq!(aborts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_future_aborts_session() {
        let (g, _closes, aborts) = guard(false);
        let fut = async move {
            let mut g = g;
            let _ = g.session().measure().await;
            std::future::pending::<()>().await;
            g.release().await
        };
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let r = tokio::time::timeout(std::time::Duration::from_millis(10), fut).await;
            assert!(r.is_err(), "future should have been cancelled");
        });
        assert_eq!(aborts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn screenshot_hash_is_content_sensitive() {
        let a = StabilityMeasurement::hash_screenshot(b"page-one");
        let b = StabilityMeasurement::hash_screenshot(b"page-one");
        let c = StabilityMeasurement::hash_screenshot(b"page-two");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
