//! Content-stability detection.
//!
//! After a reveal action the page keeps changing for a while: images decode,
//! the reader lays out new pages, lazy loaders fire. The detector polls
//! [`BrowserSession::measure`] and reports the page stable once the last
//! `window` measurements are identical. Only the trailing window is compared,
//! so a page whose height oscillates early on still converges.

use crate::browser::{BrowserSession, StabilityMeasurement};
use crate::error::ExtractError;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// How a stability wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityOutcome {
    /// The trailing window agreed after `polls` measurements.
    Stable { polls: usize },
    /// `max_wait` elapsed first. Callers treat the page as stable.
    TimedOut { waited_ms: u64 },
}

impl StabilityOutcome {
    pub fn is_stable(&self) -> bool {
        matches!(self, StabilityOutcome::Stable { .. })
    }
}

/// Poll until the page stops changing or `max_wait` elapses.
///
/// # Errors
/// Propagates a failed measurement; the timeout itself is not an error.
pub async fn wait_for_stability(
    session: &mut dyn BrowserSession,
    poll_interval: Duration,
    max_wait: Duration,
    window: usize,
) -> Result<StabilityOutcome, ExtractError> {
    let window = window.max(2);
    let start = Instant::now();
    let mut recent: VecDeque<StabilityMeasurement> = VecDeque::with_capacity(window);
    let mut polls = 0usize;

    loop {
        let m = session.measure().await?;
        polls += 1;
        if recent.len() == window {
            recent.pop_front();
        }
        recent.push_back(m);

        if recent.len() == window && recent.iter().all(|x| *x == m) {
            debug!(
                "Page stable after {} polls ({}ms): height={} elements={}",
                polls,
                start.elapsed().as_millis(),
                m.page_height,
                m.element_count
            );
            return Ok(StabilityOutcome::Stable { polls });
        }

        let elapsed = start.elapsed();
        if elapsed >= max_wait {
            return Ok(StabilityOutcome::TimedOut {
                waited_ms: elapsed.as_millis() as u64,
            });
        }
        sleep(poll_interval.min(max_wait - elapsed)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlIntent;
    use async_trait::async_trait;

    /// Replays a fixed list of heights; the last one repeats forever.
    struct ScriptedHeights {
        heights: Vec<u64>,
        next: usize,
        measured: usize,
    }

    impl ScriptedHeights {
        fn new(heights: &[u64]) -> Self {
            Self {
                heights: heights.to_vec(),
                next: 0,
                measured: 0,
            }
        }
    }

    #[async_trait]
    impl BrowserSession for ScriptedHeights {
        async fn scroll_to_bottom(&mut self) -> Result<bool, ExtractError> {
            Ok(false)
        }
        async fn scroll_by_viewport(&mut self) -> Result<bool, ExtractError> {
            Ok(false)
        }
        async fn click_if_present(&mut self, _: &ControlIntent) -> Result<bool, ExtractError> {
            Ok(false)
        }
        async fn screenshot(&mut self) -> Result<Vec<u8>, ExtractError> {
            Ok(Vec::new())
        }
        async fn measure(&mut self) -> Result<StabilityMeasurement, ExtractError> {
            self.measured += 1;
            let h = self.heights[self.next.min(self.heights.len() - 1)];
            self.next += 1;
            Ok(StabilityMeasurement {
                page_height: h,
                element_count: h / 100,
                screenshot_hash: h,
            })
        }
        async fn close(&mut self) -> Result<(), ExtractError> {
            Ok(())
        }
        fn abort(&mut self) {}
    }

    /// Never settles.
    struct Growing(u64);

    #[async_trait]
    impl BrowserSession for Growing {
        async fn scroll_to_bottom(&mut self) -> Result<bool, ExtractError> {
            Ok(true)
        }
        async fn scroll_by_viewport(&mut self) -> Result<bool, ExtractError> {
            Ok(true)
        }
        async fn click_if_present(&mut self, _: &ControlIntent) -> Result<bool, ExtractError> {
            Ok(false)
        }
        async fn screenshot(&mut self) -> Result<Vec<u8>, ExtractError> {
            Ok(Vec::new())
        }
        async fn measure(&mut self) -> Result<StabilityMeasurement, ExtractError> {
            self.0 += 10;
            Ok(StabilityMeasurement {
                page_height: self.0,
                element_count: 1,
                screenshot_hash: self.0,
            })
        }
        async fn close(&mut self) -> Result<(), ExtractError> {
            Ok(())
        }
        fn abort(&mut self) {}
    }

    const POLL: Duration = Duration::from_millis(100);
    const MAX: Duration = Duration::from_millis(2_000);

    #[tokio::test(start_paused = true)]
    async fn settled_page_is_stable_after_one_window() {
        let mut s = ScriptedHeights::new(&[1000]);
        let out = wait_for_stability(&mut s, POLL, MAX, 3).await.unwrap();
        assert_eq!(out, StabilityOutcome::Stable { polls: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn oscillation_then_convergence_is_stable() {
        let mut s = ScriptedHeights::new(&[1000, 1800, 1200, 1800, 1900, 1900, 1900]);
        let out = wait_for_stability(&mut s, POLL, MAX, 3).await.unwrap();
        assert_eq!(out, StabilityOutcome::Stable { polls: 7 });
    }

    #[tokio::test(start_paused = true)]
    async fn never_settling_page_times_out() {
        let mut s = Growing(0);
        let start = Instant::now();
        let out = wait_for_stability(&mut s, POLL, MAX, 3).await.unwrap();
        match out {
            StabilityOutcome::TimedOut { waited_ms } => assert!(waited_ms >= 2_000),
            other => panic!("expected timeout, got {other:?}"),
        }
        // bounded: no more than one poll past the budget
        assert!(start.elapsed() <= MAX + POLL);
    }

    #[tokio::test(start_paused = true)]
    async fn window_of_two_needs_two_equal_samples() {
        let mut s = ScriptedHeights::new(&[500, 700, 700]);
        let out = wait_for_stability(&mut s, POLL, MAX, 2).await.unwrap();
        assert_eq!(out, StabilityOutcome::Stable { polls: 3 });
        assert_eq!(s.measured, 3);
    }
}
