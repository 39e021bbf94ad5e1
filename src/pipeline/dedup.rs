//! Duplicate / boundary filter.
//!
//! Decides whether a fresh capture is a new page. A capture is rejected when
//! its fingerprint is within `similarity_threshold` bits of any frame already
//! accepted, so scrolling back over old content or re-rendering the last page
//! never adds a page twice. A run of rejections is how the capture loop
//! recognises the end of the document.

use crate::output::CaptureFrame;
use crate::pipeline::fingerprint::Fingerprint;

/// Why a capture was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Matches the most recently accepted frame (nothing new was revealed).
    SameAsPrevious { distance: u32 },
    /// Matches an earlier frame (the view moved back over old content).
    SeenBefore { index: usize, distance: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accepted,
    Rejected(RejectReason),
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted)
    }
}

/// Stateless comparison against the accepted history.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateFilter {
    threshold: u32,
}

impl DuplicateFilter {
    pub fn new(similarity_threshold: u32) -> Self {
        Self {
            threshold: similarity_threshold,
        }
    }

    /// Compare `candidate` with every accepted frame, newest first.
    pub fn accept(&self, candidate: &Fingerprint, accepted: &[CaptureFrame]) -> Decision {
        let mut frames = accepted.iter().rev();

        if let Some(last) = frames.next() {
            let distance = candidate.distance(&last.fingerprint);
            if distance <= self.threshold {
                return Decision::Rejected(RejectReason::SameAsPrevious { distance });
            }
        }

        for frame in frames {
            let distance = candidate.distance(&frame.fingerprint);
            if distance <= self.threshold {
                return Decision::Rejected(RejectReason::SeenBefore {
                    index: frame.index,
                    distance,
                });
            }
        }

        Decision::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fingerprint::tests::{page_image, png_bytes};
    use chrono::Local;

    fn frame(index: usize, seed: u32) -> CaptureFrame {
        let png = png_bytes(&page_image(seed, 170, 160));
        let (fingerprint, width, height) = Fingerprint::from_png(&png).unwrap();
        CaptureFrame {
            index,
            png,
            fingerprint,
            width,
            height,
            captured_at: Local::now(),
        }
    }

    fn fp(seed: u32) -> Fingerprint {
        frame(0, seed).fingerprint
    }

    #[test]
    fn first_capture_is_always_accepted() {
        let filter = DuplicateFilter::new(6);
        assert_eq!(filter.accept(&fp(1), &[]), Decision::Accepted);
    }

    #[test]
    fn repeat_of_last_frame_is_rejected() {
        let filter = DuplicateFilter::new(6);
        let history = vec![frame(0, 1), frame(1, 2)];
        match filter.accept(&fp(2), &history) {
            Decision::Rejected(RejectReason::SameAsPrevious { distance }) => {
                assert_eq!(distance, 0)
            }
            other => panic!("expected SameAsPrevious, got {other:?}"),
        }
    }

    #[test]
    fn repeat_of_older_frame_is_rejected() {
        let filter = DuplicateFilter::new(6);
        let history = vec![frame(0, 1), frame(1, 2), frame(2, 3)];
        assert_eq!(
            filter.accept(&fp(1), &history),
            Decision::Rejected(RejectReason::SeenBefore {
                index: 0,
                distance: 0
            })
        );
    }

    #[test]
    fn new_content_is_accepted() {
        let filter = DuplicateFilter::new(6);
        let history = vec![frame(0, 1), frame(1, 2)];
        assert!(filter.accept(&fp(9), &history).is_accepted());
    }

    #[test]
    fn zero_threshold_only_rejects_exact_matches() {
        let filter = DuplicateFilter::new(0);
        let history = vec![frame(0, 4)];
        assert!(!filter.accept(&fp(4), &history).is_accepted());
        assert!(filter.accept(&fp(5), &history).is_accepted());
    }
}
