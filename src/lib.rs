//! # webdoc2pdf
//!
//! Capture a paginated, JavaScript-rendered online document into one offline
//! PDF by driving a real browser.
//!
//! ## Why a browser?
//!
//! Document-sharing readers rarely expose the underlying file. Pages are drawn
//! client-side, often onto canvases, and only after the reader scrolls or
//! presses "continue reading". The only faithful copy is what the browser
//! renders, so this crate reveals the document the way a person would and
//! screenshots each page as it appears.
//!
//! ## Pipeline Overview
//!
//! ```text
//! URL
//!  │
//!  ├─ 1. Open      launch Chrome, navigate (one retry on navigation failure)
//!  ├─ 2. Reveal    zoom, scroll, click "load more"
//!  ├─ 3. Settle    poll height / element count / pixels until unchanged
//!  ├─ 4. Capture   screenshot → 256-bit perceptual fingerprint
//!  ├─ 5. Filter    drop captures that match an accepted page
//!  │               (two no-progress cycles in a row = end of document)
//!  └─ 6. Assemble  one PDF page per accepted capture (lopdf, spawn_blocking)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use webdoc2pdf::{run, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .headless(true)
//!         .output_base_dir("output")
//!         .build()?;
//!     let pdf = run("https://www.doc88.com/p-74287148231067.html", &config).await?;
//!     println!("{}", pdf.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `chrome` | on      | [`ChromeLauncher`] over `chromiumoxide`, and [`run`] |
//! | `cli`    | on      | The `webdoc2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Without `chrome`, drive the pipeline with your own [`BrowserLauncher`]
//! through [`run_with_launcher`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod browser;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod preflight;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

#[cfg(feature = "chrome")]
pub use browser::ChromeLauncher;
pub use browser::{BrowserLauncher, BrowserSession, SessionGuard, StabilityMeasurement};
pub use cleanup::prune_outputs;
pub use config::{
    BrowserConfig, ConfigFile, ControlIntent, ExtractionConfig, ExtractionConfigBuilder, LogLevel,
    ScrollMode,
};
pub use error::{ErrorKind, ExtractError, ExtractionFailure, Stage};
#[cfg(feature = "chrome")]
pub use extract::run;
pub use extract::{run_detailed, run_with_launcher};
pub use output::{CaptureFrame, ExtractionOutput, ExtractionSession, ExtractionStats};
pub use preflight::{check_environment, MissingCapability};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
