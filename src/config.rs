//! Configuration types for document extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The value is assembled once (defaults,
//! then an optional JSON file, then CLI overrides) and is never mutated after
//! [`crate::extract::run`] starts; every component receives it by reference.

use crate::error::ExtractError;
use crate::pipeline::fingerprint::FINGERPRINT_BITS;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for one extraction run.
///
/// # Example
/// ```rust
/// use webdoc2pdf::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .headless(true)
///     .viewport(1280, 1800)
///     .output_base_dir("out")
///     .build()
///     .unwrap();
/// assert!(config.headless);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Run the browser without a window. Default: false.
    ///
    /// The document sites this targets sometimes serve a reduced reader to
    /// headless user agents, so a visible window is the default.
    pub headless: bool,

    /// Browser viewport width in CSS pixels. Default: 1280.
    pub viewport_width: u32,

    /// Browser viewport height in CSS pixels. Default: 1800.
    ///
    /// Each viewport screenshot becomes one PDF page, so a tall viewport
    /// keeps a typical document page on a single capture.
    pub viewport_height: u32,

    /// Timeout for navigation and for any single browser call. Default: 60 000.
    pub navigation_timeout_ms: u64,

    /// Delay before the single navigation retry. Default: 2 000.
    pub navigation_retry_backoff_ms: u64,

    /// Interval between stability measurements. Default: 500.
    pub poll_interval_ms: u64,

    /// Longest wait for the page to stop changing after a reveal. Default: 10 000.
    pub max_stability_wait_ms: u64,

    /// Number of trailing measurements that must agree. Default: 3.
    pub stability_window: usize,

    /// Upper bound on reveal cycles before the run is declared failed. Default: 500.
    pub max_reveal_attempts: usize,

    /// Consecutive no-progress cycles that mean "end of document". Default: 2.
    pub no_progress_limit: usize,

    /// Wall-clock bound for the whole capture loop. Default: 30 minutes.
    pub session_timeout_ms: u64,

    /// Fingerprint Hamming distance (out of 256 bits) at or below which two
    /// captures count as the same content. Default: 6.
    pub similarity_threshold: u32,

    /// Extra screenshot attempts after a renderer failure. Default: 2.
    pub capture_retries: u32,

    /// Delay between screenshot attempts. Default: 500.
    pub capture_retry_delay_ms: u64,

    /// How each reveal cycle scrolls. Default: [`ScrollMode::Viewport`].
    pub scroll_mode: ScrollMode,

    /// Capture the whole page instead of the viewport. Default: false.
    pub full_page: bool,

    /// Clicks on the zoom control before the first capture. Default: 0.
    pub zoom_clicks: u32,

    /// The "continue reading" / "load more" control.
    pub reveal_control: ControlIntent,

    /// The zoom-in control used by `zoom_clicks`.
    pub zoom_control: ControlIntent,

    /// Explicit browser executable. If None, located via `chrome-probe`.
    pub chrome_executable: Option<PathBuf>,

    /// Parent directory for session directories. Default: `output`.
    pub output_base_dir: PathBuf,

    /// Keep per-page PNGs (and failed session directories). Default: false.
    pub debug_mode: bool,

    /// Log verbosity requested by the user. The library only emits `tracing`
    /// events; the binary turns this into a subscriber filter.
    pub log_level: LogLevel,

    /// Receives progress events. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            headless: false,
            viewport_width: 1280,
            viewport_height: 1800,
            navigation_timeout_ms: 60_000,
            navigation_retry_backoff_ms: 2_000,
            poll_interval_ms: 500,
            max_stability_wait_ms: 10_000,
            stability_window: 3,
            max_reveal_attempts: 500,
            no_progress_limit: 2,
            session_timeout_ms: 30 * 60 * 1000,
            similarity_threshold: 6,
            capture_retries: 2,
            capture_retry_delay_ms: 500,
            scroll_mode: ScrollMode::default(),
            full_page: false,
            zoom_clicks: 0,
            reveal_control: ControlIntent::reveal_more(),
            zoom_control: ControlIntent::zoom_in(),
            chrome_executable: None,
            output_base_dir: PathBuf::from("output"),
            debug_mode: false,
            log_level: LogLevel::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("headless", &self.headless)
            .field("viewport", &(self.viewport_width, self.viewport_height))
            .field("navigation_timeout_ms", &self.navigation_timeout_ms)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_stability_wait_ms", &self.max_stability_wait_ms)
            .field("stability_window", &self.stability_window)
            .field("max_reveal_attempts", &self.max_reveal_attempts)
            .field("no_progress_limit", &self.no_progress_limit)
            .field("session_timeout_ms", &self.session_timeout_ms)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("scroll_mode", &self.scroll_mode)
            .field("full_page", &self.full_page)
            .field("zoom_clicks", &self.zoom_clicks)
            .field("output_base_dir", &self.output_base_dir)
            .field("debug_mode", &self.debug_mode)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The browser-facing subset of this configuration.
    pub fn browser(&self) -> BrowserConfig {
        BrowserConfig {
            headless: self.headless,
            viewport_width: self.viewport_width,
            viewport_height: self.viewport_height,
            navigation_timeout: self.navigation_timeout(),
            poll_interval: self.poll_interval(),
            max_stability_wait: self.max_stability_wait(),
            max_reveal_attempts: self.max_reveal_attempts,
            full_page: self.full_page,
            chrome_executable: self.chrome_executable.clone(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_stability_wait(&self) -> Duration {
        Duration::from_millis(self.max_stability_wait_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    /// Load a JSON config file on top of the defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        Self::builder().json_file(path)?.build()
    }
}

/// Immutable browser settings handed to a [`crate::browser::BrowserLauncher`].
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub navigation_timeout: Duration,
    pub poll_interval: Duration,
    pub max_stability_wait: Duration,
    pub max_reveal_attempts: usize,
    pub full_page: bool,
    pub chrome_executable: Option<PathBuf>,
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn headless(mut self, v: bool) -> Self {
        self.config.headless = v;
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.viewport_width = width;
        self.config.viewport_height = height;
        self
    }

    pub fn navigation_timeout_ms(mut self, ms: u64) -> Self {
        self.config.navigation_timeout_ms = ms;
        self
    }

    pub fn navigation_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.navigation_retry_backoff_ms = ms;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn max_stability_wait_ms(mut self, ms: u64) -> Self {
        self.config.max_stability_wait_ms = ms;
        self
    }

    pub fn stability_window(mut self, n: usize) -> Self {
        self.config.stability_window = n;
        self
    }

    pub fn max_reveal_attempts(mut self, n: usize) -> Self {
        self.config.max_reveal_attempts = n;
        self
    }

    pub fn no_progress_limit(mut self, n: usize) -> Self {
        self.config.no_progress_limit = n;
        self
    }

    pub fn session_timeout_ms(mut self, ms: u64) -> Self {
        self.config.session_timeout_ms = ms;
        self
    }

    pub fn similarity_threshold(mut self, bits: u32) -> Self {
        self.config.similarity_threshold = bits;
        self
    }

    pub fn capture_retries(mut self, n: u32) -> Self {
        self.config.capture_retries = n;
        self
    }

    pub fn capture_retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.capture_retry_delay_ms = ms;
        self
    }

    pub fn scroll_mode(mut self, mode: ScrollMode) -> Self {
        self.config.scroll_mode = mode;
        self
    }

    pub fn full_page(mut self, v: bool) -> Self {
        self.config.full_page = v;
        self
    }

    pub fn zoom_clicks(mut self, n: u32) -> Self {
        self.config.zoom_clicks = n;
        self
    }

    pub fn reveal_control(mut self, intent: ControlIntent) -> Self {
        self.config.reveal_control = intent;
        self
    }

    pub fn zoom_control(mut self, intent: ControlIntent) -> Self {
        self.config.zoom_control = intent;
        self
    }

    pub fn chrome_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_executable = Some(path.into());
        self
    }

    pub fn output_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_base_dir = dir.into();
        self
    }

    pub fn debug_mode(mut self, v: bool) -> Self {
        self.config.debug_mode = v;
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = level;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Overlay every field present in `file`.
    pub fn apply_file(mut self, file: ConfigFile) -> Self {
        let c = &mut self.config;
        if let Some(v) = file.headless {
            c.headless = v;
        }
        if let Some(v) = file.viewport_width {
            c.viewport_width = v;
        }
        if let Some(v) = file.viewport_height {
            c.viewport_height = v;
        }
        if let Some(v) = file.navigation_timeout_ms {
            c.navigation_timeout_ms = v;
        }
        if let Some(v) = file.navigation_retry_backoff_ms {
            c.navigation_retry_backoff_ms = v;
        }
        if let Some(v) = file.poll_interval_ms {
            c.poll_interval_ms = v;
        }
        if let Some(v) = file.max_stability_wait_ms {
            c.max_stability_wait_ms = v;
        }
        if let Some(v) = file.stability_window {
            c.stability_window = v;
        }
        if let Some(v) = file.max_reveal_attempts {
            c.max_reveal_attempts = v;
        }
        if let Some(v) = file.no_progress_limit {
            c.no_progress_limit = v;
        }
        if let Some(v) = file.session_timeout_ms {
            c.session_timeout_ms = v;
        }
        if let Some(v) = file.similarity_threshold {
            c.similarity_threshold = v;
        }
        if let Some(v) = file.capture_retries {
            c.capture_retries = v;
        }
        if let Some(v) = file.capture_retry_delay_ms {
            c.capture_retry_delay_ms = v;
        }
        if let Some(v) = file.scroll_mode {
            c.scroll_mode = v;
        }
        if let Some(v) = file.full_page {
            c.full_page = v;
        }
        if let Some(v) = file.zoom_clicks {
            c.zoom_clicks = v;
        }
        if let Some(v) = file.reveal_control {
            c.reveal_control = v;
        }
        if let Some(v) = file.zoom_control {
            c.zoom_control = v;
        }
        if let Some(v) = file.chrome_executable {
            c.chrome_executable = Some(v);
        }
        if let Some(v) = file.output_base_dir {
            c.output_base_dir = v;
        }
        if let Some(v) = file.debug_mode {
            c.debug_mode = v;
        }
        if let Some(v) = file.log_level {
            c.log_level = v;
        }
        self
    }

    /// Read and overlay a JSON config file.
    pub fn json_file(self, path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let file = ConfigFile::load(path)?;
        Ok(self.apply_file(file))
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.viewport_width == 0 || c.viewport_height == 0 {
            return Err(ExtractError::InvalidConfig(format!(
                "viewport must be non-empty, got {}x{}",
                c.viewport_width, c.viewport_height
            )));
        }
        if c.poll_interval_ms == 0 {
            return Err(ExtractError::InvalidConfig(
                "poll interval must be ≥ 1ms".into(),
            ));
        }
        if c.poll_interval_ms > c.max_stability_wait_ms {
            return Err(ExtractError::InvalidConfig(format!(
                "poll interval ({}ms) exceeds max stability wait ({}ms)",
                c.poll_interval_ms, c.max_stability_wait_ms
            )));
        }
        if c.stability_window < 2 {
            return Err(ExtractError::InvalidConfig(
                "stability window must hold at least 2 measurements".into(),
            ));
        }
        if c.no_progress_limit == 0 {
            return Err(ExtractError::InvalidConfig(
                "no-progress limit must be ≥ 1".into(),
            ));
        }
        if c.max_reveal_attempts == 0 {
            return Err(ExtractError::InvalidConfig(
                "max reveal attempts must be ≥ 1".into(),
            ));
        }
        // Unrelated pages differ in about half the bits; a threshold that
        // high would reject every page after the first.
        if c.similarity_threshold >= FINGERPRINT_BITS / 2 {
            return Err(ExtractError::InvalidConfig(format!(
                "similarity threshold must be below {} bits, got {}",
                FINGERPRINT_BITS / 2,
                c.similarity_threshold
            )));
        }
        if c.navigation_timeout_ms == 0 || c.session_timeout_ms == 0 {
            return Err(ExtractError::InvalidConfig(
                "timeouts must be non-zero".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Config file ──────────────────────────────────────────────────────────

/// On-disk JSON configuration. Every field is optional; absent fields keep
/// their current value. Keys may be camelCase or snake_case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigFile {
    pub headless: Option<bool>,
    #[serde(alias = "viewport_width")]
    pub viewport_width: Option<u32>,
    #[serde(alias = "viewport_height")]
    pub viewport_height: Option<u32>,
    #[serde(alias = "navigation_timeout_ms")]
    pub navigation_timeout_ms: Option<u64>,
    #[serde(alias = "navigation_retry_backoff_ms")]
    pub navigation_retry_backoff_ms: Option<u64>,
    #[serde(alias = "poll_interval_ms")]
    pub poll_interval_ms: Option<u64>,
    #[serde(alias = "max_stability_wait_ms")]
    pub max_stability_wait_ms: Option<u64>,
    #[serde(alias = "stability_window")]
    pub stability_window: Option<usize>,
    #[serde(alias = "max_reveal_attempts")]
    pub max_reveal_attempts: Option<usize>,
    #[serde(alias = "no_progress_limit")]
    pub no_progress_limit: Option<usize>,
    #[serde(alias = "session_timeout_ms")]
    pub session_timeout_ms: Option<u64>,
    #[serde(alias = "similarity_threshold")]
    pub similarity_threshold: Option<u32>,
    #[serde(alias = "capture_retries")]
    pub capture_retries: Option<u32>,
    #[serde(alias = "capture_retry_delay_ms")]
    pub capture_retry_delay_ms: Option<u64>,
    #[serde(alias = "scroll_mode")]
    pub scroll_mode: Option<ScrollMode>,
    #[serde(alias = "full_page")]
    pub full_page: Option<bool>,
    #[serde(alias = "zoom_clicks")]
    pub zoom_clicks: Option<u32>,
    #[serde(alias = "reveal_control")]
    pub reveal_control: Option<ControlIntent>,
    #[serde(alias = "zoom_control")]
    pub zoom_control: Option<ControlIntent>,
    #[serde(alias = "chrome_executable")]
    pub chrome_executable: Option<PathBuf>,
    #[serde(alias = "output_base_dir")]
    pub output_base_dir: Option<PathBuf>,
    #[serde(alias = "debug_mode")]
    pub debug_mode: Option<bool>,
    #[serde(alias = "log_level")]
    pub log_level: Option<LogLevel>,
}

impl ConfigFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ExtractError::ConfigFile {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::parse(&text).map_err(|detail| ExtractError::ConfigFile {
            path: path.to_path_buf(),
            detail,
        })
    }

    pub fn parse(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| e.to_string())
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How a reveal cycle moves the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollMode {
    /// Advance one viewport height per cycle, so consecutive viewport
    /// screenshots tile the document page by page. (default)
    #[default]
    Viewport,
    /// Jump to the end of the page each cycle; suits full-page captures of
    /// infinite-scroll readers.
    Bottom,
}

/// How to find a clickable control: CSS selectors first, then visible text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlIntent {
    pub selectors: Vec<String>,
    /// Case-insensitive substrings matched against the text of buttons,
    /// links and small clickable elements.
    pub texts: Vec<String>,
}

impl ControlIntent {
    /// Default heuristics for "continue reading" / "load more" controls.
    pub fn reveal_more() -> Self {
        Self {
            selectors: vec![
                "#continueButton".into(),
                ".continue-read".into(),
                ".btn-more".into(),
                "[data-action='load-more']".into(),
            ],
            texts: vec![
                "继续阅读".into(),
                "加载更多".into(),
                "continue reading".into(),
                "load more".into(),
                "read more".into(),
                "show more".into(),
            ],
        }
    }

    /// Default heuristics for a zoom-in control.
    pub fn zoom_in() -> Self {
        Self {
            selectors: vec![
                "#zoomInButton".into(),
                ".zoom-in".into(),
                "[title='放大']".into(),
                "[aria-label='Zoom in']".into(),
            ],
            texts: vec!["放大".into()],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty() && self.texts.is_empty()
    }
}

/// Log verbosity, mirroring the original tool's four levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}
