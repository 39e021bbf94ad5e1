//! CLI binary for webdoc2pdf.
//!
//! A thin shim over the library crate: merges defaults, an optional JSON
//! config file and CLI flags into one `ExtractionConfig`, runs the
//! extraction and prints the result.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use webdoc2pdf::cleanup::{
    prune_outputs, DEFAULT_KEEP_LOGS, DEFAULT_KEEP_SESSIONS, LOG_DIR_NAME, LOG_FILE_PREFIX,
    LOG_FILE_SUFFIX,
};
use webdoc2pdf::extract::validate_url;
use webdoc2pdf::preflight::latest_output;
use webdoc2pdf::{
    check_environment, run_detailed, ChromeLauncher, ExtractionConfig, ExtractionProgressCallback,
    LogLevel, ProgressCallback, ScrollMode,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that follows the capture loop. Page count is unknown until the
/// loop ends, so this is a spinner with a running total, not a bar.
struct CliProgressCallback {
    bar: ProgressBar,
    pages: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Opening");
        bar.set_message("launching browser…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            pages: AtomicUsize::new(0),
        })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_session_start(&self, _url: &str, output_dir: &Path) {
        self.bar.set_prefix("Capturing");
        self.bar.set_message("waiting for first page…");
        self.bar
            .println(format!("{} {}", dim("▸"), dim(&output_dir.display().to_string())));
    }

    fn on_reveal(&self, cycle: usize) {
        let pages = self.pages.load(Ordering::SeqCst);
        self.bar
            .set_message(format!("{pages} page(s)  ·  reveal cycle {cycle}"));
    }

    fn on_frame_accepted(&self, index: usize, width: u32, height: u32) {
        self.pages.store(index + 1, Ordering::SeqCst);
        self.bar.println(format!(
            "{} page {:>3}  {}",
            green("✔"),
            index + 1,
            dim(&format!("{width}×{height}"))
        ));
    }

    fn on_frame_rejected(&self, no_progress: usize, limit: usize) {
        self.bar
            .set_message(format!("no new content ({no_progress}/{limit})"));
    }

    fn on_stability_timeout(&self, waited_ms: u64) {
        self.bar.println(format!(
            "{} page still changing after {waited_ms}ms, capturing anyway",
            yellow("⚠")
        ));
    }

    fn on_capture_complete(&self, frames: usize) {
        self.bar.set_prefix("Writing");
        self.bar.set_message(format!("PDF with {frames} page(s)…"));
    }

    fn on_pdf_written(&self, _path: &Path, _pages: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r##"EXAMPLES:
  # Extract a document (a browser window opens)
  webdoc2pdf https://www.doc88.com/p-74287148231067.html

  # No browser window, custom output directory
  webdoc2pdf --headless --output-dir ~/docs https://www.doc88.com/p-74287148231067.html

  # Prompt for the URL
  webdoc2pdf

  # Keep per-page PNGs and log at DEBUG
  webdoc2pdf --debug https://www.doc88.com/p-74287148231067.html

  # Check the environment, then prune old sessions and logs
  webdoc2pdf --check
  webdoc2pdf --cleanup

CONFIG FILE (--config, JSON, camelCase or snake_case keys):
  {
    "headless": true,
    "viewportWidth": 1280,
    "viewportHeight": 1800,
    "maxStabilityWaitMs": 10000,
    "scrollMode": "viewport",
    "zoomClicks": 3,
    "revealControl": { "selectors": ["#continueButton"], "texts": ["继续阅读"] }
  }
  Command-line flags override the file.

ENVIRONMENT VARIABLES:
  CHROME_PATH               Browser executable (otherwise PATH, install locations
                            and the Playwright cache are searched)
  PLAYWRIGHT_BROWSERS_PATH  Playwright browser cache to search
  RUST_LOG                  Console log filter, overrides --log-level
"##;

/// Capture a paginated online document into a PDF.
#[derive(Parser, Debug)]
#[command(
    name = "webdoc2pdf",
    version,
    about = "Capture a paginated, JavaScript-rendered online document into a PDF",
    long_about = "Opens the document in Chrome/Chromium, reveals every page (zoom, scroll, \
\"continue reading\"), screenshots each page once it has finished rendering and writes \
the pages, in order, to a PDF inside a per-run output directory.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document URL. Prompted for when omitted.
    #[arg(value_name = "URL", conflicts_with = "url_flag")]
    url: Option<String>,

    /// Document URL (same as the positional argument).
    #[arg(long = "url", id = "url_flag", value_name = "URL")]
    url_flag: Option<String>,

    /// Run the browser without a window.
    #[arg(long, env = "WEBDOC2PDF_HEADLESS")]
    headless: bool,

    /// Keep per-page PNGs and failed session directories; log at DEBUG.
    #[arg(long, env = "WEBDOC2PDF_DEBUG")]
    debug: bool,

    /// JSON configuration file.
    #[arg(long, env = "WEBDOC2PDF_CONFIG")]
    config: Option<PathBuf>,

    /// Log level for the console and the log file.
    #[arg(long, value_enum, env = "WEBDOC2PDF_LOG_LEVEL", ignore_case = true)]
    log_level: Option<LogLevelArg>,

    /// Parent directory for session directories and logs.
    #[arg(short, long, env = "WEBDOC2PDF_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Browser executable (overrides CHROME_PATH and auto-detection).
    #[arg(long, env = "WEBDOC2PDF_CHROME")]
    chrome: Option<PathBuf>,

    /// How each reveal cycle scrolls: viewport (page by page) or bottom.
    #[arg(long, value_enum)]
    scroll_mode: Option<ScrollModeArg>,

    /// Clicks on the reader's zoom-in control before capturing.
    #[arg(long)]
    zoom_clicks: Option<u32>,

    /// Give up after this many minutes, keeping what was captured.
    #[arg(long, value_name = "MINUTES")]
    session_timeout: Option<u64>,

    /// Check the browser and output directories, then exit.
    #[arg(long)]
    check: bool,

    /// Delete old session directories and log files, then exit.
    #[arg(long)]
    cleanup: bool,

    /// Session directories kept by --cleanup.
    #[arg(long, default_value_t = DEFAULT_KEEP_SESSIONS, requires = "cleanup")]
    keep_sessions: usize,

    /// Log files kept by --cleanup.
    #[arg(long, default_value_t = DEFAULT_KEEP_LOGS, requires = "cleanup")]
    keep_logs: usize,

    /// Print the result (ExtractionOutput) as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "WEBDOC2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevelArg {
    Debug,
    Info,
    #[value(alias = "warn")]
    Warning,
    Error,
}

impl From<LogLevelArg> for LogLevel {
    fn from(v: LogLevelArg) -> Self {
        match v {
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Warning => LogLevel::Warning,
            LogLevelArg::Error => LogLevel::Error,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ScrollModeArg {
    Viewport,
    Bottom,
}

impl From<ScrollModeArg> for ScrollMode {
    fn from(v: ScrollModeArg) -> Self {
        match v {
            ScrollModeArg::Viewport => ScrollMode::Viewport,
            ScrollModeArg::Bottom => ScrollMode::Bottom,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Build config ─────────────────────────────────────────────────────
    // The progress callback is attached later, once we know a URL exists.
    let base_config = build_config(&cli, None)?;
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let log_dir = base_config.output_base_dir.join(LOG_DIR_NAME);

    // ── Logging setup ────────────────────────────────────────────────────
    // With the spinner active the console only shows warnings; the log file
    // always gets the configured level.
    let console_level = if cli.quiet {
        "error"
    } else if show_progress && base_config.log_level != LogLevel::Debug {
        "warn"
    } else {
        base_config.log_level.as_filter()
    };
    // Dropping the guard at the end of `main` flushes the log file.
    let _log_guard = init_tracing(&log_dir, console_level, base_config.log_level.as_filter());

    // ── Maintenance modes ────────────────────────────────────────────────
    if cli.check {
        return run_check(&cli, &base_config).map(|()| ExitCode::SUCCESS);
    }
    if cli.cleanup {
        return run_cleanup(&cli, &base_config.output_base_dir).map(|()| ExitCode::SUCCESS);
    }

    // ── Resolve URL ──────────────────────────────────────────────────────
    let url = match cli.url.clone().or_else(|| cli.url_flag.clone()) {
        Some(url) => url,
        None => match prompt_for_url()? {
            Some(url) => url,
            None => {
                eprintln!("No URL given. Pass one as an argument or with --url.");
                return Ok(ExitCode::from(2));
            }
        },
    };

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;

    if !cli.quiet && !cli.json {
        eprintln!("{} {}", bold("Document:"), url);
        eprintln!(
            "{} {}{}",
            bold("Browser: "),
            if config.headless { "headless" } else { "windowed" },
            if config.debug_mode { ", debug mode" } else { "" }
        );
    }

    // ── Run extraction ───────────────────────────────────────────────────
    // On Ctrl-C the extraction future is dropped when `select!` returns,
    // which aborts the browser before the process exits.
    let launcher = ChromeLauncher::new();
    let finished = tokio::select! {
        result = run_detailed(&url, &config, &launcher) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    let Some(result) = finished else {
        warn!("Interrupted by user; browser released");
        eprintln!("\n{} interrupted; browser closed", yellow("⚠"));
        return Ok(ExitCode::from(130));
    };

    match result {
        Ok(output) => {
            if cli.json {
                let json = serde_json::to_string_pretty(&output)
                    .context("Failed to serialise output")?;
                println!("{json}");
            } else if !cli.quiet {
                eprintln!(
                    "{}  {} page(s)  {}ms  →  {}",
                    green("✔"),
                    output.pages,
                    output.stats.total_duration_ms,
                    bold(&output.pdf_path.display().to_string()),
                );
                if output.stats.truncated {
                    eprintln!(
                        "{}  session time limit reached; the PDF may be incomplete",
                        yellow("⚠")
                    );
                }
                eprintln!("   {}", dim(&output.output_dir.display().to_string()));
            } else {
                println!("{}", output.pdf_path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            eprintln!("{}  {}", red("✘"), failure);
            eprintln!(
                "   details in {}",
                dim(&log_dir.display().to_string())
            );
            Err(anyhow::Error::new(failure).context("Extraction failed"))
        }
    }
}

/// Merge defaults, the config file and CLI flags, in that order.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder();
    if let Some(ref path) = cli.config {
        builder = builder
            .json_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?;
    }

    if cli.headless {
        builder = builder.headless(true);
    }
    if cli.debug {
        builder = builder.debug_mode(true).log_level(LogLevel::Debug);
    }
    if let Some(level) = cli.log_level {
        builder = builder.log_level(level.into());
    }
    if let Some(ref dir) = cli.output_dir {
        builder = builder.output_base_dir(dir);
    }
    if let Some(ref chrome) = cli.chrome {
        builder = builder.chrome_executable(chrome);
    }
    if let Some(mode) = cli.scroll_mode {
        builder = builder.scroll_mode(mode.into());
    }
    if let Some(n) = cli.zoom_clicks {
        builder = builder.zoom_clicks(n);
    }
    if let Some(minutes) = cli.session_timeout {
        builder = builder.session_timeout_ms(minutes.saturating_mul(60_000));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Console layer on stderr plus a daily log file under `log_dir`.
/// `RUST_LOG` overrides the console filter.
/// The returned guard must outlive the last log line that should reach the file.
fn init_tracing(log_dir: &Path, console_level: &str, file_level: &str) -> Option<WorkerGuard> {
    let mut guard = None;

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(console_level));
    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(console_filter);

    let file = std::fs::create_dir_all(log_dir)
        .ok()
        .and_then(|_| {
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix(LOG_FILE_SUFFIX)
                .build(log_dir)
                .ok()
        })
        .map(|appender| {
            let (writer, worker) = tracing_appender::non_blocking(appender);
            guard = Some(worker);
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new(file_level))
        });

    tracing_subscriber::registry().with(console).with(file).init();
    guard
}

/// Ask for a URL on stdin. `None` when stdin is not a terminal or closed.
fn prompt_for_url() -> Result<Option<String>> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Ok(None);
    }

    eprintln!("{}", bold("Enter the document URL"));
    eprintln!("{}", dim("e.g. https://www.doc88.com/p-74287148231067.html"));
    let mut lines = stdin.lock().lines();
    loop {
        eprint!("URL: ");
        io::stderr().flush().ok();
        let Some(line) = lines.next() else {
            return Ok(None);
        };
        let url = line.context("Failed to read URL")?.trim().to_string();

        if url.is_empty() {
            eprintln!("{} URL cannot be empty", red("✘"));
            continue;
        }
        if let Err(e) = validate_url(&url) {
            eprintln!("{} {}", red("✘"), e);
            continue;
        }
        if !url.contains("doc88.com") {
            eprintln!(
                "{} reveal heuristics are tuned for doc88.com documents",
                yellow("⚠")
            );
            eprint!("Continue anyway? (y/n): ");
            io::stderr().flush().ok();
            let Some(answer) = lines.next() else {
                return Ok(None);
            };
            if !answer
                .context("Failed to read answer")?
                .trim()
                .eq_ignore_ascii_case("y")
            {
                continue;
            }
        }
        return Ok(Some(url));
    }
}

fn run_check(cli: &Cli, config: &ExtractionConfig) -> Result<()> {
    let missing = check_environment(config);
    let recent = latest_output(&config.output_base_dir);

    if cli.json {
        let report = serde_json::json!({
            "ready": missing.is_empty(),
            "missing": missing,
            "latest": recent,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if missing.is_empty() {
            eprintln!("{}  environment ready", green("✔"));
        }
        for m in &missing {
            eprintln!("{}  {}", red("✘"), m);
        }
        if let Some(recent) = recent {
            eprintln!("   latest session: {}", recent.dir.display());
            match (recent.pdf, recent.pdf_bytes) {
                (Some(pdf), Some(bytes)) => eprintln!("   PDF: {} ({} bytes)", pdf.display(), bytes),
                _ => eprintln!("   {}", yellow("no PDF in the latest session")),
            }
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} capability(ies) missing", missing.len())
    }
}

fn run_cleanup(cli: &Cli, base: &Path) -> Result<()> {
    let report = prune_outputs(base, cli.keep_sessions, cli.keep_logs)
        .with_context(|| format!("Failed to clean {}", base.display()))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !cli.quiet {
        eprintln!(
            "{}  removed {} session(s) and {} log file(s); kept {} and {}",
            green("✔"),
            report.removed_sessions.len(),
            report.removed_logs.len(),
            report.kept_sessions,
            report.kept_logs
        );
        for (path, reason) in &report.failures {
            eprintln!("{}  {}: {}", red("✘"), path.display(), reason);
        }
    }
    Ok(())
}
