//! # chrome-probe
//!
//! Locate a Chrome or Chromium executable so that CDP clients such as
//! `chromiumoxide` can launch it without the user having to pass a path.
//!
//! ## How it works
//!
//! [`locate_chrome`] checks, in order (first match wins):
//!
//! 1. `CHROME_PATH`: an explicit executable path.
//! 2. Every directory on `PATH`, for the usual executable names
//!    (`google-chrome`, `chromium`, `chromium-browser`, `chrome`, …).
//! 3. Well-known per-platform install locations.
//! 4. The Playwright browser cache (`~/.cache/ms-playwright/chromium-*`),
//!    which is where `playwright install chromium` puts its build.
//!
//! The first successful lookup is memoised for the process lifetime.
//!
//! ```rust,no_run
//! match chrome_probe::locate_chrome() {
//!     Ok(path) => println!("using {}", path.display()),
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```
//!
//! ## Environment variable overrides
//!
//! - `CHROME_PATH`: path to a Chrome/Chromium executable; skips the search.
//! - `PLAYWRIGHT_BROWSERS_PATH`: overrides the Playwright cache root.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

/// Environment variable holding an explicit browser executable path.
pub const CHROME_PATH_ENV: &str = "CHROME_PATH";

/// Environment variable Playwright uses to relocate its browser cache.
pub const PLAYWRIGHT_BROWSERS_ENV: &str = "PLAYWRIGHT_BROWSERS_PATH";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by chrome-probe lookups.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// `CHROME_PATH` is set but does not name an existing file.
    #[error("CHROME_PATH '{path}' does not exist")]
    OverrideMissing { path: PathBuf },

    /// Nothing was found in any of the searched locations.
    #[error(
        "No Chrome/Chromium executable found (searched {searched} locations).\n\
Install Chrome or Chromium, or set CHROME_PATH=/path/to/chrome."
    )]
    NotFound { searched: usize },
}

// ── Internal: platform metadata ──────────────────────────────────────────────

/// Executable names searched on `PATH`.
fn executable_names() -> &'static [&'static str] {
    if cfg!(windows) {
        &["chrome.exe", "msedge.exe", "chromium.exe"]
    } else {
        &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "chrome",
            "headless_shell",
        ]
    }
}

/// Install locations that are not necessarily on `PATH`.
fn well_known_locations() -> Vec<PathBuf> {
    let mut out = Vec::new();
    match std::env::consts::OS {
        "macos" => {
            out.push(PathBuf::from(
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            ));
            out.push(PathBuf::from(
                "/Applications/Chromium.app/Contents/MacOS/Chromium",
            ));
            if let Some(home) = dirs::home_dir() {
                out.push(home.join(
                    "Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                ));
            }
        }
        "windows" => {
            for var in ["ProgramFiles", "ProgramFiles(x86)", "LocalAppData"] {
                if let Ok(base) = std::env::var(var) {
                    out.push(
                        PathBuf::from(base).join("Google\\Chrome\\Application\\chrome.exe"),
                    );
                }
            }
        }
        _ => {
            out.push(PathBuf::from("/usr/bin/google-chrome"));
            out.push(PathBuf::from("/usr/bin/chromium"));
            out.push(PathBuf::from("/usr/bin/chromium-browser"));
            out.push(PathBuf::from("/snap/bin/chromium"));
            out.push(PathBuf::from("/opt/google/chrome/chrome"));
        }
    }
    out
}

/// Relative path of the browser binary inside a Playwright `chromium-*` dir.
fn playwright_binary() -> &'static str {
    match std::env::consts::OS {
        "macos" => "chrome-mac/Chromium.app/Contents/MacOS/Chromium",
        "windows" => "chrome-win\\chrome.exe",
        _ => "chrome-linux/chrome",
    }
}

// ── Cache directory resolution ───────────────────────────────────────────────

/// Returns the Playwright browser cache root.
///
/// Default locations:
/// - **macOS**: `~/Library/Caches/ms-playwright/`
/// - **Linux**: `~/.cache/ms-playwright/`
/// - **Windows**: `%LOCALAPPDATA%\ms-playwright\`
///
/// Override by setting `PLAYWRIGHT_BROWSERS_PATH`.
pub fn playwright_cache_dir() -> PathBuf {
    if let Ok(override_dir) = std::env::var(PLAYWRIGHT_BROWSERS_ENV) {
        return PathBuf::from(override_dir);
    }

    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);

    base.join("ms-playwright")
}

/// Every `chromium-<rev>` build in the Playwright cache, newest revision first.
fn playwright_candidates(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut builds: Vec<(u64, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            let rev = name.strip_prefix("chromium-")?.parse::<u64>().ok()?;
            Some((rev, e.path().join(playwright_binary())))
        })
        .collect();
    builds.sort_by(|a, b| b.0.cmp(&a.0));
    builds.into_iter().map(|(_, p)| p).collect()
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Returns `true` when a browser executable can be found.
pub fn is_chrome_available() -> bool {
    locate_chrome().is_ok()
}

/// Finds a Chrome/Chromium executable.
///
/// # Thread safety
///
/// Safe to call from multiple threads; the search result is cached after the
/// first success.
pub fn locate_chrome() -> Result<PathBuf, ProbeError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let path = search()?;
    let _ = RESOLVED_PATH.set(path.clone());
    Ok(path)
}

/// Lists every location [`locate_chrome`] would inspect, in search order.
///
/// Useful for diagnostics output when nothing is found.
pub fn candidate_paths() -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            for name in executable_names() {
                out.push(dir.join(name));
            }
        }
    }
    out.extend(well_known_locations());
    out.extend(playwright_candidates(&playwright_cache_dir()));
    out
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn search() -> Result<PathBuf, ProbeError> {
    // 1. Environment variable override. Unlike the other sources a stale
    //    override is an error, not a fall-through.
    if let Ok(env_path) = std::env::var(CHROME_PATH_ENV) {
        if !env_path.is_empty() {
            let p = PathBuf::from(env_path);
            if is_executable_file(&p) {
                return Ok(p);
            }
            return Err(ProbeError::OverrideMissing { path: p });
        }
    }

    // 2-4. PATH, install locations, Playwright cache.
    let candidates = candidate_paths();
    let searched = candidates.len();
    candidates
        .into_iter()
        .find(|p| is_executable_file(p))
        .ok_or(ProbeError::NotFound { searched })
}

fn is_executable_file(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executable_names_nonempty() {
        assert!(!executable_names().is_empty());
        assert!(!playwright_binary().is_empty());
    }

    #[test]
    fn playwright_dir_override_via_env() {
        std::env::set_var(PLAYWRIGHT_BROWSERS_ENV, "/tmp/test_chrome_probe_override");
        let d = playwright_cache_dir();
        std::env::remove_var(PLAYWRIGHT_BROWSERS_ENV);
        assert_eq!(d, PathBuf::from("/tmp/test_chrome_probe_override"));
    }

    #[test]
    fn playwright_builds_sorted_newest_first() {
        let root = std::env::temp_dir().join(format!("chrome-probe-{}", std::process::id()));
        for rev in ["chromium-1000", "chromium-1097", "firefox-1400", "chromium-abc"] {
            std::fs::create_dir_all(root.join(rev)).unwrap();
        }
        let found = playwright_candidates(&root);
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(found.len(), 2);
        assert!(found[0].starts_with(root.join("chromium-1097")));
        assert!(found[1].starts_with(root.join("chromium-1000")));
    }

    #[test]
    fn directories_are_not_executables() {
        assert!(!is_executable_file(&std::env::temp_dir()));
        assert!(!is_executable_file(Path::new("/definitely/not/here/chrome")));
    }

    #[test]
    fn not_found_message_mentions_override() {
        let e = ProbeError::NotFound { searched: 12 };
        let msg = e.to_string();
        assert!(msg.contains("12 locations"));
        assert!(msg.contains("CHROME_PATH"));
    }
}
