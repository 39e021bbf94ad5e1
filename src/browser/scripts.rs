//! Page-context JavaScript used by the Chrome session.
//!
//! Each script lives in its own `.js` file under `scripts/` so editors
//! highlight it, and is embedded at compile time. Every script is a single
//! IIFE expression that returns a JSON-serialisable value.

use crate::config::ControlIntent;

/// `{ height, elements }`: document scroll height and the number of
/// rendered elements with a non-empty box.
pub const MEASURE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/scripts/measure.js"));

/// Scrolls one viewport down; returns whether the position changed.
pub const SCROLL_VIEWPORT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/scripts/scroll_viewport.js"
));

/// Scrolls to the end of the document; returns whether the position changed.
pub const SCROLL_BOTTOM: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/scripts/scroll_bottom.js"
));

/// Main-document HTTP status, `0` when unknown, `-1` on a Chrome error page.
pub const NAV_STATUS: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/scripts/nav_status.js"
));

const CLICK_CONTROL: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/scripts/click_control.js"
));

const INTENT_PLACEHOLDER: &str = "__INTENT__";

/// Script that clicks the first visible control matching `intent` and
/// returns whether it found one.
pub fn click_control(intent: &ControlIntent) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(intent)?;
    Ok(CLICK_CONTROL.replacen(INTENT_PLACEHOLDER, &json, 1))
}
