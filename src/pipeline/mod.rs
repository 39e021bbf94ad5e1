//! Pipeline stages for web-document extraction.
//!
//! Each submodule owns one step; the orchestrator in [`crate::extract`]
//! wires them together around a single browser session.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌──────────── capture loop ────────────┐
//! session ──▶ reveal ──▶ stability ──▶ screenshot ──▶ dedup ──▶ assemble
//!            └──────◀──── until no progress ◀───────┘          (lopdf)
//! ```
//!
//! 1. [`capture`]: the Init/Revealing/…/Done state machine
//! 2. [`stability`]: poll page measurements until the trailing window agrees
//! 3. [`fingerprint`]: 256-bit difference hash of each screenshot
//! 4. [`dedup`]: reject captures too close to an accepted frame
//! 5. [`assemble`]: one PDF page per accepted frame, inside
//!    `spawn_blocking` (image decoding and deflate are CPU-bound)

pub mod assemble;
pub mod capture;
pub mod dedup;
pub mod fingerprint;
pub mod stability;
