//! The controllable browser session seam.
//!
//! The workflow and the broker only ever talk to [`BrowserSession`]; the
//! production implementation drives headless Chrome over CDP
//! ([`chromium::ChromiumSession`]) and tests script an in-memory
//! [`fake::FakeSession`].

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

pub mod chromium;
pub mod fake;

pub use chromium::{ChromiumSession, SessionOptions};
pub use fake::{FakePage, FakeSession};

/// Viewport dimensions reported by the broker's `/state` response.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// One live, controllable page.
///
/// Locator arguments are CSS selectors (comma lists allowed). Operations that
/// act on an element fail when no matching element exists; `is_visible`
/// answers `false` instead, so it is safe to call speculatively.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn reload(&self) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Full text of the document body. Fails while navigation is in flight;
    /// callers that poll treat that as "state unknown" and read again.
    async fn body_text(&self) -> Result<String>;

    /// Whether the first element matching `selector` is visible.
    async fn is_visible(&self, selector: &str) -> Result<bool>;

    /// Number of visible elements matching `selector`.
    async fn count(&self, selector: &str) -> Result<usize>;

    /// Fills the first visible element matching `selector`.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Fills the `index`-th visible element matching `selector`.
    async fn fill_nth(&self, selector: &str, index: usize, value: &str) -> Result<()>;

    /// Checks the first checkbox matching `selector` (no-op when already
    /// checked).
    async fn check(&self, selector: &str) -> Result<()>;

    /// Clicks the first element matching `selector`.
    async fn click(&self, selector: &str) -> Result<()>;

    /// Clicks the first visible button whose text contains `needle`
    /// (case-insensitive). Answers whether anything was clicked; an absent
    /// button is not an error.
    async fn click_by_text(&self, needle: &str) -> Result<bool>;

    /// Raw coordinate click, forwarded from the broker.
    async fn mouse_click(&self, x: f64, y: f64) -> Result<()>;

    /// Raw key press (e.g. "Enter"), forwarded from the broker.
    async fn press_key(&self, key: &str) -> Result<()>;

    /// Viewport-only PNG capture.
    async fn screenshot_png(&self) -> Result<Vec<u8>>;

    fn viewport(&self) -> Viewport;

    /// Tears the session down. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}
