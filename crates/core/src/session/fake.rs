//! In-memory session for exercising the broker and the workflow without a
//! browser.
//!
//! Pages are scripted: register what a URL shows with [`FakeSession::on_navigate`],
//! what a text-click changes with [`FakeSession::on_click_text`], and what each
//! reload reveals with [`FakeSession::on_reload`]. Everything the engine does to
//! the session is recorded for assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::session::{BrowserSession, Viewport};

/// One scripted page state.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    /// Body text returned by `body_text`.
    pub body: String,
    /// Visible elements, one entry per element (repeat a selector to model
    /// multiple matching elements).
    pub visible: Vec<String>,
    /// Visible button labels for `click_by_text`.
    pub buttons: Vec<String>,
    /// URL override applied with the page (e.g. a post-click redirect).
    pub url: Option<String>,
}

impl FakePage {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into(), ..Default::default() }
    }

    pub fn visible(mut self, selectors: &[&str]) -> Self {
        self.visible = selectors.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn buttons(mut self, labels: &[&str]) -> Self {
        self.buttons = labels.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn at(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

#[derive(Default)]
struct Inner {
    url: String,
    body: String,
    visible: Vec<String>,
    buttons: Vec<String>,
    nav_pages: HashMap<String, VecDeque<FakePage>>,
    click_effects: HashMap<String, FakePage>,
    reload_effects: VecDeque<FakePage>,
    read_failures: usize,
    screenshot: Vec<u8>,
    fills: HashMap<String, String>,
    nth_fills: HashMap<(String, usize), String>,
    checks: Vec<String>,
    clicks: Vec<String>,
    text_clicks: Vec<String>,
    mouse_clicks: Vec<(f64, f64)>,
    keys: Vec<String>,
    navigations: Vec<String>,
    reloads: usize,
    closed: bool,
}

impl Inner {
    fn apply(&mut self, page: &FakePage) {
        self.body = page.body.clone();
        self.visible = page.visible.clone();
        self.buttons = page.buttons.clone();
        if let Some(url) = &page.url {
            self.url = url.clone();
        }
    }
}

/// Scriptable [`BrowserSession`] double. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct FakeSession {
    inner: Arc<Mutex<Inner>>,
}

// A comma list like "input[type=email], input#email" matches an element if
// any of its parts does.
fn selector_matches(selector: &str, element: &str) -> bool {
    selector.split(',').any(|part| part.trim() == element)
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_navigate(&self, url: &str, page: FakePage) {
        let mut inner = self.inner.lock().unwrap();
        inner.nav_pages.entry(url.to_string()).or_default().push_back(page);
    }

    pub fn on_click_text(&self, needle: &str, page: FakePage) {
        let mut inner = self.inner.lock().unwrap();
        inner.click_effects.insert(needle.to_lowercase(), page);
    }

    pub fn on_reload(&self, page: FakePage) {
        self.inner.lock().unwrap().reload_effects.push_back(page);
    }

    pub fn set_page(&self, page: FakePage) {
        self.inner.lock().unwrap().apply(&page);
    }

    pub fn set_body(&self, body: impl Into<String>) {
        self.inner.lock().unwrap().body = body.into();
    }

    pub fn set_url(&self, url: impl Into<String>) {
        self.inner.lock().unwrap().url = url.into();
    }

    pub fn show(&self, selector: &str) {
        self.inner.lock().unwrap().visible.push(selector.to_string());
    }

    pub fn add_button(&self, label: &str) {
        self.inner.lock().unwrap().buttons.push(label.to_string());
    }

    pub fn set_screenshot(&self, bytes: Vec<u8>) {
        self.inner.lock().unwrap().screenshot = bytes;
    }

    /// Makes the next `n` body reads fail, as a detached frame would.
    pub fn fail_next_reads(&self, n: usize) {
        self.inner.lock().unwrap().read_failures = n;
    }

    pub fn filled(&self, selector: &str) -> Option<String> {
        self.inner.lock().unwrap().fills.get(selector).cloned()
    }

    pub fn filled_nth(&self, selector: &str, index: usize) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .nth_fills
            .get(&(selector.to_string(), index))
            .cloned()
    }

    pub fn nth_fill_count(&self, selector: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .nth_fills
            .keys()
            .filter(|(sel, _)| sel == selector)
            .count()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.inner.lock().unwrap().clicks.clone()
    }

    pub fn text_clicks(&self) -> Vec<String> {
        self.inner.lock().unwrap().text_clicks.clone()
    }

    pub fn mouse_clicks(&self) -> Vec<(f64, f64)> {
        self.inner.lock().unwrap().mouse_clicks.clone()
    }

    pub fn key_presses(&self) -> Vec<String> {
        self.inner.lock().unwrap().keys.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.inner.lock().unwrap().navigations.clone()
    }

    pub fn reload_count(&self) -> usize {
        self.inner.lock().unwrap().reloads
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.navigations.push(url.to_string());
        inner.url = url.to_string();
        let page = inner.nav_pages.get_mut(url).and_then(|queue| {
            if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() }
        });
        if let Some(page) = page {
            inner.apply(&page);
        }
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.reloads += 1;
        if let Some(page) = inner.reload_effects.pop_front() {
            inner.apply(&page);
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.inner.lock().unwrap().url.clone())
    }

    async fn body_text(&self) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        if inner.read_failures > 0 {
            inner.read_failures -= 1;
            return Err(Error::Session("page text unavailable".into()));
        }
        Ok(inner.body.clone())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        Ok(self.count(selector).await? > 0)
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .visible
            .iter()
            .filter(|element| selector_matches(selector, element))
            .count())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let matched = inner
            .visible
            .iter()
            .find(|element| selector_matches(selector, element))
            .cloned()
            .ok_or_else(|| Error::Session(format!("no element for {selector}")))?;
        inner.fills.insert(matched, value.to_string());
        Ok(())
    }

    async fn fill_nth(&self, selector: &str, index: usize, value: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let matches = inner
            .visible
            .iter()
            .filter(|element| selector_matches(selector, element))
            .count();
        if index >= matches {
            return Err(Error::Session(format!("no element {index} for {selector}")));
        }
        inner
            .nth_fills
            .insert((selector.to_string(), index), value.to_string());
        Ok(())
    }

    async fn check(&self, selector: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.visible.iter().any(|element| selector_matches(selector, element)) {
            return Err(Error::Session(format!("no element for {selector}")));
        }
        inner.checks.push(selector.to_string());
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.visible.iter().any(|element| selector_matches(selector, element)) {
            return Err(Error::Session(format!("no element for {selector}")));
        }
        inner.clicks.push(selector.to_string());
        Ok(())
    }

    async fn click_by_text(&self, needle: &str) -> Result<bool> {
        let needle_lower = needle.to_lowercase();
        let mut inner = self.inner.lock().unwrap();
        let hit = inner
            .buttons
            .iter()
            .any(|label| label.to_lowercase().contains(&needle_lower));
        if hit {
            inner.text_clicks.push(needle.to_string());
            if let Some(page) = inner.click_effects.remove(&needle_lower) {
                inner.apply(&page);
            }
        }
        Ok(hit)
    }

    async fn mouse_click(&self, x: f64, y: f64) -> Result<()> {
        self.inner.lock().unwrap().mouse_clicks.push((x, y));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.inner.lock().unwrap().keys.push(key.to_string());
        Ok(())
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        if inner.screenshot.is_empty() {
            // Minimal valid PNG signature so content-type checks have bytes.
            Ok(vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a])
        } else {
            Ok(inner.screenshot.clone())
        }
    }

    fn viewport(&self) -> Viewport {
        Viewport { width: 1280, height: 900 }
    }

    async fn close(&self) -> Result<()> {
        self.inner.lock().unwrap().closed = true;
        Ok(())
    }
}
