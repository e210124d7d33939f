//! Headless-Chrome implementation of [`BrowserSession`] over CDP.
//!
//! DOM interaction goes through small JavaScript probes rather than CDP's
//! element handles: the probes filter for visibility the same way on every
//! call, and selector escaping happens once via JSON string encoding.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{Error, Result};
use crate::session::{BrowserSession, Viewport};

const DEFAULT_VIEWPORT: (u32, u32) = (1280, 900);
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Launch options for a Chrome-backed session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub headless: bool,
    /// Persistent profile directory, reused across runs so cookies and the
    /// logged-in state survive.
    pub profile_dir: PathBuf,
}

impl SessionOptions {
    pub fn new(profile_dir: PathBuf) -> Self {
        Self { headless: true, profile_dir }
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }
}

/// One Chrome page plus the background task pumping its CDP event stream.
pub struct ChromiumSession {
    browser: tokio::sync::Mutex<Option<Browser>>,
    page: Page,
    handler_task: JoinHandle<()>,
    viewport: Viewport,
}

fn cdp_err(err: impl std::fmt::Display) -> Error {
    Error::Session(err.to_string())
}

impl ChromiumSession {
    pub async fn launch(options: SessionOptions) -> Result<Self> {
        std::fs::create_dir_all(&options.profile_dir)?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&options.profile_dir)
            .window_size(DEFAULT_VIEWPORT.0, DEFAULT_VIEWPORT.1)
            .args(vec![
                "--disable-blink-features=AutomationControlled",
                "--no-sandbox",
                "--disable-features=IsolateOrigins,site-per-process",
            ]);
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(Error::Session)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(cdp_err)?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(cdp_err)?;
        debug!(target = "spaceup", headless = options.headless, "browser session launched");

        Ok(Self {
            browser: tokio::sync::Mutex::new(Some(browser)),
            page,
            handler_task,
            viewport: Viewport { width: DEFAULT_VIEWPORT.0, height: DEFAULT_VIEWPORT.1 },
        })
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        let result = self.page.evaluate(script).await.map_err(cdp_err)?;
        result.into_value::<T>().map_err(cdp_err)
    }
}

// Shared visibility predicate for the JS probes below.
const VISIBLE_FILTER: &str = "el => { const r = el.getBoundingClientRect(); \
    const s = window.getComputedStyle(el); \
    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; }";

fn visible_matches(selector: &str) -> String {
    let sel = serde_json::Value::String(selector.to_string());
    format!(
        "Array.from(document.querySelectorAll({sel})).filter({VISIBLE_FILTER})"
    )
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        let nav = async {
            self.page.goto(url).await.map_err(cdp_err)?;
            self.page.wait_for_navigation().await.map_err(cdp_err)?;
            Ok::<_, Error>(())
        };
        match tokio::time::timeout(NAVIGATION_TIMEOUT, nav).await {
            Ok(result) => result.map_err(|e| Error::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(Error::Navigation {
                url: url.to_string(),
                message: "timed out".into(),
            }),
        }
    }

    async fn reload(&self) -> Result<()> {
        self.page.reload().await.map_err(cdp_err)?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await.map_err(cdp_err)?.unwrap_or_default())
    }

    async fn body_text(&self) -> Result<String> {
        self.eval("document.body ? document.body.innerText : ''".to_string())
            .await
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        Ok(self.count(selector).await? > 0)
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        self.eval(format!("{}.length", visible_matches(selector))).await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.fill_nth(selector, 0, value).await
    }

    async fn fill_nth(&self, selector: &str, index: usize, value: &str) -> Result<()> {
        let val = serde_json::Value::String(value.to_string());
        let script = format!(
            "(() => {{ const el = {matches}[{index}]; if (!el) return false; \
             el.focus(); \
             const proto = el instanceof HTMLTextAreaElement \
                 ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype; \
             Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, {val}); \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return true; }})()",
            matches = visible_matches(selector),
        );
        if self.eval::<bool>(script).await? {
            Ok(())
        } else {
            Err(Error::Session(format!("no visible element for {selector}")))
        }
    }

    async fn check(&self, selector: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const el = {matches}[0]; if (!el) return false; \
             if (!el.checked) el.click(); return true; }})()",
            matches = visible_matches(selector),
        );
        if self.eval::<bool>(script).await? {
            Ok(())
        } else {
            Err(Error::Session(format!("no visible element for {selector}")))
        }
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const el = {matches}[0]; if (!el) return false; \
             el.click(); return true; }})()",
            matches = visible_matches(selector),
        );
        if self.eval::<bool>(script).await? {
            Ok(())
        } else {
            Err(Error::Session(format!("no visible element for {selector}")))
        }
    }

    async fn click_by_text(&self, needle: &str) -> Result<bool> {
        let needle = serde_json::Value::String(needle.to_lowercase());
        let script = format!(
            "(() => {{ const vis = {matches}; \
             const el = vis.find(b => ((b.innerText || b.value || '')\
                 .toLowerCase().includes({needle}))); \
             if (!el) return false; el.click(); return true; }})()",
            matches = visible_matches("button, input[type=submit], [role=button]"),
        );
        self.eval(script).await
    }

    async fn mouse_click(&self, x: f64, y: f64) -> Result<()> {
        for kind in [DispatchMouseEventType::MousePressed, DispatchMouseEventType::MouseReleased] {
            let params = DispatchMouseEventParams::builder()
                .r#type(kind)
                .x(x)
                .y(y)
                .button(MouseButton::Left)
                .click_count(1)
                .build()
                .map_err(Error::Session)?;
            self.page.execute(params).await.map_err(cdp_err)?;
        }
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let text = match key {
            "Enter" => Some("\r".to_string()),
            k if k.chars().count() == 1 => Some(k.to_string()),
            _ => None,
        };
        for down in [true, false] {
            let kind = if down { DispatchKeyEventType::KeyDown } else { DispatchKeyEventType::KeyUp };
            let mut builder = DispatchKeyEventParams::builder().r#type(kind).key(key);
            if down {
                if let Some(text) = &text {
                    builder = builder.text(text.clone());
                }
            }
            let params = builder.build().map_err(Error::Session)?;
            self.page.execute(params).await.map_err(cdp_err)?;
        }
        Ok(())
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();
        self.page.screenshot(params).await.map_err(cdp_err)
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    async fn close(&self) -> Result<()> {
        if let Some(mut browser) = self.browser.lock().await.take() {
            browser.close().await.map_err(cdp_err)?;
            let _ = browser.wait().await;
            self.handler_task.abort();
        }
        Ok(())
    }
}
