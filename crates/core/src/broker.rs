//! Browser control broker: a narrow HTTP facade over one live session.
//!
//! When a human-verification gate blocks the workflow, a human (or an external
//! UI) needs just enough remote control to clear it: read the state, see the
//! page, click a coordinate, press a key, and poke the two named convenience
//! buttons. The surface is a deliberate allow-list; nothing here evaluates
//! scripts or exposes the session wholesale.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::gate;
use crate::session::BrowserSession;

/// How many sequential ports to try when the requested one is taken.
pub const PORT_PROBE_ATTEMPTS: u16 = 20;

/// Credential input probe for the heuristic "form" state.
const EMAIL_INPUT: &str = "input[type=email], input[name=email], input#email";

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Requested port; 0 lets the OS assign one.
    pub port: u16,
    /// Gate re-read cadence for [`Broker::ensure_human`].
    pub poll_interval: Duration,
    /// Hard ceiling after which `ensure_human` returns control regardless.
    pub wait_ceiling: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            poll_interval: Duration::from_millis(1500),
            wait_ceiling: Duration::from_secs(10 * 60),
        }
    }
}

impl BrokerConfig {
    pub fn with_port(port: u16) -> Self {
        Self { port, ..Default::default() }
    }
}

#[derive(Clone)]
struct AppState {
    session: Arc<dyn BrowserSession>,
}

/// A running broker bound to one session.
///
/// At most one broker may be active per session; starting a second one for
/// the same session is a caller error. Callers that already hold a running
/// broker reuse it for [`Broker::ensure_human`] instead of binding again.
pub struct Broker {
    url: String,
    session: Arc<dyn BrowserSession>,
    config: BrokerConfig,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Broker {
    /// Binds per the port policy (exact port, 20-port upward probe, or OS
    /// pick for 0) and starts serving.
    pub async fn start(session: Arc<dyn BrowserSession>, config: BrokerConfig) -> Result<Self> {
        let listener = bind_with_probe(config.port).await?;
        let port = listener.local_addr()?.port();
        let url = format!("http://127.0.0.1:{port}");

        let app = Router::new()
            .route("/state", get(get_state))
            .route("/screenshot", get(get_screenshot))
            .route("/click", post(post_click))
            .route("/press", post(post_press))
            .route("/begin", post(post_begin))
            .route("/confirm", post(post_confirm))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(AppState { session: Arc::clone(&session) });

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        info!(target = "spaceup", %url, "broker listening");
        Ok(Self { url, session, config, shutdown: Some(shutdown_tx), task })
    }

    /// Resolved base URL, e.g. `http://127.0.0.1:45111`.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Blocks until the human-verification gate clears or the ceiling
    /// expires. Answers whether the gate was observed cleared; on `false`
    /// the caller re-checks the page itself rather than assuming success.
    pub async fn ensure_human(&self) -> bool {
        ensure_human(
            self.session.as_ref(),
            self.config.poll_interval,
            self.config.wait_ceiling,
        )
        .await
    }

    /// Stops the listener. Idempotent with drop; called on every workflow
    /// exit path so no port leaks past a run.
    pub async fn close(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Polling wait for the human gate to clear: re-reads the page at
/// `poll_interval` until the gate phrase is gone or `ceiling` elapses.
/// A failed page read counts as "gate not showing" so a mid-navigation
/// page cannot wedge the wait.
pub async fn ensure_human(
    session: &dyn BrowserSession,
    poll_interval: Duration,
    ceiling: Duration,
) -> bool {
    let started = Instant::now();
    loop {
        let text = session.body_text().await.unwrap_or_default();
        if !gate::is_human_gate(&text) {
            return true;
        }
        if started.elapsed() >= ceiling {
            debug!(target = "spaceup", "human-gate wait ceiling expired");
            return false;
        }
        tokio::time::sleep(poll_interval).await;
    }
}

async fn bind_with_probe(port: u16) -> Result<TcpListener> {
    if port == 0 {
        return Ok(TcpListener::bind(("127.0.0.1", 0)).await?);
    }
    for offset in 0..PORT_PROBE_ATTEMPTS {
        let Some(candidate) = port.checked_add(offset) else { break };
        match TcpListener::bind(("127.0.0.1", candidate)).await {
            Ok(listener) => return Ok(listener),
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Err(Error::PortExhausted { start: port })
}

fn internal_error(err: impl std::fmt::Display) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": err.to_string() }))).into_response()
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

async fn get_state(State(app): State<AppState>) -> Response {
    // Computed fresh on every call; a failed read is "unknown", never a 500.
    let text = app.session.body_text().await.unwrap_or_default();
    let state = if gate::is_human_gate(&text) {
        "captcha"
    } else if app.session.is_visible(EMAIL_INPUT).await.unwrap_or(false) {
        "form"
    } else {
        "unknown"
    };
    Json(json!({ "state": state, "viewport": app.session.viewport() })).into_response()
}

async fn get_screenshot(State(app): State<AppState>) -> Response {
    match app.session.screenshot_png().await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn post_click(State(app): State<AppState>, body: Bytes) -> Response {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return bad_request("x,y required");
    };
    let (Some(x), Some(y)) = (value["x"].as_f64(), value["y"].as_f64()) else {
        return bad_request("x,y required");
    };
    match app.session.mouse_click(x, y).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn post_press(State(app): State<AppState>, body: Bytes) -> Response {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return bad_request("key required");
    };
    let Some(key) = value["key"].as_str().filter(|key| !key.is_empty()) else {
        return bad_request("key required");
    };
    match app.session.press_key(key).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn post_begin(State(app): State<AppState>) -> Response {
    named_button(&app, "begin").await
}

async fn post_confirm(State(app): State<AppState>) -> Response {
    named_button(&app, "confirm").await
}

// Best-effort: an absent button is success, only a session failure is a 500.
async fn named_button(app: &AppState, needle: &str) -> Response {
    match app.session.click_by_text(needle).await {
        Ok(_) => Json(json!({ "ok": true })).into_response(),
        Err(err) => internal_error(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FakeSession;

    #[tokio::test]
    async fn os_assigned_port_reports_resolved_url() {
        let session = Arc::new(FakeSession::new());
        let broker = Broker::start(session, BrokerConfig::default()).await.unwrap();
        let url = broker.url().to_string();
        assert!(url.starts_with("http://127.0.0.1:"));
        let port: u16 = url.rsplit(':').next().unwrap().parse().unwrap();
        assert_ne!(port, 0);
        broker.close().await;
    }

    #[tokio::test]
    async fn probe_gives_up_after_twenty_ports() {
        // Occupy a contiguous range so the probe has nowhere to land.
        let first = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let base = first.local_addr().unwrap().port();
        let mut held = vec![first];
        for offset in 1..PORT_PROBE_ATTEMPTS {
            let Some(candidate) = base.checked_add(offset) else { break };
            if let Ok(listener) = TcpListener::bind(("127.0.0.1", candidate)).await {
                held.push(listener);
            }
            // A bind failure means someone else owns the port, which is just
            // as blocked from the probe's point of view.
        }

        let err = bind_with_probe(base).await.unwrap_err();
        assert!(matches!(err, Error::PortExhausted { start } if start == base));
        drop(held);
    }

    #[tokio::test]
    async fn ensure_human_tolerates_read_failures() {
        let session = FakeSession::new();
        session.set_body("Let's confirm you are human");
        session.fail_next_reads(1);
        // First read fails and is treated as cleared rather than an error.
        let cleared = ensure_human(
            &session,
            Duration::from_millis(5),
            Duration::from_millis(50),
        )
        .await;
        assert!(cleared);
    }

    #[tokio::test]
    async fn ensure_human_respects_ceiling() {
        let session = FakeSession::new();
        session.set_body("Let's confirm you are human");
        let cleared = ensure_human(
            &session,
            Duration::from_millis(5),
            Duration::from_millis(40),
        )
        .await;
        assert!(!cleared);
    }
}
