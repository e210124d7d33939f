//! End-to-end tests of the broker HTTP surface against a scripted session.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use spaceup_core::broker::{Broker, BrokerConfig};
use spaceup_core::session::FakeSession;

const HUMAN_GATE_TEXT: &str = "Let's confirm you are human";

fn short_config() -> BrokerConfig {
    BrokerConfig {
        port: 0,
        poll_interval: Duration::from_millis(10),
        wait_ceiling: Duration::from_secs(5),
    }
}

async fn start(session: &FakeSession) -> Broker {
    Broker::start(Arc::new(session.clone()), short_config())
        .await
        .expect("broker should bind an OS-assigned port")
}

#[tokio::test]
async fn binds_requested_port_when_free() {
    let probe = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    let session = FakeSession::new();
    let broker = Broker::start(Arc::new(session), BrokerConfig::with_port(port))
        .await
        .unwrap();
    assert_eq!(broker.url(), format!("http://127.0.0.1:{port}"));
    broker.close().await;
}

#[tokio::test]
async fn requested_port_in_use_probes_upward() {
    let holder = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let taken = holder.local_addr().unwrap().port();

    let session = FakeSession::new();
    let broker = Broker::start(Arc::new(session), BrokerConfig::with_port(taken))
        .await
        .unwrap();
    let bound: u16 = broker.url().rsplit(':').next().unwrap().parse().unwrap();
    assert!(bound > taken && bound < taken.saturating_add(20), "bound {bound}, requested {taken}");
    broker.close().await;
}

#[tokio::test]
async fn state_reflects_the_page_freshly_each_call() {
    let session = FakeSession::new();
    session.set_body(HUMAN_GATE_TEXT);
    let broker = start(&session).await;
    let client = reqwest::Client::new();

    let state: Value = client
        .get(format!("{}/state", broker.url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(state["state"], "captcha");
    assert_eq!(state["viewport"]["width"], 1280);
    assert_eq!(state["viewport"]["height"], 900);

    session.set_body("Create your account");
    session.show("input[type=email]");
    let state: Value = client
        .get(format!("{}/state", broker.url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(state["state"], "form");

    // Page replaced wholesale: no gate text, no credential input.
    session.set_page(spaceup_core::session::fake::FakePage::new("something else"));
    let state: Value = client
        .get(format!("{}/state", broker.url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(state["state"], "unknown");

    broker.close().await;
}

#[tokio::test]
async fn state_survives_a_failed_page_read() {
    let session = FakeSession::new();
    session.fail_next_reads(1);
    let broker = start(&session).await;

    let response = reqwest::get(format!("{}/state", broker.url())).await.unwrap();
    assert_eq!(response.status(), 200);
    let state: Value = response.json().await.unwrap();
    assert_eq!(state["state"], "unknown");

    broker.close().await;
}

#[tokio::test]
async fn screenshot_is_png_bytes() {
    let session = FakeSession::new();
    session.set_screenshot(vec![0x89, b'P', b'N', b'G', 1, 2, 3]);
    let broker = start(&session).await;

    let response = reqwest::get(format!("{}/screenshot", broker.url())).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(response.bytes().await.unwrap().as_ref(), &[0x89, b'P', b'N', b'G', 1, 2, 3]);

    broker.close().await;
}

#[tokio::test]
async fn click_validates_coordinate_types() {
    let session = FakeSession::new();
    let broker = start(&session).await;
    let client = reqwest::Client::new();

    let bad = client
        .post(format!("{}/click", broker.url()))
        .json(&json!({ "x": "12", "y": 34 }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), 400);
    let body: Value = bad.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("x,y"));
    assert!(session.mouse_clicks().is_empty(), "rejected input must not reach the session");

    let ok = client
        .post(format!("{}/click", broker.url()))
        .json(&json!({ "x": 12.5, "y": 34 }))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), 200);
    let body: Value = ok.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(session.mouse_clicks(), vec![(12.5, 34.0)]);

    broker.close().await;
}

#[tokio::test]
async fn press_requires_a_key() {
    let session = FakeSession::new();
    let broker = start(&session).await;
    let client = reqwest::Client::new();

    let bad = client
        .post(format!("{}/press", broker.url()))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), 400);

    let ok = client
        .post(format!("{}/press", broker.url()))
        .json(&json!({ "key": "Enter" }))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), 200);
    assert_eq!(session.key_presses(), vec!["Enter".to_string()]);

    broker.close().await;
}

#[tokio::test]
async fn begin_and_confirm_are_best_effort() {
    let session = FakeSession::new();
    let broker = start(&session).await;
    let client = reqwest::Client::new();

    // No button anywhere: still ok.
    let response = client.post(format!("{}/begin", broker.url())).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(session.text_clicks().is_empty());

    session.add_button("Confirm");
    let response = client.post(format!("{}/confirm", broker.url())).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(session.text_clicks(), vec!["confirm".to_string()]);

    broker.close().await;
}

#[tokio::test]
async fn preflight_is_answered_with_cors_headers() {
    let session = FakeSession::new();
    let broker = start(&session).await;
    let client = reqwest::Client::new();

    let response = client
        .request(reqwest::Method::OPTIONS, format!("{}/state", broker.url()))
        .header("Origin", "http://localhost:3000")
        .header("Access-Control-Request-Method", "GET")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    broker.close().await;
}

#[tokio::test]
async fn ensure_human_returns_soon_after_the_gate_clears() {
    let session = FakeSession::new();
    session.set_body(HUMAN_GATE_TEXT);
    let broker = start(&session).await;

    // A human clears the challenge while the workflow is blocked.
    let clearer = {
        let session = session.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            session.set_body("Create your account");
        })
    };

    let started = std::time::Instant::now();
    let cleared = broker.ensure_human().await;
    clearer.await.unwrap();

    assert!(cleared);
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(50), "returned before the gate cleared");
    assert!(waited < Duration::from_secs(2), "did not notice the gate clearing promptly");

    broker.close().await;
}
