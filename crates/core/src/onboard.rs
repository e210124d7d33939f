//! The onboarding state machine.
//!
//! Sequences one workflow run end to end: navigate to the signup page, fill
//! and submit the form, resolve whatever gates appear (human challenge via
//! the broker, email verification via bounded reloads, exposed-password via
//! a synthesized replacement), log in, duplicate the source Space through a
//! deep link, watch the URL for the new repo id, poll the derived endpoint
//! until it is reachable, and append it to the registry.
//!
//! Phases execute strictly in order; each either succeeds or fails fatally
//! with a message naming the phase. The session and the broker are torn down
//! on every exit path.

use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use rand::RngCore;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::broker::{Broker, BrokerConfig};
use crate::error::{Error, Result};
use crate::fallback::{Action, Candidate, FallbackOutcome, resolve_and_act};
use crate::gate;
use crate::registry::SpaceRegistry;
use crate::session::BrowserSession;
use crate::store::{BrokerRecord, CredentialRecord, KvStore, now_ts};

/// Suffix appended to the hostname of every duplicated Space.
const SPACE_HOST_SUFFIX: &str = "hf.space";

/// At most this many password inputs receive the replacement password
/// (a "new password" + "confirm password" pair).
const PASSWORD_PAIR_CAP: usize = 2;

const PASSWORD_INPUTS: &str = "input[type=password]";

static REPO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/spaces/([^/?#]+)/([^/?#]+)").unwrap());

#[derive(Debug, Clone)]
pub struct OnboardConfig {
    pub email: String,
    pub password: String,
    /// Display name for the duplicated Space.
    pub space_name: String,
    /// Hardware tier requested through the deep link.
    pub hardware: String,
    /// Source template Space, `owner/name`.
    pub source_space: String,
    pub base_url: String,
    pub broker: BrokerConfig,
    /// Ceiling for readiness polling of the derived endpoint.
    pub readiness_timeout: Duration,
    pub readiness_interval: Duration,
    /// Email-verification reload budget: attempts x interval.
    pub verify_attempts: u32,
    pub verify_interval: Duration,
    /// Budget for the repo id to appear in the navigated URL.
    pub repo_id_timeout: Duration,
    pub repo_id_interval: Duration,
    /// Pause after navigations and submissions, letting the page settle.
    pub settle: Duration,
}

impl Default for OnboardConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            password: String::new(),
            space_name: "DSU-Worker".into(),
            hardware: "cpu-basic".into(),
            source_space: "VSTOPIA/DSU".into(),
            base_url: "https://huggingface.co".into(),
            broker: BrokerConfig::default(),
            readiness_timeout: Duration::from_secs(180),
            readiness_interval: Duration::from_secs(3),
            verify_attempts: 60,
            verify_interval: Duration::from_secs(5),
            repo_id_timeout: Duration::from_secs(120),
            repo_id_interval: Duration::from_secs(1),
            settle: Duration::from_millis(800),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Done,
    Error,
}

/// Terminal record of one workflow run, produced exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub status: WorkflowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker_url: Option<String>,
    pub message: String,
}

/// Reachability probe for the freshly provisioned endpoint. Injected so the
/// workflow is testable without outbound network access.
#[async_trait]
pub trait EndpointProbe: Send + Sync {
    /// Whether a plain GET got any response at all; non-2xx still counts as
    /// up, the goal is reachability rather than application health.
    async fn is_up(&self, url: &str) -> bool;
}

pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EndpointProbe for HttpProbe {
    async fn is_up(&self, url: &str) -> bool {
        self.client
            .get(url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok()
    }
}

/// Drives one onboarding run against one browser session.
pub struct Onboarder {
    session: Arc<dyn BrowserSession>,
    config: OnboardConfig,
    store: Arc<dyn KvStore>,
    registry: Arc<SpaceRegistry>,
    probe: Arc<dyn EndpointProbe>,
}

impl Onboarder {
    pub fn new(
        session: Arc<dyn BrowserSession>,
        config: OnboardConfig,
        store: Arc<dyn KvStore>,
        registry: Arc<SpaceRegistry>,
    ) -> Self {
        Self {
            session,
            config,
            store,
            registry,
            probe: Arc::new(HttpProbe::new()),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn EndpointProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Runs the workflow to its terminal result. The session is closed and
    /// the broker listener shut down on every path out of here.
    pub async fn run(self) -> WorkflowResult {
        let broker = match Broker::start(
            Arc::clone(&self.session),
            self.config.broker.clone(),
        )
        .await
        {
            Ok(broker) => broker,
            Err(err) => {
                let _ = self.session.close().await;
                return WorkflowResult {
                    status: WorkflowStatus::Error,
                    resource_endpoint: None,
                    broker_url: None,
                    message: err.to_string(),
                };
            }
        };
        let broker_url = broker.url().to_string();

        let record = BrokerRecord { url: broker_url.clone() };
        if let Ok(json) = serde_json::to_string(&record) {
            if let Err(err) = self.store.write("broker", &json) {
                warn!(target = "spaceup", error = %err, "could not record broker url");
            }
        }

        let outcome = self.drive(&broker).await;

        let _ = self.session.close().await;
        broker.close().await;

        match outcome {
            Ok(endpoint) => WorkflowResult {
                status: WorkflowStatus::Done,
                resource_endpoint: Some(endpoint),
                broker_url: Some(broker_url),
                message: "onboarding complete".into(),
            },
            Err(err) => WorkflowResult {
                status: WorkflowStatus::Error,
                resource_endpoint: None,
                broker_url: Some(broker_url),
                message: err.to_string(),
            },
        }
    }

    async fn drive(&self, broker: &Broker) -> Result<String> {
        let mut password = self.config.password.clone();

        self.open_join_page().await?;
        self.maybe_sign_up(&password).await?;
        self.resolve_gates(broker, &mut password).await?;
        self.login(&password).await?;
        let repo_id = self.duplicate_space().await?;
        let endpoint = space_url_from_repo_id(&repo_id);
        info!(target = "spaceup", %repo_id, %endpoint, "space created, waiting for it to come up");
        self.await_readiness(&endpoint).await?;
        self.registry.add(&endpoint)?;
        Ok(endpoint)
    }

    /// Loads the signup page, retrying once through the site root when the
    /// perimeter serves its block page instead.
    async fn open_join_page(&self) -> Result<()> {
        let join_url = format!("{}/join", self.config.base_url);
        self.session.navigate(&join_url).await?;
        if gate::is_block_page(&self.page_text().await) {
            info!(target = "spaceup", "perimeter block detected, warming site root");
            self.session.navigate(&self.config.base_url).await?;
            tokio::time::sleep(self.config.settle).await;
            self.session.navigate(&join_url).await?;
        }
        tokio::time::sleep(self.config.settle).await;

        // Some deployments interpose a confirmation screen before the form;
        // press it speculatively, absence is fine.
        if self.session.click_by_text("begin").await.unwrap_or(false) {
            tokio::time::sleep(self.config.settle).await;
        }
        Ok(())
    }

    /// Fills and submits the signup form when its heading is visible. A
    /// missing heading means the account may already exist, so the machine
    /// skips ahead to login instead of failing.
    async fn maybe_sign_up(&self, password: &str) -> Result<()> {
        if !gate::has_signup_heading(&self.page_text().await) {
            info!(target = "spaceup", "no signup form, assuming existing account");
            return Ok(());
        }

        let email_chain = [
            Candidate::css("input[type=email]", Action::Fill(self.config.email.clone())),
            Candidate::css("input[name=email]", Action::Fill(self.config.email.clone())),
            Candidate::css("input#email", Action::Fill(self.config.email.clone())),
        ];
        if resolve_and_act(self.session.as_ref(), &email_chain).await == FallbackOutcome::Exhausted {
            return Err(Error::FieldDetection { field: "email field".into() });
        }

        let password_chain = [
            Candidate::css("input[type=password]", Action::Fill(password.to_string())),
            Candidate::css("input[name=password]", Action::Fill(password.to_string())),
            Candidate::css("input#password", Action::Fill(password.to_string())),
        ];
        if resolve_and_act(self.session.as_ref(), &password_chain).await
            == FallbackOutcome::Exhausted
        {
            return Err(Error::FieldDetection { field: "password field".into() });
        }

        // Not every deployment shows a terms checkbox.
        let terms_chain = [
            Candidate::css("input[name=terms]", Action::Check),
            Candidate::css("input#terms", Action::Check),
            Candidate::css("input[type=checkbox]", Action::Check),
        ];
        if resolve_and_act(self.session.as_ref(), &terms_chain).await == FallbackOutcome::Exhausted {
            debug!(target = "spaceup", "no terms checkbox found");
        }

        self.submit().await?;
        tokio::time::sleep(self.config.settle).await;
        Ok(())
    }

    /// Resolves gates in order: human challenge (broker-mediated wait),
    /// exposed-password prompt (synthesized replacement), then the bounded
    /// email-verification reload loop.
    async fn resolve_gates(&self, broker: &Broker, password: &mut String) -> Result<()> {
        let text = self.page_text().await;
        if gate::is_human_gate(&text) || gate::is_email_gate(&text) {
            info!(
                target = "spaceup",
                broker = broker.url(),
                "verification gate up; solve the challenge via the broker UI and click \
                 the link in your email if one was sent"
            );
            if gate::is_human_gate(&text) && !broker.ensure_human().await {
                warn!(target = "spaceup", "human-gate wait ceiling expired, re-checking");
            }
        }

        if gate::is_credential_exposed(&self.page_text().await) {
            *password = generate_strong_password();
            info!(target = "spaceup", "exposed-password prompt, setting a fresh one");
            self.set_new_password(password).await?;
            self.persist_credentials(password)?;
        }

        for attempt in 0..self.config.verify_attempts {
            if !gate::is_email_gate(&self.page_text().await) {
                return Ok(());
            }
            debug!(target = "spaceup", attempt, "email verification pending, reloading");
            tokio::time::sleep(self.config.verify_interval).await;
            let _ = self.session.reload().await;
        }
        // Budget spent without the gate clearing; login below gives the
        // authoritative verdict.
        Ok(())
    }

    /// Fills however many password inputs are visible, capped at the
    /// new/confirm pair, and submits.
    async fn set_new_password(&self, password: &str) -> Result<()> {
        let visible = self.session.count(PASSWORD_INPUTS).await.unwrap_or(0);
        for index in 0..visible.min(PASSWORD_PAIR_CAP) {
            if let Err(err) = self.session.fill_nth(PASSWORD_INPUTS, index, password).await {
                debug!(target = "spaceup", index, error = %err, "password input skipped");
            }
        }
        self.submit().await?;
        tokio::time::sleep(self.config.settle).await;
        Ok(())
    }

    fn persist_credentials(&self, password: &str) -> Result<()> {
        let record = CredentialRecord {
            email: self.config.email.clone(),
            password: password.to_string(),
            ts: now_ts(),
        };
        self.store.write("credentials", &serde_json::to_string(&record)?)
    }

    /// Always runs, even when signup looked successful, because verification
    /// may have completed in the meantime. Success is confirmed only by an
    /// identity marker on the profile page.
    async fn login(&self, password: &str) -> Result<()> {
        self.session
            .navigate(&format!("{}/login", self.config.base_url))
            .await?;
        tokio::time::sleep(self.config.settle).await;

        // Exhaustion is not fatal here: a live cookie from the profile dir
        // can mean there is no login form at all.
        let user_chain = [
            Candidate::css("input[type=email]", Action::Fill(self.config.email.clone())),
            Candidate::css("input[name=username]", Action::Fill(self.config.email.clone())),
            Candidate::css("input[name=email]", Action::Fill(self.config.email.clone())),
        ];
        let filled_user = resolve_and_act(self.session.as_ref(), &user_chain).await;

        let password_chain = [
            Candidate::css("input[type=password]", Action::Fill(password.to_string())),
            Candidate::css("input[name=password]", Action::Fill(password.to_string())),
        ];
        let filled_password = resolve_and_act(self.session.as_ref(), &password_chain).await;

        if filled_user != FallbackOutcome::Exhausted || filled_password != FallbackOutcome::Exhausted
        {
            self.submit().await?;
            tokio::time::sleep(self.config.settle).await;
        }

        self.session
            .navigate(&format!("{}/settings/profile", self.config.base_url))
            .await?;
        if gate::has_identity_marker(&self.page_text().await) {
            info!(target = "spaceup", "login verified");
            Ok(())
        } else {
            Err(Error::Login)
        }
    }

    /// Opens the duplication deep link, clicks through, and watches the URL
    /// for the new repo id.
    async fn duplicate_space(&self) -> Result<String> {
        let link = duplicate_link(
            &self.config.base_url,
            &self.config.source_space,
            &self.config.hardware,
            &self.config.space_name,
        );
        self.session.navigate(&link).await?;
        tokio::time::sleep(self.config.settle).await;

        let duplicate_chain = [
            Candidate::button_text("duplicate"),
            Candidate::button_text("create"),
        ];
        if resolve_and_act(self.session.as_ref(), &duplicate_chain).await
            == FallbackOutcome::Exhausted
        {
            debug!(target = "spaceup", "no duplicate control visible, watching URL anyway");
        }

        let deadline = Instant::now() + self.config.repo_id_timeout;
        loop {
            let url = self.session.current_url().await.unwrap_or_default();
            if let Some(repo_id) = repo_id_from_url(&url) {
                return Ok(repo_id);
            }
            if Instant::now() >= deadline {
                return Err(Error::SpaceCreate);
            }
            tokio::time::sleep(self.config.repo_id_interval).await;
        }
    }

    async fn await_readiness(&self, endpoint: &str) -> Result<()> {
        let started = Instant::now();
        loop {
            if self.probe.is_up(endpoint).await {
                return Ok(());
            }
            if started.elapsed() >= self.config.readiness_timeout {
                return Err(Error::Readiness {
                    url: endpoint.to_string(),
                    waited_secs: self.config.readiness_timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.config.readiness_interval).await;
        }
    }

    /// First successful submit control wins; Enter is the last resort.
    async fn submit(&self) -> Result<()> {
        let submit_chain = [
            Candidate::button_text("create"),
            Candidate::button_text("sign up"),
            Candidate::button_text("continue"),
            Candidate::button_text("join"),
            Candidate::button_text("submit"),
            Candidate::css("button[type=submit]", Action::Click),
        ];
        if resolve_and_act(self.session.as_ref(), &submit_chain).await == FallbackOutcome::Exhausted
        {
            self.session.press_key("Enter").await.map_err(|_| Error::Submission)?;
        }
        Ok(())
    }

    /// A failed read mid-navigation classifies as "nothing matched" so the
    /// machine keeps going instead of halting.
    async fn page_text(&self) -> String {
        self.session.body_text().await.unwrap_or_default()
    }
}

/// Derives the public endpoint from a repo id: `Acme/My-Space` becomes
/// `https://acme-my-space.hf.space`. Pure; this mapping mirrors the
/// platform's subdomain convention exactly.
pub fn space_url_from_repo_id(repo_id: &str) -> String {
    format!(
        "https://{}.{}",
        repo_id.replacen('/', "-", 1).to_lowercase(),
        SPACE_HOST_SUFFIX
    )
}

/// Extracts `owner/name` from a Space URL, if present.
pub fn repo_id_from_url(url: &str) -> Option<String> {
    REPO_ID
        .captures(url)
        .map(|caps| format!("{}/{}", &caps[1], &caps[2]))
}

/// Duplication deep link carrying hardware tier and display name.
pub fn duplicate_link(base_url: &str, source_space: &str, hardware: &str, title: &str) -> String {
    let mut link = format!("{base_url}/spaces/{source_space}?duplicate=true");
    let encode = |s: &str| {
        url::form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>()
    };
    link.push_str(&format!("&hardware={}", encode(hardware)));
    link.push_str("&sdk=docker");
    link.push_str(&format!("&title={}", encode(title)));
    link
}

/// 18 bytes of OS randomness, base64url, plus a fixed suffix that guarantees
/// the platform's complexity rules (upper, lower, digit, symbol).
pub fn generate_strong_password() -> String {
    let mut raw = [0u8; 18];
    rand::rngs::OsRng.fill_bytes(&mut raw);
    let mut password = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw);
    password.push_str("Aa1!");
    password
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_derivation_is_pure_and_lowercased() {
        assert_eq!(
            space_url_from_repo_id("Acme/My-Space"),
            "https://acme-my-space.hf.space"
        );
        // Same input, same output.
        assert_eq!(
            space_url_from_repo_id("Acme/My-Space"),
            space_url_from_repo_id("Acme/My-Space")
        );
    }

    #[test]
    fn endpoint_derivation_joins_only_the_separator() {
        assert_eq!(
            space_url_from_repo_id("owner/name-with-dash"),
            "https://owner-name-with-dash.hf.space"
        );
    }

    #[test]
    fn repo_id_extraction() {
        assert_eq!(
            repo_id_from_url("https://huggingface.co/spaces/Acme/My-Space?duplicate=true"),
            Some("Acme/My-Space".to_string())
        );
        assert_eq!(
            repo_id_from_url("https://huggingface.co/spaces/a/b#frag"),
            Some("a/b".to_string())
        );
        assert_eq!(repo_id_from_url("https://huggingface.co/join"), None);
    }

    #[test]
    fn duplicate_link_encodes_query_values() {
        let link = duplicate_link("https://huggingface.co", "VSTOPIA/DSU", "cpu-basic", "My Space");
        assert_eq!(
            link,
            "https://huggingface.co/spaces/VSTOPIA/DSU?duplicate=true\
             &hardware=cpu-basic&sdk=docker&title=My+Space"
        );
    }

    #[test]
    fn generated_password_meets_complexity() {
        let password = generate_strong_password();
        assert!(password.len() >= 24);
        assert!(password.ends_with("Aa1!"));
        assert!(password.chars().any(|c| c.is_ascii_uppercase()));
        assert!(password.chars().any(|c| c.is_ascii_lowercase()));
        assert!(password.chars().any(|c| c.is_ascii_digit()));
        assert!(password.chars().any(|c| !c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generated_passwords_differ() {
        assert_ne!(generate_strong_password(), generate_strong_password());
    }
}
