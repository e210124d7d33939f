//! Gate classification over page-text snapshots.
//!
//! The target site interposes interstitial screens (human-verification
//! challenge, email-verification notice, exposed-password warning) that block
//! forward progress. Classification is a pure function of the body text, so
//! callers re-read the page on every check and nothing here is cached.

use std::sync::LazyLock;

use regex_lite::Regex;

/// Which gate, if any, the current screen is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateKind {
    /// "Let's confirm you are human" challenge; needs a human operator.
    Human,
    /// "Verify your email" notice; clears when the mailbox link is clicked.
    EmailVerify,
    /// The platform's leaked-password prompt; needs a replacement password.
    CredentialExposed,
    /// No gate text matched.
    None,
}

static HUMAN_GATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)let's confirm you are human|choose all the").unwrap());
static EMAIL_GATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)verify your email|check your email").unwrap());
static EXPOSED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)password has been exposed|set a new password|pwned").unwrap()
});
static BLOCK_PAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)403 ERROR|Request blocked|cloudfront").unwrap());
static SIGNUP_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Create your account|Join Hugging Face").unwrap());
static IDENTITY_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bEmail\b|\bUsername\b").unwrap());

/// Classifies a body-text snapshot. Human gate wins over the email gate when
/// both phrases are present, since the human gate is the one that must clear
/// first.
pub fn classify(page_text: &str) -> GateKind {
    if HUMAN_GATE.is_match(page_text) {
        GateKind::Human
    } else if EXPOSED.is_match(page_text) {
        GateKind::CredentialExposed
    } else if EMAIL_GATE.is_match(page_text) {
        GateKind::EmailVerify
    } else {
        GateKind::None
    }
}

/// Human-gate phrase only; used by the broker's wait primitive, which must
/// keep blocking while an email gate is merely pending.
pub fn is_human_gate(page_text: &str) -> bool {
    HUMAN_GATE.is_match(page_text)
}

pub fn is_email_gate(page_text: &str) -> bool {
    EMAIL_GATE.is_match(page_text)
}

pub fn is_credential_exposed(page_text: &str) -> bool {
    EXPOSED.is_match(page_text)
}

/// Matches the CDN block page served instead of the signup form when the
/// perimeter rejects the request.
pub fn is_block_page(page_text: &str) -> bool {
    BLOCK_PAGE.is_match(page_text)
}

pub fn has_signup_heading(page_text: &str) -> bool {
    SIGNUP_HEADING.is_match(page_text)
}

/// Profile-page identity label; presence confirms a completed login.
pub fn has_identity_marker(page_text: &str) -> bool {
    IDENTITY_MARKER.is_match(page_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_gate_is_case_insensitive() {
        assert_eq!(classify("LET'S CONFIRM YOU ARE HUMAN"), GateKind::Human);
        assert_eq!(classify("please choose all the bicycles"), GateKind::Human);
    }

    #[test]
    fn email_gate_detected() {
        assert_eq!(
            classify("We sent you a link. Verify your email to continue."),
            GateKind::EmailVerify
        );
        assert_eq!(classify("Check your email for a link"), GateKind::EmailVerify);
    }

    #[test]
    fn exposed_password_detected() {
        assert_eq!(
            classify("This password has been exposed in a data breach"),
            GateKind::CredentialExposed
        );
        assert_eq!(classify("Please set a new password"), GateKind::CredentialExposed);
    }

    #[test]
    fn human_gate_wins_over_email_gate() {
        let text = "Let's confirm you are human. Then verify your email.";
        assert_eq!(classify(text), GateKind::Human);
    }

    #[test]
    fn plain_page_is_none() {
        assert_eq!(classify("Welcome to the hub"), GateKind::None);
        assert_eq!(classify(""), GateKind::None);
    }

    #[test]
    fn block_page_signature() {
        assert!(is_block_page("403 ERROR\nThe request could not be satisfied"));
        assert!(is_block_page("Request blocked. We can't connect"));
        assert!(is_block_page("Generated by cloudfront (CloudFront)"));
        assert!(!is_block_page("Create your account"));
    }

    #[test]
    fn signup_and_identity_predicates() {
        assert!(has_signup_heading("Join Hugging Face today"));
        assert!(has_signup_heading("create your account"));
        assert!(has_identity_marker("Email\nyou@example.com"));
        assert!(has_identity_marker("Username: acme"));
        assert!(!has_identity_marker("Sign in to continue"));
    }
}
