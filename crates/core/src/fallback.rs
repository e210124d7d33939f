//! Ordered selector-fallback chains.
//!
//! The target site's markup is not ours and changes without notice, so every
//! DOM interaction that matters is expressed as an ordered list of candidate
//! (locator, action) pairs. Candidates are tried strictly left to right; a
//! candidate that is missing or not visible is an expected outcome, not an
//! error, and the first one that acts wins.

use tracing::debug;

use crate::session::BrowserSession;

/// How to find the element a candidate targets.
#[derive(Debug, Clone)]
pub enum Locator {
    /// CSS selector (comma lists allowed).
    Css(&'static str),
    /// First visible `<button>` whose text contains the needle,
    /// case-insensitive. Only meaningful with [`Action::Click`].
    ButtonText(&'static str),
}

/// What to do once the element is found.
#[derive(Debug, Clone)]
pub enum Action {
    Fill(String),
    Click,
    Check,
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub locator: Locator,
    pub action: Action,
}

impl Candidate {
    pub fn css(selector: &'static str, action: Action) -> Self {
        Self { locator: Locator::Css(selector), action }
    }

    pub fn button_text(needle: &'static str) -> Self {
        Self { locator: Locator::ButtonText(needle), action: Action::Click }
    }
}

/// Result of evaluating a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackOutcome {
    /// The candidate at this index resolved and its action succeeded.
    Applied(usize),
    /// No candidate resolved to a visible, actionable element.
    Exhausted,
}

/// Evaluates `candidates` in order against `session`, stopping at the first
/// success. Re-running on an unchanged page repeats the same choice.
pub async fn resolve_and_act(
    session: &dyn BrowserSession,
    candidates: &[Candidate],
) -> FallbackOutcome {
    for (index, candidate) in candidates.iter().enumerate() {
        if try_candidate(session, candidate).await {
            debug!(target = "spaceup", index, ?candidate, "fallback candidate applied");
            return FallbackOutcome::Applied(index);
        }
    }
    FallbackOutcome::Exhausted
}

async fn try_candidate(session: &dyn BrowserSession, candidate: &Candidate) -> bool {
    match &candidate.locator {
        Locator::Css(selector) => {
            match session.is_visible(selector).await {
                Ok(true) => {}
                // Absent or hidden element, or a read failure mid-navigation;
                // either way this candidate is a miss.
                Ok(false) | Err(_) => return false,
            }
            let acted = match &candidate.action {
                Action::Fill(value) => session.fill(selector, value).await,
                Action::Click => session.click(selector).await,
                Action::Check => session.check(selector).await,
            };
            acted.is_ok()
        }
        Locator::ButtonText(needle) => {
            matches!(session.click_by_text(needle).await, Ok(true))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FakeSession;

    #[tokio::test]
    async fn first_visible_candidate_wins() {
        let session = FakeSession::new();
        session.show("input[name=email]");

        let chain = [
            Candidate::css("input[type=email]", Action::Fill("a@b.c".into())),
            Candidate::css("input[name=email]", Action::Fill("a@b.c".into())),
            Candidate::css("input#email", Action::Fill("a@b.c".into())),
        ];
        let outcome = resolve_and_act(&session, &chain).await;
        assert_eq!(outcome, FallbackOutcome::Applied(1));
        assert_eq!(session.filled("input[name=email]"), Some("a@b.c".into()));
    }

    #[tokio::test]
    async fn later_candidates_not_attempted_after_success() {
        let session = FakeSession::new();
        session.show("button[type=submit]");
        session.show("button.alt");

        let chain = [
            Candidate::css("button[type=submit]", Action::Click),
            Candidate::css("button.alt", Action::Click),
        ];
        assert_eq!(resolve_and_act(&session, &chain).await, FallbackOutcome::Applied(0));
        assert_eq!(session.clicks(), vec!["button[type=submit]".to_string()]);
    }

    #[tokio::test]
    async fn exhausted_when_nothing_visible() {
        let session = FakeSession::new();
        let chain = [
            Candidate::css("input[type=email]", Action::Fill("x".into())),
            Candidate::button_text("sign up"),
        ];
        assert_eq!(resolve_and_act(&session, &chain).await, FallbackOutcome::Exhausted);
    }

    #[tokio::test]
    async fn button_text_candidate_clicks_visible_button() {
        let session = FakeSession::new();
        session.add_button("Sign up with email");

        let chain = [
            Candidate::css("button[type=submit]", Action::Click),
            Candidate::button_text("sign up"),
        ];
        assert_eq!(resolve_and_act(&session, &chain).await, FallbackOutcome::Applied(1));
    }

    #[tokio::test]
    async fn rerun_on_unchanged_page_is_idempotent() {
        let session = FakeSession::new();
        session.show("input#terms");

        let chain = [Candidate::css("input#terms", Action::Check)];
        let first = resolve_and_act(&session, &chain).await;
        let second = resolve_and_act(&session, &chain).await;
        assert_eq!(first, second);
    }
}
