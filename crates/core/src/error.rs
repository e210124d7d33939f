//! Error types for the onboarding engine.
//!
//! Lower layers absorb their own recoverable failures (a fallback candidate
//! that is not in the DOM, a page read mid-navigation). What surfaces here is
//! either infrastructure trouble or a fatal phase failure, and each fatal
//! variant names the phase so the diagnostic tells a human where to resume.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("browser session error: {0}")]
    Session(String),

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("no free port found in 20 attempts starting at {start}")]
    PortExhausted { start: u16 },

    #[error("could not locate {field}: all selector candidates exhausted")]
    FieldDetection { field: String },

    #[error("form submission failed: no submit control matched")]
    Submission,

    #[error("login did not complete; ensure the email was verified, then rerun")]
    Login,

    #[error("Failed to create Space. Try again from the UI.")]
    SpaceCreate,

    #[error("space at {url} did not come up within {waited_secs}s")]
    Readiness { url: String, waited_secs: u64 },

    #[error("state store error: {0}")]
    Store(String),

    #[error("upload client error: {0}")]
    Client(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
