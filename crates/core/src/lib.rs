// spaceup-core: onboarding orchestration engine
//
// Drives a controllable browser session through signup, login and Space
// duplication on huggingface.co, escalating to a human over a small HTTP
// broker whenever a verification gate blocks automated progress.

pub mod broker;
pub mod client;
pub mod error;
pub mod fallback;
pub mod gate;
pub mod onboard;
pub mod registry;
pub mod session;
pub mod store;

pub use broker::{Broker, BrokerConfig, ensure_human};
pub use error::{Error, Result};
pub use fallback::{Action, Candidate, FallbackOutcome, Locator, resolve_and_act};
pub use gate::GateKind;
pub use onboard::{OnboardConfig, Onboarder, WorkflowResult, WorkflowStatus};
pub use registry::SpaceRegistry;
pub use session::BrowserSession;
pub use store::{DirStore, KvStore, MemoryStore};
