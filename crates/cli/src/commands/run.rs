use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use spaceup_core::onboard::{OnboardConfig, Onboarder, WorkflowStatus};
use spaceup_core::registry::SpaceRegistry;
use spaceup_core::session::{ChromiumSession, SessionOptions};
use spaceup_core::store::DirStore;

use crate::paths::StateDir;

pub struct RunArgs {
    pub email: String,
    pub password: String,
    pub headful: bool,
    pub port: u16,
    pub readiness_timeout_secs: u64,
    pub source_space: String,
    pub space_name: String,
    pub hardware: String,
    pub base_url: String,
    pub state: StateDir,
}

pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    let session = ChromiumSession::launch(
        SessionOptions::new(args.state.profile_dir()).headless(!args.headful),
    )
    .await
    .context("launching browser")?;

    let config = OnboardConfig {
        email: args.email,
        password: args.password,
        source_space: args.source_space,
        space_name: args.space_name,
        hardware: args.hardware,
        base_url: args.base_url,
        broker: spaceup_core::broker::BrokerConfig::with_port(args.port),
        readiness_timeout: std::time::Duration::from_secs(args.readiness_timeout_secs),
        ..Default::default()
    };

    let store = Arc::new(DirStore::new(args.state.root().clone()));
    let registry = Arc::new(SpaceRegistry::new(args.state.registry_path()));

    info!(target = "spaceup", "starting onboarding run");
    let result = Onboarder::new(Arc::new(session), config, store, registry)
        .run()
        .await;

    // The terminal record goes to stdout; logs stay on stderr.
    println!("{}", serde_json::to_string_pretty(&result)?);
    match result.status {
        WorkflowStatus::Done => Ok(()),
        WorkflowStatus::Error => Err(anyhow::anyhow!(result.message)),
    }
}
