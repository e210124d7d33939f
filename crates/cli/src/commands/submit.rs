use std::path::PathBuf;

use spaceup_core::client::{self, SubmitOptions};
use spaceup_core::registry::SpaceRegistry;

use crate::paths::StateDir;

pub async fn execute(
    input: PathBuf,
    space: Option<String>,
    token: Option<String>,
    out: PathBuf,
    job_id: Option<String>,
    state: StateDir,
) -> anyhow::Result<()> {
    let space_url = match space {
        Some(url) => url,
        None => SpaceRegistry::new(state.registry_path()).next()?,
    };

    let outcome = client::submit(SubmitOptions {
        input_path: input,
        space_url,
        token,
        out_dir: out,
        job_id,
    })
    .await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
