use spaceup_core::registry::SpaceRegistry;

use crate::cli::SpacesAction;
use crate::paths::StateDir;

pub fn execute(action: SpacesAction, state: StateDir) -> anyhow::Result<()> {
    let registry = SpaceRegistry::new(state.registry_path());
    match action {
        SpacesAction::Add { url } => {
            let spaces = registry.add(&url)?;
            println!("{}", serde_json::to_string_pretty(&spaces)?);
        }
        SpacesAction::List => {
            println!("{}", serde_json::to_string_pretty(&registry.list()?)?);
        }
    }
    Ok(())
}
