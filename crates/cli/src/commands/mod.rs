mod run;
mod spaces;
mod submit;

use crate::cli::Commands;
use crate::paths::StateDir;

pub async fn dispatch(command: Commands, state: StateDir) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            email,
            password,
            headful,
            port,
            readiness_timeout_secs,
            source_space,
            space_name,
            hardware,
            base_url,
        } => {
            run::execute(run::RunArgs {
                email,
                password,
                headful,
                port,
                readiness_timeout_secs,
                source_space,
                space_name,
                hardware,
                base_url,
                state,
            })
            .await
        }
        Commands::Submit { input, space, token, out, job_id } => {
            submit::execute(input, space, token, out, job_id, state).await
        }
        Commands::Spaces { action } => spaces::execute(action, state),
    }
}
