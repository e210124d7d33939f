use clap::Parser;
use spaceup_cli::{cli::Cli, commands, logging, paths::StateDir};
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let state = match StateDir::resolve(cli.state_dir) {
        Ok(state) => state,
        Err(err) => {
            error!(target = "spaceup", error = %err, "state dir unavailable");
            std::process::exit(1);
        }
    };

    if let Err(err) = commands::dispatch(cli.command, state).await {
        error!(target = "spaceup", error = %err, "command failed");
        std::process::exit(1);
    }
}
