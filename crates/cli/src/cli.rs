use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "spaceup")]
#[command(about = "Unattended Space provisioning with human-in-the-loop escalation")]
#[command(version)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// State directory (profile, credentials, registry). Defaults to the
    /// platform config dir, e.g. ~/.config/spaceup
    #[arg(long, global = true, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the onboarding workflow: sign up, clear gates, duplicate the
    /// source Space, and register the new endpoint
    Run {
        /// Account email
        #[arg(long, env = "HF_EMAIL")]
        email: String,

        /// Account password
        #[arg(long, env = "HF_PASSWORD", hide_env_values = true)]
        password: String,

        /// Show the browser window instead of running headless
        #[arg(long)]
        headful: bool,

        /// Requested broker port; 0 lets the OS assign one
        #[arg(long, default_value = "45111")]
        port: u16,

        /// Ceiling in seconds for the new Space to come up
        #[arg(long, default_value = "180", value_name = "SECS")]
        readiness_timeout_secs: u64,

        /// Source Space to duplicate, owner/name
        #[arg(long, default_value = "VSTOPIA/DSU")]
        source_space: String,

        /// Display name for the duplicated Space
        #[arg(long, default_value = "DSU-Worker")]
        space_name: String,

        /// Hardware tier requested through the duplication link
        #[arg(long, default_value = "cpu-basic")]
        hardware: String,

        /// Hub base URL
        #[arg(long, default_value = "https://huggingface.co")]
        base_url: String,
    },

    /// Upload a media file to a provisioned Space and save the returned zip
    Submit {
        /// Input media file
        input: PathBuf,

        /// Pin a specific Space URL instead of round-robining the registry
        #[arg(long)]
        space: Option<String>,

        /// Bearer token for the Space, if it requires one
        #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Directory for downloaded artifacts
        #[arg(short, long, default_value = "out")]
        out: PathBuf,

        /// Job id; defaults to the input file's stem
        #[arg(long)]
        job_id: Option<String>,
    },

    /// Manage the registry of provisioned Spaces
    Spaces {
        #[command(subcommand)]
        action: SpacesAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum SpacesAction {
    /// Append a Space URL to the registry
    Add { url: String },

    /// List registered Space URLs
    List,
}
