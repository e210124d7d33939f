use tracing_subscriber::EnvFilter;

/// Maps `-v` counts to a default filter; `RUST_LOG` always wins.
pub fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "spaceup=warn",
        1 => "spaceup=info",
        _ => "spaceup=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
