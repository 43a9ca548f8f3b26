use clap::Parser;
use log::error;
use powerpulse::Engine;
use powerpulse::util::logging;

/// One-shot driver: load the device manifest, pick the desired profile and
/// apply it. The HAL integration goes through the C entry points instead.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Path to a device manifest; repeatable, replaces the built-in
    /// search list
    #[clap(short, long)]
    manifest: Vec<String>,

    /// Profile to apply instead of the boot or restored profile
    #[clap(short, long)]
    profile: Option<String>,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,

    /// Enable verbose logging
    #[clap(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    let default_filter = if cli.verbose {
        "trace"
    } else if cli.debug {
        "debug"
    } else {
        "info"
    };
    logging::init(&std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string()));

    let engine = match Engine::new(cli.manifest, cli.profile) {
        Ok(engine) => engine,
        Err(e) => {
            error!("error initializing PowerPulse: {e}");
            std::process::exit(1);
        }
    };

    engine.stargaze();
    // A configured boot profile defers the real application; see it through
    // before exiting.
    engine.wait_until_settled();
}
