use bookmark_harvester::output::text;
use std::process;

#[tokio::main]
async fn main() {
    let verbose = std::env::args().any(|arg| arg == "--verbose" || arg == "-v");
    init_logging(verbose);

    if let Err(e) = bookmark_harvester::cli::run().await {
        eprintln!("{}", text::error(&format!("Error: {}", e)));
        for suggestion in e.suggestions() {
            eprintln!("{}", text::bullet(&suggestion));
        }
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = if verbose {
        EnvFilter::new("debug,chromiumoxide=info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,chromiumoxide=off"))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
