use clap::Parser;
use migrun_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging as early as possible.
    if let Err(e) = logging::init_logging(cli.verbose) {
        eprintln!("migrun: file logging unavailable ({:#}), logging to stderr", e);
        logging::init_logging_stderr(cli.verbose);
    }

    if let Err(err) = cli.run().await {
        eprintln!("migrun error: {:#}", err);
        std::process::exit(1);
    }
}
