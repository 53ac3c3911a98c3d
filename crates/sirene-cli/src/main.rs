use clap::Parser;
use sirene_core::logging;

mod cli;

use crate::cli::Cli;

/// Exit status when the batch finished but some transfers failed.
const EXIT_PARTIAL_FAILURE: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging as early as possible; fall back to stderr if the log file can't be opened.
    let guard = match logging::init("sirene", &cli.logger_options()) {
        Ok(guard) => Some(guard),
        Err(err) => {
            logging::init_stderr(cli.log_level);
            tracing::warn!("file logging unavailable: {:#}", err);
            None
        }
    };

    let code = match cli.run().await {
        Ok(true) => 0,
        Ok(false) => EXIT_PARTIAL_FAILURE,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("sirene error: {:#}", err);
            1
        }
    };

    drop(guard);
    std::process::exit(code);
}
