//! Storefront payments server.
//!
//! ```sh
//! storefront-payments init            # Generate default config.toml
//! storefront-payments serve           # Start the server
//! ```

use clap::Parser;
use storefront_payments::cmd::{self, Cli, Commands};

#[tokio::main]
#[allow(clippy::print_stderr)]
async fn main() {
    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Commands::Init { output, force } => cmd::init::run(&output, force).map_err(Into::into),
        Commands::Serve { config } => cmd::serve::run(&config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
