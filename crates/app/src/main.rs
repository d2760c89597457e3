//! Scoreload - Main Entry Point
//!
//! Loads configuration, installs logging and dispatches the subcommand.

use clap::Parser;
use scoreload::commands::{self, live_wiring, load_settings};
use scoreload::report::render_summary;
use scoreload::{Cli, Commands};
use scoreload_infrastructure::{init_tracing, load_dotenv};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    load_dotenv(cli.env_file.as_deref())?;

    match cli.command {
        Commands::Scenarios { json } => {
            print!("{}", commands::scenarios(json)?);
        }
        Commands::Token { host } => {
            let wiring = live_wiring(load_settings(host.as_deref())?)?;
            print!("{}", commands::token(&wiring).await?);
        }
        Commands::Run(args) => {
            let wiring = live_wiring(load_settings(args.host.as_deref())?)?;
            let summary = commands::run(&wiring, &args).await?;
            print!("{}", render_summary(&summary));
        }
    }

    Ok(())
}
