//! CLI argument parsing definitions

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use scoreload_application::RunOptions;
use scoreload_domain::{DomainResult, TaskFilter};

#[derive(Debug, Parser)]
#[command(name = "scoreload", author, version, about, long_about = None)]
pub struct Cli {
    /// Log level or filter directive; `RUST_LOG` takes precedence
    #[arg(long, value_name = "LEVEL", global = true, default_value = "info")]
    pub log_level: String,

    /// Load environment variables from this file instead of `./.env`
    #[arg(long, value_name = "PATH", global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a load test and print the per-task summary
    Run(RunArgs),

    /// Authenticate once and show the token
    Token {
        /// Override API_HOST
        #[arg(long, value_name = "URL")]
        host: Option<String>,
    },

    /// List the built-in scenarios
    Scenarios {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Scenario name, see `scoreload scenarios`
    #[arg(long, short = 's', default_value = "smoke")]
    pub scenario: String,

    /// Number of concurrent virtual users
    #[arg(long, short = 'u', default_value_t = 1)]
    pub users: u64,

    /// Users started per second
    #[arg(long, short = 'r', default_value_t = 1.0)]
    pub spawn_rate: f64,

    /// Test duration in seconds
    #[arg(long, short = 't', value_name = "SECS", default_value_t = 60)]
    pub run_time: u64,

    /// Override API_HOST
    #[arg(long, value_name = "URL")]
    pub host: Option<String>,

    /// Only run tasks with these tags or resources (e.g. `read,users`)
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Shortest pause between tasks
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub wait_min_ms: u64,

    /// Longest pause between tasks
    #[arg(long, value_name = "MS", default_value_t = 3000)]
    pub wait_max_ms: u64,

    /// Keep created items instead of deleting them straight away
    #[arg(long)]
    pub no_cleanup: bool,

    /// Seed for reproducible task selection
    #[arg(long)]
    pub seed: Option<u64>,
}

impl RunArgs {
    /// Converts the flags into runner options.
    ///
    /// # Errors
    ///
    /// Returns an error if a `--tags` term is neither a tag nor a resource.
    pub fn run_options(&self, request_timeout: Duration) -> DomainResult<RunOptions> {
        Ok(RunOptions {
            users: self.users,
            spawn_rate: self.spawn_rate,
            run_time: Duration::from_secs(self.run_time),
            wait_min: Duration::from_millis(self.wait_min_ms),
            wait_max: Duration::from_millis(self.wait_max_ms),
            cleanup: !self.no_cleanup,
            request_timeout,
            filter: TaskFilter::parse(&self.tags)?,
            seed: self.seed,
        })
    }
}
