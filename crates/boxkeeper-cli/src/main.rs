#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use boxkeeper_core::Config;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "boxkeeper")]
#[command(author, version, about = "Self-update service for a boxed Node application", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Installation root (defaults to the current directory)
    #[arg(long, global = true, value_name = "PATH", env = "BOXKEEPER_ROOT")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Run the update HTTP API (foreground)
    Serve,

    /// Check whether a newer release is available
    Check,

    /// Validate the environment preconditions for an install
    Requirements,

    /// Install the latest release in the foreground, printing progress
    Install,

    /// Query the status endpoint of a running server
    Status {
        /// Server base URL (defaults to the configured host and port)
        #[arg(long, value_name = "URL")]
        url: Option<String>,
    },

    /// Restore the most recent backup
    Rollback,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let root = cli
        .root
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let command = match cli.command {
        Some(Commands::Version) | None => return commands::version::run(cli.json),
        Some(command) => command,
    };

    let config = Config::load(&root)
        .into_diagnostic()?
        .with_root(root)
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    match command {
        Commands::Version => commands::version::run(cli.json),
        Commands::Serve => commands::serve::run(&config),
        Commands::Check => commands::check::run(&config, cli.json),
        Commands::Requirements => commands::requirements::run(&config, cli.json),
        Commands::Install => commands::install::run(&config, cli.json),
        Commands::Status { url } => commands::status::run(&config, url.as_deref(), cli.json),
        Commands::Rollback => commands::rollback::run(&config, cli.json),
    }
}
