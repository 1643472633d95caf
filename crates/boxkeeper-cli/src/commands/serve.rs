use boxkeeper_core::Config;
use boxkeeper_daemon::run_server;
use miette::{IntoDiagnostic, Result};
use std::io::Write;

/// Run the HTTP API in the foreground until interrupted.
pub fn run(config: &Config) -> Result<()> {
    eprintln!(
        "serving updates for {} on http://{}:{}",
        config.root.display(),
        config.host,
        config.port
    );
    std::io::stderr().flush().into_diagnostic()?;

    let runtime = super::runtime()?;
    runtime.block_on(async { run_server(config).await.into_diagnostic() })
}
