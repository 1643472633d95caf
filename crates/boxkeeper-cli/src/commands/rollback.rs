use boxkeeper_core::Config;
use boxkeeper_daemon::Installer;
use miette::{IntoDiagnostic, Result};
use serde_json::json;

/// Restore the most recent backup over the installation.
pub fn run(config: &Config, json: bool) -> Result<()> {
    let installer = Installer::from_config(config).into_diagnostic()?;
    let runtime = super::runtime()?;

    match runtime.block_on(installer.rollback()) {
        Ok(archive) if json => super::print_json(&json!({
            "success": true,
            "backup": archive.display().to_string(),
        })),
        Ok(archive) => {
            println!("restored {}", archive.display());
            Ok(())
        }
        Err(e) => super::fail(e, json),
    }
}
