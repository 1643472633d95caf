use boxkeeper_core::update::{check_for_updates, ReleaseClient};
use boxkeeper_core::Config;
use miette::{IntoDiagnostic, Result};

/// Compare the installed version with the latest release.
///
/// Registry failures are reported but do not fail the command.
pub fn run(config: &Config, json: bool) -> Result<()> {
    let client = ReleaseClient::from_config(config).into_diagnostic()?;
    let version_file = config.paths().version_file;

    let runtime = super::runtime()?;
    let check = runtime.block_on(check_for_updates(&client, &version_file));

    if json {
        return super::print_json(&check);
    }

    println!("current version: {}", check.current_version);
    match (&check.latest_version, &check.error) {
        (Some(latest), _) => println!("latest version:  {latest}"),
        (None, Some(error)) => eprintln!("warning: could not check for updates: {error}"),
        (None, None) => {}
    }

    if let Some(release) = check.update_info.as_ref().filter(|_| check.has_update) {
        println!("update available: {}", release.version);
        if let Some(description) = release.description.as_deref().filter(|d| !d.is_empty()) {
            println!();
            println!("{description}");
        }
    } else if check.error.is_none() {
        println!("up to date");
    }
    Ok(())
}
