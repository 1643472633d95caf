use boxkeeper_core::update::{InstallStatus, UpdateError};
use boxkeeper_core::Config;
use boxkeeper_daemon::Installer;
use miette::{miette, IntoDiagnostic, Result};

/// Run one install in the foreground.
///
/// Progress goes to stderr; the final state goes to stdout. Exits non-zero if
/// the install was refused or failed.
pub fn run(config: &Config, json: bool) -> Result<()> {
    let installer = Installer::from_config(config).into_diagnostic()?;
    let runtime = super::runtime()?;

    let outcome = runtime.block_on(async {
        let mut rx = installer.subscribe();
        let handle = installer.start().await?;

        let printer = tokio::spawn(async move {
            let mut last = None;
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                let line = (state.progress, state.current_step.clone());
                if last.as_ref() != Some(&line) {
                    eprintln!(
                        "[{:>3}%] {}",
                        state.progress,
                        state.current_step.as_deref().unwrap_or_default()
                    );
                    last = Some(line);
                }
                if state.status.is_terminal() {
                    break;
                }
            }
        });

        let state = handle.wait().await;
        let _ = printer.await;
        Ok::<_, UpdateError>(state)
    });

    let state = match outcome {
        Ok(state) => state,
        Err(e) => return super::fail(e, json),
    };

    if json {
        super::print_json(&state.snapshot())?;
    } else if state.status == InstallStatus::Success {
        println!("installed {}", state.version.as_deref().unwrap_or_default());
    }

    if state.status == InstallStatus::Success {
        Ok(())
    } else {
        Err(miette!(
            "install failed: {}",
            state.error.as_deref().unwrap_or("unknown error")
        ))
    }
}
