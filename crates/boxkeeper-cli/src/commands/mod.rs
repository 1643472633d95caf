pub mod check;
pub mod install;
pub mod requirements;
pub mod rollback;
pub mod serve;
pub mod status;
pub mod version;

use boxkeeper_core::update::UpdateError;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use serde_json::json;

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

/// Report a failed operation and exit non-zero.
///
/// With `--json` the error goes to stdout as `{error, code, details?}`;
/// otherwise it is rendered by miette.
pub fn fail(err: UpdateError, json: bool) -> Result<()> {
    if json {
        let mut body = json!({
            "error": err.message(),
            "code": err.code(),
        });
        if let Some(report) = err.report() {
            body["details"] = serde_json::to_value(report).into_diagnostic()?;
        }
        print_json(&body)?;
        std::process::exit(1);
    }

    if let Some(report) = err.report() {
        for line in &report.errors {
            eprintln!("  - {line}");
        }
    }
    Err(err).into_diagnostic()
}

/// Tokio runtime for one command.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()
}
