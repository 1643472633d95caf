use boxkeeper_core::update::RequirementValidator;
use boxkeeper_core::Config;
use miette::{IntoDiagnostic, Result};

/// Run the pre-install checks. Exits non-zero when an install would be
/// refused.
pub fn run(config: &Config, json: bool) -> Result<()> {
    let validator = RequirementValidator::new(config).into_diagnostic()?;
    let runtime = super::runtime()?;
    let report = runtime.block_on(validator.validate());

    if json {
        super::print_json(&report)?;
    } else {
        let mark = |ok: bool| if ok { "ok" } else { "FAIL" };
        println!("{:<12} {}", config.required_tool, mark(report.has_git));
        println!("{:<12} {}", "internet", mark(report.has_internet));
        println!("{:<12} {}", "disk space", mark(report.has_space));
        println!("{:<12} {}", "permissions", mark(report.has_permissions));
        if report.tool_installed {
            println!("({} was installed by the setup script)", config.required_tool);
        }
        for error in &report.errors {
            eprintln!("error: {error}");
        }
    }

    if !report.can_update {
        std::process::exit(1);
    }
    Ok(())
}
