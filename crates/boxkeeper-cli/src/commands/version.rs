use boxkeeper_core::version::version_string;
use boxkeeper_core::VERSION;
use miette::Result;
use serde_json::json;

pub fn run(json: bool) -> Result<()> {
    if json {
        return super::print_json(&json!({
            "name": "boxkeeper",
            "version": VERSION,
        }));
    }
    println!("{}", version_string());
    Ok(())
}
