//! Pre-install environment checks.

use super::error::UpdateError;
use super::script::run_script;
use super::{CONNECT_TIMEOUT, REACHABILITY_TIMEOUT, SCRIPT_TIMEOUT};
use crate::version::USER_AGENT;
use crate::Config;
use boxkeeper_util::fs::is_dir_writable;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Marker file written and removed by the permission check.
pub const PERMISSION_MARKER: &str = ".update-test";

/// Outcome of one requirements validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementsReport {
    pub has_git: bool,
    pub has_internet: bool,
    pub has_space: bool,
    pub has_permissions: bool,
    /// The required tool was missing and got installed by the setup script.
    pub tool_installed: bool,
    pub errors: Vec<String>,
    pub can_update: bool,
}

impl RequirementsReport {
    fn finish(mut self) -> Self {
        self.can_update =
            self.has_git && self.has_internet && self.has_space && self.has_permissions;
        self
    }
}

/// Runs the four independent pre-install checks.
#[derive(Debug, Clone)]
pub struct RequirementValidator {
    root: PathBuf,
    tool: String,
    setup_script: PathBuf,
    connectivity_url: String,
    http: Client,
}

impl RequirementValidator {
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &Config) -> Result<Self, UpdateError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REACHABILITY_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| UpdateError::remote(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            root: config.root.clone(),
            tool: config.required_tool.clone(),
            setup_script: config.paths().setup_script,
            connectivity_url: config.connectivity_url.clone(),
            http,
        })
    }

    /// Run every check. Each one is best-effort and records its own error.
    pub async fn validate(&self) -> RequirementsReport {
        let mut report = RequirementsReport::default();

        self.check_tool(&mut report).await;

        if self.reachable().await {
            report.has_internet = true;
        } else {
            report.errors.push("No internet connection".to_string());
        }

        if std::fs::metadata(&self.root).is_ok() {
            report.has_space = true;
        } else {
            report.errors.push(format!(
                "Unable to check disk space at {}",
                self.root.display()
            ));
        }

        if is_dir_writable(&self.root, PERMISSION_MARKER) {
            report.has_permissions = true;
        } else {
            report.errors.push(format!(
                "No write permission in {}",
                self.root.display()
            ));
        }

        report.finish()
    }

    async fn check_tool(&self, report: &mut RequirementsReport) {
        if self.tool_available().await {
            report.has_git = true;
            return;
        }

        if !self.setup_script.is_file() {
            report.errors.push(format!(
                "{} not found and setup script {} is missing",
                self.tool,
                self.setup_script.display()
            ));
            return;
        }

        match run_script(&self.setup_script, &self.root, SCRIPT_TIMEOUT).await {
            Ok(_) if self.tool_available().await => {
                report.has_git = true;
                report.tool_installed = true;
            }
            Ok(_) => report.errors.push(format!(
                "{} is still unavailable after running the setup script",
                self.tool
            )),
            Err(e) => report.errors.push(format!(
                "{} could not be installed automatically: {}",
                self.tool,
                e.message()
            )),
        }
    }

    async fn tool_available(&self) -> bool {
        Command::new(&self.tool)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok_and(|status| status.success())
    }

    /// HTTP GET first; if that fails, fall back to a raw TCP connect to the
    /// same host so a proxy-level HTTP error does not read as "offline".
    async fn reachable(&self) -> bool {
        if self.http.get(&self.connectivity_url).send().await.is_ok() {
            return true;
        }

        let Ok(url) = url::Url::parse(&self.connectivity_url) else {
            return false;
        };
        let (Some(host), Some(port)) = (url.host_str(), url.port_or_known_default()) else {
            return false;
        };
        matches!(
            tokio::time::timeout(
                REACHABILITY_TIMEOUT,
                tokio::net::TcpStream::connect((host, port))
            )
            .await,
            Ok(Ok(_))
        )
    }
}
