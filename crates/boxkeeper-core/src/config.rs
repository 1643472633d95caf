use crate::error::Error;
use crate::paths::InstallPaths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the optional config file looked up in the installation root.
pub const CONFIG_FILE: &str = "boxkeeper.json";

/// Environment overrides, applied after the config file.
pub mod env {
    pub const ROOT: &str = "BOXKEEPER_ROOT";
    pub const HOST: &str = "HOST";
    pub const PORT: &str = "PORT";
    pub const REPOSITORY: &str = "BOXKEEPER_REPOSITORY";
    pub const API_URL: &str = "BOXKEEPER_API_URL";
    pub const CONNECTIVITY_URL: &str = "BOXKEEPER_CONNECTIVITY_URL";
    pub const REQUIRED_TOOL: &str = "BOXKEEPER_REQUIRED_TOOL";
    pub const SERVICE: &str = "BOXKEEPER_SERVICE";
    pub const SUPERVISOR: &str = "BOXKEEPER_SUPERVISOR";
    pub const TOKEN: &str = "BOXKEEPER_TOKEN";
}

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8001;
pub const DEFAULT_REPOSITORY: &str = "franc-nt/techify-box";
pub const DEFAULT_API_URL: &str = "https://api.github.com/";
pub const DEFAULT_CONNECTIVITY_URL: &str = "https://api.github.com";

/// Paths included in every pre-install backup, relative to the root.
/// A trailing `/` marks a directory.
pub const DEFAULT_BACKUP_PATHS: &[&str] = &[
    "package.json",
    "config.json",
    "ecosystem.config.js",
    "server/",
    "public/",
    "scripts/",
];

/// Runtime configuration for boxkeeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Installation root: the directory that gets updated in place.
    pub root: PathBuf,

    /// HTTP bind host.
    pub host: String,

    /// HTTP bind port.
    pub port: u16,

    /// Release repository as `owner/name`.
    pub repository: String,

    /// Base URL of the release registry API.
    pub api_base_url: String,

    /// Endpoint probed by the internet reachability check.
    pub connectivity_url: String,

    /// External tool that must be runnable before an install.
    pub required_tool: String,

    /// Script that installs `required_tool`, relative to the root.
    pub tool_setup_script: PathBuf,

    /// Name of the supervised service to restart after an install.
    pub service_name: String,

    /// Process supervisor binary (invoked as `<cmd> restart <service>`).
    pub supervisor_command: String,

    /// Version metadata file, relative to the root.
    pub version_file: PathBuf,

    /// Paths captured by backups.
    pub backup_paths: Vec<String>,

    /// Bearer token required by the HTTP API. `None` disables auth.
    pub api_token: Option<String>,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    #[serde(skip)]
    pub verbosity: u8,

    /// Whether to emit JSON logs.
    #[serde(skip)]
    pub json_logs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            repository: DEFAULT_REPOSITORY.to_string(),
            api_base_url: DEFAULT_API_URL.to_string(),
            connectivity_url: DEFAULT_CONNECTIVITY_URL.to_string(),
            required_tool: "git".to_string(),
            tool_setup_script: PathBuf::from("scripts/setup-git.sh"),
            service_name: "local-app".to_string(),
            supervisor_command: "pm2".to_string(),
            version_file: PathBuf::from("package.json"),
            backup_paths: DEFAULT_BACKUP_PATHS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
            api_token: None,
            verbosity: 0,
            json_logs: false,
        }
    }
}

impl Config {
    /// Create a config with defaults for the given installation root.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            ..Default::default()
        }
    }

    /// Load the config for `root`: defaults, then `boxkeeper.json` if present,
    /// then process environment overrides.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be read or parsed,
    /// or an environment override is malformed.
    pub fn load(root: &Path) -> Result<Self, Error> {
        Self::from_file(root)?.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Defaults merged with `<root>/boxkeeper.json`, without env overrides.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_file(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::new(root.to_path_buf()));
        }

        let raw = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
            path: path.clone(),
            source,
        })?;
        let mut config: Self =
            serde_json::from_str(&raw).map_err(|source| Error::ConfigParse { path, source })?;
        config.root = root.to_path_buf();
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    ///
    /// # Errors
    /// Returns an error if `PORT` is not a valid port number.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, Error> {
        if let Some(root) = lookup(env::ROOT) {
            self.root = PathBuf::from(root);
        }
        if let Some(host) = lookup(env::HOST) {
            self.host = host;
        }
        if let Some(port) = lookup(env::PORT) {
            self.port = port.parse().map_err(|_| Error::InvalidSetting {
                key: env::PORT.to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(repo) = lookup(env::REPOSITORY) {
            self.repository = repo;
        }
        if let Some(url) = lookup(env::API_URL) {
            self.api_base_url = url;
        }
        if let Some(url) = lookup(env::CONNECTIVITY_URL) {
            self.connectivity_url = url;
        }
        if let Some(tool) = lookup(env::REQUIRED_TOOL) {
            self.required_tool = tool;
        }
        if let Some(service) = lookup(env::SERVICE) {
            self.service_name = service;
        }
        if let Some(cmd) = lookup(env::SUPERVISOR) {
            self.supervisor_command = cmd;
        }
        if let Some(token) = lookup(env::TOKEN).filter(|t| !t.is_empty()) {
            self.api_token = Some(token);
        }
        Ok(self)
    }

    /// On-disk layout derived from this config.
    #[must_use]
    pub fn paths(&self) -> InstallPaths {
        InstallPaths::new(&self.root, &self.version_file, &self.tool_setup_script)
    }

    #[must_use]
    pub fn with_root(mut self, root: PathBuf) -> Self {
        self.root = root;
        self
    }

    #[must_use]
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = repository.into();
        self
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_connectivity_url(mut self, url: impl Into<String>) -> Self {
        self.connectivity_url = url.into();
        self
    }

    #[must_use]
    pub fn with_required_tool(mut self, tool: impl Into<String>) -> Self {
        self.required_tool = tool.into();
        self
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::new(PathBuf::from("/srv/box"));
        assert_eq!(config.port, 8001);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.service_name, "local-app");
        assert!(config.backup_paths.iter().any(|p| p == "config.json"));
        assert!(config.api_token.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"repository":"acme/box","port":9000}"#,
        )
        .unwrap();

        let config = Config::from_file(dir.path()).unwrap();
        assert_eq!(config.repository, "acme/box");
        assert_eq!(config.port, 9000);
        assert_eq!(config.required_tool, "git");
        assert_eq!(config.root, dir.path());
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();

        let err = Config::from_file(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::new(PathBuf::from("/srv/box"))
            .with_env_overrides(lookup(&[
                ("PORT", "8080"),
                ("HOST", "0.0.0.0"),
                ("BOXKEEPER_TOKEN", "s3cret"),
            ]))
            .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.api_token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_empty_token_keeps_auth_disabled() {
        let config = Config::new(PathBuf::from("/srv/box"))
            .with_env_overrides(lookup(&[("BOXKEEPER_TOKEN", "")]))
            .unwrap();
        assert!(config.api_token.is_none());
    }

    #[test]
    fn test_invalid_port_rejected() {
        let err = Config::new(PathBuf::from("/srv/box"))
            .with_env_overrides(lookup(&[("PORT", "eighty")]))
            .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
