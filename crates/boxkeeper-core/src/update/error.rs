//! Update pipeline error types.

use super::requirements::RequirementsReport;
use std::fmt;
use std::io;

/// Update error codes.
pub mod codes {
    pub const ALREADY_RUNNING: &str = "ALREADY_RUNNING";
    pub const NO_UPDATE_AVAILABLE: &str = "NO_UPDATE_AVAILABLE";
    pub const REQUIREMENTS_NOT_MET: &str = "REQUIREMENTS_NOT_MET";
    pub const CONFLICT: &str = "CONFLICT";

    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    pub const RELEASE_NOT_FOUND: &str = "RELEASE_NOT_FOUND";
    pub const REMOTE_ERROR: &str = "REMOTE_ERROR";
    pub const ASSET_NOT_FOUND: &str = "ASSET_NOT_FOUND";
    pub const DOWNLOAD_FAILED: &str = "DOWNLOAD_FAILED";

    pub const UNSUPPORTED_FORMAT: &str = "UNSUPPORTED_FORMAT";
    pub const EXTRACTION_FAILED: &str = "EXTRACTION_FAILED";
    pub const MANIFEST_INVALID: &str = "MANIFEST_INVALID";
    pub const APPLY_FAILED: &str = "APPLY_FAILED";
    pub const SCRIPT_FAILED: &str = "SCRIPT_FAILED";
    pub const VERSION_WRITE_FAILED: &str = "VERSION_WRITE_FAILED";

    pub const BACKUP_FAILED: &str = "BACKUP_FAILED";
    pub const BACKUP_MISSING: &str = "BACKUP_MISSING";
    pub const ROLLBACK_FAILED: &str = "ROLLBACK_FAILED";
    pub const RESTART_FAILED: &str = "RESTART_FAILED";
    pub const CLEANUP_FAILED: &str = "CLEANUP_FAILED";

    pub const IO_ERROR: &str = "IO_ERROR";
}

/// Update pipeline error: a stable code plus a human-readable message.
#[derive(Debug)]
pub struct UpdateError {
    code: &'static str,
    message: String,
    report: Option<Box<RequirementsReport>>,
}

impl UpdateError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            report: None,
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The failing requirements report, for `REQUIREMENTS_NOT_MET`.
    #[must_use]
    pub fn report(&self) -> Option<&RequirementsReport> {
        self.report.as_deref()
    }

    #[must_use]
    pub fn already_running(version: Option<&str>) -> Self {
        let msg = match version {
            Some(v) => format!("An installation of version {v} is already in progress"),
            None => "An installation is already in progress".to_string(),
        };
        Self::new(codes::ALREADY_RUNNING, msg)
    }

    #[must_use]
    pub fn no_update_available(current: &str) -> Self {
        Self::new(
            codes::NO_UPDATE_AVAILABLE,
            format!("No update available (current version {current})"),
        )
    }

    /// Requirements failed; carries the full report for the caller.
    #[must_use]
    pub fn requirements_not_met(report: RequirementsReport) -> Self {
        let detail = if report.errors.is_empty() {
            "one or more checks failed".to_string()
        } else {
            report.errors.join("; ")
        };
        Self {
            code: codes::REQUIREMENTS_NOT_MET,
            message: format!("System requirements not met: {detail}"),
            report: Some(Box::new(report)),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(codes::CONFLICT, msg)
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::new(codes::NETWORK_ERROR, msg)
    }

    #[must_use]
    pub fn release_not_found(repository: &str) -> Self {
        Self::new(
            codes::RELEASE_NOT_FOUND,
            format!("No published release found for {repository}"),
        )
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Self::new(codes::REMOTE_ERROR, msg)
    }

    #[must_use]
    pub fn asset_not_found(version: &str) -> Self {
        Self::new(
            codes::ASSET_NOT_FOUND,
            format!("Release {version} has no update package asset"),
        )
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::DOWNLOAD_FAILED, msg)
    }

    pub fn unsupported_format(msg: impl Into<String>) -> Self {
        Self::new(codes::UNSUPPORTED_FORMAT, msg)
    }

    pub fn extraction_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::EXTRACTION_FAILED, msg)
    }

    pub fn manifest_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::MANIFEST_INVALID, msg)
    }

    pub fn apply_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::APPLY_FAILED, msg)
    }

    pub fn script_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::SCRIPT_FAILED, msg)
    }

    pub fn version_write_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::VERSION_WRITE_FAILED, msg)
    }

    pub fn backup_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::BACKUP_FAILED, msg)
    }

    #[must_use]
    pub fn backup_missing() -> Self {
        Self::new(codes::BACKUP_MISSING, "No backup archive available for rollback")
    }

    pub fn rollback_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::ROLLBACK_FAILED, msg)
    }

    pub fn restart_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::RESTART_FAILED, msg)
    }

    pub fn cleanup_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::CLEANUP_FAILED, msg)
    }

    /// Classify a transport error from a download request.
    #[must_use]
    pub fn from_download(e: &reqwest::Error, url: &str) -> Self {
        if e.is_timeout() || e.is_connect() {
            Self::network(format!("Failed to download '{url}': {e}"))
        } else {
            Self::download_failed(format!("Failed to download '{url}': {e}"))
        }
    }
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for UpdateError {}

impl From<io::Error> for UpdateError {
    fn from(e: io::Error) -> Self {
        Self::new(codes::IO_ERROR, e.to_string())
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::network(format!("Request timed out: {e}"))
        } else if e.is_connect() {
            Self::network(format!("Connection failed: {e}"))
        } else if e.is_request() {
            Self::network(e.to_string())
        } else {
            Self::remote(e.to_string())
        }
    }
}

impl From<serde_json::Error> for UpdateError {
    fn from(e: serde_json::Error) -> Self {
        Self::remote(format!("Invalid JSON: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_starts_with_code() {
        let err = UpdateError::network("Connection failed: refused");
        assert_eq!(err.code(), codes::NETWORK_ERROR);
        assert!(err.to_string().starts_with("NETWORK_ERROR: "));
    }

    #[test]
    fn test_requirements_not_met_keeps_report() {
        let report = RequirementsReport {
            has_git: true,
            has_internet: false,
            has_space: true,
            has_permissions: true,
            tool_installed: false,
            errors: vec!["No internet connection".to_string()],
            can_update: false,
        };
        let err = UpdateError::requirements_not_met(report.clone());
        assert_eq!(err.code(), codes::REQUIREMENTS_NOT_MET);
        assert_eq!(err.report(), Some(&report));
        assert!(err.message().contains("No internet connection"));
    }

    #[test]
    fn test_error_codes_uppercase() {
        let all_codes = [
            codes::ALREADY_RUNNING,
            codes::NO_UPDATE_AVAILABLE,
            codes::REQUIREMENTS_NOT_MET,
            codes::CONFLICT,
            codes::NETWORK_ERROR,
            codes::RELEASE_NOT_FOUND,
            codes::REMOTE_ERROR,
            codes::ASSET_NOT_FOUND,
            codes::DOWNLOAD_FAILED,
            codes::UNSUPPORTED_FORMAT,
            codes::EXTRACTION_FAILED,
            codes::MANIFEST_INVALID,
            codes::APPLY_FAILED,
            codes::SCRIPT_FAILED,
            codes::VERSION_WRITE_FAILED,
            codes::BACKUP_FAILED,
            codes::BACKUP_MISSING,
            codes::ROLLBACK_FAILED,
            codes::RESTART_FAILED,
            codes::CLEANUP_FAILED,
            codes::IO_ERROR,
        ];

        for code in all_codes {
            assert!(
                code.chars().all(|c| c.is_uppercase() || c == '_'),
                "Error code '{code}' should be SCREAMING_SNAKE_CASE"
            );
        }
    }
}
